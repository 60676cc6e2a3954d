// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ordering / Queue (C6): per-author sequence gap-fill and ready-op
//! selection.
//!
//! The teacher has no multi-participant sequencer of its own — it
//! reconciles through `automerge` sync messages directly — so this module
//! is written fresh from the invariants in the specification, using the
//! same "buffer until contiguous, then fixed-point drain" shape implied by
//! [`crate::ot::server::OtSession`]'s revision bookkeeping.

use crate::cache::{CacheEntry, CacheKey, TransformCache};
use crate::clock::AuthorId;
use crate::document::DocumentState;
use crate::error::CollabError;
use crate::op::{Op, OpId};
use crate::ot::server::OtSession;
use dissimilar::Chunk;
use std::collections::HashMap;

pub struct PendingOp {
    pub op: Op,
    pub arrived_at_millis: u64,
}

/// A gap persisted beyond the configured timeout: the transport should
/// ask this author to resync from the document's current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncRequest {
    pub author: AuthorId,
}

pub struct OrderingQueue {
    pending: Vec<PendingOp>,
    pub gap_timeout_millis: u64,
}

impl OrderingQueue {
    #[must_use]
    pub fn new(gap_timeout_millis: u64) -> Self {
        Self {
            pending: Vec::new(),
            gap_timeout_millis,
        }
    }

    pub fn submit(&mut self, op: Op, now_millis: u64) {
        self.pending.push(PendingOp {
            op,
            arrived_at_millis: now_millis,
        });
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn next_expected_sequence(doc: &DocumentState, author: AuthorId) -> u64 {
        doc.participant(author)
            .map_or(1, |p| p.last_accepted_sequence + 1)
    }

    /// Extracts any ready op (seq == participant.last_accepted + 1),
    /// transforms it through the OT engine and commits it, then
    /// re-checks the remaining buffer — a newly advanced participant may
    /// unblock others. Returns one commit result per op that left the
    /// buffer this round.
    ///
    /// Before running an op through [`OtSession::reconcile`], this checks
    /// `cache` for a previously computed transform of the same op against
    /// the same document version and replays it instead of redoing the
    /// transform sweep over every concurrently committed op; a miss
    /// computes and populates the entry for the next caller.
    pub fn drain_ready(
        &mut self,
        doc: &mut DocumentState,
        sessions: &mut HashMap<AuthorId, OtSession>,
        cache: &mut TransformCache,
        now_millis: u64,
    ) -> Vec<Result<u64, CollabError>> {
        let mut results = Vec::new();

        loop {
            let ready_index = self.pending.iter().position(|pending| {
                pending.op.sequence == Self::next_expected_sequence(doc, pending.op.author)
            });

            let Some(index) = ready_index else {
                break;
            };

            let pending = self.pending.remove(index);
            let key = CacheKey::for_op(&pending.op, doc.version());
            let session = sessions
                .entry(pending.op.author)
                .or_insert_with(|| OtSession::new(pending.op.author));

            let transformed = if let Some(cached) = cache.get(&key) {
                let transformed = cached.transformed.clone();
                session.record_committed(transformed.clone());
                transformed
            } else {
                let committed_so_far = doc.recent_ops(doc.version() as usize);
                let transformed = session.reconcile(pending.op, &committed_so_far);
                let inverse = crate::ot::inverse(&transformed, doc.content());
                cache.insert(
                    key,
                    CacheEntry {
                        transformed: transformed.clone(),
                        inverse,
                        conflicts: Vec::new(),
                        inserted_at_millis: now_millis,
                    },
                );
                transformed
            };

            results.push(doc.commit(transformed, now_millis));
        }

        results
    }

    /// Ops from an author whose oldest pending entry has aged past the gap
    /// timeout are discarded, never forged; a `ResyncRequest` is raised
    /// for the transport to handle instead.
    pub fn expire_gaps(&mut self, now_millis: u64) -> Vec<ResyncRequest> {
        let timeout = self.gap_timeout_millis;
        let mut stale_authors = Vec::new();
        for pending in &self.pending {
            let age = now_millis.saturating_sub(pending.arrived_at_millis);
            if age > timeout && !stale_authors.contains(&pending.op.author) {
                stale_authors.push(pending.op.author);
            }
        }
        self.pending
            .retain(|pending| !stale_authors.contains(&pending.op.author));
        stale_authors
            .into_iter()
            .map(|author| ResyncRequest { author })
            .collect()
    }
}

/// Turns a resync participant's full buffer into a minimal op sequence
/// against the document's current content, the same way
/// `daemon/src/document.rs` diffs an editor's desired buffer against the
/// CRDT instead of forcing a whole-document replace. Used once a
/// [`ResyncRequest`] comes back with the participant's current text: the
/// transport hands both strings here rather than rebuilding the document
/// from scratch.
#[must_use]
pub fn resync_ops_from_full_text(
    current: &str,
    desired_text: &str,
    author: AuthorId,
    document: crate::document::DocumentId,
    first_op_id: u64,
    first_sequence: u64,
) -> Vec<Op> {
    let chunks = dissimilar::diff(current, desired_text);
    let mut ops = Vec::new();
    let mut position = 0usize;
    let mut op_id = first_op_id;
    let mut sequence = first_sequence;

    for chunk in chunks {
        match chunk {
            Chunk::Equal(text) => {
                position += text.chars().count();
            }
            Chunk::Delete(text) => {
                let len = text.chars().count();
                ops.push(Op::delete(OpId(op_id), document, author, sequence, position, len));
                op_id += 1;
                sequence += 1;
            }
            Chunk::Insert(text) => {
                ops.push(Op::insert(OpId(op_id), document, author, sequence, position, text));
                position += text.chars().count();
                op_id += 1;
                sequence += 1;
            }
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ReplicationStrategy;
    use crate::op::OpId;
    use pretty_assertions::assert_eq;

    fn ins(id: u64, author: u64, seq: u64, pos: usize, text: &str) -> Op {
        Op::insert(OpId(id), crate::document::DocumentId(1), AuthorId(author), seq, pos, text)
    }

    #[test]
    fn out_of_order_seq_stays_buffered_until_gap_fills() {
        let mut doc = DocumentState::initialize(
            crate::document::DocumentId(1),
            ReplicationStrategy::Ot,
            "",
            0,
        );
        let mut queue = OrderingQueue::new(30_000);
        let mut sessions = HashMap::new();
        let mut cache = TransformCache::new(60_000);

        queue.submit(ins(2, 1, 2, 0, "b"), 0);
        let results = queue.drain_ready(&mut doc, &mut sessions, &mut cache, 0);
        assert!(results.is_empty());
        assert_eq!(queue.pending_count(), 1);

        queue.submit(ins(1, 1, 1, 0, "a"), 1);
        let results = queue.drain_ready(&mut doc, &mut sessions, &mut cache, 1);
        assert_eq!(results.len(), 2);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(doc.content(), "ab");
    }

    #[test]
    fn gap_beyond_timeout_emits_resync_and_drops_buffered_ops() {
        let mut queue = OrderingQueue::new(1000);
        queue.submit(ins(2, 1, 2, 0, "b"), 0);

        let resyncs = queue.expire_gaps(500);
        assert!(resyncs.is_empty());

        let resyncs = queue.expire_gaps(1501);
        assert_eq!(resyncs, vec![ResyncRequest { author: AuthorId(1) }]);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn resync_ops_reconstruct_the_desired_text() {
        use crate::document::DocumentId;
        use crate::ot::apply;

        let current = "hello world";
        let desired = "hello brave world";
        let ops = resync_ops_from_full_text(current, desired, AuthorId(1), DocumentId(1), 1, 1);
        assert!(!ops.is_empty());

        let mut content = current.to_string();
        for op in ops {
            content = apply(&op, &content).unwrap();
        }
        assert_eq!(content, desired);
    }
}
