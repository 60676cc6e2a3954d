// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-participant OT reconciliation queue.
//!
//! Grounded on `ot.rs`'s `OTServer`, generalized from "one document, one
//! editor connection" to "one document, one participant's pending-ack
//! queue" so it composes with the multi-participant [`crate::ordering`]
//! stage. Where the source keeps `editor_revision`/`daemon_revision`
//! counters and a queue of unacknowledged edits, this keeps the same
//! shape using this crate's own [`Op`] type and its own [`transform`].

use crate::clock::AuthorId;
use crate::op::Op;
use crate::ot::transform::transform;

/// Tracks one participant's outstanding, not-yet-committed ops so that
/// later incoming ops from the same author can be transformed against the
/// participant's own pending queue before being transformed against
/// concurrent ops from other authors.
#[derive(Debug, Default)]
pub struct OtSession {
    pub author: AuthorId,
    /// Ops from this author the document has committed, most recent last.
    committed: Vec<Op>,
}

impl OtSession {
    #[must_use]
    pub fn new(author: AuthorId) -> Self {
        Self {
            author,
            committed: Vec::new(),
        }
    }

    /// Transforms `incoming` (from this session's author) against every op
    /// committed by *other* authors since `incoming`'s base version, in
    /// commit order, then records the result as committed.
    pub fn reconcile(&mut self, mut incoming: Op, committed_since_base: &[Op]) -> Op {
        for other in committed_since_base {
            if other.author == self.author {
                continue;
            }
            incoming = transform(&incoming, other);
        }
        self.committed.push(incoming.clone());
        incoming
    }

    /// Records an op as committed without transforming it — used when a
    /// cached transform result is replayed instead of recomputed, so the
    /// session's bookkeeping stays consistent either way.
    pub fn record_committed(&mut self, op: Op) {
        self.committed.push(op);
    }

    #[must_use]
    pub fn last_accepted_sequence(&self) -> u64 {
        self.committed.last().map_or(0, |op| op.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentId;
    use crate::op::OpId;
    use pretty_assertions::assert_eq;

    fn ins(id: u64, author: u64, seq: u64, pos: usize, text: &str) -> Op {
        Op::insert(OpId(id), DocumentId(1), AuthorId(author), seq, pos, text)
    }

    #[test]
    fn reconciles_against_concurrent_committed_ops_only() {
        let mut session = OtSession::new(AuthorId(2));
        let alice_committed = ins(1, 1, 1, 2, "X");
        let bob_incoming = ins(2, 2, 1, 4, "Y");

        let reconciled = session.reconcile(bob_incoming, std::slice::from_ref(&alice_committed));
        assert_eq!(reconciled.position, 5);
        assert_eq!(session.last_accepted_sequence(), 1);
    }

    #[test]
    fn skips_own_prior_ops_in_the_committed_window() {
        let mut session = OtSession::new(AuthorId(1));
        let own_prior = ins(1, 1, 1, 0, "A");
        let incoming = ins(2, 1, 2, 5, "B");

        let reconciled = session.reconcile(incoming, std::slice::from_ref(&own_prior));
        // Unaffected: own_prior is filtered out, so the position is untouched.
        assert_eq!(reconciled.position, 5);
    }
}
