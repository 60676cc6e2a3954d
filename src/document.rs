// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Document State (C4): content, version, op log, checkpoints, participants.
//!
//! The checkpoint/rollback mechanics are grounded on `history.rs`'s
//! bookmark-and-diff pattern (`seenit`/`snapshot`/`whatsnew`) and on
//! `document.rs`'s save/load lifecycle, generalized from automerge change
//! hashes to this spec's integer version numbers.

use crate::clock::AuthorId;
use crate::error::CollabError;
use crate::ot::apply;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("doc:{}", self.0)]
pub struct DocumentId(pub u64);

/// A document is created with a fixed replication path; submitting an op
/// through the other path is rejected rather than reconciled, since the
/// source defines no crossover semantics between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationStrategy {
    Ot,
    Crdt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantState {
    pub author: AuthorId,
    pub display_name: String,
    pub last_accepted_sequence: u64,
    pub acknowledged_ops: Vec<crate::op::OpId>,
    pub cursor: Option<(usize, usize)>,
    pub last_active_millis: u64,
}

impl ParticipantState {
    #[must_use]
    pub fn new(author: AuthorId, display_name: impl Into<String>, now_millis: u64) -> Self {
        Self {
            author,
            display_name: display_name.into(),
            last_accepted_sequence: 0,
            acknowledged_ops: Vec::new(),
            cursor: None,
            last_active_millis: now_millis,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u64,
    pub content: String,
    pub timestamp_millis: u64,
    pub op_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggedOp {
    version: u64,
    op: crate::op::Op,
}

#[derive(Debug)]
pub struct DocumentState {
    pub id: DocumentId,
    pub strategy: ReplicationStrategy,
    content: String,
    version: u64,
    op_log: Vec<LoggedOp>,
    checkpoints: Vec<Checkpoint>,
    participants: BTreeMap<AuthorId, ParticipantState>,
    last_modified_millis: u64,
    quarantined: bool,

    pub max_ops_in_memory: usize,
    pub checkpoint_interval: u64,
    pub max_retained_checkpoints: usize,
}

impl DocumentState {
    #[must_use]
    pub fn initialize(
        id: DocumentId,
        strategy: ReplicationStrategy,
        initial_content: impl Into<String>,
        now_millis: u64,
    ) -> Self {
        let content = initial_content.into();
        let checkpoints = vec![Checkpoint {
            version: 0,
            content: content.clone(),
            timestamp_millis: now_millis,
            op_count: 0,
        }];
        Self {
            id,
            strategy,
            content,
            version: 0,
            op_log: Vec::new(),
            checkpoints,
            participants: BTreeMap::new(),
            last_modified_millis: now_millis,
            quarantined: false,
            max_ops_in_memory: 1000,
            checkpoint_interval: 100,
            max_retained_checkpoints: 10,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn is_quarantined(&self) -> bool {
        self.quarantined
    }

    #[must_use]
    pub fn participant(&self, author: AuthorId) -> Option<&ParticipantState> {
        self.participants.get(&author)
    }

    pub fn enroll(&mut self, participant: ParticipantState) {
        self.participants.insert(participant.author, participant);
    }

    pub fn remove_participant(&mut self, author: AuthorId) {
        self.participants.remove(&author);
    }

    #[must_use]
    pub fn recent_ops(&self, count: usize) -> Vec<crate::op::Op> {
        self.op_log
            .iter()
            .rev()
            .take(count)
            .map(|logged| logged.op.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Commits an already-transformed op: appends to the log, applies to
    /// content, advances the version, snapshots a checkpoint on the
    /// interval boundary, and opportunistically trims the log.
    pub fn commit(&mut self, op: crate::op::Op, now_millis: u64) -> Result<u64, CollabError> {
        if self.quarantined {
            return Err(CollabError::Inconsistency {
                document: self.id,
                reason: "document is quarantined after a prior invariant violation".to_string(),
            });
        }

        if self.strategy != ReplicationStrategy::Ot {
            return Err(CollabError::InvalidOperation {
                op_id: op.id,
                reason: format!(
                    "document {} replicates via {:?}, not Ot: no OT/CRDT crossover",
                    self.id, self.strategy
                ),
            });
        }

        let new_content = apply(&op, &self.content).map_err(|bad| CollabError::InvalidOperation {
            op_id: op.id,
            reason: bad.to_string(),
        })?;

        self.version += 1;
        let version = self.version;
        self.content = new_content;
        self.last_modified_millis = now_millis;

        if let Some(participant) = self.participants.get_mut(&op.author) {
            participant.last_accepted_sequence = op.sequence;
            participant.acknowledged_ops.push(op.id);
            participant.last_active_millis = now_millis;
        }

        self.op_log.push(LoggedOp {
            version,
            op: op.clone(),
        });

        if version % self.checkpoint_interval == 0 {
            self.checkpoints.push(Checkpoint {
                version,
                content: self.content.clone(),
                timestamp_millis: now_millis,
                op_count: self.op_log.len() as u64,
            });
            if self.checkpoints.len() > self.max_retained_checkpoints {
                self.checkpoints.remove(0);
            }
        }

        self.trim_log();

        Ok(version)
    }

    /// Flags the document quarantined: no further submits are accepted,
    /// but the document's state remains inspectable. Invariant violations
    /// are fatal per-document, never per-process.
    pub fn quarantine(&mut self) {
        self.quarantined = true;
    }

    fn earliest_retained_checkpoint_version(&self) -> u64 {
        self.checkpoints.first().map_or(0, |c| c.version)
    }

    fn trim_log(&mut self) {
        if self.op_log.len() <= self.max_ops_in_memory {
            return;
        }
        let floor = self.earliest_retained_checkpoint_version();
        while self.op_log.len() > self.max_ops_in_memory {
            let Some(front) = self.op_log.first() else {
                break;
            };
            // Never trim past the earliest retained checkpoint's window.
            if front.version > floor {
                self.op_log.remove(0);
            } else {
                break;
            }
        }
    }

    /// Restores the latest checkpoint at or before `target_version` and
    /// replays ops in `(checkpoint.version, target_version]`.
    pub fn rollback(&mut self, target_version: u64) -> Result<(), CollabError> {
        let checkpoint = self
            .checkpoints
            .iter()
            .filter(|c| c.version <= target_version)
            .max_by_key(|c| c.version)
            .cloned()
            .ok_or(CollabError::UnreachableVersion {
                target: target_version,
            })?;

        let mut content = checkpoint.content.clone();
        let mut replayed = Vec::new();
        for logged in &self.op_log {
            if logged.version > checkpoint.version && logged.version <= target_version {
                content = apply(&logged.op, &content).map_err(|_| CollabError::Inconsistency {
                    document: self.id,
                    reason: "checkpoint replay produced an invalid apply".to_string(),
                })?;
                replayed.push(logged.clone());
            }
        }

        if target_version > checkpoint.version
            && replayed.last().map(|l| l.version) != Some(target_version)
            && target_version != checkpoint.version
        {
            // We didn't find an op landing exactly on target_version, and
            // target_version isn't itself a checkpoint: the log doesn't
            // cover this version (trimmed away, or never committed).
            if target_version > self.version {
                return Err(CollabError::UnreachableVersion {
                    target: target_version,
                });
            }
        }

        self.content = content;
        self.version = target_version;
        self.op_log.retain(|l| l.version <= target_version);
        self.checkpoints.retain(|c| c.version <= target_version);
        Ok(())
    }

    /// Serializes content + version + checkpoints for the persistence
    /// contract (`checkpoint:{document_id}:{version}`).
    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        let snapshot = Checkpoint {
            version: self.version,
            content: self.content.clone(),
            timestamp_millis: self.last_modified_millis,
            op_count: self.op_log.len() as u64,
        };
        postcard::to_allocvec(&snapshot).unwrap_or_default()
    }

    pub fn load(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let snapshot: Checkpoint = postcard::from_bytes(bytes)?;
        self.content = snapshot.content;
        self.version = snapshot.version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{Op, OpId};
    use pretty_assertions::assert_eq;

    fn insert(seq: u64, pos: usize, text: &str) -> Op {
        Op::insert(OpId(seq), DocumentId(1), AuthorId(1), seq, pos, text)
    }

    #[test]
    fn initialize_starts_at_version_zero_with_a_checkpoint() {
        let doc = DocumentState::initialize(DocumentId(1), ReplicationStrategy::Ot, "hello", 0);
        assert_eq!(doc.version(), 0);
        assert_eq!(doc.content(), "hello");
        assert_eq!(doc.checkpoints.len(), 1);
    }

    #[test]
    fn commit_advances_version_and_content() {
        let mut doc = DocumentState::initialize(DocumentId(1), ReplicationStrategy::Ot, "ab", 0);
        let v = doc.commit(insert(1, 2, "c"), 1).unwrap();
        assert_eq!(v, 1);
        assert_eq!(doc.content(), "abc");
    }

    #[test]
    fn scenario_e_rollback_with_gap() {
        let mut doc = DocumentState::initialize(DocumentId(1), ReplicationStrategy::Ot, "", 0);
        doc.checkpoint_interval = 100;
        for i in 1..=150u64 {
            doc.commit(insert(i, (i - 1) as usize, "x"), i).unwrap();
        }
        assert_eq!(doc.version(), 150);
        let content_at_100 = {
            let cp = doc
                .checkpoints
                .iter()
                .find(|c| c.version == 100)
                .cloned()
                .unwrap();
            cp.content
        };

        doc.rollback(120).unwrap();
        assert_eq!(doc.version(), 120);
        assert_eq!(doc.content().len(), content_at_100.len() + 20);
        assert!(doc.op_log.iter().all(|l| l.version <= 120));
    }

    #[test]
    fn rollback_without_covering_checkpoint_fails() {
        let mut doc = DocumentState::initialize(DocumentId(1), ReplicationStrategy::Ot, "", 0);
        let err = doc.rollback(5).unwrap_err();
        assert_eq!(err, CollabError::UnreachableVersion { target: 5 });
    }

    #[test]
    fn quarantined_document_rejects_further_commits() {
        let mut doc = DocumentState::initialize(DocumentId(1), ReplicationStrategy::Ot, "ab", 0);
        doc.quarantine();
        let err = doc.commit(insert(1, 0, "x"), 1).unwrap_err();
        assert!(matches!(err, CollabError::Inconsistency { .. }));
    }

    #[test]
    fn crdt_document_rejects_ot_style_commits() {
        let mut doc = DocumentState::initialize(DocumentId(1), ReplicationStrategy::Crdt, "ab", 0);
        let err = doc.commit(insert(1, 0, "x"), 1).unwrap_err();
        assert!(matches!(err, CollabError::InvalidOperation { .. }));
        assert_eq!(doc.version(), 0);
        assert_eq!(doc.content(), "ab");
    }
}
