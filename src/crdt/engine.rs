// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Order-independent CRDT engine (C3): insert/delete/merge without a
//! central sequencer.
//!
//! Grounded in spirit on the corpus's RGA-style implementations (a node
//! set keyed by identity, tombstones instead of physical removal, a
//! vector clock gating remote application), rewritten against this
//! crate's own [`Node`]/[`LogicalPosition`]/[`VectorClock`] types rather
//! than reusing `automerge`, which hides exactly the primitives this
//! engine needs to expose.

use crate::clock::{AuthorId, VectorClock};
use crate::crdt::node::{Node, NodeId};
use crate::position::LogicalPosition;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub enum CrdtOpKind {
    Insert(Node),
    Delete(NodeId),
}

/// A CRDT mutation as it travels the wire: the kind, plus the author's
/// vector clock *after* minting this op (so the op's own author-component
/// equals its own per-author sequence number).
#[derive(Debug, Clone)]
pub struct CrdtOp {
    pub kind: CrdtOpKind,
    pub author: AuthorId,
    pub clock: VectorClock,
}

impl CrdtOp {
    /// The causal dependencies this op requires to already be satisfied
    /// before it can be applied: every other author's component as
    /// stamped, and the issuing author's own prior op (one less than its
    /// own stamped component, since the op itself supplies that count).
    fn dependencies(&self) -> VectorClock {
        let mut deps = self.clock.clone();
        let own = deps.get(self.author);
        if own > 0 {
            // observe() only ever raises; to lower we rebuild.
            let mut rebuilt = VectorClock::new();
            for author in all_authors(&self.clock) {
                let count = if author == self.author {
                    own - 1
                } else {
                    self.clock.get(author)
                };
                if count > 0 {
                    rebuilt.observe(author, count);
                }
            }
            deps = rebuilt;
        }
        deps
    }
}

fn all_authors(clock: &VectorClock) -> Vec<AuthorId> {
    // VectorClock doesn't expose iteration directly; reconstruct via a
    // small debug-format-free scan isn't available, so track authors
    // separately wherever a clock is built. Engine below always builds
    // `dependencies()` immediately after stamping a clock it owns, so we
    // thread the known author set in through the op's own clock updates.
    clock.authors()
}

#[derive(Debug, Default)]
pub struct CrdtEngine {
    nodes: BTreeMap<NodeId, Node>,
    /// What this replica has applied so far.
    clock: VectorClock,
    /// Remote ops that arrived before their causal dependencies.
    pending: Vec<CrdtOp>,
    next_node_id: u64,
}

impl CrdtEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Mints a position strictly between `after` and its current successor
    /// (or the end sentinel), inserts a new visible node there, and returns
    /// the op to broadcast to other replicas.
    pub fn insert_between(
        &mut self,
        after: &LogicalPosition,
        text: impl Into<String>,
        author: AuthorId,
        now_millis: u64,
    ) -> CrdtOp {
        let successor = self.successor_position(after);
        let position = LogicalPosition::between(after, &successor, author);

        self.next_node_id += 1;
        let node = Node::new(NodeId(self.next_node_id), position, text, author, now_millis);
        self.nodes.insert(node.id, node.clone());

        self.clock.inc(author);
        CrdtOp {
            kind: CrdtOpKind::Insert(node),
            author,
            clock: self.clock.clone(),
        }
    }

    /// Tombstones the node at `id`. Idempotent.
    pub fn delete_at(&mut self, id: NodeId, author: AuthorId) -> CrdtOp {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.tombstone();
        }
        self.clock.inc(author);
        CrdtOp {
            kind: CrdtOpKind::Delete(id),
            author,
            clock: self.clock.clone(),
        }
    }

    /// Applies a remote op if causally ready; otherwise buffers it. After
    /// applying, re-checks the buffer for ops that are now ready (fixed
    /// point), since advancing one author may unblock others.
    pub fn apply_remote(&mut self, op: CrdtOp) {
        self.pending.push(op);
        loop {
            let ready_index = self
                .pending
                .iter()
                .position(|candidate| self.clock.satisfies(&candidate.dependencies()));
            let Some(index) = ready_index else {
                break;
            };
            let ready = self.pending.remove(index);
            self.apply_ready(ready);
        }
    }

    fn apply_ready(&mut self, op: CrdtOp) {
        match op.kind {
            CrdtOpKind::Insert(node) => {
                self.nodes.entry(node.id).or_insert(node);
            }
            CrdtOpKind::Delete(id) => {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.tombstone();
                }
            }
        }
        self.clock = VectorClock::merge(&self.clock, &op.clock);
    }

    /// Sorts all visible nodes by logical position and concatenates their
    /// payloads. This is the authoritative view of document content.
    #[must_use]
    pub fn materialize(&self) -> String {
        let mut visible: Vec<&Node> = self.nodes.values().filter(|n| n.visible).collect();
        visible.sort_by(|a, b| a.position.cmp(&b.position));
        visible.iter().map(|n| n.payload.as_str()).collect()
    }

    #[must_use]
    pub fn node_at_index(&self, index: usize) -> Option<NodeId> {
        let mut visible: Vec<&Node> = self.nodes.values().filter(|n| n.visible).collect();
        visible.sort_by(|a, b| a.position.cmp(&b.position));
        visible.get(index).map(|n| n.id)
    }

    fn successor_position(&self, after: &LogicalPosition) -> LogicalPosition {
        self.nodes
            .values()
            .map(|n| &n.position)
            .filter(|pos| *pos > after)
            .min()
            .cloned()
            .unwrap_or_else(LogicalPosition::end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn materialize_concatenates_in_position_order() {
        let mut engine = CrdtEngine::new();
        let begin = LogicalPosition::begin();
        let a = engine.insert_between(&begin, "A", AuthorId(1), 0);
        let CrdtOpKind::Insert(a_node) = a.kind.clone() else {
            unreachable!()
        };
        let _b = engine.insert_between(&a_node.position, "B", AuthorId(1), 1);
        assert_eq!(engine.materialize(), "AB");
    }

    #[test]
    fn delete_tombstones_rather_than_removes() {
        let mut engine = CrdtEngine::new();
        let begin = LogicalPosition::begin();
        let op = engine.insert_between(&begin, "A", AuthorId(1), 0);
        let CrdtOpKind::Insert(node) = op.kind else {
            unreachable!()
        };
        engine.delete_at(node.id, AuthorId(1));
        assert_eq!(engine.materialize(), "");
        assert!(engine.nodes.contains_key(&node.id));
    }

    #[test]
    fn out_of_order_remote_ops_buffer_until_causally_ready() {
        let mut origin = CrdtEngine::new();
        let begin = LogicalPosition::begin();
        let op1 = origin.insert_between(&begin, "A", AuthorId(1), 0);
        let CrdtOpKind::Insert(node1) = op1.kind.clone() else {
            unreachable!()
        };
        let op2 = origin.insert_between(&node1.position, "B", AuthorId(1), 1);

        let mut replica = CrdtEngine::new();
        // op2 depends on op1 (same author, sequential); applying it first
        // must buffer rather than apply.
        replica.apply_remote(op2.clone());
        assert_eq!(replica.materialize(), "");

        replica.apply_remote(op1.clone());
        assert_eq!(replica.materialize(), "AB");
    }

    #[test]
    fn convergence_across_apply_orders() {
        let mut origin = CrdtEngine::new();
        let begin = LogicalPosition::begin();
        let op_a = origin.insert_between(&begin, "A", AuthorId(1), 0);
        let CrdtOpKind::Insert(a_node) = op_a.kind.clone() else {
            unreachable!()
        };
        let op_b = origin.insert_between(&a_node.position, "B", AuthorId(2), 1);
        let op_c = origin.insert_between(&begin, "C", AuthorId(3), 2);

        let mut replica_1 = CrdtEngine::new();
        for op in [op_a.clone(), op_b.clone(), op_c.clone()] {
            replica_1.apply_remote(op);
        }

        let mut replica_2 = CrdtEngine::new();
        for op in [op_c, op_a, op_b] {
            replica_2.apply_remote(op);
        }

        assert_eq!(replica_1.materialize(), replica_2.materialize());
        assert_eq!(origin.materialize(), replica_1.materialize());
    }
}
