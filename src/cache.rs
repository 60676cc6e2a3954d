// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transform Cache (C9): memoized transform results, evicted by a single
//! sweeping pass.
//!
//! The source evicts cache entries with a per-entry timer (effectively a
//! `setTimeout` per cache key); the design notes flag this as needing
//! re-architecture. This cache instead exposes a `sweep` the caller drives
//! periodically (or opportunistically, alongside checkpointing), which
//! walks the map once and drops everything past its TTL — O(1) amortized
//! per lookup, no per-entry scheduling at all.

use crate::op::{Op, OpId, OpKind};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub op_id: OpId,
    pub document_version_at_apply: u64,
    pub op_kind: CacheableKind,
    pub position: usize,
}

/// A hashable, comparable fingerprint of an [`OpKind`] — `OpKind` itself
/// carries owned text/attribute payloads that are irrelevant to cache
/// identity, only the discriminant and length matter here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheableKind {
    Insert(usize),
    Delete(usize),
    Retain(usize),
    Format,
}

impl From<&OpKind> for CacheableKind {
    fn from(kind: &OpKind) -> Self {
        match kind {
            OpKind::Insert(text) => Self::Insert(text.chars().count()),
            OpKind::Delete(len) => Self::Delete(*len),
            OpKind::Retain(len) => Self::Retain(*len),
            OpKind::Format(_) => Self::Format,
        }
    }
}

impl CacheKey {
    #[must_use]
    pub fn for_op(op: &Op, document_version_at_apply: u64) -> Self {
        Self {
            op_id: op.id,
            document_version_at_apply,
            op_kind: CacheableKind::from(&op.kind),
            position: op.position,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub transformed: Op,
    pub inverse: Op,
    pub conflicts: Vec<OpId>,
    pub inserted_at_millis: u64,
}

pub struct TransformCache {
    entries: HashMap<CacheKey, CacheEntry>,
    ttl_millis: u64,
}

impl TransformCache {
    #[must_use]
    pub fn new(ttl_millis: u64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_millis,
        }
    }

    /// Best-effort lookup: a miss simply means the caller recomputes.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Single sweeping pass: drops every entry older than the configured
    /// TTL. Call this periodically; there is no per-entry timer.
    pub fn sweep(&mut self, now_millis: u64) {
        self.entries
            .retain(|_, entry| now_millis.saturating_sub(entry.inserted_at_millis) <= self.ttl_millis);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AuthorId;
    use crate::document::DocumentId;
    use pretty_assertions::assert_eq;

    fn op(id: u64) -> Op {
        Op::insert(OpId(id), DocumentId(1), AuthorId(1), 1, 0, "x")
    }

    #[test]
    fn hit_then_miss_after_sweep_past_ttl() {
        let mut cache = TransformCache::new(1000);
        let key = CacheKey::for_op(&op(1), 5);
        cache.insert(
            key.clone(),
            CacheEntry {
                transformed: op(1),
                inverse: op(1),
                conflicts: vec![],
                inserted_at_millis: 0,
            },
        );
        assert!(cache.get(&key).is_some());

        cache.sweep(500);
        assert!(cache.get(&key).is_some());

        cache.sweep(1500);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn cache_key_ignores_text_payload_identity() {
        let a = Op::insert(OpId(1), DocumentId(1), AuthorId(1), 1, 0, "hello");
        let b = Op::insert(OpId(1), DocumentId(1), AuthorId(1), 1, 0, "world");
        assert_eq!(
            CacheKey::for_op(&a, 5),
            CacheKey::for_op(&b, 5),
            "same id/version/kind-length/position should collide regardless of text content"
        );
    }
}
