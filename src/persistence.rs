// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The persistence contract (A2/§6): `checkpoint:{document_id}:{version}` ->
//! serialized checkpoint bytes, retained at least 24h. Grounded on
//! `daemon/src/actors.rs`'s `Actor` trait, which the same way draws a
//! pluggable-backend boundary around the one thing that has both a real
//! implementation and a test fixture; here the boundary is "where do
//! checkpoint bytes live" rather than "what drives the edits".
//!
//! This crate only defines the contract and an in-memory reference
//! implementation; a real deployment backs [`CheckpointStore`] with
//! whatever durable store it already runs (object storage, a KV cluster).

use crate::document::DocumentId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

fn checkpoint_key(document: DocumentId, version: u64) -> String {
    format!("checkpoint:{document}:{version}")
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn put(&self, document: DocumentId, version: u64, bytes: Vec<u8>);
    async fn get(&self, document: DocumentId, version: u64) -> Option<Vec<u8>>;
    async fn latest_version(&self, document: DocumentId) -> Option<u64>;
}

/// Reference implementation backing tests and single-process deployments
/// that don't need durability across restarts.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    latest: Mutex<HashMap<DocumentId, u64>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put(&self, document: DocumentId, version: u64, bytes: Vec<u8>) {
        let key = checkpoint_key(document, version);
        self.entries.lock().expect("checkpoint store poisoned").insert(key, bytes);
        let mut latest = self.latest.lock().expect("checkpoint store poisoned");
        let entry = latest.entry(document).or_insert(0);
        if version > *entry {
            *entry = version;
        }
    }

    async fn get(&self, document: DocumentId, version: u64) -> Option<Vec<u8>> {
        let key = checkpoint_key(document, version);
        self.entries.lock().expect("checkpoint store poisoned").get(&key).cloned()
    }

    async fn latest_version(&self, document: DocumentId) -> Option<u64> {
        self.latest.lock().expect("checkpoint store poisoned").get(&document).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryCheckpointStore::new();
        let doc = DocumentId(1);
        store.put(doc, 100, b"snapshot-at-100".to_vec()).await;
        assert_eq!(store.get(doc, 100).await, Some(b"snapshot-at-100".to_vec()));
        assert_eq!(store.get(doc, 200).await, None);
    }

    #[tokio::test]
    async fn latest_version_tracks_the_highest_put_so_far() {
        let store = InMemoryCheckpointStore::new();
        let doc = DocumentId(1);
        assert_eq!(store.latest_version(doc).await, None);
        store.put(doc, 100, b"a".to_vec()).await;
        store.put(doc, 50, b"b".to_vec()).await;
        store.put(doc, 200, b"c".to_vec()).await;
        assert_eq!(store.latest_version(doc).await, Some(200));
    }
}
