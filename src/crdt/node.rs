// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! CRDT node: an immutable-position, tombstoneable unit of content (C3).

use crate::clock::AuthorId;
use crate::position::LogicalPosition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: LogicalPosition,
    pub payload: String,
    /// `false` means tombstoned. Never physically removed once created.
    pub visible: bool,
    pub author: AuthorId,
    pub created_at_millis: u64,
}

impl Node {
    #[must_use]
    pub fn new(
        id: NodeId,
        position: LogicalPosition,
        payload: impl Into<String>,
        author: AuthorId,
        created_at_millis: u64,
    ) -> Self {
        Self {
            id,
            position,
            payload: payload.into(),
            visible: true,
            author,
            created_at_millis,
        }
    }

    pub fn tombstone(&mut self) {
        self.visible = false;
    }
}
