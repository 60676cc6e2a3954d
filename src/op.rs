// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `Op` type: the unit of change flowing through the OT path.
//!
//! Grounded on `types.rs`'s `TextDelta`/`TextOp` pair, generalized from a
//! delta-of-ops-over-one-document shape into the spec's single tagged `Op`
//! carrying its own author, sequence number, and document scope.

use crate::clock::AuthorId;
use crate::document::DocumentId;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("op:{}", self.0)]
pub struct OpId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Insert(String),
    Delete(usize),
    Retain(usize),
    Format(BTreeMap<String, String>),
}

impl OpKind {
    #[must_use]
    pub const fn is_retain(&self) -> bool {
        matches!(self, Self::Retain(_))
    }

    /// The number of characters this op kind spans in the *pre-apply*
    /// content (0 for inserts, which don't consume any existing content).
    #[must_use]
    pub fn span_len(&self) -> usize {
        match self {
            Self::Insert(_) => 0,
            Self::Delete(len) | Self::Retain(len) => *len,
            Self::Format(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub id: OpId,
    pub document: DocumentId,
    pub author: AuthorId,
    pub kind: OpKind,
    /// Absolute character position this op applies at.
    pub position: usize,
    /// Monotonic per-(document, author) sequence number, 1-based.
    pub sequence: u64,
    /// Advisory only; MUST NOT be used to break transform ties.
    pub timestamp_millis: u64,
    pub depends_on: BTreeSet<OpId>,
}

impl Op {
    #[must_use]
    pub fn insert(
        id: OpId,
        document: DocumentId,
        author: AuthorId,
        sequence: u64,
        position: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            document,
            author,
            kind: OpKind::Insert(text.into()),
            position,
            sequence,
            timestamp_millis: 0,
            depends_on: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn delete(
        id: OpId,
        document: DocumentId,
        author: AuthorId,
        sequence: u64,
        position: usize,
        len: usize,
    ) -> Self {
        Self {
            id,
            document,
            author,
            kind: OpKind::Delete(len),
            position,
            sequence,
            timestamp_millis: 0,
            depends_on: BTreeSet::new(),
        }
    }

    /// The canonical linearization order: `(sequence_number, author_id)`.
    /// Wall-clock timestamps never participate in tie-breaking.
    #[must_use]
    pub fn order_key(&self) -> (u64, AuthorId) {
        (self.sequence, self.author)
    }
}

#[cfg(test)]
mod factories {
    use super::*;

    pub fn ins(id: u64, author: u64, seq: u64, pos: usize, text: &str) -> Op {
        Op::insert(OpId(id), DocumentId(1), AuthorId(author), seq, pos, text)
    }

    pub fn del(id: u64, author: u64, seq: u64, pos: usize, len: usize) -> Op {
        Op::delete(OpId(id), DocumentId(1), AuthorId(author), seq, pos, len)
    }
}
