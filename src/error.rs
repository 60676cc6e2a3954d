// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured error kinds surfaced across the collaboration core.
//!
//! Internal call chains that aren't part of a public boundary keep using
//! `anyhow::Result` with `.context(...)`; this type exists for the seams
//! that callers (the session layer, the fabric, the CLI) need to match on.

use crate::clock::AuthorId;
use crate::document::DocumentId;
use crate::op::OpId;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CollabError {
    #[error("permission denied for author {author} on document {document}")]
    PermissionDenied {
        author: AuthorId,
        document: DocumentId,
    },

    #[error("invalid operation {op_id}: {reason}")]
    InvalidOperation { op_id: OpId, reason: String },

    #[error("sequence gap for author {author} on document {document}: expected {expected}, got {got}")]
    SequenceGap {
        document: DocumentId,
        author: AuthorId,
        expected: u64,
        got: u64,
    },

    #[error("unknown document {document}")]
    UnknownDocument { document: DocumentId },

    #[error("backpressure: destination queue for {destination} exceeded its high-water mark")]
    Backpressure { destination: String },

    #[error("fabric unavailable: {reason}")]
    FabricUnavailable { reason: String },

    #[error("version {target} is unreachable: no checkpoint covers it")]
    UnreachableVersion { target: u64 },

    #[error("document {document} quarantined after invariant violation: {reason}")]
    Inconsistency {
        document: DocumentId,
        reason: String,
    },
}

impl CollabError {
    /// Whether a caller may recover locally (retry, drop, or resync) without
    /// tearing down the document.
    #[must_use]
    pub const fn is_locally_recoverable(&self) -> bool {
        !matches!(self, Self::Inconsistency { .. })
    }
}

pub type Result<T> = std::result::Result<T, CollabError>;
