// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client protocol (external interface, §6): the messages a transport
//! connection exchanges with the collaboration core.
//!
//! Grounded on `editor_protocol.rs`'s tagged-enum JSON-RPC shape, carrying
//! this crate's own `Op`/document-state types instead of editor text-edit
//! deltas. The exact wire encoding is out of scope (per the spec); this
//! defines the semantic shape with `serde` derives so any transport can
//! encode it.

use crate::clock::AuthorId;
use crate::document::{DocumentId, ParticipantState};
use crate::op::{Op, OpId};
use crate::session::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    Join {
        document_id: DocumentId,
        user_id: AuthorId,
        user_name: String,
        role: Role,
    },
    Submit {
        op: Op,
    },
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub content: String,
    pub version: u64,
    pub participants: Vec<ParticipantState>,
    pub recent_ops: Vec<Op>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerPush {
    RemoteOp { op: Op },
    ParticipantJoined { author: AuthorId, display_name: String },
    ParticipantLeft { author: AuthorId },
    Resync { from_version: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SubmitOutcome {
    Ack { op_id: OpId, new_version: u64 },
    Reject { op_id: OpId, reason: String },
}
