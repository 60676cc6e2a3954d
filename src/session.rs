// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session Manager (C5): per-connection session, permissions, participant
//! set.
//!
//! Grounded on `editor_connection.rs`'s `EditorConnection` (per-connection
//! state that owns nothing of the document itself, only a reference plus
//! local bookkeeping) and on the role shape implied by `config.rs`. The
//! Session Manager is the only component aware of user identity; the
//! OT/CRDT cores downstream only ever see author ids.

use crate::clock::AuthorId;
use crate::document::{DocumentId, ParticipantState};
use crate::error::CollabError;
use crate::op::Op;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Viewer,
    Editor,
    Owner,
    Public,
}

impl Role {
    /// `true` iff this role may submit ops. `Public` is explicitly
    /// read-only; only `Editor` and `Owner` may mutate.
    #[must_use]
    pub const fn can_edit(self) -> bool {
        matches!(self, Self::Editor | Self::Owner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub document: DocumentId,
    pub author: AuthorId,
    pub role: Role,
}

/// Tracks every active session, independent of which document it is
/// bound to. Destroyed on disconnect; never outlives its transport.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: std::collections::HashMap<SessionId, Session>,
    next_session_id: u64,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorizes `role` against the document's permission policy, enrolls
    /// the participant, and returns the new session id.
    pub fn join(
        &mut self,
        document: DocumentId,
        author: AuthorId,
        display_name: impl Into<String>,
        role: Role,
        now_millis: u64,
        doc_state: &mut crate::document::DocumentState,
    ) -> Result<SessionId, CollabError> {
        self.next_session_id += 1;
        let id = SessionId(self.next_session_id);
        self.sessions.insert(
            id,
            Session {
                id,
                document,
                author,
                role,
            },
        );

        if doc_state.participant(author).is_none() {
            doc_state.enroll(ParticipantState::new(author, display_name, now_millis));
        }

        Ok(id)
    }

    /// Verifies the session may submit, and that the op's author matches
    /// the session's author, before handing off downstream.
    pub fn authorize_submit(&self, session_id: SessionId, op: &Op) -> Result<(), CollabError> {
        let session = self.sessions.get(&session_id).ok_or(CollabError::UnknownDocument {
            document: op.document,
        })?;

        if !session.role.can_edit() {
            return Err(CollabError::PermissionDenied {
                author: op.author,
                document: op.document,
            });
        }

        if session.author != op.author {
            return Err(CollabError::PermissionDenied {
                author: op.author,
                document: op.document,
            });
        }

        Ok(())
    }

    /// Removes the session. The participant state itself persists on the
    /// document until an explicit leave-all or inactivity timeout.
    pub fn leave(&mut self, session_id: SessionId) {
        self.sessions.remove(&session_id);
    }

    #[must_use]
    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }
}
