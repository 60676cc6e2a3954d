// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The per-document actor and its handle.
//!
//! Grounded on `daemon.rs`'s `DaemonActor`/`Daemon` split: an actor task
//! owns all mutable state and drains an `mpsc::Receiver` of commands; a
//! cheaply cloneable handle exposes an async API over that channel plus a
//! `broadcast` channel other tasks (here, the fabric publisher) subscribe
//! to for "document changed" notifications. This is the serialization
//! point described in the concurrency model: all commits for a document
//! execute sequentially inside `run()`; different documents get
//! independent actors and channels.

use crate::cache::TransformCache;
use crate::clock::AuthorId;
use crate::document::{DocumentState, ParticipantState, ReplicationStrategy};
use crate::error::CollabError;
use crate::op::Op;
use crate::ordering::{OrderingQueue, ResyncRequest};
use crate::ot::server::OtSession;
use crate::protocol::{JoinResponse, SubmitOutcome};
use crate::session::{Role, SessionId, SessionManager};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

pub enum DocCommand {
    Join {
        author: AuthorId,
        display_name: String,
        role: Role,
        response_tx: oneshot::Sender<Result<(SessionId, JoinResponse), CollabError>>,
    },
    Submit {
        session_id: SessionId,
        op: Op,
        response_tx: oneshot::Sender<SubmitOutcome>,
    },
    Leave {
        session_id: SessionId,
    },
    /// Drives periodic maintenance: gap-timeout checks and cache sweeps.
    /// Suspension-free from the caller's point of view except for the
    /// reply; the actual work inside is all CPU-bound.
    Tick {
        now_millis: u64,
        response_tx: oneshot::Sender<Vec<ResyncRequest>>,
    },
}

pub struct DocumentActor {
    document: DocumentState,
    sessions: SessionManager,
    queue: OrderingQueue,
    ot_sessions: HashMap<AuthorId, OtSession>,
    cache: TransformCache,
    receiver: mpsc::Receiver<DocCommand>,
    doc_changed_tx: broadcast::Sender<()>,
}

impl DocumentActor {
    #[must_use]
    pub fn new(
        strategy: ReplicationStrategy,
        document_id: crate::document::DocumentId,
        initial_content: impl Into<String>,
        now_millis: u64,
        gap_timeout_millis: u64,
        cache_ttl_millis: u64,
        receiver: mpsc::Receiver<DocCommand>,
        doc_changed_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            document: DocumentState::initialize(document_id, strategy, initial_content, now_millis),
            sessions: SessionManager::new(),
            queue: OrderingQueue::new(gap_timeout_millis),
            ot_sessions: HashMap::new(),
            cache: TransformCache::new(cache_ttl_millis),
            receiver,
            doc_changed_tx,
        }
    }

    pub async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            self.handle_command(command);
        }
        info!("document actor stopped, channel closed");
    }

    fn handle_command(&mut self, command: DocCommand) {
        match command {
            DocCommand::Join {
                author,
                display_name,
                role,
                response_tx,
            } => {
                let now_millis = 0;
                let result = self
                    .sessions
                    .join(
                        self.document.id,
                        author,
                        display_name,
                        role,
                        now_millis,
                        &mut self.document,
                    )
                    .map(|session_id| {
                        (
                            session_id,
                            JoinResponse {
                                content: self.document.content().to_string(),
                                version: self.document.version(),
                                participants: self
                                    .document
                                    .participant(author)
                                    .cloned()
                                    .into_iter()
                                    .collect::<Vec<ParticipantState>>(),
                                recent_ops: self.document.recent_ops(100),
                            },
                        )
                    });
                let _ = response_tx.send(result);
            }

            DocCommand::Submit {
                session_id,
                op,
                response_tx,
            } => {
                let outcome = self.submit(session_id, op);
                let _ = response_tx.send(outcome);
                let _ = self.doc_changed_tx.send(());
            }

            DocCommand::Leave { session_id } => {
                self.sessions.leave(session_id);
            }

            DocCommand::Tick {
                now_millis,
                response_tx,
            } => {
                let resyncs = self.queue.expire_gaps(now_millis);
                if !resyncs.is_empty() {
                    warn!(count = resyncs.len(), "gap timeout, issuing resync requests");
                }
                self.cache.sweep(now_millis);
                let _ = response_tx.send(resyncs);
            }
        }
    }

    fn submit(&mut self, session_id: SessionId, op: Op) -> SubmitOutcome {
        if let Err(err) = self.sessions.authorize_submit(session_id, &op) {
            return SubmitOutcome::Reject {
                op_id: op.id,
                reason: err.to_string(),
            };
        }

        let now_millis = 0;
        self.queue.submit(op.clone(), now_millis);
        let results = self.queue.drain_ready(
            &mut self.document,
            &mut self.ot_sessions,
            &mut self.cache,
            now_millis,
        );

        match results.into_iter().find(|_| true) {
            Some(Ok(new_version)) => SubmitOutcome::Ack {
                op_id: op.id,
                new_version,
            },
            Some(Err(err)) => {
                if matches!(err, CollabError::Inconsistency { .. }) {
                    self.document.quarantine();
                }
                SubmitOutcome::Reject {
                    op_id: op.id,
                    reason: err.to_string(),
                }
            }
            None => SubmitOutcome::Ack {
                op_id: op.id,
                new_version: self.document.version(),
            },
        }
    }
}

#[derive(Clone)]
pub struct DocumentActorHandle {
    sender: mpsc::Sender<DocCommand>,
    doc_changed_tx: broadcast::Sender<()>,
}

impl DocumentActorHandle {
    #[must_use]
    pub fn spawn(
        strategy: ReplicationStrategy,
        document_id: crate::document::DocumentId,
        initial_content: impl Into<String>,
        now_millis: u64,
        gap_timeout_millis: u64,
        cache_ttl_millis: u64,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(64);
        let (doc_changed_tx, _) = broadcast::channel(16);
        let actor = DocumentActor::new(
            strategy,
            document_id,
            initial_content,
            now_millis,
            gap_timeout_millis,
            cache_ttl_millis,
            receiver,
            doc_changed_tx.clone(),
        );
        tokio::spawn(actor.run());
        Self {
            sender,
            doc_changed_tx,
        }
    }

    #[must_use]
    pub fn subscribe_document_changes(&self) -> broadcast::Receiver<()> {
        self.doc_changed_tx.subscribe()
    }

    pub async fn join(
        &self,
        author: AuthorId,
        display_name: impl Into<String>,
        role: Role,
    ) -> Result<(SessionId, JoinResponse), CollabError> {
        let (response_tx, response_rx) = oneshot::channel();
        let _ = self
            .sender
            .send(DocCommand::Join {
                author,
                display_name: display_name.into(),
                role,
                response_tx,
            })
            .await;
        response_rx
            .await
            .expect("document actor dropped the join response channel")
    }

    pub async fn submit(&self, session_id: SessionId, op: Op) -> SubmitOutcome {
        let (response_tx, response_rx) = oneshot::channel();
        let _ = self
            .sender
            .send(DocCommand::Submit {
                session_id,
                op,
                response_tx,
            })
            .await;
        response_rx
            .await
            .expect("document actor dropped the submit response channel")
    }

    pub async fn leave(&self, session_id: SessionId) {
        let _ = self.sender.send(DocCommand::Leave { session_id }).await;
    }

    pub async fn tick(&self, now_millis: u64) -> Vec<ResyncRequest> {
        let (response_tx, response_rx) = oneshot::channel();
        let _ = self
            .sender
            .send(DocCommand::Tick {
                now_millis,
                response_tx,
            })
            .await;
        response_rx.await.unwrap_or_default()
    }
}
