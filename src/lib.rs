// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core real-time collaborative document editing engine: an Operational
//! Transformation path and a logical-position CRDT path over the same
//! [`document`] model, bound together by a per-document [`actor`] and a
//! multi-instance [`fabric`].
//!
//! Transport plumbing, the relational store, analytics, presence UI,
//! authentication and review workflows are all external collaborators;
//! this crate only implements the collaboration core itself.

pub mod actor;
pub mod cache;
pub mod clock;
pub mod config;
pub mod crdt;
pub mod document;
pub mod error;
pub mod fabric;
pub mod instance;
pub mod logging;
pub mod op;
pub mod ordering;
pub mod ot;
pub mod persistence;
pub mod position;
pub mod protocol;
pub mod session;

pub use error::{CollabError, Result};
