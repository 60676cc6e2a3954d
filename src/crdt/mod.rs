// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! CRDT engine (C3): node set, tombstones, position-ordered merge.

pub mod engine;
pub mod node;

pub use engine::{CrdtEngine, CrdtOp, CrdtOpKind};
pub use node::{Node, NodeId};
