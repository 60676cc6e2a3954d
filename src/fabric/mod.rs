// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session & pub/sub fabric: reliable multi-instance broadcast (C7) plus
//! instance health and routing (C8).

pub mod bus;
pub mod registry;

pub use bus::{Fabric, FabricMessage, InstanceId, MessageId, Topic};
pub use registry::{CircuitBreaker, CircuitState, Heartbeat, InstanceRegistry, LoadBalancerStrategy};
