// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Instance Registry & Health (C8): heartbeats, circuit breakers, routing.
//!
//! Grounded on `peer.rs`'s connection-health handling (a peer link that
//! can fail and needs retrying) generalized into an explicit state
//! machine, since the source has no registry of its own — ethersync is
//! two-party peer-to-peer, not a multi-instance fleet.

use crate::fabric::bus::InstanceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub instance: InstanceId,
    pub address: String,
    pub capabilities: Vec<String>,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub connection_count: u32,
    pub ops_per_sec: f32,
    pub received_at_millis: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    failure_threshold: u32,
    cooldown_millis: u64,
    opened_at_millis: u64,
    cooldown_multiplier: u32,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown_millis: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            failure_threshold,
            cooldown_millis,
            opened_at_millis: 0,
            cooldown_multiplier: 1,
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call may be attempted right now: always when closed,
    /// never when open (until the cooldown elapses, which `tick`
    /// transitions into half-open), and exactly once when half-open.
    pub fn may_attempt(&mut self, now_millis: u64) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooldown = self.cooldown_millis * u64::from(self.cooldown_multiplier);
                if now_millis.saturating_sub(self.opened_at_millis) >= cooldown {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.cooldown_multiplier = 1;
    }

    pub fn record_failure(&mut self, now_millis: u64) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at_millis = now_millis;
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at_millis = now_millis;
                self.cooldown_multiplier = (self.cooldown_multiplier * 2).min(16);
            }
            CircuitState::Open => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancerStrategy {
    RoundRobin,
    LeastConnections,
    HealthBased,
    Weighted,
}

pub struct InstanceRegistry {
    heartbeats: HashMap<InstanceId, Heartbeat>,
    breakers: HashMap<InstanceId, CircuitBreaker>,
    heartbeat_interval_millis: u64,
    round_robin_cursor: usize,
    strategy: LoadBalancerStrategy,
}

impl InstanceRegistry {
    #[must_use]
    pub fn new(heartbeat_interval_millis: u64, strategy: LoadBalancerStrategy) -> Self {
        Self {
            heartbeats: HashMap::new(),
            breakers: HashMap::new(),
            heartbeat_interval_millis,
            round_robin_cursor: 0,
            strategy,
        }
    }

    pub fn record_heartbeat(&mut self, heartbeat: Heartbeat) {
        self.breakers
            .entry(heartbeat.instance)
            .or_insert_with(|| CircuitBreaker::new(5, 10_000));
        self.heartbeats.insert(heartbeat.instance, heartbeat);
    }

    /// Instances whose most recent heartbeat is older than twice the
    /// configured interval are inactive and removed.
    pub fn reap_stale(&mut self, now_millis: u64) -> Vec<InstanceId> {
        let stale_threshold = self.heartbeat_interval_millis * 2;
        let stale: Vec<InstanceId> = self
            .heartbeats
            .values()
            .filter(|hb| now_millis.saturating_sub(hb.received_at_millis) > stale_threshold)
            .map(|hb| hb.instance)
            .collect();
        for id in &stale {
            self.heartbeats.remove(id);
            self.breakers.remove(id);
        }
        stale
    }

    pub fn breaker_mut(&mut self, instance: InstanceId) -> &mut CircuitBreaker {
        self.breakers
            .entry(instance)
            .or_insert_with(|| CircuitBreaker::new(5, 10_000))
    }

    /// Reorders (a copy of) `candidates` per the configured load-balancing
    /// strategy, excluding instances whose circuit is currently open.
    #[must_use]
    pub fn route(&mut self, candidates: &[InstanceId]) -> Vec<InstanceId> {
        let mut usable: Vec<InstanceId> = candidates
            .iter()
            .filter(|id| {
                self.breakers
                    .get(id)
                    .map_or(true, |b| b.state() != CircuitState::Open)
            })
            .copied()
            .collect();

        match self.strategy {
            LoadBalancerStrategy::RoundRobin => {
                if !usable.is_empty() {
                    self.round_robin_cursor %= usable.len();
                    usable.rotate_left(self.round_robin_cursor);
                    self.round_robin_cursor += 1;
                }
            }
            LoadBalancerStrategy::LeastConnections => {
                usable.sort_by_key(|id| {
                    self.heartbeats
                        .get(id)
                        .map_or(u32::MAX, |hb| hb.connection_count)
                });
            }
            LoadBalancerStrategy::HealthBased => {
                usable.sort_by(|a, b| {
                    let score = |id: &InstanceId| {
                        self.heartbeats.get(id).map_or(f32::MAX, |hb| hb.cpu_percent)
                    };
                    score(a)
                        .partial_cmp(&score(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            LoadBalancerStrategy::Weighted => {
                usable.sort_by(|a, b| {
                    let score = |id: &InstanceId| {
                        self.heartbeats.get(id).map_or(0.0, |hb| hb.ops_per_sec)
                    };
                    score(b)
                        .partial_cmp(&score(a))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }

        usable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn heartbeat(id: u64, now: u64) -> Heartbeat {
        Heartbeat {
            instance: InstanceId(id),
            address: format!("127.0.0.1:{id}"),
            capabilities: vec![],
            cpu_percent: 0.0,
            memory_bytes: 0,
            connection_count: 0,
            ops_per_sec: 0.0,
            received_at_millis: now,
        }
    }

    #[test]
    fn stale_heartbeats_beyond_twice_interval_are_reaped() {
        let mut registry = InstanceRegistry::new(1000, LoadBalancerStrategy::RoundRobin);
        registry.record_heartbeat(heartbeat(1, 0));
        assert!(registry.reap_stale(1500).is_empty());
        let reaped = registry.reap_stale(2100);
        assert_eq!(reaped, vec![InstanceId(1)]);
    }

    #[test]
    fn circuit_breaker_opens_after_threshold_and_half_opens_after_cooldown() {
        let mut breaker = CircuitBreaker::new(3, 1000);
        assert!(breaker.may_attempt(0));
        for _ in 0..3 {
            breaker.record_failure(0);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.may_attempt(500));
        assert!(breaker.may_attempt(1001));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_failure_reopens_with_extended_cooldown() {
        let mut breaker = CircuitBreaker::new(1, 1000);
        breaker.record_failure(0);
        assert!(breaker.may_attempt(1001));
        breaker.record_failure(1001);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.may_attempt(1001 + 1000));
        assert!(breaker.may_attempt(1001 + 2000 + 1));
    }

    #[test]
    fn route_excludes_open_circuits() {
        let mut registry = InstanceRegistry::new(1000, LoadBalancerStrategy::RoundRobin);
        registry.record_heartbeat(heartbeat(1, 0));
        registry.record_heartbeat(heartbeat(2, 0));
        registry.breaker_mut(InstanceId(1)).record_failure(0);
        for _ in 0..5 {
            registry.breaker_mut(InstanceId(1)).record_failure(0);
        }
        let routed = registry.route(&[InstanceId(1), InstanceId(2)]);
        assert_eq!(routed, vec![InstanceId(2)]);
    }
}
