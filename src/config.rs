// SPDX-FileCopyrightText: 2024 Danny McClanahan <dmcC2@hypnicjerk.ai>
// SPDX-FileCopyrightText: 2024 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2024 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `EngineConfig` (A3): the enumerated configuration surface of §6,
//! loaded from an `.ini` file and overridable by environment variables,
//! following [`daemon/src/config.rs`]'s `AppConfig::from_config_file` /
//! merge pattern, generalized from "one peer address" to the full set of
//! tunables this engine exposes.

use crate::fabric::registry::LoadBalancerStrategy;
use ini::Ini;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Every tunable named in spec §6, with the defaults given there.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_ops_in_memory: usize,
    pub checkpoint_interval: u64,
    pub cache_ttl: Duration,
    pub inactive_document_ttl: Duration,
    pub sequence_gap_timeout: Duration,
    pub fabric_retention: Duration,
    pub fabric_max_message_size: usize,
    pub load_balancer_strategy: LoadBalancerStrategy,
    pub ack_required: bool,
    pub persistence_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ops_in_memory: 1000,
            checkpoint_interval: 100,
            cache_ttl: Duration::from_secs(5 * 60),
            inactive_document_ttl: Duration::from_secs(60 * 60),
            sequence_gap_timeout: Duration::from_secs(30),
            fabric_retention: Duration::from_secs(24 * 60 * 60),
            fabric_max_message_size: 1024 * 1024,
            load_balancer_strategy: LoadBalancerStrategy::RoundRobin,
            ack_required: false,
            persistence_enabled: false,
        }
    }
}

impl EngineConfig {
    /// Loads overrides from an `.ini` file's `[general]` section, falling
    /// back to [`Self::default`] for any key that's absent or the file
    /// doesn't exist. Mirrors `AppConfig::from_config_file`'s "missing file
    /// means defaults, present file means parse-or-panic" behavior for
    /// malformed values, since a broken config should fail loudly rather
    /// than silently run with the wrong tuning.
    #[must_use]
    pub fn from_config_file(config_file: &Path) -> Self {
        let mut config = Self::default();
        if !config_file.exists() {
            return config;
        }

        let conf = Ini::load_from_file(config_file)
            .expect("Could not access config file, even though it exists");
        let section = conf.general_section();

        if let Some(v) = section.get("max_ops_in_memory") {
            config.max_ops_in_memory = v.parse().expect("max_ops_in_memory must be an integer");
        }
        if let Some(v) = section.get("checkpoint_interval") {
            config.checkpoint_interval = v.parse().expect("checkpoint_interval must be an integer");
        }
        if let Some(v) = section.get("cache_ttl_secs") {
            config.cache_ttl = Duration::from_secs(v.parse().expect("cache_ttl_secs must be an integer"));
        }
        if let Some(v) = section.get("inactive_document_ttl_secs") {
            config.inactive_document_ttl =
                Duration::from_secs(v.parse().expect("inactive_document_ttl_secs must be an integer"));
        }
        if let Some(v) = section.get("sequence_gap_timeout_secs") {
            config.sequence_gap_timeout =
                Duration::from_secs(v.parse().expect("sequence_gap_timeout_secs must be an integer"));
        }
        if let Some(v) = section.get("fabric_retention_secs") {
            config.fabric_retention =
                Duration::from_secs(v.parse().expect("fabric_retention_secs must be an integer"));
        }
        if let Some(v) = section.get("fabric_max_message_size") {
            config.fabric_max_message_size =
                v.parse().expect("fabric_max_message_size must be an integer");
        }
        if let Some(v) = section.get("load_balancer_strategy") {
            config.load_balancer_strategy = parse_strategy(v);
        }
        if let Some(v) = section.get("ack_required") {
            config.ack_required = v.parse().expect("ack_required must be a bool");
        }
        if let Some(v) = section.get("persistence_enabled") {
            config.persistence_enabled = v.parse().expect("persistence_enabled must be a bool");
        }

        config
    }

    /// Applies environment-variable overrides (`COLLAB_*`), taking
    /// precedence over whatever the config file set. Unset variables leave
    /// `self` untouched.
    #[must_use]
    pub fn merge_env(mut self) -> Self {
        if let Ok(v) = std::env::var("COLLAB_MAX_OPS_IN_MEMORY") {
            match v.parse() {
                Ok(parsed) => self.max_ops_in_memory = parsed,
                Err(_) => warn!(value = %v, "ignoring malformed COLLAB_MAX_OPS_IN_MEMORY"),
            }
        }
        if let Ok(v) = std::env::var("COLLAB_CHECKPOINT_INTERVAL") {
            match v.parse() {
                Ok(parsed) => self.checkpoint_interval = parsed,
                Err(_) => warn!(value = %v, "ignoring malformed COLLAB_CHECKPOINT_INTERVAL"),
            }
        }
        if let Ok(v) = std::env::var("COLLAB_ACK_REQUIRED") {
            match v.parse() {
                Ok(parsed) => self.ack_required = parsed,
                Err(_) => warn!(value = %v, "ignoring malformed COLLAB_ACK_REQUIRED"),
            }
        }
        if let Ok(v) = std::env::var("COLLAB_PERSISTENCE_ENABLED") {
            match v.parse() {
                Ok(parsed) => self.persistence_enabled = parsed,
                Err(_) => warn!(value = %v, "ignoring malformed COLLAB_PERSISTENCE_ENABLED"),
            }
        }
        self
    }
}

fn parse_strategy(value: &str) -> LoadBalancerStrategy {
    match value {
        "round_robin" => LoadBalancerStrategy::RoundRobin,
        "least_connections" => LoadBalancerStrategy::LeastConnections,
        "health_based" => LoadBalancerStrategy::HealthBased,
        "weighted" => LoadBalancerStrategy::Weighted,
        other => {
            warn!(value = %other, "unknown load_balancer_strategy, falling back to round_robin");
            LoadBalancerStrategy::RoundRobin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = EngineConfig::from_config_file(Path::new("/nonexistent/collab.ini"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn file_overrides_selected_keys_only() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("collab.ini");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "max_ops_in_memory=500").unwrap();
        writeln!(file, "ack_required=true").unwrap();
        writeln!(file, "load_balancer_strategy=weighted").unwrap();
        drop(file);

        let config = EngineConfig::from_config_file(&path);
        assert_eq!(config.max_ops_in_memory, 500);
        assert!(config.ack_required);
        assert_eq!(config.load_balancer_strategy, LoadBalancerStrategy::Weighted);
        assert_eq!(config.checkpoint_interval, EngineConfig::default().checkpoint_interval);
    }

    #[test]
    fn unknown_strategy_falls_back_to_round_robin() {
        assert_eq!(parse_strategy("bogus"), LoadBalancerStrategy::RoundRobin);
    }
}
