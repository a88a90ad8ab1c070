// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Discovery operation mode.
///
/// The mode governs how address and port search spaces are derived when no
/// explicit ranges are configured, and whether a network sweep runs at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// No sweep. Only explicitly configured discovery urls are probed.
    #[default]
    Off,
    /// Probe only addresses of the local machine, across all ports.
    Local,
    /// Sweep local subnets and default gateways, well-known ports only.
    Fast,
    /// Sweep configured or derived ranges across unassigned ports as well.
    Scan,
}

impl FromStr for DiscoveryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "local" => Ok(Self::Local),
            "fast" => Ok(Self::Fast),
            "scan" => Ok(Self::Scan),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown discovery mode '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Local => write!(f, "local"),
            Self::Fast => write!(f, "fast"),
            Self::Scan => write!(f, "scan"),
        }
    }
}

/// Class of network interfaces considered during sweeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    /// No interfaces are considered.
    None,
    /// Wired (non-loopback) interfaces.
    #[default]
    Wired,
}

/// Discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Address ranges to scan (CIDR / dashed / comma separated syntax).
    /// When absent, ranges are derived from the mode and live interfaces.
    #[serde(default)]
    pub address_ranges_to_scan: Option<String>,

    /// Port ranges to scan. When absent, derived from the mode.
    #[serde(default)]
    pub port_ranges_to_scan: Option<String>,

    /// Lower bound on concurrent address probes.
    #[serde(default = "default_min_network_probes")]
    pub min_network_probes: usize,

    /// Hard cap on concurrent address probes.
    #[serde(default = "default_max_network_probes")]
    pub max_network_probes: usize,

    /// Lower bound on concurrent port probes.
    #[serde(default = "default_min_port_probes")]
    pub min_port_probes: usize,

    /// Hard cap on concurrent port probes.
    #[serde(default = "default_max_port_probes")]
    pub max_port_probes: usize,

    /// Fraction of the port candidate space that must have been probed
    /// before a sweep may wind down (100 = probe everything).
    #[serde(default = "default_min_port_probes_percent")]
    pub min_port_probes_percent: u8,

    /// Per-address probe timeout in milliseconds.
    #[serde(default = "default_network_probe_timeout")]
    pub network_probe_timeout_ms: u64,

    /// Per-port probe timeout in milliseconds.
    #[serde(default = "default_port_probe_timeout")]
    pub port_probe_timeout_ms: u64,

    /// Idle time between continuous scan passes, in seconds.
    #[serde(default = "default_idle_time_between_scans")]
    pub idle_time_between_scans_secs: u64,

    /// Discovery urls probed in every pass regardless of mode.
    #[serde(default)]
    pub discovery_urls: Vec<String>,
}

fn default_min_network_probes() -> usize {
    1
}

fn default_max_network_probes() -> usize {
    250
}

fn default_min_port_probes() -> usize {
    1
}

fn default_max_port_probes() -> usize {
    1000
}

fn default_min_port_probes_percent() -> u8 {
    100
}

fn default_network_probe_timeout() -> u64 {
    3_000
}

fn default_port_probe_timeout() -> u64 {
    5_000
}

fn default_idle_time_between_scans() -> u64 {
    3_600
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            address_ranges_to_scan: None,
            port_ranges_to_scan: None,
            min_network_probes: default_min_network_probes(),
            max_network_probes: default_max_network_probes(),
            min_port_probes: default_min_port_probes(),
            max_port_probes: default_max_port_probes(),
            min_port_probes_percent: default_min_port_probes_percent(),
            network_probe_timeout_ms: default_network_probe_timeout(),
            port_probe_timeout_ms: default_port_probe_timeout(),
            idle_time_between_scans_secs: default_idle_time_between_scans(),
            discovery_urls: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Get the per-address probe timeout as Duration.
    pub fn network_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.network_probe_timeout_ms)
    }

    /// Get the per-port probe timeout as Duration.
    pub fn port_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.port_probe_timeout_ms)
    }

    /// Get the idle time between continuous scan passes as Duration.
    pub fn idle_time_between_scans(&self) -> Duration {
        Duration::from_secs(self.idle_time_between_scans_secs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_network_probes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_network_probes cannot be 0".into(),
            ));
        }
        if self.max_port_probes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_port_probes cannot be 0".into(),
            ));
        }
        if self.min_network_probes > self.max_network_probes {
            return Err(ConfigError::InvalidValue(
                "min_network_probes cannot exceed max_network_probes".into(),
            ));
        }
        if self.min_port_probes > self.max_port_probes {
            return Err(ConfigError::InvalidValue(
                "min_port_probes cannot exceed max_port_probes".into(),
            ));
        }
        if self.min_port_probes_percent > 100 {
            return Err(ConfigError::InvalidValue(
                "min_port_probes_percent cannot exceed 100".into(),
            ));
        }
        if self.network_probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "network_probe_timeout_ms cannot be 0".into(),
            ));
        }
        if self.port_probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "port_probe_timeout_ms cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.max_network_probes, 250);
        assert_eq!(config.max_port_probes, 1000);
        assert_eq!(config.min_port_probes_percent, 100);
        assert!(config.discovery_urls.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = DiscoveryConfig {
            address_ranges_to_scan: Some("10.0.0.0/24".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DiscoveryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_field_names_are_camel_case() {
        let json = serde_json::to_string(&DiscoveryConfig::default()).unwrap();
        assert!(json.contains("\"addressRangesToScan\""));
        assert!(json.contains("\"idleTimeBetweenScansSecs\""));
        assert!(json.contains("\"discoveryUrls\""));
    }

    #[test]
    fn test_validation_zero_probes() {
        let config = DiscoveryConfig {
            max_network_probes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_min_exceeds_max() {
        let config = DiscoveryConfig {
            min_port_probes: 2000,
            max_port_probes: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_percent_out_of_range() {
        let config = DiscoveryConfig {
            min_port_probes_percent: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let config = DiscoveryConfig {
            network_probe_timeout_ms: 1500,
            idle_time_between_scans_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.network_probe_timeout(), Duration::from_millis(1500));
        assert_eq!(config.idle_time_between_scans(), Duration::from_secs(60));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.json");
        let config = DiscoveryConfig {
            port_ranges_to_scan: Some("4840-4841".into()),
            ..Default::default()
        };
        config.to_file(&path).unwrap();
        let loaded = DiscoveryConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("fast".parse::<DiscoveryMode>().unwrap(), DiscoveryMode::Fast);
        assert_eq!("OFF".parse::<DiscoveryMode>().unwrap(), DiscoveryMode::Off);
        assert!("turbo".parse::<DiscoveryMode>().is_err());
    }
}
