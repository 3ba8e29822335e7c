//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Manager daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Ledger database path
    pub db_path: PathBuf,

    /// Port gateway agents listen on
    pub gateway_port: u16,

    /// Notification endpoint base URL (messages go to `{base}/sendMessage`)
    pub notify_base_url: String,

    /// Months granted to a freshly provisioned subscriber
    pub trial_months: u32,

    /// Price of one subscription month, in minor currency units
    pub unit_price: u32,

    /// How far ahead of expiry the reminder fires, in hours
    pub reminder_lookahead_hours: u32,

    /// Worker cadence
    pub workers: WorkerConfig,

    /// Operator-configured gateways, synced into the ledger at startup
    #[serde(default)]
    pub gateways: Vec<GatewayEntry>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: wgfleet_common::default_db_path(),
            gateway_port: 3003,
            notify_base_url: String::new(),
            trial_months: 1,
            unit_price: 100,
            reminder_lookahead_hours: 24,
            workers: WorkerConfig::default(),
            gateways: Vec::new(),
        }
    }
}

/// Worker loop intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub reconcile_interval_secs: u64,
    pub expiry_interval_secs: u64,
    pub reminder_interval_secs: u64,

    /// Delay before the first pass, letting dependent connections settle
    pub startup_delay_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 60 * 5,
            expiry_interval_secs: 60 * 60,
            reminder_interval_secs: 60 * 60,
            startup_delay_secs: 5,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One operator-configured gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEntry {
    pub name: String,
    pub address: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub default: bool,
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_entry_defaults() {
        let config: DaemonConfig = toml::from_str(
            r#"
            db_path = "/tmp/ledger.db"
            gateway_port = 3003
            notify_base_url = "http://localhost:9000"
            trial_months = 1
            unit_price = 100
            reminder_lookahead_hours = 24

            [workers]
            reconcile_interval_secs = 300
            expiry_interval_secs = 3600
            reminder_interval_secs = 3600
            startup_delay_secs = 5

            [[gateways]]
            name = "fra-1"
            address = "203.0.113.10"
            "#,
        )
        .unwrap();

        assert_eq!(config.gateways.len(), 1);
        assert!(config.gateways[0].active);
        assert!(!config.gateways[0].default);
    }
}
