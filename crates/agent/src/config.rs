//! Agent configuration

use ipnetwork::{Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Gateway agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// WireGuard interface name
    pub interface: String,

    /// Path to the interface peer-config file
    pub config_path: PathBuf,

    /// Directory for persisted client configs and disabled-peer sidecars
    pub clients_dir: PathBuf,

    /// HTTP API listen port
    pub listen_port: u16,

    /// IPv4 subnet peers are allocated from
    pub subnet_v4: Ipv4Network,

    /// IPv6 subnet peers are allocated from
    pub subnet_v6: Ipv6Network,

    /// Maximum peers served by this gateway
    pub max_peers: u32,

    /// The gateway's own WireGuard public key
    pub server_public_key: String,

    /// Public endpoint clients connect to, `host:port`
    pub endpoint: String,

    /// DNS servers pushed to clients
    pub dns: Vec<String>,

    /// Ranges routed through the tunnel
    pub allowed_ips: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interface: "wg0".to_string(),
            config_path: PathBuf::from("/etc/wireguard/wg0.conf"),
            clients_dir: PathBuf::from("/etc/wireguard/clients"),
            listen_port: 3003,
            subnet_v4: "10.66.66.0/24".parse().expect("valid default subnet"),
            subnet_v6: "fd42:42:42::/64".parse().expect("valid default subnet"),
            max_peers: 253,
            server_public_key: String::new(),
            endpoint: String::new(),
            dns: vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()],
            allowed_ips: "0.0.0.0/0,::/0".to_string(),
        }
    }
}

impl AgentConfig {
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
