//! Peer provisioning
//!
//! One create/remove/disable/enable surface over the gateway's flat peer
//! config and the live interface. Allocation, the config append, and the
//! interface reload for this gateway are one atomic step: everything runs
//! under a single mutex, and the gateway config is only ever appended to or
//! rewritten from an already-validated snapshot.

use crate::allocator;
use crate::config::AgentConfig;
use crate::iface::InterfaceControl;
use crate::keys::KeyProvider;
use crate::wgconf;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use wgfleet_common::{Error, Result};

static PEER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid peer-name pattern"));

/// Reject names that could break the config grammar or any downstream
/// process invocation. Runs before any side effect.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !PEER_NAME.is_match(name) {
        return Err(Error::Validation(format!("invalid peer name: {:?}", name)));
    }
    Ok(())
}

/// Result of a successful provisioning call
#[derive(Debug, Clone)]
pub struct ProvisionedPeer {
    pub client_config: String,
    pub public_key: String,
}

/// Peer lifecycle operations for one gateway interface
pub struct PeerProvisioner {
    cfg: AgentConfig,
    keys: Arc<dyn KeyProvider>,
    iface: Arc<dyn InterfaceControl>,
    lock: Mutex<()>,
}

impl PeerProvisioner {
    pub fn new(
        cfg: AgentConfig,
        keys: Arc<dyn KeyProvider>,
        iface: Arc<dyn InterfaceControl>,
    ) -> Self {
        Self {
            cfg,
            keys,
            iface,
            lock: Mutex::new(()),
        }
    }

    fn client_conf_path(&self, name: &str) -> PathBuf {
        self.cfg
            .clients_dir
            .join(format!("{}-client-{}.conf", self.cfg.interface, name))
    }

    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.cfg
            .clients_dir
            .join("disabled")
            .join(format!("{}.peer", name))
    }

    fn read_config(&self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.cfg.config_path)?)
    }

    fn write_config(&self, text: &str) -> Result<()> {
        std::fs::write(&self.cfg.config_path, text)?;
        Ok(())
    }

    /// Append-only commit of a new stanza to the gateway config
    fn append_to_config(&self, current: &str, stanza: &str) -> Result<()> {
        let appended = wgconf::append_stanza(current, stanza);
        let suffix = &appended[current.len()..];
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.cfg.config_path)?;
        file.write_all(suffix.as_bytes())?;
        Ok(())
    }

    /// Names of peers currently live on this gateway
    pub fn live_peers(&self) -> Result<Vec<String>> {
        let config = self.read_config()?;
        Ok(wgconf::client_names(&config))
    }

    /// Create a peer: allocate addresses, generate keys, persist the client
    /// config, append the gateway stanza, reload the interface.
    pub async fn provision(&self, name: &str) -> Result<ProvisionedPeer> {
        validate_name(name)?;
        let _guard = self.lock.lock().await;

        let config = self.read_config()?;
        if wgconf::contains_client(&config, name) || self.sidecar_path(name).exists() {
            return Err(Error::already_exists("peer", name));
        }

        let addresses = allocator::allocate(
            &config,
            self.cfg.subnet_v4,
            self.cfg.subnet_v6,
            self.cfg.max_peers,
        )?;

        let keypair = self.keys.generate_keypair();
        let preshared_key = self.keys.generate_preshared_key();

        let client_config = wgconf::render_client_config(&wgconf::ClientConfigParams {
            private_key: &keypair.private_key,
            preshared_key: &preshared_key,
            addresses: &addresses,
            dns: &self.cfg.dns,
            server_public_key: &self.cfg.server_public_key,
            endpoint: &self.cfg.endpoint,
            allowed_ips: &self.cfg.allowed_ips,
        });
        let stanza =
            wgconf::render_gateway_stanza(name, &keypair.public_key, &preshared_key, &addresses);

        std::fs::create_dir_all(&self.cfg.clients_dir)?;
        std::fs::write(self.client_conf_path(name), &client_config)?;

        self.append_to_config(&config, &stanza)?;
        self.iface.sync_from_config(&self.cfg.interface).await?;

        info!("Provisioned peer {} at {}", name, addresses.v4);
        Ok(ProvisionedPeer {
            client_config,
            public_key: keypair.public_key,
        })
    }

    /// Delete a peer's stanza, client config, and any disabled sidecar
    pub async fn remove(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let _guard = self.lock.lock().await;

        let config = self.read_config()?;
        let was_live = match wgconf::split_stanza(&config, name) {
            Some((remaining, _)) => {
                self.write_config(&remaining)?;
                true
            }
            None => false,
        };

        let had_sidecar = std::fs::remove_file(self.sidecar_path(name)).is_ok();
        let _ = std::fs::remove_file(self.client_conf_path(name));

        if !was_live && !had_sidecar {
            return Err(Error::not_found("peer", name));
        }
        if was_live {
            self.iface.sync_from_config(&self.cfg.interface).await?;
        }

        info!("Removed peer {}", name);
        Ok(())
    }

    /// Take a peer out of the live config, parking its stanza for a later
    /// enable. Disabling an absent or already-disabled peer is a no-op.
    pub async fn disable(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let _guard = self.lock.lock().await;

        let config = self.read_config()?;
        let Some((remaining, stanza)) = wgconf::split_stanza(&config, name) else {
            return Ok(());
        };

        let sidecar = self.sidecar_path(name);
        if let Some(parent) = sidecar.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&sidecar, &stanza)?;

        self.write_config(&remaining)?;
        self.iface.sync_from_config(&self.cfg.interface).await?;

        info!("Disabled peer {}", name);
        Ok(())
    }

    /// Restore a previously disabled peer. The caller's public key must
    /// match the parked stanza. Enabling an already-live peer is a no-op.
    pub async fn enable(&self, name: &str, public_key: &str) -> Result<()> {
        validate_name(name)?;
        let _guard = self.lock.lock().await;

        let config = self.read_config()?;
        if wgconf::contains_client(&config, name) {
            return Ok(());
        }

        let sidecar = self.sidecar_path(name);
        let stanza = std::fs::read_to_string(&sidecar)
            .map_err(|_| Error::not_found("peer", name))?;

        let recorded = wgconf::extract_public_key(&stanza, name);
        if recorded.as_deref() != Some(public_key) {
            return Err(Error::Validation(format!(
                "public key mismatch for peer {}",
                name
            )));
        }

        self.append_to_config(&config, &stanza)?;
        std::fs::remove_file(&sidecar)?;
        self.iface.sync_from_config(&self.cfg.interface).await?;

        info!("Enabled peer {}", name);
        Ok(())
    }

    /// Persisted artifacts for a peer that already exists on this gateway
    pub fn existing(&self, name: &str) -> Result<ProvisionedPeer> {
        validate_name(name)?;

        let client_config = std::fs::read_to_string(self.client_conf_path(name))
            .map_err(|_| Error::not_found("peer", name))?;

        let config = self.read_config()?;
        let public_key = wgconf::extract_public_key(&config, name)
            .or_else(|| {
                std::fs::read_to_string(self.sidecar_path(name))
                    .ok()
                    .and_then(|stanza| wgconf::extract_public_key(&stanza, name))
            })
            .ok_or_else(|| Error::not_found("peer", name))?;

        Ok(ProvisionedPeer {
            client_config,
            public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::NullControl;
    use crate::keys::X25519KeyProvider;
    use std::sync::atomic::Ordering;

    const BASE_CONFIG: &str =
        "[Interface]\nPrivateKey = serverpriv\nAddress = 10.66.66.1/24\nListenPort = 51820\n";

    fn test_provisioner(dir: &tempfile::TempDir) -> (PeerProvisioner, Arc<NullControl>) {
        let config_path = dir.path().join("wg0.conf");
        std::fs::write(&config_path, BASE_CONFIG).unwrap();

        let cfg = AgentConfig {
            config_path,
            clients_dir: dir.path().join("clients"),
            server_public_key: "serverpub".to_string(),
            endpoint: "vpn.example.net:51820".to_string(),
            ..AgentConfig::default()
        };
        let iface = Arc::new(NullControl::default());
        let provisioner =
            PeerProvisioner::new(cfg, Arc::new(X25519KeyProvider), iface.clone());
        (provisioner, iface)
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("4242").is_ok());
        assert!(validate_name("user_42-a").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a b").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("x;reboot").is_err());
    }

    #[tokio::test]
    async fn test_provision_creates_peer() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, iface) = test_provisioner(&dir);

        let peer = provisioner.provision("4242").await.unwrap();
        assert!(peer.client_config.contains("Address = 10.66.66.2/32"));
        assert_eq!(peer.public_key.len(), 44);
        assert_eq!(iface.reloads.load(Ordering::SeqCst), 1);

        assert_eq!(provisioner.live_peers().unwrap(), vec!["4242"]);
        let saved = provisioner.existing("4242").unwrap();
        assert_eq!(saved.client_config, peer.client_config);
        assert_eq!(saved.public_key, peer.public_key);
    }

    #[tokio::test]
    async fn test_duplicate_provision_leaves_config_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, _) = test_provisioner(&dir);

        provisioner.provision("4242").await.unwrap();
        let before = std::fs::read(dir.path().join("wg0.conf")).unwrap();

        let err = provisioner.provision("4242").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));

        let after = std::fs::read(dir.path().join("wg0.conf")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_concurrent_provisions_get_distinct_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, _) = test_provisioner(&dir);
        let provisioner = Arc::new(provisioner);

        let a = provisioner.clone();
        let b = provisioner.clone();
        let (first, second) =
            tokio::join!(async move { a.provision("100").await }, async move {
                b.provision("200").await
            });
        let first = first.unwrap();
        let second = second.unwrap();

        let addr = |conf: &str| {
            conf.lines()
                .find_map(|l| l.strip_prefix("Address = "))
                .unwrap()
                .to_string()
        };
        assert_ne!(addr(&first.client_config), addr(&second.client_config));
    }

    #[tokio::test]
    async fn test_disable_enable_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, _) = test_provisioner(&dir);

        let peer = provisioner.provision("4242").await.unwrap();

        provisioner.disable("4242").await.unwrap();
        assert!(provisioner.live_peers().unwrap().is_empty());

        // disabling again is a no-op
        provisioner.disable("4242").await.unwrap();

        // wrong key is rejected
        let err = provisioner.enable("4242", "not-the-key").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        provisioner.enable("4242", &peer.public_key).await.unwrap();
        assert_eq!(provisioner.live_peers().unwrap(), vec!["4242"]);

        // enabling again is a no-op
        provisioner.enable("4242", &peer.public_key).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_peer_still_counts_as_existing() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, _) = test_provisioner(&dir);

        provisioner.provision("100").await.unwrap();
        provisioner.disable("100").await.unwrap();

        // a disabled peer still counts as existing
        let err = provisioner.provision("100").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_enable_unknown_peer() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, _) = test_provisioner(&dir);

        let err = provisioner.enable("999", "somekey").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, _) = test_provisioner(&dir);

        provisioner.provision("4242").await.unwrap();
        provisioner.remove("4242").await.unwrap();

        assert!(provisioner.live_peers().unwrap().is_empty());
        assert!(provisioner.existing("4242").is_err());

        let err = provisioner.remove("4242").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_disabled_peer() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, _) = test_provisioner(&dir);

        provisioner.provision("4242").await.unwrap();
        provisioner.disable("4242").await.unwrap();
        provisioner.remove("4242").await.unwrap();

        let err = provisioner.enable("4242", "anykey").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
