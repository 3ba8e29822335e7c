//! Live interface reload capability
//!
//! Reloading a running WireGuard interface requires driving external
//! tooling; this is the only process boundary in the agent and it accepts a
//! validated interface name and nothing else. `wg syncconf` applies the
//! updated peer set without dropping existing peers.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::io::Write;
use tokio::process::Command;
use tracing::{debug, info};
use wgfleet_common::{Error, Result};

static IFACE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_=+.-]{1,15}$").expect("valid interface-name pattern")
});

/// Interface reload capability consumed by the provisioner
#[async_trait]
pub trait InterfaceControl: Send + Sync {
    /// Re-apply the on-disk peer config to the running interface
    async fn sync_from_config(&self, interface: &str) -> Result<()>;
}

/// Production control driving `wg-quick strip` + `wg syncconf`
pub struct WgSyncControl;

#[async_trait]
impl InterfaceControl for WgSyncControl {
    async fn sync_from_config(&self, interface: &str) -> Result<()> {
        if !IFACE_NAME.is_match(interface) {
            return Err(Error::Validation(format!(
                "invalid interface name: {}",
                interface
            )));
        }

        debug!("Stripping config for {}", interface);
        let stripped = Command::new("wg-quick")
            .arg("strip")
            .arg(interface)
            .output()
            .await
            .map_err(|e| Error::Remote(format!("wg-quick strip failed to start: {}", e)))?;
        if !stripped.status.success() {
            return Err(Error::Remote(format!(
                "wg-quick strip {} exited with {}",
                interface, stripped.status
            )));
        }

        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(&stripped.stdout)?;
        tmp.flush()?;

        let status = Command::new("wg")
            .arg("syncconf")
            .arg(interface)
            .arg(tmp.path())
            .status()
            .await
            .map_err(|e| Error::Remote(format!("wg syncconf failed to start: {}", e)))?;
        if !status.success() {
            return Err(Error::Remote(format!(
                "wg syncconf {} exited with {}",
                interface, status
            )));
        }

        info!("Reloaded interface {}", interface);
        Ok(())
    }
}

/// No-op control for tests and dry runs; counts invocations
#[derive(Default)]
pub struct NullControl {
    pub reloads: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl InterfaceControl for NullControl {
    async fn sync_from_config(&self, _interface: &str) -> Result<()> {
        self.reloads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
