//! Shared test doubles

use crate::gateway::{CreatePeerResponse, GatewayApi};
use crate::ledger::SubscriptionLedger;
use crate::notify::Notify;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use wgfleet_common::{Database, Error, Gateway, Result};

/// In-memory ledger with schema applied, one trial month
pub fn test_ledger() -> SubscriptionLedger {
    let db = Database::open_memory().unwrap();
    let ledger = SubscriptionLedger::new(db, 1);
    ledger.init_schema().unwrap();
    ledger
}

/// Gateway double tracking live peer sets per gateway id
#[derive(Default)]
pub struct MockGateway {
    pub peers: Mutex<HashMap<i64, HashSet<i64>>>,
    /// Gateway ids whose list call fails
    pub list_failures: Mutex<HashSet<i64>>,
    pub fail_disable: AtomicBool,
    pub create_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub enable_calls: AtomicUsize,
    pub disable_calls: AtomicUsize,
}

impl MockGateway {
    pub fn seed_peers(&self, gateway_id: i64, ids: &[i64]) {
        self.peers
            .lock()
            .entry(gateway_id)
            .or_default()
            .extend(ids.iter().copied());
    }

    pub fn live(&self, gateway_id: i64) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .peers
            .lock()
            .get(&gateway_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl GatewayApi for MockGateway {
    async fn list_peers(&self, gateway: &Gateway) -> Result<Vec<i64>> {
        if self.list_failures.lock().contains(&gateway.id) {
            return Err(Error::Remote(format!("gateway {} unreachable", gateway.name)));
        }
        Ok(self.live(gateway.id))
    }

    async fn create_peer(&self, gateway: &Gateway, user_id: i64) -> Result<CreatePeerResponse> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let already_exist = !self
            .peers
            .lock()
            .entry(gateway.id)
            .or_default()
            .insert(user_id);
        Ok(CreatePeerResponse {
            success: true,
            conf: Some(STANDARD.encode(format!("conf-{}", user_id))),
            qr: Some(STANDARD.encode(format!("qr-{}", user_id))),
            already_exist,
            public_key: Some(format!("pk-{}", user_id)),
        })
    }

    async fn remove_peer(&self, gateway: &Gateway, user_id: i64) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.peers
            .lock()
            .entry(gateway.id)
            .or_default()
            .remove(&user_id);
        Ok(())
    }

    async fn enable_peer(&self, gateway: &Gateway, user_id: i64, _public_key: &str) -> Result<()> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.peers
            .lock()
            .entry(gateway.id)
            .or_default()
            .insert(user_id);
        Ok(())
    }

    async fn disable_peer(&self, gateway: &Gateway, user_id: i64) -> Result<()> {
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_disable.load(Ordering::SeqCst) {
            return Err(Error::Remote(format!("gateway {} unreachable", gateway.name)));
        }
        self.peers
            .lock()
            .entry(gateway.id)
            .or_default()
            .remove(&user_id);
        Ok(())
    }
}

/// Notifier double recording every send
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl Notify for RecordingNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().push((chat_id, text.to_string()));
        Ok(())
    }
}
