//! Ledger/gateway reconciliation
//!
//! The gateway's live peer list is ground truth for existence; the ledger is
//! ground truth for billing. Peers live on a gateway without a ledger row
//! get one (self-healing after out-of-band provisioning); rows claiming an
//! enabled peer that is gone get their assignment cleared. Rows the
//! enforcer disabled keep their assignment so renewal can re-enable them.

use crate::gateway::GatewayApi;
use crate::ledger::SubscriptionLedger;
use crate::workers::Worker;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wgfleet_common::{Gateway, Result};

pub struct ReconciliationWorker {
    ledger: SubscriptionLedger,
    gateway: Arc<dyn GatewayApi>,
}

impl ReconciliationWorker {
    pub fn new(ledger: SubscriptionLedger, gateway: Arc<dyn GatewayApi>) -> Self {
        Self { ledger, gateway }
    }

    async fn reconcile_gateway(&self, gw: &Gateway) -> Result<()> {
        let live = self.gateway.list_peers(gw).await?;
        debug!("Gateway [{}] live peers: {:?}", gw.name, live);

        let rows = self.ledger.subscribers_on_gateway(gw.id)?;
        let known: HashSet<i64> = rows.iter().map(|row| row.user_id).collect();
        let live_set: HashSet<i64> = live.iter().copied().collect();

        for user_id in &live {
            if !known.contains(user_id) {
                self.ledger.insert_discovered(*user_id, gw.id)?;
                info!(
                    "Gateway [{}] peer {} had no ledger row, inserted",
                    gw.name, user_id
                );
            }
        }

        for row in &rows {
            if row.active && !live_set.contains(&row.user_id) {
                self.ledger.clear_gateway(row.user_id)?;
                info!(
                    "Subscriber {} no longer on gateway [{}], assignment cleared",
                    row.user_id, gw.name
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Worker for ReconciliationWorker {
    async fn run_once(&self) -> Result<()> {
        let gateways = self.ledger.active_gateways()?;

        for gw in gateways {
            // one unreachable gateway must not stop the others
            if let Err(e) = self.reconcile_gateway(&gw).await {
                warn!("Failed to reconcile gateway [{}]: {}", gw.name, e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayEntry;
    use crate::ledger::NewSubscriber;
    use crate::testing::{test_ledger, MockGateway};

    fn seed_gateway(ledger: &SubscriptionLedger, name: &str) -> Gateway {
        ledger
            .sync_gateways(&[GatewayEntry {
                name: name.to_string(),
                address: format!("{}.example.net", name),
                active: true,
                default: false,
            }])
            .unwrap();
        ledger.gateway_by_name(name).unwrap().unwrap()
    }

    fn seed_subscriber(ledger: &SubscriptionLedger, user_id: i64, gateway_id: i64) {
        ledger
            .create_subscriber(&NewSubscriber {
                user_id,
                chat_id: user_id,
                username: None,
                first_name: None,
                last_name: None,
                gateway_id,
                public_key: format!("pk-{}", user_id),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_discovers_unknown_live_peers() {
        let ledger = test_ledger();
        let gw = seed_gateway(&ledger, "fra-1");
        seed_subscriber(&ledger, 10, gw.id);
        seed_subscriber(&ledger, 20, gw.id);

        let gateway = Arc::new(MockGateway::default());
        gateway.seed_peers(gw.id, &[10, 20, 30]);

        let worker = ReconciliationWorker::new(ledger.clone(), gateway);
        worker.run_once().await.unwrap();

        let rows = ledger.subscribers_on_gateway(gw.id).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_second_run_mutates_nothing() {
        let ledger = test_ledger();
        let gw = seed_gateway(&ledger, "fra-1");
        seed_subscriber(&ledger, 10, gw.id);

        let gateway = Arc::new(MockGateway::default());
        gateway.seed_peers(gw.id, &[10, 30]);

        let worker = ReconciliationWorker::new(ledger.clone(), gateway);
        worker.run_once().await.unwrap();

        let after_first = ledger.subscribers_on_gateway(gw.id).unwrap();
        worker.run_once().await.unwrap();
        let after_second = ledger.subscribers_on_gateway(gw.id).unwrap();

        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_clears_assignment_of_vanished_peer() {
        let ledger = test_ledger();
        let gw = seed_gateway(&ledger, "fra-1");
        seed_subscriber(&ledger, 40, gw.id);

        let gateway = Arc::new(MockGateway::default());
        // gateway reports no peers at all

        let worker = ReconciliationWorker::new(ledger.clone(), gateway);
        worker.run_once().await.unwrap();

        let sub = ledger.find(40).unwrap().unwrap();
        assert_eq!(sub.gateway_id, None);
        assert_eq!(sub.public_key, None);
    }

    #[tokio::test]
    async fn test_disabled_rows_keep_assignment() {
        let ledger = test_ledger();
        let gw = seed_gateway(&ledger, "fra-1");
        seed_subscriber(&ledger, 50, gw.id);
        ledger.mark_disabled(50).unwrap();

        let gateway = Arc::new(MockGateway::default());

        let worker = ReconciliationWorker::new(ledger.clone(), gateway);
        worker.run_once().await.unwrap();

        let sub = ledger.find(50).unwrap().unwrap();
        assert_eq!(sub.gateway_id, Some(gw.id));
        assert_eq!(sub.public_key.as_deref(), Some("pk-50"));
    }

    #[tokio::test]
    async fn test_one_unreachable_gateway_does_not_stop_the_rest() {
        let ledger = test_ledger();
        ledger
            .sync_gateways(&[
                GatewayEntry {
                    name: "fra-1".to_string(),
                    address: "fra-1.example.net".to_string(),
                    active: true,
                    default: false,
                },
                GatewayEntry {
                    name: "ams-1".to_string(),
                    address: "ams-1.example.net".to_string(),
                    active: true,
                    default: false,
                },
            ])
            .unwrap();
        let fra = ledger.gateway_by_name("fra-1").unwrap().unwrap();
        let ams = ledger.gateway_by_name("ams-1").unwrap().unwrap();

        let gateway = Arc::new(MockGateway::default());
        gateway.list_failures.lock().insert(fra.id);
        gateway.seed_peers(ams.id, &[70]);

        let worker = ReconciliationWorker::new(ledger.clone(), gateway);
        worker.run_once().await.unwrap();

        // the healthy gateway was still reconciled
        assert_eq!(ledger.subscribers_on_gateway(ams.id).unwrap().len(), 1);
    }
}
