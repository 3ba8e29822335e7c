//! Expiry enforcement
//!
//! Disables peers whose subscription lapsed. The ledger row is only touched
//! after the gateway confirmed the disable; a failed disable leaves the row
//! selected for the next pass. At-least-once, never exactly-once.

use crate::gateway::GatewayApi;
use crate::ledger::SubscriptionLedger;
use crate::messages;
use crate::notify::Notify;
use crate::workers::Worker;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use wgfleet_common::{Result, Subscriber};

pub struct ExpiryEnforcerWorker {
    ledger: SubscriptionLedger,
    gateway: Arc<dyn GatewayApi>,
    notifier: Arc<dyn Notify>,
}

impl ExpiryEnforcerWorker {
    pub fn new(
        ledger: SubscriptionLedger,
        gateway: Arc<dyn GatewayApi>,
        notifier: Arc<dyn Notify>,
    ) -> Self {
        Self {
            ledger,
            gateway,
            notifier,
        }
    }

    async fn enforce_one(&self, subscriber: &Subscriber) -> Result<()> {
        let Some(gateway_id) = subscriber.gateway_id else {
            error!(
                "Expired subscriber {} has no gateway assignment",
                subscriber.user_id
            );
            return Ok(());
        };
        let Some(gw) = self.ledger.gateway_by_id(gateway_id)? else {
            error!(
                "Expired subscriber {} references unknown gateway {}",
                subscriber.user_id, gateway_id
            );
            return Ok(());
        };

        // wording depends on the pre-mutation trial state
        let was_trial = !subscriber.trial_used;

        self.gateway.disable_peer(&gw, subscriber.user_id).await?;
        self.ledger.mark_disabled(subscriber.user_id)?;
        info!(
            "Disabled expired subscriber {} on [{}]",
            subscriber.user_id, gw.name
        );

        let text = if was_trial {
            messages::TRIAL_EXPIRED
        } else {
            messages::SUBSCRIPTION_EXPIRED
        };
        if let Err(e) = self.notifier.send(subscriber.chat_id, text).await {
            warn!(
                "Failed to notify subscriber {} about expiry: {}",
                subscriber.user_id, e
            );
        }

        Ok(())
    }
}

#[async_trait]
impl Worker for ExpiryEnforcerWorker {
    async fn run_once(&self) -> Result<()> {
        let due = self.ledger.expired_active(Utc::now())?;

        for subscriber in &due {
            // the row stays untouched on failure and is selected next pass
            if let Err(e) = self.enforce_one(subscriber).await {
                warn!(
                    "Failed to disable expired subscriber {}: {}",
                    subscriber.user_id, e
                );
            }
        }

        Ok(())
    }
}
