//! Pre-expiry reminders
//!
//! Warns subscribers whose expiry falls within the lookahead window, once
//! per expiry value. The `reminded` flag is set when the send is enqueued,
//! not after confirmed delivery: overlapping passes must not double-send,
//! and a send that fails after the flag is set is not retried. Extending
//! expiry clears the flag, so the next expiry gets its own reminder.

use crate::ledger::SubscriptionLedger;
use crate::messages;
use crate::notify::Notify;
use crate::workers::Worker;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use wgfleet_common::Result;

pub struct ReminderWorker {
    ledger: SubscriptionLedger,
    notifier: Arc<dyn Notify>,
    lookahead: Duration,
}

impl ReminderWorker {
    pub fn new(ledger: SubscriptionLedger, notifier: Arc<dyn Notify>, lookahead: Duration) -> Self {
        Self {
            ledger,
            notifier,
            lookahead,
        }
    }
}

#[async_trait]
impl Worker for ReminderWorker {
    async fn run_once(&self) -> Result<()> {
        let due = self.ledger.expiring_within(Utc::now(), self.lookahead)?;

        for subscriber in &due {
            let was_trial = !subscriber.trial_used;

            if let Err(e) = self.ledger.mark_reminded(subscriber.user_id) {
                warn!(
                    "Failed to mark subscriber {} reminded: {}",
                    subscriber.user_id, e
                );
                continue;
            }

            let text = if was_trial {
                messages::TRIAL_REMINDER
            } else {
                messages::SUBSCRIPTION_REMINDER
            };
            match self.notifier.send(subscriber.chat_id, text).await {
                Ok(()) => info!("Reminded subscriber {}", subscriber.user_id),
                // accepted tradeoff: the flag is already set, no retry
                Err(e) => warn!(
                    "Failed to send reminder to subscriber {}: {}",
                    subscriber.user_id, e
                ),
            }
        }

        Ok(())
    }
}
