//! Manager-side subscription operations
//!
//! The surface the chat-bot layer calls into: provisioning a peer for a
//! subscriber, and extending expiry through payments and promo codes.

use crate::gateway::GatewayApi;
use crate::ledger::{NewSubscriber, SubscriptionLedger};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use wgfleet_common::{expiry, Error, Result, Tariff};

/// Identity fields forwarded from the chat layer
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Result of a provisioning request
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub already_exist: bool,
    /// Decoded client config text
    pub client_config: Option<String>,
    /// Base64 scannable image, passed through from the gateway
    pub qr: Option<String>,
    pub public_key: Option<String>,
}

/// Subscription operations over the ledger and the gateway API
pub struct SubscriptionService {
    ledger: SubscriptionLedger,
    gateway: Arc<dyn GatewayApi>,
    unit_price: u32,
}

fn decode_text(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Remote(format!("undecodable config payload: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Remote(format!("non-UTF-8 config payload: {}", e)))
}

impl SubscriptionService {
    pub fn new(ledger: SubscriptionLedger, gateway: Arc<dyn GatewayApi>, unit_price: u32) -> Self {
        Self {
            ledger,
            gateway,
            unit_price,
        }
    }

    /// Provision a peer for `profile` on the named gateway.
    ///
    /// A subscriber moving to a different gateway goes through the legacy
    /// delete-and-recreate flow: the old peer is removed, the row dropped,
    /// and a fresh row created with a fresh trial expiry.
    pub async fn provision(
        &self,
        profile: &UserProfile,
        gateway_name: &str,
    ) -> Result<ProvisionOutcome> {
        let gw = self
            .ledger
            .gateway_by_name(gateway_name)?
            .ok_or_else(|| Error::not_found("gateway", gateway_name))?;

        if let Some(existing) = self.ledger.find(profile.user_id)? {
            if let Some(old_id) = existing.gateway_id {
                if old_id != gw.id {
                    if let Some(old_gw) = self.ledger.gateway_by_id(old_id)? {
                        self.gateway.remove_peer(&old_gw, profile.user_id).await?;
                    }
                    self.ledger.delete_subscriber(profile.user_id)?;
                    info!(
                        "Subscriber {} switching gateway {} -> {}",
                        profile.user_id, old_id, gw.id
                    );
                }
            }
        }

        let response = self.gateway.create_peer(&gw, profile.user_id).await?;
        if !response.success {
            return Err(Error::Remote(format!(
                "gateway {} refused provisioning",
                gw.name
            )));
        }

        let client_config = response.conf.as_deref().map(decode_text).transpose()?;

        if response.already_exist {
            info!(
                "Subscriber {} already has a peer on {}",
                profile.user_id, gw.name
            );
            return Ok(ProvisionOutcome {
                already_exist: true,
                client_config,
                qr: response.qr,
                public_key: response.public_key,
            });
        }

        let public_key = response
            .public_key
            .clone()
            .ok_or_else(|| Error::Remote("gateway response missing public key".to_string()))?;

        match self.ledger.find(profile.user_id)? {
            None => {
                self.ledger.create_subscriber(&NewSubscriber {
                    user_id: profile.user_id,
                    chat_id: profile.chat_id,
                    username: profile.username.clone(),
                    first_name: profile.first_name.clone(),
                    last_name: profile.last_name.clone(),
                    gateway_id: gw.id,
                    public_key: public_key.clone(),
                })?;
            }
            Some(_) => {
                self.ledger
                    .assign_gateway(profile.user_id, gw.id, &public_key)?;
                self.ledger.mark_enabled(profile.user_id)?;
            }
        }

        info!("Provisioned subscriber {} on {}", profile.user_id, gw.name);
        Ok(ProvisionOutcome {
            already_exist: false,
            client_config,
            qr: response.qr,
            public_key: Some(public_key),
        })
    }

    /// Extend expiry by months bought with a raw payment amount
    /// (`amount / unit_price`; see DESIGN.md on the dual derivation).
    pub async fn record_payment(&self, user_id: i64, amount: u32) -> Result<DateTime<Utc>> {
        let months = expiry::months_for_amount(amount, self.unit_price);
        self.renew(user_id, months).await
    }

    /// Extend expiry by a validated tariff's months
    pub async fn record_tariff_payment(&self, user_id: i64, tariff: Tariff) -> Result<DateTime<Utc>> {
        self.renew(user_id, tariff.months()).await
    }

    /// Atomically consume a promo code and extend expiry by its months
    pub async fn apply_promo(&self, user_id: i64, code: &str) -> Result<DateTime<Utc>> {
        let promo = self
            .ledger
            .consume_promo(code)?
            .ok_or_else(|| Error::not_found("promo", code))?;
        info!("Subscriber {} redeemed promo {}", user_id, promo.value);
        self.renew(user_id, promo.months).await
    }

    async fn renew(&self, user_id: i64, months: u32) -> Result<DateTime<Utc>> {
        let subscriber = self
            .ledger
            .find(user_id)?
            .ok_or_else(|| Error::not_found("subscriber", user_id))?;

        let now = Utc::now();
        let new_expiry = expiry::extend(subscriber.expires_at, now, months);
        self.ledger.extend_expiry(user_id, new_expiry)?;

        if let Some(until) = expiry::describe(new_expiry, now) {
            info!("Subscriber {} renewed until {}", user_id, until);
        }

        // a disabled peer that kept its assignment comes back on renewal
        if !subscriber.active {
            match (subscriber.gateway_id, &subscriber.public_key) {
                (Some(gateway_id), Some(public_key)) => {
                    if let Some(gw) = self.ledger.gateway_by_id(gateway_id)? {
                        self.gateway.enable_peer(&gw, user_id, public_key).await?;
                        self.ledger.mark_enabled(user_id)?;
                    }
                }
                _ => warn!(
                    "Subscriber {} renewed without an assigned peer; provisioning required",
                    user_id
                ),
            }
        }

        Ok(new_expiry)
    }
}
