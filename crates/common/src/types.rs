//! Core domain types for wgfleet

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A VPN gateway node hosting WireGuard peers.
///
/// Rows come from operator configuration and are read-only to the workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    pub id: i64,
    pub name: String,
    /// Reachable address of the gateway agent (host or IP, no port)
    pub address: String,
    pub active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Billing/ledger record for one end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    /// External user identifier, unique
    pub user_id: i64,
    /// Chat identifier for notifications
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Assigned gateway, absent when no peer is provisioned
    pub gateway_id: Option<i64>,
    /// WireGuard public key of the provisioned peer
    pub public_key: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub trial_used: bool,
    /// Peer currently enabled on its gateway (eventually consistent)
    pub active: bool,
    /// One-shot pre-expiry reminder flag, cleared when expiry is extended
    pub reminded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A redeemable promo code granting a number of subscription months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: i64,
    pub value: String,
    pub months: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated subscription tariff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tariff {
    Month,
    Quarter,
    Year,
}

impl Tariff {
    pub fn months(self) -> u32 {
        match self {
            Self::Month => 1,
            Self::Quarter => 3,
            Self::Year => 12,
        }
    }
}

impl std::fmt::Display for Tariff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Month => write!(f, "month"),
            Self::Quarter => write!(f, "quarter"),
            Self::Year => write!(f, "year"),
        }
    }
}

impl std::str::FromStr for Tariff {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            _ => Err(format!("unknown tariff: {}", s)),
        }
    }
}
