//! Subscription ledger
//!
//! Tables:
//! - gateways: operator-configured gateway nodes, synced at startup
//! - subscribers: billing records keyed by the external user id
//! - promo_codes: one-shot subscription extensions
//!
//! Every update is keyed by `user_id` and idempotent; applying the same
//! update twice has the same effect as once. Consistency across the worker
//! tasks rests on SQLite's serialized connection, not in-process locks.

use crate::config::GatewayEntry;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;
use wgfleet_common::{Database, Error, Gateway, PromoCode, Result, Subscriber};

/// Ledger access contract consumed by the workers and the subscription
/// service
#[derive(Clone)]
pub struct SubscriptionLedger {
    db: Database,
    trial_months: u32,
}

/// Fields known at first provisioning
#[derive(Debug, Clone)]
pub struct NewSubscriber {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gateway_id: i64,
    pub public_key: String,
}

fn to_dt(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn gateway_from_row(row: &Row<'_>) -> rusqlite::Result<Gateway> {
    Ok(Gateway {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        active: row.get(3)?,
        is_default: row.get(4)?,
        created_at: to_dt(row.get(5)?),
        updated_at: to_dt(row.get(6)?),
    })
}

fn subscriber_from_row(row: &Row<'_>) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        id: row.get(0)?,
        user_id: row.get(1)?,
        chat_id: row.get(2)?,
        username: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        gateway_id: row.get(6)?,
        public_key: row.get(7)?,
        expires_at: to_dt(row.get(8)?),
        trial_used: row.get(9)?,
        active: row.get(10)?,
        reminded: row.get(11)?,
        created_at: to_dt(row.get(12)?),
        updated_at: to_dt(row.get(13)?),
    })
}

fn promo_from_row(row: &Row<'_>) -> rusqlite::Result<PromoCode> {
    Ok(PromoCode {
        id: row.get(0)?,
        value: row.get(1)?,
        months: row.get(2)?,
        active: row.get(3)?,
        created_at: to_dt(row.get(4)?),
        updated_at: to_dt(row.get(5)?),
    })
}

const GATEWAY_COLS: &str = "id, name, address, active, is_default, created_at, updated_at";
const SUBSCRIBER_COLS: &str = "id, user_id, chat_id, username, first_name, last_name, \
                               gateway_id, public_key, expires_at, trial_used, active, \
                               reminded, created_at, updated_at";

impl SubscriptionLedger {
    pub fn new(db: Database, trial_months: u32) -> Self {
        Self { db, trial_months }
    }

    /// Underlying database handle, for subsystems sharing the ledger DB
    pub fn database(&self) -> Database {
        self.db.clone()
    }

    /// Initialize ledger schema
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute_batch(
            r#"
            -- Gateways (operator configuration, read-only to the workers)
            CREATE TABLE IF NOT EXISTS gateways (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                address TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Subscribers
            CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                chat_id INTEGER NOT NULL,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                gateway_id INTEGER REFERENCES gateways(id),
                public_key TEXT,
                expires_at INTEGER NOT NULL,
                trial_used INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                reminded INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_subscribers_gateway ON subscribers(gateway_id);
            CREATE INDEX IF NOT EXISTS idx_subscribers_expiry ON subscribers(expires_at, active);

            -- Promo codes
            CREATE TABLE IF NOT EXISTS promo_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                value TEXT NOT NULL UNIQUE,
                months INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        info!("Ledger schema initialized");
        Ok(())
    }

    // ========================================================================
    // Gateway operations
    // ========================================================================

    /// Sync operator-configured gateways into the ledger (startup only)
    pub fn sync_gateways(&self, entries: &[GatewayEntry]) -> Result<()> {
        let now = Utc::now().timestamp();
        let conn = self.db.connection();
        let conn = conn.lock();
        for entry in entries {
            conn.execute(
                "INSERT INTO gateways (name, address, active, is_default, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(name) DO UPDATE SET
                     address = excluded.address,
                     active = excluded.active,
                     is_default = excluded.is_default,
                     updated_at = excluded.updated_at",
                params![entry.name, entry.address, entry.active, entry.default, now],
            )?;
        }
        info!("Synced {} gateways from configuration", entries.len());
        Ok(())
    }

    pub fn active_gateways(&self) -> Result<Vec<Gateway>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM gateways WHERE active = 1 ORDER BY name",
            GATEWAY_COLS
        ))?;
        let rows = stmt.query_map([], gateway_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Active gateways, optionally excluding the one a subscriber is on
    pub fn gateways_excluding(&self, exclude: Option<i64>) -> Result<Vec<Gateway>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM gateways WHERE active = 1 AND id IS NOT ?1 ORDER BY name",
            GATEWAY_COLS
        ))?;
        let rows = stmt.query_map(params![exclude], gateway_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn default_gateway(&self) -> Result<Option<Gateway>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM gateways WHERE is_default = 1 AND active = 1",
                    GATEWAY_COLS
                ),
                [],
                gateway_from_row,
            )
            .optional()?)
    }

    pub fn gateway_by_name(&self, name: &str) -> Result<Option<Gateway>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM gateways WHERE name = ?1 AND active = 1",
                    GATEWAY_COLS
                ),
                params![name],
                gateway_from_row,
            )
            .optional()?)
    }

    pub fn gateway_by_id(&self, id: i64) -> Result<Option<Gateway>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM gateways WHERE id = ?1", GATEWAY_COLS),
                params![id],
                gateway_from_row,
            )
            .optional()?)
    }

    // ========================================================================
    // Subscriber operations
    // ========================================================================

    pub fn find(&self, user_id: i64) -> Result<Option<Subscriber>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM subscribers WHERE user_id = ?1", SUBSCRIBER_COLS),
                params![user_id],
                subscriber_from_row,
            )
            .optional()?)
    }

    /// Subscriber together with its assigned gateway, if any
    pub fn find_with_gateway(&self, user_id: i64) -> Result<Option<(Subscriber, Option<Gateway>)>> {
        let Some(subscriber) = self.find(user_id)? else {
            return Ok(None);
        };
        let gateway = match subscriber.gateway_id {
            Some(id) => self.gateway_by_id(id)?,
            None => None,
        };
        Ok(Some((subscriber, gateway)))
    }

    pub fn subscribers_on_gateway(&self, gateway_id: i64) -> Result<Vec<Subscriber>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscribers WHERE gateway_id = ?1 ORDER BY user_id",
            SUBSCRIBER_COLS
        ))?;
        let rows = stmt.query_map(params![gateway_id], subscriber_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Create a subscriber row at first successful provisioning
    pub fn create_subscriber(&self, new: &NewSubscriber) -> Result<Subscriber> {
        let now = Utc::now();
        let expires_at = wgfleet_common::expiry::trial_expiry(now, self.trial_months);

        let changed = {
            let conn = self.db.connection();
            let conn = conn.lock();
            conn.execute(
                "INSERT INTO subscribers
                     (user_id, chat_id, username, first_name, last_name,
                      gateway_id, public_key, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(user_id) DO NOTHING",
                params![
                    new.user_id,
                    new.chat_id,
                    new.username,
                    new.first_name,
                    new.last_name,
                    new.gateway_id,
                    new.public_key,
                    expires_at.timestamp(),
                    now.timestamp(),
                ],
            )?
        };
        if changed == 0 {
            return Err(Error::already_exists("subscriber", new.user_id));
        }

        self.find(new.user_id)?
            .ok_or_else(|| Error::not_found("subscriber", new.user_id))
    }

    /// Insert a row for a peer discovered live on a gateway with no ledger
    /// record. Idempotent: an existing row is left alone.
    pub fn insert_discovered(&self, user_id: i64, gateway_id: i64) -> Result<()> {
        let now = Utc::now();
        let expires_at = wgfleet_common::expiry::trial_expiry(now, self.trial_months);

        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute(
            "INSERT INTO subscribers
                 (user_id, chat_id, gateway_id, expires_at, created_at, updated_at)
             VALUES (?1, ?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id) DO NOTHING",
            params![user_id, gateway_id, expires_at.timestamp(), now.timestamp()],
        )?;
        Ok(())
    }

    fn update<P: rusqlite::Params>(&self, user_id: i64, sql: &str, params: P) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let changed = conn.execute(sql, params)?;
        if changed == 0 {
            return Err(Error::not_found("subscriber", user_id));
        }
        Ok(())
    }

    pub fn assign_gateway(&self, user_id: i64, gateway_id: i64, public_key: &str) -> Result<()> {
        self.update(
            user_id,
            "UPDATE subscribers SET gateway_id = ?2, public_key = ?3, updated_at = ?4
             WHERE user_id = ?1",
            params![user_id, gateway_id, public_key, Utc::now().timestamp()],
        )
    }

    /// Drop the gateway assignment of a row whose peer disappeared
    pub fn clear_gateway(&self, user_id: i64) -> Result<()> {
        self.update(
            user_id,
            "UPDATE subscribers SET gateway_id = NULL, public_key = NULL, updated_at = ?2
             WHERE user_id = ?1",
            params![user_id, Utc::now().timestamp()],
        )
    }

    /// Move the expiry; any extension re-arms the reminder
    pub fn extend_expiry(&self, user_id: i64, expires_at: DateTime<Utc>) -> Result<()> {
        self.update(
            user_id,
            "UPDATE subscribers SET expires_at = ?2, trial_used = 1, reminded = 0, updated_at = ?3
             WHERE user_id = ?1",
            params![user_id, expires_at.timestamp(), Utc::now().timestamp()],
        )
    }

    pub fn mark_disabled(&self, user_id: i64) -> Result<()> {
        self.update(
            user_id,
            "UPDATE subscribers SET active = 0, trial_used = 1, updated_at = ?2
             WHERE user_id = ?1",
            params![user_id, Utc::now().timestamp()],
        )
    }

    pub fn mark_enabled(&self, user_id: i64) -> Result<()> {
        self.update(
            user_id,
            "UPDATE subscribers SET active = 1, updated_at = ?2 WHERE user_id = ?1",
            params![user_id, Utc::now().timestamp()],
        )
    }

    pub fn mark_reminded(&self, user_id: i64) -> Result<()> {
        self.update(
            user_id,
            "UPDATE subscribers SET reminded = 1, updated_at = ?2 WHERE user_id = ?1",
            params![user_id, Utc::now().timestamp()],
        )
    }

    /// Legacy gateway-switch support only; lapsed subscriptions are
    /// disabled, never deleted.
    pub fn delete_subscriber(&self, user_id: i64) -> Result<()> {
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute("DELETE FROM subscribers WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }

    /// Rows whose subscription lapsed but whose peer is still enabled
    pub fn expired_active(&self, now: DateTime<Utc>) -> Result<Vec<Subscriber>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscribers WHERE expires_at < ?1 AND active = 1 ORDER BY user_id",
            SUBSCRIBER_COLS
        ))?;
        let rows = stmt.query_map(params![now.timestamp()], subscriber_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Rows expiring within the lookahead that have not yet been reminded
    pub fn expiring_within(&self, now: DateTime<Utc>, lookahead: Duration) -> Result<Vec<Subscriber>> {
        let horizon = now + lookahead;
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscribers
             WHERE expires_at < ?1 AND active = 1 AND reminded = 0 ORDER BY user_id",
            SUBSCRIBER_COLS
        ))?;
        let rows = stmt.query_map(params![horizon.timestamp()], subscriber_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ========================================================================
    // Promo operations
    // ========================================================================

    pub fn create_promo(&self, value: &str, months: u32) -> Result<PromoCode> {
        let now = Utc::now().timestamp();
        let conn = self.db.connection();
        let conn = conn.lock();
        conn.execute(
            "INSERT INTO promo_codes (value, months, active, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)",
            params![value, months, now],
        )?;
        conn.query_row(
            "SELECT id, value, months, active, created_at, updated_at
             FROM promo_codes WHERE value = ?1",
            params![value],
            promo_from_row,
        )
        .map_err(Into::into)
    }

    /// Atomically match and spend a promo code. The flip to inactive happens
    /// in the same statement as the match, so two concurrent redemptions
    /// cannot both succeed.
    pub fn consume_promo(&self, value: &str) -> Result<Option<PromoCode>> {
        let now = Utc::now().timestamp();
        let conn = self.db.connection();
        let conn = conn.lock();
        Ok(conn
            .query_row(
                "UPDATE promo_codes SET active = 0, updated_at = ?2
                 WHERE value = ?1 AND active = 1
                 RETURNING id, value, months, active, created_at, updated_at",
                params![value, now],
                promo_from_row,
            )
            .optional()?)
    }
}
