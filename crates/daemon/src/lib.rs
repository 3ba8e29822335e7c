//! wgfleet manager daemon library
//!
//! Owns the subscription ledger and the three reconciliation/enforcement
//! workers; talks to gateway agents and the notification channel over HTTP.

pub mod config;
pub mod gateway;
pub mod ledger;
pub mod messages;
pub mod notify;
pub mod subscription;
pub mod workers;

#[cfg(test)]
pub mod testing;
