//! Notification wording
//!
//! Trial and paid subscriptions get different texts; the enforcer and the
//! reminder pick based on `trial_used` read before any mutation.

pub const TRIAL_EXPIRED: &str =
    "Your trial period has ended and the VPN connection was switched off. \
     Renew the subscription to restore access.";

pub const SUBSCRIPTION_EXPIRED: &str =
    "Your subscription has expired and the VPN connection was switched off. \
     Renew it to restore access.";

pub const TRIAL_REMINDER: &str =
    "Your trial period ends within a day. Renew now to keep your access.";

pub const SUBSCRIPTION_REMINDER: &str =
    "Your subscription ends within a day. Renew now to keep your access.";
