//! Expiry date arithmetic for subscriptions

use chrono::{DateTime, Datelike, Months, Utc};

/// Expiry granted to a freshly provisioned subscriber
pub fn trial_expiry(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_add_months(Months::new(months)).unwrap_or(now)
}

/// New expiry after extending by `months`.
///
/// A lapsed subscription extends from now, not from the old expiry.
pub fn extend(current: DateTime<Utc>, now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let base = if now > current { now } else { current };
    base.checked_add_months(Months::new(months)).unwrap_or(base)
}

/// Months bought by a raw payment amount at the configured unit price.
///
/// Kept separate from `Tariff::months` on purpose: the two derivations are
/// not equivalent under currency or tariff changes (see DESIGN.md).
pub fn months_for_amount(amount: u32, unit_price: u32) -> u32 {
    if unit_price == 0 {
        return 0;
    }
    amount / unit_price
}

/// Human-readable expiry date with remaining time, `None` once lapsed.
///
/// Renders as `DD.MM.YYYY (N months)`.
pub fn describe(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<String> {
    if now > expires_at {
        return None;
    }

    let diff = expires_at - now;
    let month_diff = (diff.num_days() as f64 / 30.0).round() as i64;
    let day_diff = diff.num_days();

    let time_left = if month_diff >= 12 {
        "more than a year".to_string()
    } else if month_diff > 1 {
        format!("{} months", month_diff)
    } else if month_diff > 0 {
        "1 month".to_string()
    } else if day_diff > 1 {
        format!("{} days", day_diff)
    } else {
        "1 day".to_string()
    };

    Some(format!(
        "{:02}.{:02}.{:04} ({})",
        expires_at.day(),
        expires_at.month(),
        expires_at.year(),
        time_left
    ))
}
