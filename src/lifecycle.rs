//! License lifecycle rules.
//!
//! A license expiry (`licensedate`) is either one of two sentinel timestamps or
//! a real date:
//!
//! - `1970-01-01 00:00:00` → **inactive** (issued, never activated)
//! - `9999-12-31 23:59:59` → **permanent** (never expires)
//! - anything else        → **temporal** (can be moved by whole days)
//!
//! This module also owns the typed kind → table mapping, so adding a kind
//! without deciding where it is stored fails to compile.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::LicenseError;

/// Wire and storage format for naive timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn sentinel(year: i32, month: u32, day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(h, m, s))
        .expect("sentinel timestamps are valid calendar dates")
}

/// `1970-01-01 00:00:00`, the expiry of a license that has not been activated yet.
pub fn inactive_sentinel() -> NaiveDateTime {
    sentinel(1970, 1, 1, 0, 0, 0)
}

/// `9999-12-31 23:59:59`, the expiry of a license that never expires.
pub fn permanent_sentinel() -> NaiveDateTime {
    sentinel(9999, 12, 31, 23, 59, 59)
}

// ============================================================================
// Kinds and tables
// ============================================================================

/// License tier as sold on the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseKind {
    Week,
    Month,
    Lifetime,
    LifetimePro,
}

impl LicenseKind {
    pub const ALL: [LicenseKind; 4] = [
        LicenseKind::Week,
        LicenseKind::Month,
        LicenseKind::Lifetime,
        LicenseKind::LifetimePro,
    ];

    /// Label used on the wire and in the `license` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseKind::Week => "WEEK",
            LicenseKind::Month => "MONTH",
            LicenseKind::Lifetime => "LIFETIME",
            LicenseKind::LifetimePro => "LIFETIME_PRO",
        }
    }

    /// Key under `[sellauth.variants]` in the configuration.
    pub fn config_key(&self) -> &'static str {
        match self {
            LicenseKind::Week => "week",
            LicenseKind::Month => "month",
            LicenseKind::Lifetime => "lifetime",
            LicenseKind::LifetimePro => "lifetime_pro",
        }
    }

    /// Table that stores licenses of this kind.
    pub fn table(&self) -> LicenseTable {
        match self {
            LicenseKind::Week | LicenseKind::Month | LicenseKind::Lifetime => {
                LicenseTable::ApiPremium
            }
            LicenseKind::LifetimePro => LicenseTable::ApiPro,
        }
    }

    /// Non-expiring kinds start at the permanent sentinel.
    pub fn is_permanent(&self) -> bool {
        matches!(self, LicenseKind::Lifetime | LicenseKind::LifetimePro)
    }

    /// Whether generated licenses of this kind come with a coupon code.
    pub fn issues_coupon(&self) -> bool {
        matches!(self, LicenseKind::Week | LicenseKind::Month)
    }
}

impl fmt::Display for LicenseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseKind {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LicenseKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| LicenseError::UnknownLicenseKind(s.to_string()))
    }
}

/// Physical table holding license rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTable {
    ApiPremium,
    ApiPro,
}

impl LicenseTable {
    pub const ALL: [LicenseTable; 2] = [LicenseTable::ApiPremium, LicenseTable::ApiPro];

    /// Order in which tables are searched when adjusting expiry dates.
    pub const ADJUSTMENT_ORDER: [LicenseTable; 2] =
        [LicenseTable::ApiPremium, LicenseTable::ApiPro];

    /// The only table that supports deletion and the unbounded export.
    pub const MANAGED: LicenseTable = LicenseTable::ApiPro;

    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseTable::ApiPremium => "apipremium",
            LicenseTable::ApiPro => "apipro",
        }
    }

    /// Label shown to the dashboard for a stored `license` value.
    ///
    /// `apipro` stores its lifetime tier as `LIFETIME` but displays it as `PREMIUM`.
    pub fn display_label(&self, stored: &str) -> String {
        match (self, stored) {
            (LicenseTable::ApiPro, "LIFETIME") => "PREMIUM".to_string(),
            _ => stored.to_string(),
        }
    }
}

impl fmt::Display for LicenseTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Expiry rules
// ============================================================================

/// Three-way classification of an expiry timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryClass {
    Permanent,
    Inactive,
    Temporal,
}

impl fmt::Display for ExpiryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpiryClass::Permanent => "permanent",
            ExpiryClass::Inactive => "inactive",
            ExpiryClass::Temporal => "temporal",
        };
        f.write_str(s)
    }
}

/// Direction of a date adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateOperation {
    Add,
    Subtract,
}

impl DateOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateOperation::Add => "add",
            DateOperation::Subtract => "subtract",
        }
    }
}

impl FromStr for DateOperation {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(DateOperation::Add),
            "subtract" => Ok(DateOperation::Subtract),
            other => Err(LicenseError::InvalidRequest(format!(
                "operation must be 'add' or 'subtract', got '{other}'"
            ))),
        }
    }
}

/// Errors raised by the pure lifecycle rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("expiry is {0}; only temporal licenses can be adjusted")]
    NotAdjustable(ExpiryClass),

    #[error("moving the expiry by {days} day(s) leaves the valid date range")]
    OutOfRange { days: u32 },
}

/// Classify an expiry timestamp.
pub fn classify(ts: NaiveDateTime) -> ExpiryClass {
    if ts == permanent_sentinel() {
        ExpiryClass::Permanent
    } else if ts == inactive_sentinel() {
        ExpiryClass::Inactive
    } else {
        ExpiryClass::Temporal
    }
}

/// Expiry assigned to a freshly issued license.
pub fn initial_expiry(kind: LicenseKind) -> NaiveDateTime {
    if kind.is_permanent() {
        permanent_sentinel()
    } else {
        inactive_sentinel()
    }
}

/// Move a temporal expiry by whole calendar days.
///
/// Sentinels never move. A result that overflows the calendar or lands on a
/// sentinel is rejected, so `add n` followed by `subtract n` always round-trips.
pub fn adjust_expiry(
    current: NaiveDateTime,
    op: DateOperation,
    days: u32,
) -> Result<NaiveDateTime, LifecycleError> {
    let class = classify(current);
    if class != ExpiryClass::Temporal {
        return Err(LifecycleError::NotAdjustable(class));
    }

    let delta = Days::new(u64::from(days));
    let moved = match op {
        DateOperation::Add => current.checked_add_days(delta),
        DateOperation::Subtract => current.checked_sub_days(delta),
    }
    .ok_or(LifecycleError::OutOfRange { days })?;

    if classify(moved) != ExpiryClass::Temporal {
        return Err(LifecycleError::OutOfRange { days });
    }

    Ok(moved)
}

/// Format a timestamp the way the dashboard expects it.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Serde helpers for `YYYY-MM-DD HH:MM:SS` timestamps.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use super::format_timestamp;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(*ts))
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::Serializer;

        use super::super::format_timestamp;

        pub fn serialize<S: Serializer>(
            ts: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&format_timestamp(*ts)),
                None => serializer.serialize_none(),
            }
        }
    }
}
