//! Serial and coupon generation.
//!
//! Serials are random alphanumeric strings (`[0-9a-zA-Z]`, 15 characters by
//! default). Coupons are a fixed prefix followed by uppercase alphanumerics,
//! e.g. `PURGE7K2QX`. Only kinds that sell with a coupon receive one.
//!
//! # Example
//!
//! ```rust
//! use serialdesk::config::GeneratorConfig;
//! use serialdesk::generator::generate_batch;
//! use serialdesk::lifecycle::LicenseKind;
//!
//! let items = generate_batch(LicenseKind::Week, 3, &GeneratorConfig::default());
//! assert_eq!(items.len(), 3);
//! assert!(items.iter().all(|item| item.cupon.is_some()));
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::lifecycle::LicenseKind;

const SERIAL_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const COUPON_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// One license to create, as submitted by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseDraft {
    #[serde(default)]
    pub serial: String,
    /// Label stored in the `license` column.
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub cupon: Option<String>,
    /// Kind used for table routing; falls back to `license` when absent.
    #[serde(rename = "licenseType", default, skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
}

fn random_string(charset: &[u8], length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset[idx] as char
        })
        .collect()
}

/// Generate a random serial of `length` alphanumeric characters.
pub fn generate_serial(length: u8) -> String {
    random_string(SERIAL_CHARSET, usize::from(length))
}

/// Generate a coupon code: `prefix` followed by `length` uppercase alphanumerics.
pub fn generate_coupon(prefix: &str, length: u8) -> String {
    format!("{prefix}{}", random_string(COUPON_CHARSET, usize::from(length)))
}

/// Generate `count` drafts of the given kind.
pub fn generate_batch(kind: LicenseKind, count: u32, config: &GeneratorConfig) -> Vec<LicenseDraft> {
    (0..count)
        .map(|_| LicenseDraft {
            serial: generate_serial(config.serial_length),
            license: kind.as_str().to_string(),
            cupon: kind
                .issues_coupon()
                .then(|| generate_coupon(&config.coupon_prefix, config.coupon_length)),
            license_type: Some(kind.as_str().to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn serial_has_requested_length_and_charset() {
        let serial = generate_serial(15);
        assert_eq!(serial.len(), 15);
        assert!(serial.bytes().all(|b| SERIAL_CHARSET.contains(&b)));
    }

    #[test]
    fn coupon_has_prefix_and_uppercase_tail() {
        let coupon = generate_coupon("PURGE", 5);
        assert_eq!(coupon.len(), 10);
        assert!(coupon.starts_with("PURGE"));
        assert!(coupon[5..].bytes().all(|b| COUPON_CHARSET.contains(&b)));
    }

    #[test]
    fn batch_is_unique_and_typed() {
        let config = GeneratorConfig::default();
        let items = generate_batch(LicenseKind::Month, 50, &config);
        let serials: HashSet<_> = items.iter().map(|i| i.serial.clone()).collect();
        assert_eq!(serials.len(), 50);
        assert!(items.iter().all(|i| i.license == "MONTH"));
        assert!(items.iter().all(|i| i.license_type.as_deref() == Some("MONTH")));
    }

    #[test]
    fn lifetime_batches_have_no_coupon() {
        let config = GeneratorConfig::default();
        let items = generate_batch(LicenseKind::LifetimePro, 3, &config);
        assert!(items.iter().all(|i| i.cupon.is_none()));
    }

    #[test]
    fn draft_reads_dashboard_payload() {
        let draft: LicenseDraft = serde_json::from_str(
            r#"{"serial":"AAA111","license":"WEEK","cupon":"PURGEX1","licenseType":"WEEK"}"#,
        )
        .unwrap();
        assert_eq!(draft.serial, "AAA111");
        assert_eq!(draft.cupon.as_deref(), Some("PURGEX1"));
        assert_eq!(draft.license_type.as_deref(), Some("WEEK"));
    }
}
