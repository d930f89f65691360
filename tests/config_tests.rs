use std::env;

use serial_test::serial;

use serialdesk::config::{get_config, resolve_secret, PanelConfig};
use serialdesk::errors::LicenseError;

#[test]
#[serial]
fn env_overrides_apply_to_global_config() {
    env::set_var("SERIALDESK_SERVER_PORT", "9911");
    env::set_var("SERIALDESK_SELLAUTH_SHOP_ID", "121539");

    let config = get_config().expect("config loads");

    assert_eq!(config.server.port, 9911);
    assert_eq!(config.sellauth.shop_id, "121539");
    // Values without an override keep their defaults.
    assert_eq!(config.listing.bounded_limit, 1000);
    assert_eq!(config.generator.coupon_prefix, "PURGE");

    // Cached after the first load.
    let again = get_config().expect("cached config");
    assert!(std::ptr::eq(config, again));

    env::remove_var("SERIALDESK_SERVER_PORT");
    env::remove_var("SERIALDESK_SELLAUTH_SHOP_ID");
}

#[test]
#[serial]
fn secrets_resolve_from_environment() {
    env::set_var("SERIALDESK_TEST_STOREFRONT_TOKEN", "tok-123");

    assert_eq!(
        resolve_secret("env:SERIALDESK_TEST_STOREFRONT_TOKEN").unwrap(),
        "tok-123"
    );
    assert_eq!(resolve_secret("literal-token").unwrap(), "literal-token");

    env::remove_var("SERIALDESK_TEST_STOREFRONT_TOKEN");

    let err = resolve_secret("env:SERIALDESK_TEST_STOREFRONT_TOKEN").unwrap_err();
    assert!(matches!(err, LicenseError::ConfigError(_)));
}

#[test]
fn default_variants_cover_every_kind() {
    let config = PanelConfig::default();
    let week = &config.sellauth.variants["week"];
    assert_eq!(week.product_id, "211190");
    assert_eq!(week.variant_id, "263237");
    assert_eq!(config.sellauth.variants.len(), 4);
    assert!(config.validate().is_ok());
}
