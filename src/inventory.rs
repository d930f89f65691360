//! Storefront inventory sync.
//!
//! Newly issued serials are appended to the SellAuth deliverables list of the
//! product/variant that sells their kind. SellAuth only offers "read" and
//! "overwrite" for deliverables, so a push is:
//!
//! 1. fetch the current remote list (abort on failure, nothing is written)
//! 2. union = remote list ++ new serials
//! 3. overwrite the remote list with the union
//!
//! Remote entries are never removed. Duplicates are kept unless
//! `sellauth.deduplicate` is set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{resolve_secret, SellAuthConfig, VariantConfig};
use crate::errors::{LicenseError, LicenseResult};
use crate::lifecycle::LicenseKind;

/// Failures of a single push.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Transport failure or transient remote status. Safe to retry.
    #[error("storefront unavailable: {0}")]
    Unavailable(String),

    /// The storefront refused the request.
    #[error("storefront rejected request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("no storefront variant configured for {0}")]
    VariantNotConfigured(LicenseKind),

    #[error("storefront sync is disabled")]
    Disabled,
}

impl InventoryError {
    /// Whether the caller may retry the push unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::Unavailable(_))
    }

    /// Stable machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            InventoryError::Unavailable(_) => "remote_unavailable",
            InventoryError::Rejected { .. } => "remote_rejected",
            InventoryError::VariantNotConfigured(_) => "variant_not_configured",
            InventoryError::Disabled => "disabled",
        }
    }
}

/// Remote deliverables store.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// Current deliverables of a product variant.
    async fn fetch_deliverables(
        &self,
        product_id: &str,
        variant_id: &str,
    ) -> Result<Vec<String>, InventoryError>;

    /// Replace the deliverables of a product variant, returning the remote response body.
    async fn overwrite_deliverables(
        &self,
        product_id: &str,
        variant_id: &str,
        deliverables: &[String],
    ) -> Result<Value, InventoryError>;
}

// ============================================================================
// SellAuth HTTP client
// ============================================================================

/// reqwest-backed SellAuth API client.
#[derive(Debug, Clone)]
pub struct SellAuthClient {
    http: Client,
    base_url: String,
    shop_id: String,
    api_token: String,
}

impl SellAuthClient {
    /// Build a client from explicit configuration.
    pub fn new(config: &SellAuthConfig) -> LicenseResult<Self> {
        let api_token = resolve_secret(&config.api_token)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            shop_id: config.shop_id.clone(),
            api_token,
        })
    }

    fn deliverables_url(&self, product_id: &str, variant_id: &str) -> String {
        format!(
            "{}/shops/{}/products/{}/deliverables/{}",
            self.base_url, self.shop_id, product_id, variant_id
        )
    }

    fn overwrite_url(&self, product_id: &str, variant_id: &str) -> String {
        format!(
            "{}/shops/{}/products/{}/deliverables/overwrite/{}",
            self.base_url, self.shop_id, product_id, variant_id
        )
    }
}

/// Read a snapshot body into a list of serials.
///
/// Accepts a bare JSON array or an object carrying a `deliverables` array.
fn deliverables_from_value(value: Value) -> Option<Vec<String>> {
    let items = match value {
        Value::Null => return Some(Vec::new()),
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("deliverables") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    Some(
        items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    )
}

#[async_trait]
impl InventoryApi for SellAuthClient {
    async fn fetch_deliverables(
        &self,
        product_id: &str,
        variant_id: &str,
    ) -> Result<Vec<String>, InventoryError> {
        let resp = self
            .http
            .get(self.deliverables_url(product_id, variant_id))
            .bearer_auth(&self.api_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(format!("GET deliverables failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| InventoryError::Unavailable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    InventoryError::Unavailable(format!("HTTP {} - {}", status.as_u16(), body))
                } else {
                    InventoryError::Rejected {
                        status: status.as_u16(),
                        body,
                    }
                },
            );
        }

        let value: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|e| InventoryError::Rejected {
                status: status.as_u16(),
                body: format!("invalid deliverables JSON: {e}"),
            })?
        };

        deliverables_from_value(value).ok_or_else(|| InventoryError::Rejected {
            status: status.as_u16(),
            body: "unexpected deliverables payload".to_string(),
        })
    }

    async fn overwrite_deliverables(
        &self,
        product_id: &str,
        variant_id: &str,
        deliverables: &[String],
    ) -> Result<Value, InventoryError> {
        let resp = self
            .http
            .put(self.overwrite_url(product_id, variant_id))
            .bearer_auth(&self.api_token)
            .header("Accept", "application/json")
            .json(&json!({ "deliverables": deliverables }))
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(format!("PUT deliverables failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| InventoryError::Unavailable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(InventoryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

// ============================================================================
// Sync adapter
// ============================================================================

/// Result of a successful push.
#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub product_id: String,
    pub variant_id: String,
    /// Serials appended by this push
    pub pushed: usize,
    /// Size of the list written to the storefront
    pub remote_total: usize,
    /// Body returned by the overwrite call
    pub response: Value,
}

/// Per-kind outcome embedded in the create response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SyncOutcome {
    Pushed(PushReport),
    Failed {
        error: String,
        kind: &'static str,
        retryable: bool,
    },
}

impl From<Result<PushReport, InventoryError>> for SyncOutcome {
    fn from(result: Result<PushReport, InventoryError>) -> Self {
        match result {
            Ok(report) => SyncOutcome::Pushed(report),
            Err(err) => SyncOutcome::Failed {
                error: err.to_string(),
                kind: err.kind(),
                retryable: err.is_retryable(),
            },
        }
    }
}

/// Union of the remote snapshot and the new serials, remote entries first.
pub fn merge_deliverables(existing: Vec<String>, new: &[String], deduplicate: bool) -> Vec<String> {
    let mut merged = existing;
    if deduplicate {
        for serial in new {
            if !merged.contains(serial) {
                merged.push(serial.clone());
            }
        }
    } else {
        merged.extend(new.iter().cloned());
    }
    merged
}

/// Pushes new serials into the storefront inventory.
#[derive(Clone)]
pub struct InventorySync {
    api: Option<Arc<dyn InventoryApi>>,
    variants: HashMap<LicenseKind, VariantConfig>,
    deduplicate: bool,
}

impl InventorySync {
    /// Sync adapter over an arbitrary inventory backend.
    pub fn new(api: Arc<dyn InventoryApi>, config: &SellAuthConfig) -> Self {
        let variants = LicenseKind::ALL
            .into_iter()
            .filter_map(|kind| config.variant_for(kind).map(|v| (kind, v.clone())))
            .collect();

        Self {
            api: Some(api),
            variants,
            deduplicate: config.deduplicate,
        }
    }

    /// Adapter that refuses every push.
    pub fn disabled() -> Self {
        Self {
            api: None,
            variants: HashMap::new(),
            deduplicate: false,
        }
    }

    /// SellAuth-backed adapter when enabled, a disabled one otherwise.
    pub fn from_config(config: &SellAuthConfig) -> LicenseResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let client = SellAuthClient::new(config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn is_enabled(&self) -> bool {
        self.api.is_some()
    }

    /// Append `new_serials` to the deliverables of one product variant.
    pub async fn push(
        &self,
        product_id: &str,
        variant_id: &str,
        new_serials: &[String],
    ) -> Result<PushReport, InventoryError> {
        let api = self.api.as_ref().ok_or(InventoryError::Disabled)?;

        let existing = api.fetch_deliverables(product_id, variant_id).await?;
        info!(
            "Storefront {}/{} holds {} deliverables, appending {}",
            product_id,
            variant_id,
            existing.len(),
            new_serials.len()
        );

        let merged = merge_deliverables(existing, new_serials, self.deduplicate);
        let remote_total = merged.len();

        let response = api
            .overwrite_deliverables(product_id, variant_id, &merged)
            .await?;

        Ok(PushReport {
            product_id: product_id.to_string(),
            variant_id: variant_id.to_string(),
            pushed: new_serials.len(),
            remote_total,
            response,
        })
    }

    /// Push serials of one kind to the variant configured for it.
    pub async fn push_kind(
        &self,
        kind: LicenseKind,
        new_serials: &[String],
    ) -> Result<PushReport, InventoryError> {
        if !self.is_enabled() {
            return Err(InventoryError::Disabled);
        }
        let variant = self
            .variants
            .get(&kind)
            .ok_or(InventoryError::VariantNotConfigured(kind))?;

        let result = self
            .push(&variant.product_id, &variant.variant_id, new_serials)
            .await;

        if let Err(e) = &result {
            warn!("Storefront push for {} failed: {}", kind, e);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory storefront that records every call.
    #[derive(Default)]
    struct FakeInventory {
        lists: Mutex<HashMap<(String, String), Vec<String>>>,
        fail_fetch: Option<InventoryError>,
        fail_overwrite: Option<InventoryError>,
        overwrites: Mutex<u32>,
    }

    #[async_trait]
    impl InventoryApi for FakeInventory {
        async fn fetch_deliverables(
            &self,
            product_id: &str,
            variant_id: &str,
        ) -> Result<Vec<String>, InventoryError> {
            if let Some(err) = &self.fail_fetch {
                return Err(err.clone());
            }
            let lists = self.lists.lock().unwrap();
            Ok(lists
                .get(&(product_id.to_string(), variant_id.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn overwrite_deliverables(
            &self,
            product_id: &str,
            variant_id: &str,
            deliverables: &[String],
        ) -> Result<Value, InventoryError> {
            *self.overwrites.lock().unwrap() += 1;
            if let Some(err) = &self.fail_overwrite {
                return Err(err.clone());
            }
            self.lists.lock().unwrap().insert(
                (product_id.to_string(), variant_id.to_string()),
                deliverables.to_vec(),
            );
            Ok(json!({ "success": true }))
        }
    }

    fn serials(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sync_over(fake: Arc<FakeInventory>, deduplicate: bool) -> InventorySync {
        let config = SellAuthConfig {
            deduplicate,
            ..SellAuthConfig::default()
        };
        InventorySync::new(fake, &config)
    }

    #[test]
    fn merge_keeps_remote_entries_first() {
        let merged = merge_deliverables(serials(&["A", "B"]), &serials(&["C"]), false);
        assert_eq!(merged, serials(&["A", "B", "C"]));
    }

    #[test]
    fn merge_keeps_duplicates_unless_asked() {
        let merged = merge_deliverables(serials(&["A"]), &serials(&["A", "B"]), false);
        assert_eq!(merged, serials(&["A", "A", "B"]));

        let deduped = merge_deliverables(serials(&["A"]), &serials(&["A", "B"]), true);
        assert_eq!(deduped, serials(&["A", "B"]));
    }

    #[test]
    fn push_appends_to_existing_snapshot() {
        let fake = Arc::new(FakeInventory::default());
        fake.lists.lock().unwrap().insert(
            ("211190".to_string(), "263237".to_string()),
            serials(&["OLD1", "OLD2"]),
        );
        let sync = sync_over(fake.clone(), false);

        let report = tokio_test::block_on(sync.push_kind(LicenseKind::Week, &serials(&["NEW1"])))
            .unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(report.remote_total, 3);
        let lists = fake.lists.lock().unwrap();
        assert_eq!(
            lists[&("211190".to_string(), "263237".to_string())],
            serials(&["OLD1", "OLD2", "NEW1"])
        );
    }

    #[test]
    fn failed_fetch_never_overwrites() {
        let fake = Arc::new(FakeInventory {
            fail_fetch: Some(InventoryError::Unavailable("timeout".to_string())),
            ..FakeInventory::default()
        });
        let sync = sync_over(fake.clone(), false);

        let err = tokio_test::block_on(sync.push("1", "2", &serials(&["X"]))).unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(*fake.overwrites.lock().unwrap(), 0);
    }

    #[test]
    fn rejected_overwrite_is_not_retryable() {
        let fake = Arc::new(FakeInventory {
            fail_overwrite: Some(InventoryError::Rejected {
                status: 403,
                body: "forbidden".to_string(),
            }),
            ..FakeInventory::default()
        });
        let sync = sync_over(fake, false);

        let err = tokio_test::block_on(sync.push("1", "2", &serials(&["X"]))).unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "remote_rejected");
    }

    #[test]
    fn disabled_adapter_refuses_pushes() {
        let sync = InventorySync::disabled();
        let err =
            tokio_test::block_on(sync.push_kind(LicenseKind::Month, &serials(&["X"]))).unwrap_err();
        assert_eq!(err, InventoryError::Disabled);
    }

    #[test]
    fn missing_variant_is_reported() {
        let mut config = SellAuthConfig::default();
        config.variants.remove("lifetime_pro");
        let sync = InventorySync::new(Arc::new(FakeInventory::default()), &config);

        let err = tokio_test::block_on(sync.push_kind(LicenseKind::LifetimePro, &serials(&["X"])))
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::VariantNotConfigured(LicenseKind::LifetimePro)
        );
    }

    #[test]
    fn snapshot_payload_shapes() {
        assert_eq!(
            deliverables_from_value(json!(["A", 7])),
            Some(serials(&["A", "7"]))
        );
        assert_eq!(
            deliverables_from_value(json!({ "deliverables": ["B"] })),
            Some(serials(&["B"]))
        );
        assert_eq!(deliverables_from_value(Value::Null), Some(Vec::new()));
        assert_eq!(deliverables_from_value(json!({ "message": "nope" })), None);
    }

    #[test]
    fn failed_outcome_serializes_inline() {
        let outcome: SyncOutcome = Err(InventoryError::Unavailable("down".to_string())).into();
        let value = serde_json::to_value(outcome).unwrap();
        assert_eq!(value["kind"], "remote_unavailable");
        assert_eq!(value["retryable"], true);
        assert!(value["error"].as_str().unwrap().contains("down"));
    }
}
