//! Request logging middleware and audit events.
//!
//! Every request gets a UUID request id, a tracing span carrying method and
//! path, and a completion line with status and duration. The id is echoed in
//! the `X-Request-Id` response header.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::server::database::TableCounts;

/// License state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// License row inserted
    Created,
    /// License row deleted
    Deleted,
    /// Expiry moved by a date adjustment
    ExpiryAdjusted,
    /// Id-list adjustment skipped a record
    AdjustmentSkipped,
    /// Serials appended to storefront inventory
    Synced,
    /// Storefront push failed
    SyncFailed,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Created => "created",
            LicenseEvent::Deleted => "deleted",
            LicenseEvent::ExpiryAdjusted => "expiry_adjusted",
            LicenseEvent::AdjustmentSkipped => "adjustment_skipped",
            LicenseEvent::Synced => "synced",
            LicenseEvent::SyncFailed => "sync_failed",
        };
        write!(f, "{}", s)
    }
}

/// Log a license state change event.
///
/// `subject` is a serial, an id, or a license kind for storefront events.
pub fn log_license_event(event: LicenseEvent, subject: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        subject = %subject,
    );
    let _enter = span.enter();

    match event {
        LicenseEvent::SyncFailed | LicenseEvent::AdjustmentSkipped => {
            if let Some(d) = details {
                warn!(reason = %d, "License event occurred");
            } else {
                warn!("License event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "License event occurred");
            } else {
                info!("License event occurred");
            }
        }
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and generates request IDs.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    info!(
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: DatabaseHealth,
}

/// Database health status.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    /// sqlite or postgres
    pub db_type: String,
    /// Row count per table, absent when the probe failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<TableCounts>,
}

impl HealthResponse {
    /// Build a response from a table-count probe. A failed probe means degraded.
    pub fn from_probe(db_type: &str, tables: Option<TableCounts>) -> Self {
        let connected = tables.is_some();
        Self {
            status: if connected { "healthy" } else { "degraded" }.to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected,
                db_type: db_type.to_string(),
                tables,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn health_response_healthy() {
        let counts = TableCounts {
            apipremium: 4,
            apipro: 2,
        };
        let health = HealthResponse::from_probe("sqlite", Some(counts));
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "serialdesk");
        assert!(health.database.connected);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["database"]["tables"]["apipremium"], 4);
    }

    #[test]
    fn health_response_degraded() {
        let health = HealthResponse::from_probe("postgres", None);
        assert_eq!(health.status, "degraded");
        assert!(!health.database.connected);
        let json = serde_json::to_value(&health).unwrap();
        assert!(json["database"].get("tables").is_none());
    }

    #[test]
    fn event_names() {
        assert_eq!(LicenseEvent::ExpiryAdjusted.to_string(), "expiry_adjusted");
        assert_eq!(LicenseEvent::SyncFailed.to_string(), "sync_failed");
    }
}
