//! HTTP server components.
//!
//! - `database`    → license store over SQLite/Postgres
//! - `handlers`    → axum handlers for the panel endpoints
//! - `routes`      → router builder
//! - `api_error`   → error codes, error body and JSON extractor
//! - `auth`        → credential verifier and Basic auth middleware
//! - `cors`        → open CORS middleware
//! - `logging`     → request logging, audit events, health body
//! - `validation`  → request field validation

pub mod api_error;
pub mod auth;
pub mod cors;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod validation;

pub use api_error::{ApiError, ApiJson, ErrorCode};
pub use auth::{AuthState, CredentialVerifier, StaticCredentials};
pub use database::{
    Adjustment, BatchAdjustment, Database, DeleteOutcome, DeletedLicense, LicenseRecord,
    NewLicense, TableCounts,
};
pub use handlers::AppState;
pub use routes::{build_router, build_router_with_logging};
