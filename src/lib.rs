//! serialdesk - license-key management panel backend.
//!
//! Licenses live in two tables (`apipremium`, `apipro`). Their expiry is either
//! a sentinel (inactive or permanent) or a real, adjustable date. Newly issued
//! serials can be appended to a SellAuth storefront inventory.
//!
//! # Features
//!
//! - `server` - HTTP server components (handlers, database). Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (server + sqlite)
//! serialdesk = { path = "../serialdesk" }
//!
//! # Lifecycle rules, generator and storefront client only
//! serialdesk = { path = "../serialdesk", default-features = false }
//!
//! # Server with PostgreSQL
//! serialdesk = { path = "../serialdesk", features = ["server", "postgres"] }
//! ```

// Core modules (always available)
pub mod config;
pub mod errors;
pub mod generator;
pub mod inventory;
pub mod lifecycle;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
