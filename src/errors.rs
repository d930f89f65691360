//! Error types shared across the crate.
//!
//! `LicenseError` is the domain error every store, lifecycle and sync failure
//! is folded into. The HTTP layer maps it to a status code and a JSON body in
//! `crate::server::api_error`.

use thiserror::Error;

use crate::inventory::InventoryError;
use crate::lifecycle::LifecycleError;

/// Domain errors for license management operations.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The request was malformed or missing required fields. No mutation was attempted.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A license kind label has no entry in the kind→table mapping.
    #[error("unknown license type: {0}")]
    UnknownLicenseKind(String),

    /// The record exists but its expiry is a sentinel (or the adjustment is out of range).
    #[error("license not adjustable: {0}")]
    RecordNotAdjustable(String),

    /// Constraint or connectivity failure in the relational store.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Storefront could not be reached or answered with a transient failure.
    #[error("storefront unavailable: {0}")]
    RemoteUnavailable(String),

    /// Storefront answered with a non-success status.
    #[error("storefront rejected request (HTTP {status}): {body}")]
    RemoteRejected { status: u16, body: String },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Credentials missing or rejected.
    #[error("unauthorized")]
    Unauthorized,
}

/// Convenience alias used throughout the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;

impl From<LifecycleError> for LicenseError {
    fn from(err: LifecycleError) -> Self {
        LicenseError::RecordNotAdjustable(err.to_string())
    }
}

impl From<InventoryError> for LicenseError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Unavailable(msg) => LicenseError::RemoteUnavailable(msg),
            InventoryError::Rejected { status, body } => {
                LicenseError::RemoteRejected { status, body }
            }
            InventoryError::VariantNotConfigured(_) | InventoryError::Disabled => {
                LicenseError::ConfigError(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ExpiryClass;

    #[test]
    fn lifecycle_error_maps_to_not_adjustable() {
        let err: LicenseError = LifecycleError::NotAdjustable(ExpiryClass::Inactive).into();
        assert!(matches!(err, LicenseError::RecordNotAdjustable(_)));
        assert!(err.to_string().contains("inactive"));
    }

    #[test]
    fn inventory_rejection_keeps_status() {
        let err: LicenseError = InventoryError::Rejected {
            status: 422,
            body: "bad".to_string(),
        }
        .into();
        match err {
            LicenseError::RemoteRejected { status, .. } => assert_eq!(status, 422),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
