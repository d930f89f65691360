//! Error responses shared by every panel endpoint.
//!
//! # Response Format
//!
//! ```json
//! {
//!   "error": "MISSING_PARAMETERS",
//!   "message": "Required field 'serial' is missing",
//!   "details": { "field": "serial" }
//! }
//! ```
//!
//! `details` is omitted when empty.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::LicenseError;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Request Errors (4xx) ===
    /// HTTP method not supported on this path
    InvalidMethod,
    /// Body is not valid JSON
    InvalidJson,
    /// Body is JSON but required fields are missing or mistyped
    MissingParameters,
    /// `action` is not a known adjustment action
    InvalidAction,
    /// `operation` is neither `add` nor `subtract`
    InvalidOperation,
    /// A field value is out of range or malformed
    InvalidField,
    /// Credentials missing or rejected
    Unauthorized,

    // === Domain Errors (5xx) ===
    /// A license kind has no table mapping
    UnknownLicenseKind,
    /// No temporal license matched the adjustment
    NotAdjustable,
    /// Store operation failed
    DatabaseError,
    /// Storefront failure
    RemoteError,
    /// Server configuration error
    ConfigError,
    /// Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidMethod => StatusCode::METHOD_NOT_ALLOWED,

            ErrorCode::InvalidJson
            | ErrorCode::MissingParameters
            | ErrorCode::InvalidAction
            | ErrorCode::InvalidOperation
            | ErrorCode::InvalidField => StatusCode::BAD_REQUEST,

            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::RemoteError => StatusCode::BAD_GATEWAY,

            ErrorCode::UnknownLicenseKind
            | ErrorCode::NotAdjustable
            | ErrorCode::DatabaseError
            | ErrorCode::ConfigError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMethod => "Method not allowed",
            ErrorCode::InvalidJson => "Request body is not valid JSON",
            ErrorCode::MissingParameters => "Required parameters are missing",
            ErrorCode::InvalidAction => "Unknown action",
            ErrorCode::InvalidOperation => "Operation must be 'add' or 'subtract'",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::Unauthorized => "Invalid credentials",
            ErrorCode::UnknownLicenseKind => "Unknown license type",
            ErrorCode::NotAdjustable => "License date cannot be adjusted",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::RemoteError => "Storefront request failed",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable error code
    pub error: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional context (field name, received payload, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            error: code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: code,
            message: message.into(),
            details: None,
        }
    }

    /// Creates a new API error with a custom message and details.
    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            error: code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }

    // === Convenience constructors ===

    pub fn method_not_allowed() -> Self {
        Self::new(ErrorCode::InvalidMethod)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized)
    }

    /// Missing required field error.
    pub fn missing_field(field: &str) -> Self {
        Self::with_details(
            ErrorCode::MissingParameters,
            format!("Required field '{}' is missing", field),
            json!({ "field": field }),
        )
    }

    /// Invalid field value error.
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_details(
            ErrorCode::InvalidField,
            format!("Invalid value for '{}': {}", field, reason),
            json!({ "field": field }),
        )
    }

    /// Classify a body parse failure.
    ///
    /// Syntax errors are `INVALID_JSON`. Well-formed JSON of the wrong shape
    /// is `MISSING_PARAMETERS`, echoing what was received.
    pub fn from_json_error(err: serde_json::Error, body: &[u8]) -> Self {
        match err.classify() {
            serde_json::error::Category::Data => Self::with_details(
                ErrorCode::MissingParameters,
                err.to_string(),
                json!({ "received_data": serde_json::from_slice::<Value>(body).unwrap_or(Value::Null) }),
            ),
            _ => Self::with_message(ErrorCode::InvalidJson, err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error.default_message(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        let code = match &err {
            LicenseError::InvalidRequest(_) => ErrorCode::InvalidField,
            LicenseError::UnknownLicenseKind(_) => ErrorCode::UnknownLicenseKind,
            LicenseError::RecordNotAdjustable(_) => ErrorCode::NotAdjustable,
            LicenseError::DatabaseError(_) => ErrorCode::DatabaseError,
            LicenseError::RemoteUnavailable(_) | LicenseError::RemoteRejected { .. } => {
                ErrorCode::RemoteError
            }
            LicenseError::ConfigError(_) => ErrorCode::ConfigError,
            LicenseError::Unauthorized => ErrorCode::Unauthorized,
        };
        ApiError::with_message(code, err.to_string())
    }
}

/// JSON body extractor with panel error codes.
///
/// The body is parsed whatever the `Content-Type`, the way the dashboard
/// posts it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::with_message(ErrorCode::InvalidJson, e.body_text()))?;

        serde_json::from_slice(&bytes)
            .map(ApiJson)
            .map_err(|e| ApiError::from_json_error(e, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(
            ErrorCode::InvalidMethod.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(ErrorCode::InvalidJson.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::InvalidAction.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::NotAdjustable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_is_flat() {
        let err = ApiError::missing_field("serial");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "MISSING_PARAMETERS");
        assert_eq!(json["details"]["field"], "serial");

        let bare = serde_json::to_value(ApiError::method_not_allowed()).unwrap();
        assert_eq!(bare["error"], "INVALID_METHOD");
        assert!(bare.get("details").is_none());
    }

    #[test]
    fn json_errors_are_classified() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Body {
            serials: Vec<String>,
        }

        let syntax = serde_json::from_slice::<Body>(b"{not json").unwrap_err();
        assert_eq!(
            ApiError::from_json_error(syntax, b"{not json").error,
            ErrorCode::InvalidJson
        );

        let raw = br#"{"other":1}"#;
        let shape = serde_json::from_slice::<Body>(raw).unwrap_err();
        let err = ApiError::from_json_error(shape, raw);
        assert_eq!(err.error, ErrorCode::MissingParameters);
        assert_eq!(err.details.unwrap()["received_data"]["other"], 1);
    }

    #[test]
    fn license_error_conversion() {
        let api: ApiError = LicenseError::UnknownLicenseKind("YEAR".to_string()).into();
        assert_eq!(api.error, ErrorCode::UnknownLicenseKind);
        assert!(api.message.contains("YEAR"));

        let api: ApiError = LicenseError::RecordNotAdjustable("inactive".to_string()).into();
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
