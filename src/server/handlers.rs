use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{GeneratorConfig, ListingConfig, PanelConfig};
use crate::errors::LicenseResult;
use crate::generator::{generate_batch, LicenseDraft};
use crate::inventory::{InventorySync, SyncOutcome};
use crate::lifecycle::{initial_expiry, timestamp, DateOperation, LicenseKind, LicenseTable};
use crate::server::api_error::{ApiError, ApiJson, ErrorCode};
use crate::server::auth::AuthState;
use crate::server::database::{Adjustment, Database, DeletedLicense, LicenseRecord, NewLicense};
use crate::server::logging::{log_license_event, HealthResponse, LicenseEvent};
use crate::server::validation::{
    validate_batch_size, validate_days, validate_not_empty, validate_serial,
};

/// Result type returned by every handler.
pub type ApiResult<T> = Result<T, ApiError>;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub inventory: Arc<InventorySync>,
    pub auth: AuthState,
    pub listing: ListingConfig,
    pub generator: GeneratorConfig,
}

impl AppState {
    /// State with storefront sync and auth disabled and default limits.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            inventory: Arc::new(InventorySync::disabled()),
            auth: AuthState::disabled(),
            listing: ListingConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }

    /// State wired from the loaded configuration.
    pub fn from_config(db: Arc<Database>, config: &PanelConfig) -> LicenseResult<Self> {
        Ok(Self {
            db,
            inventory: Arc::new(InventorySync::from_config(&config.sellauth)?),
            auth: AuthState::from_config(&config.auth)?,
            listing: config.listing.clone(),
            generator: config.generator.clone(),
        })
    }

    pub fn with_inventory(mut self, inventory: InventorySync) -> Self {
        self.inventory = Arc::new(inventory);
        self
    }

    pub fn with_auth(mut self, auth: AuthState) -> Self {
        self.auth = auth;
        self
    }
}

/// A JSON scalar that may arrive as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    fn into_text(self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

// ============================================================================
// Create
// ============================================================================

/// One inserted license, echoed back to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct InsertedLicense {
    pub serial: String,
    pub license: String,
    pub cupon: Option<String>,
    #[serde(rename = "licenseType")]
    pub license_type: LicenseKind,
    pub table: LicenseTable,
    #[serde(serialize_with = "timestamp::serialize")]
    pub licensedate: NaiveDateTime,
}

/// Response of the create endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CreateResponse {
    pub success: bool,
    pub message: String,
    pub inserted_licenses: Vec<InsertedLicense>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sellauth_responses: Option<BTreeMap<LicenseKind, SyncOutcome>>,
}

/// Resolve, insert and (optionally) push a batch of drafts.
///
/// Every kind is resolved before the store is touched. Storefront pushes run
/// after the insert commits and never fail the call.
async fn create_licenses(
    state: &AppState,
    drafts: Vec<LicenseDraft>,
    sync: bool,
) -> ApiResult<CreateResponse> {
    if drafts.is_empty() {
        return Err(ApiError::with_details(
            ErrorCode::MissingParameters,
            "No licenses provided",
            json!({ "received_data": [] }),
        ));
    }

    let created_at = Utc::now().naive_utc().trunc_subsecs(0);
    let mut batch = Vec::with_capacity(drafts.len());
    let mut kinds = Vec::with_capacity(drafts.len());

    for draft in drafts {
        if draft.serial.trim().is_empty() {
            return Err(ApiError::missing_field("serial"));
        }
        if draft.license.trim().is_empty() {
            return Err(ApiError::missing_field("license"));
        }
        validate_serial(&draft.serial, "serial")?;

        let label = draft.license_type.as_deref().unwrap_or(&draft.license);
        let kind: LicenseKind = label.parse()?;

        batch.push(NewLicense {
            serial: draft.serial,
            license: draft.license,
            cupon: draft.cupon.filter(|c| !c.is_empty()),
            licensedate: initial_expiry(kind),
            created_at,
            table: kind.table(),
        });
        kinds.push(kind);
    }

    let records = state.db.insert_licenses(batch).await?;
    for record in &records {
        log_license_event(
            LicenseEvent::Created,
            &record.serial,
            Some(record.source_table.as_str()),
        );
    }

    let sellauth_responses = if sync {
        Some(push_by_kind(state, &records, &kinds).await)
    } else {
        None
    };

    let inserted_licenses: Vec<InsertedLicense> = records
        .into_iter()
        .zip(kinds)
        .map(|(record, kind)| InsertedLicense {
            serial: record.serial,
            license: record.license,
            cupon: record.cupon,
            license_type: kind,
            table: record.source_table,
            licensedate: record.licensedate,
        })
        .collect();

    info!("Created {} license(s)", inserted_licenses.len());

    Ok(CreateResponse {
        success: true,
        message: "Licenses created successfully".to_string(),
        count: inserted_licenses.len(),
        inserted_licenses,
        sellauth_responses,
    })
}

/// One storefront push per kind; each outcome is reported independently.
async fn push_by_kind(
    state: &AppState,
    records: &[LicenseRecord],
    kinds: &[LicenseKind],
) -> BTreeMap<LicenseKind, SyncOutcome> {
    let mut grouped: BTreeMap<LicenseKind, Vec<String>> = BTreeMap::new();
    for (record, kind) in records.iter().zip(kinds) {
        grouped.entry(*kind).or_default().push(record.serial.clone());
    }

    let mut outcomes = BTreeMap::new();
    for (kind, serials) in grouped {
        let result = state.inventory.push_kind(kind, &serials).await;
        match &result {
            Ok(report) => log_license_event(
                LicenseEvent::Synced,
                kind.as_str(),
                Some(&format!("{} serial(s), {} remote", report.pushed, report.remote_total)),
            ),
            Err(e) => log_license_event(LicenseEvent::SyncFailed, kind.as_str(), Some(&e.to_string())),
        }
        outcomes.insert(kind, SyncOutcome::from(result));
    }
    outcomes
}

/// `POST /addlicenses_sellauth.php`: create, then push each kind to the storefront.
pub async fn create_with_sync_handler(
    State(state): State<AppState>,
    ApiJson(drafts): ApiJson<Vec<LicenseDraft>>,
) -> ApiResult<Json<CreateResponse>> {
    info!("Creating {} license(s) with storefront sync", drafts.len());
    create_licenses(&state, drafts, true).await.map(Json)
}

/// `POST /addlicenses_updated.php`: create locally only.
pub async fn create_local_handler(
    State(state): State<AppState>,
    ApiJson(drafts): ApiJson<Vec<LicenseDraft>>,
) -> ApiResult<Json<CreateResponse>> {
    info!("Creating {} license(s)", drafts.len());
    create_licenses(&state, drafts, false).await.map(Json)
}

fn default_true() -> bool {
    true
}

/// Request body for server-side generation.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "licenseType")]
    pub license_type: String,
    #[serde(rename = "numLicenses")]
    pub num_licenses: Scalar,
    #[serde(default = "default_true")]
    pub sync: bool,
}

/// `POST /generate_licenses.php`: generate serials and coupons, then create them.
pub async fn generate_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> ApiResult<Json<CreateResponse>> {
    let kind: LicenseKind = req.license_type.parse()?;
    let requested = req
        .num_licenses
        .as_i64()
        .ok_or_else(|| ApiError::invalid_field("numLicenses", "must be an integer"))?;
    let count = validate_batch_size(requested, state.generator.max_batch, "numLicenses")?;

    info!("Generating {} {} license(s)", count, kind);
    let drafts = generate_batch(kind, count, &state.generator);
    create_licenses(&state, drafts, req.sync).await.map(Json)
}

// ============================================================================
// List
// ============================================================================

/// `GET /getlicenses.php`: most recent licenses of both tables.
pub async fn list_bounded_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LicenseRecord>>> {
    let records = state.db.list_bounded(state.listing.bounded_limit).await?;
    info!("Listed {} license(s)", records.len());
    Ok(Json(records))
}

/// `GET /getlicenses_unlimited.php`: every labelled license of the managed table.
pub async fn list_unbounded_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<LicenseRecord>>> {
    let records = state
        .db
        .list_unbounded(state.listing.page_size, state.listing.max_pages)
        .await?;
    info!("Exported {} license(s) from {}", records.len(), LicenseTable::MANAGED);
    Ok(Json(records))
}

// ============================================================================
// Delete
// ============================================================================

/// Request body for deletion. `ids` are matched as serials.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub serials: Option<Vec<Scalar>>,
    #[serde(default)]
    pub ids: Option<Vec<Scalar>>,
}

#[derive(Debug, Serialize)]
pub struct DeleteData {
    pub deleted_count: u64,
    pub deleted_licenses: Vec<DeletedLicense>,
    pub requested_serials: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DeleteResponse {
    Deleted {
        success: bool,
        message: String,
        data: DeleteData,
    },
    NotFound {
        success: bool,
        message: String,
        attempted_serials: Vec<String>,
    },
}

/// `POST /delete_rows.php`: delete managed licenses by serial.
pub async fn delete_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DeleteRequest>,
) -> ApiResult<Json<DeleteResponse>> {
    let serials: Vec<String> = req
        .serials
        .or(req.ids)
        .unwrap_or_default()
        .into_iter()
        .map(Scalar::into_text)
        .filter(|s| !s.trim().is_empty())
        .collect();

    if serials.is_empty() {
        return Err(ApiError::with_message(
            ErrorCode::MissingParameters,
            "Array of serials is required",
        ));
    }

    let outcome = state.db.delete_by_serials(&serials).await?;

    if outcome.deleted.is_empty() {
        warn!("Delete matched none of {} serial(s)", serials.len());
        return Ok(Json(DeleteResponse::NotFound {
            success: false,
            message: "No licenses found with the provided serials".to_string(),
            attempted_serials: serials,
        }));
    }

    for row in &outcome.deleted {
        log_license_event(LicenseEvent::Deleted, &row.serial, None);
    }

    Ok(Json(DeleteResponse::Deleted {
        success: true,
        message: "Licenses deleted successfully".to_string(),
        data: DeleteData {
            deleted_count: outcome.deleted_count,
            deleted_licenses: outcome.deleted,
            requested_serials: serials,
        },
    }))
}

// ============================================================================
// Adjust dates
// ============================================================================

/// Request body for `update_license_date.php`.
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub days: Option<Scalar>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default, rename = "licenseIds")]
    pub license_ids: Option<Vec<Scalar>>,
}

#[derive(Debug, Serialize)]
pub struct SerialAdjustData {
    pub serial: String,
    #[serde(serialize_with = "timestamp::serialize")]
    pub old_date: NaiveDateTime,
    #[serde(serialize_with = "timestamp::serialize")]
    pub new_date: NaiveDateTime,
    pub operation: DateOperation,
    pub days: u32,
    pub table: LicenseTable,
}

#[derive(Debug, Serialize)]
pub struct IdsAdjustData {
    pub updated_licenses: Vec<Adjustment>,
    pub skipped_ids: Vec<i64>,
    pub operation: DateOperation,
    pub days: u32,
    pub total_updated: usize,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AdjustData {
    Serial(SerialAdjustData),
    Ids(IdsAdjustData),
}

#[derive(Debug, Serialize)]
pub struct AdjustResponse {
    pub success: bool,
    pub message: String,
    pub data: AdjustData,
}

/// `POST /update_license_date.php`: move temporal expiries by whole days.
///
/// `update_by_serial` fails when the serial has no temporal match;
/// `update_by_ids` skips such ids and reports them in `skipped_ids`.
pub async fn adjust_dates_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AdjustRequest>,
) -> ApiResult<Json<AdjustResponse>> {
    let by_serial = match req.action.as_str() {
        "update_by_serial" => true,
        "update_by_ids" => false,
        _ => {
            return Err(ApiError::with_message(
                ErrorCode::InvalidAction,
                "Action must be 'update_by_serial' or 'update_by_ids'",
            ))
        }
    };

    let op: DateOperation = req
        .operation
        .as_deref()
        .unwrap_or("add")
        .parse()
        .map_err(|_| ApiError::new(ErrorCode::InvalidOperation))?;

    let days = match &req.days {
        None => 1,
        Some(value) => {
            let raw = value
                .as_i64()
                .ok_or_else(|| ApiError::invalid_field("days", "must be an integer"))?;
            validate_days(raw, "days")?
        }
    };

    if by_serial {
        let serial = req
            .serial
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::missing_field("serial"))?;

        let adjustment = state.db.adjust_by_serial(&serial, op, days).await?;
        log_license_event(
            LicenseEvent::ExpiryAdjusted,
            &adjustment.serial,
            Some(&format!("{} {} day(s)", op.as_str(), days)),
        );

        return Ok(Json(AdjustResponse {
            success: true,
            message: "License date updated successfully".to_string(),
            data: AdjustData::Serial(SerialAdjustData {
                serial: adjustment.serial,
                old_date: adjustment.old_date,
                new_date: adjustment.new_date,
                operation: op,
                days,
                table: adjustment.table,
            }),
        }));
    }

    let raw_ids = req
        .license_ids
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| ApiError::missing_field("licenseIds"))?;
    let ids = raw_ids
        .iter()
        .map(|id| {
            id.as_i64()
                .ok_or_else(|| ApiError::invalid_field("licenseIds", "ids must be integers"))
        })
        .collect::<ApiResult<Vec<i64>>>()?;

    let outcome = state.db.adjust_by_ids(&ids, op, days).await?;
    for adjustment in &outcome.updated {
        log_license_event(
            LicenseEvent::ExpiryAdjusted,
            &adjustment.serial,
            Some(&format!("{} {} day(s)", op.as_str(), days)),
        );
    }
    for id in &outcome.skipped {
        log_license_event(
            LicenseEvent::AdjustmentSkipped,
            &id.to_string(),
            Some("no temporal license with this id"),
        );
    }

    Ok(Json(AdjustResponse {
        success: true,
        message: "License dates updated successfully".to_string(),
        data: AdjustData::Ids(IdsAdjustData {
            total_updated: outcome.updated.len(),
            updated_licenses: outcome.updated,
            skipped_ids: outcome.skipped,
            operation: op,
            days,
        }),
    }))
}

// ============================================================================
// Login, health, fallback
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
}

/// `POST /login`: check the panel credentials.
///
/// Always succeeds when auth is disabled.
pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    validate_not_empty(&req.username, "username")?;

    if !state.auth.enabled || state.auth.check(&req.username, &req.password) {
        info!("Login accepted for '{}'", req.username);
        Ok(Json(LoginResponse { success: true }))
    } else {
        warn!("Login rejected for '{}'", req.username);
        Err(ApiError::unauthorized())
    }
}

/// `GET /health`: service status and per-table row counts.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let tables = match state.db.table_counts().await {
        Ok(counts) => Some(counts),
        Err(e) => {
            warn!("Health probe failed: {}", e);
            None
        }
    };
    Json(HealthResponse::from_probe(state.db.db_type(), tables))
}

/// Fallback for unsupported methods on known paths.
pub async fn method_not_allowed_handler() -> ApiError {
    ApiError::with_message(ErrorCode::InvalidMethod, "Method not allowed on this path")
}
