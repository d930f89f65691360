//! Storefront sync against a local stand-in for the SellAuth API.

#![cfg(all(feature = "server", feature = "sqlite"))]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tower::ServiceExt;

use serialdesk::config::SellAuthConfig;
use serialdesk::inventory::{InventoryError, InventorySync};
use serialdesk::lifecycle::LicenseKind;
use serialdesk::server::{build_router, AppState, Database};

/// In-memory shop: deliverables per variant id plus scripted failures.
#[derive(Default)]
struct MockShop {
    deliverables: HashMap<String, Vec<String>>,
    fetch_status: Option<StatusCode>,
    put_status: Option<StatusCode>,
    puts: usize,
    last_auth: Option<String>,
}

type Shared = Arc<Mutex<MockShop>>;

async fn fetch_deliverables(
    State(shop): State<Shared>,
    Path((_shop_id, _product, variant)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut shop = shop.lock().unwrap();
    shop.last_auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(status) = shop.fetch_status {
        return (status, "storefront says no").into_response();
    }
    let list = shop.deliverables.get(&variant).cloned().unwrap_or_default();
    Json(json!(list)).into_response()
}

async fn overwrite_deliverables(
    State(shop): State<Shared>,
    Path((_shop_id, _product, variant)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let mut shop = shop.lock().unwrap();
    if let Some(status) = shop.put_status {
        return (status, "forbidden").into_response();
    }
    shop.puts += 1;

    let list: Vec<String> = body["deliverables"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let total = list.len();
    shop.deliverables.insert(variant, list);

    Json(json!({ "success": true, "count": total })).into_response()
}

/// Start the mock storefront and return its base URL.
async fn spawn_mock_shop(shop: Shared) -> String {
    let app = Router::new()
        .route(
            "/shops/:shop_id/products/:product/deliverables/:variant",
            get(fetch_deliverables),
        )
        .route(
            "/shops/:shop_id/products/:product/deliverables/overwrite/:variant",
            put(overwrite_deliverables),
        )
        .with_state(shop);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn sellauth_config(base_url: String) -> SellAuthConfig {
    SellAuthConfig {
        enabled: true,
        base_url,
        shop_id: "shop1".to_string(),
        api_token: "test-token".to_string(),
        timeout_secs: 5,
        ..SellAuthConfig::default()
    }
}

fn serials(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn push_appends_without_removing_remote_entries() {
    let shop = Shared::default();
    shop.lock()
        .unwrap()
        .deliverables
        .insert("263237".to_string(), serials(&["OLD1", "DUP"]));
    let base = spawn_mock_shop(shop.clone()).await;

    let sync = InventorySync::from_config(&sellauth_config(base)).unwrap();
    let report = sync
        .push_kind(LicenseKind::Week, &serials(&["DUP", "NEW1"]))
        .await
        .unwrap();

    assert_eq!(report.product_id, "211190");
    assert_eq!(report.variant_id, "263237");
    assert_eq!(report.pushed, 2);
    assert_eq!(report.remote_total, 4);
    assert_eq!(report.response["success"], true);

    let shop = shop.lock().unwrap();
    assert_eq!(
        shop.deliverables["263237"],
        serials(&["OLD1", "DUP", "DUP", "NEW1"])
    );
    assert_eq!(shop.last_auth.as_deref(), Some("Bearer test-token"));
}

#[tokio::test]
async fn push_can_deduplicate() {
    let shop = Shared::default();
    shop.lock()
        .unwrap()
        .deliverables
        .insert("441430".to_string(), serials(&["P1"]));
    let base = spawn_mock_shop(shop.clone()).await;

    let mut config = sellauth_config(base);
    config.deduplicate = true;
    let sync = InventorySync::from_config(&config).unwrap();

    let report = sync
        .push_kind(LicenseKind::LifetimePro, &serials(&["P1", "P2"]))
        .await
        .unwrap();

    assert_eq!(report.remote_total, 2);
    assert_eq!(shop.lock().unwrap().deliverables["441430"], serials(&["P1", "P2"]));
}

#[tokio::test]
async fn failed_fetch_writes_nothing() {
    let shop = Shared::default();
    {
        let mut guard = shop.lock().unwrap();
        guard
            .deliverables
            .insert("251890".to_string(), serials(&["KEEP"]));
        guard.fetch_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let base = spawn_mock_shop(shop.clone()).await;

    let sync = InventorySync::from_config(&sellauth_config(base)).unwrap();
    let err = sync
        .push_kind(LicenseKind::Month, &serials(&["NEW"]))
        .await
        .unwrap_err();

    assert!(matches!(err, InventoryError::Unavailable(_)));
    assert!(err.is_retryable());

    let shop = shop.lock().unwrap();
    assert_eq!(shop.puts, 0);
    assert_eq!(shop.deliverables["251890"], serials(&["KEEP"]));
}

#[tokio::test]
async fn client_errors_are_rejections() {
    let shop = Shared::default();
    shop.lock().unwrap().fetch_status = Some(StatusCode::NOT_FOUND);
    let base = spawn_mock_shop(shop.clone()).await;

    let sync = InventorySync::from_config(&sellauth_config(base)).unwrap();
    let err = sync
        .push_kind(LicenseKind::Lifetime, &serials(&["X"]))
        .await
        .unwrap_err();

    assert!(matches!(err, InventoryError::Rejected { status: 404, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rejected_overwrite_is_reported() {
    let shop = Shared::default();
    shop.lock().unwrap().put_status = Some(StatusCode::FORBIDDEN);
    let base = spawn_mock_shop(shop.clone()).await;

    let sync = InventorySync::from_config(&sellauth_config(base)).unwrap();
    let err = sync
        .push_kind(LicenseKind::Week, &serials(&["W"]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        InventoryError::Rejected {
            status: 403,
            body: "forbidden".to_string()
        }
    );
}

#[tokio::test]
async fn unconfigured_variant_is_not_pushed() {
    let shop = Shared::default();
    let base = spawn_mock_shop(shop.clone()).await;

    let mut config = sellauth_config(base);
    config.variants.remove("week");
    let sync = InventorySync::from_config(&config).unwrap();

    let err = sync
        .push_kind(LicenseKind::Week, &serials(&["W"]))
        .await
        .unwrap_err();
    assert_eq!(err, InventoryError::VariantNotConfigured(LicenseKind::Week));
    assert!(shop.lock().unwrap().last_auth.is_none());
}

// ============================================================================
// Through the create endpoint
// ============================================================================

async fn app_with_shop(shop: Shared) -> (Router, Arc<Database>) {
    let base = spawn_mock_shop(shop).await;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = Arc::new(Database::SQLite(pool));
    db.ensure_schema().await.unwrap();

    let sync = InventorySync::from_config(&sellauth_config(base)).unwrap();
    let app = build_router(AppState::new(db.clone()).with_inventory(sync));
    (app, db)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(json!({})))
}

#[tokio::test]
async fn create_pushes_each_kind_to_its_variant() {
    let shop = Shared::default();
    let (app, _db) = app_with_shop(shop.clone()).await;

    let (status, body) = post_json(
        &app,
        "/addlicenses_sellauth.php",
        json!([
            { "serial": "W1", "license": "WEEK" },
            { "serial": "W2", "license": "WEEK" },
            { "serial": "P1", "license": "LIFETIME_PRO" }
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sellauth_responses"]["WEEK"]["pushed"], 2);
    assert_eq!(body["sellauth_responses"]["LIFETIME_PRO"]["variant_id"], "441430");

    let shop = shop.lock().unwrap();
    assert_eq!(shop.puts, 2);
    assert_eq!(shop.deliverables["263237"], serials(&["W1", "W2"]));
    assert_eq!(shop.deliverables["441430"], serials(&["P1"]));
}

#[tokio::test]
async fn local_insert_survives_storefront_outage() {
    let shop = Shared::default();
    shop.lock().unwrap().fetch_status = Some(StatusCode::SERVICE_UNAVAILABLE);
    let (app, db) = app_with_shop(shop.clone()).await;

    let (status, body) = post_json(
        &app,
        "/addlicenses_sellauth.php",
        json!([{ "serial": "KEEPME", "license": "MONTH" }]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);
    assert_eq!(body["sellauth_responses"]["MONTH"]["kind"], "remote_unavailable");
    assert_eq!(body["sellauth_responses"]["MONTH"]["retryable"], true);

    assert_eq!(db.table_counts().await.unwrap().apipremium, 1);
    assert_eq!(shop.lock().unwrap().puts, 0);
}
