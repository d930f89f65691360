use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::auth::require_basic_auth;
use crate::server::cors::cors_middleware;
use crate::server::handlers::{
    adjust_dates_handler, create_local_handler, create_with_sync_handler, delete_handler,
    generate_handler, health_handler, list_bounded_handler, list_unbounded_handler,
    login_handler, method_not_allowed_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

/// Build the panel router.
///
/// # Routes
///
/// ## Data endpoints (Basic credentials when `auth.enabled`)
/// - `POST /addlicenses_sellauth.php` - Create licenses and push them to the storefront
/// - `POST /addlicenses_updated.php` - Create licenses locally
/// - `POST /generate_licenses.php` - Generate and create licenses
/// - `GET /getlicenses.php` - Most recent licenses of both tables
/// - `GET /getlicenses_unlimited.php` - Full export of the managed table
/// - `POST /delete_rows.php` - Delete managed licenses by serial
/// - `POST /update_license_date.php` - Move temporal expiry dates
///
/// ## Open endpoints
/// - `POST /login` - Check panel credentials
/// - `GET /health` - Service and database health
///
/// Other methods on these paths answer 405; `OPTIONS` anywhere answers 200.
pub fn build_router(state: AppState) -> Router {
    let data = Router::new()
        .route(
            "/addlicenses_sellauth.php",
            post(create_with_sync_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/addlicenses_updated.php",
            post(create_local_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/generate_licenses.php",
            post(generate_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/getlicenses.php",
            get(list_bounded_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/getlicenses_unlimited.php",
            get(list_unbounded_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/delete_rows.php",
            post(delete_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/update_license_date.php",
            post(adjust_dates_handler).fallback(method_not_allowed_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_basic_auth,
        ));

    let open = Router::new()
        .route(
            "/login",
            post(login_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/health",
            get(health_handler).fallback(method_not_allowed_handler),
        );

    data.merge(open)
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

/// [`build_router`] wrapped in the request logging middleware.
pub fn build_router_with_logging(state: AppState) -> Router {
    build_router(state).layer(middleware::from_fn(request_logging_middleware))
}
