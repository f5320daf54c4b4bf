use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints open to anonymous callers. Directory reads only ever expose approved
/// groups and active catalog entries; that filtering happens in the handlers and
/// repository, not in the client.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // --- Accounts ---
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        // Always 202, whether or not the phone is registered.
        .route("/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        // --- Phone verification ---
        // Rate limited per phone number and purpose.
        .route("/otp/send", post(handlers::otp::send_otp))
        .route("/otp/verify", post(handlers::otp::verify_otp))
        // --- Relief groups ---
        .route("/groups/register", post(handlers::groups::register_group))
        .route("/groups", get(handlers::groups::list_groups))
        .route("/groups/{id}", get(handlers::groups::get_group))
        // --- Directory data ---
        .route("/catalog/{kind}", get(handlers::catalog::list_active))
        .route("/locations/{level}", get(handlers::locations::list_locations))
        .route("/locations/{level}/{id}", get(handlers::locations::get_location))
        .route("/inventory", get(handlers::inventory::search_inventory))
        .route(
            "/inventory/item-types",
            get(handlers::inventory::list_item_types),
        )
        // --- Service requests ---
        // POST /requests accepts anonymous callers; a bearer token, when sent,
        // links the request to the account.
        .route("/requests", post(handlers::requests::submit_request))
        .route(
            "/requests/track/{number}",
            get(handlers::requests::track_request),
        )
}
