use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes for any signed-in user. The `auth_middleware` layer above guarantees a
/// valid, unrevoked session; handlers add the role checks:
/// - `/me/group/**`, `/me/inventory/**`, `/me/resupply/**` require a provider
///   owning a relief group (and for stock and request work, an approved one);
/// - everything else is open to any role.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Session ---
        .route("/me", get(handlers::auth::me))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route(
            "/auth/change-password",
            post(handlers::auth::change_password),
        )
        // --- Citizen ---
        .route("/me/requests", get(handlers::requests::my_requests))
        .route(
            "/me/requests/{id}/cancel",
            post(handlers::requests::cancel_my_request),
        )
        // POST /inventory/{id}/donations
        // Any signed-in user can offer stock to an approved group's entry.
        .route(
            "/inventory/{id}/donations",
            post(handlers::inventory::offer_donation),
        )
        .route("/me/donations", get(handlers::inventory::my_donations))
        .route(
            "/me/donations/{id}/cancel",
            post(handlers::inventory::cancel_donation),
        )
        // --- Provider: own group ---
        .route(
            "/me/group",
            get(handlers::groups::my_group).put(handlers::groups::update_my_group),
        )
        // Presigned, direct-to-storage upload; the document is recorded afterwards.
        .route(
            "/me/group/documents/upload-url",
            post(handlers::groups::document_upload_url),
        )
        .route(
            "/me/group/documents",
            get(handlers::groups::my_documents).post(handlers::groups::record_document),
        )
        // --- Provider: inventory ---
        .route(
            "/me/inventory",
            get(handlers::inventory::my_inventory).post(handlers::inventory::create_entry),
        )
        .route(
            "/me/inventory/{id}",
            put(handlers::inventory::update_entry).delete(handlers::inventory::delete_entry),
        )
        .route(
            "/me/inventory/{id}/resupply",
            post(handlers::inventory::request_resupply),
        )
        .route("/me/resupply", get(handlers::inventory::my_resupply))
        .route(
            "/me/resupply/{id}/cancel",
            post(handlers::inventory::cancel_resupply),
        )
        .route(
            "/me/group/donations",
            get(handlers::inventory::group_donations),
        )
        .route(
            "/me/group/donations/{id}/status",
            put(handlers::inventory::decide_donation),
        )
        // --- Provider: service requests ---
        .route(
            "/me/group/requests",
            get(handlers::requests::provider_requests),
        )
        .route(
            "/me/group/requests/{id}/accept",
            post(handlers::requests::accept_request),
        )
        .route(
            "/me/group/requests/{id}/status",
            put(handlers::requests::update_progress),
        )
}
