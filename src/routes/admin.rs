use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Routes exclusively for the `admin` role, nested under `/admin`. The whole
/// router is wrapped in `admin_middleware`, which authenticates the caller and
/// rejects any other role with 403 before a handler runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Dashboard counters: users, groups by status, open requests, stock work.
        .route("/stats", get(handlers::admin::get_admin_stats))
        // --- Users ---
        .route("/users", get(handlers::admin::list_users))
        // Deactivation revokes every session of the user.
        .route("/users/{id}/active", put(handlers::admin::set_user_active))
        .route("/audit", get(handlers::admin::list_audit))
        // --- Relief group moderation ---
        .route("/groups", get(handlers::groups::admin_list_groups))
        .route("/groups/{id}", get(handlers::groups::admin_group_detail))
        .route("/groups/{id}/status", put(handlers::groups::set_group_status))
        .route(
            "/documents/{id}/download",
            get(handlers::groups::document_download_url),
        )
        // --- Catalogs: services, alert categories, alert statuses ---
        .route(
            "/catalog/{kind}",
            get(handlers::catalog::admin_list).post(handlers::catalog::create_entry),
        )
        .route(
            "/catalog/{kind}/{id}",
            put(handlers::catalog::update_entry).delete(handlers::catalog::delete_entry),
        )
        // --- Location hierarchy ---
        .route(
            "/locations/{level}",
            axum::routing::post(handlers::locations::create_location),
        )
        .route(
            "/locations/{level}/{id}",
            put(handlers::locations::update_location).delete(handlers::locations::delete_location),
        )
        // --- Inventory ---
        .route(
            "/inventory/item-types",
            axum::routing::post(handlers::inventory::create_item_type),
        )
        .route(
            "/inventory/item-types/{id}",
            put(handlers::inventory::update_item_type)
                .delete(handlers::inventory::delete_item_type),
        )
        .route("/resupply", get(handlers::inventory::admin_list_resupply))
        .route(
            "/resupply/{id}/status",
            put(handlers::inventory::decide_resupply),
        )
        // --- Service requests ---
        .route("/requests", get(handlers::requests::admin_list_requests))
        .route(
            "/requests/{id}/assign",
            put(handlers::requests::assign_request),
        )
        .route(
            "/requests/{id}/status",
            put(handlers::requests::set_request_status),
        )
        .route(
            "/requests/{id}/alert",
            put(handlers::requests::set_request_alert),
        )
}
