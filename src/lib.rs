use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod otp;
pub mod repository;
pub mod sms;
pub mod storage;
pub mod validation;
pub mod workflow;

// Routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use error::AppError;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use sms::{HttpSmsClient, MockSmsService, SmsState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and the schemas they use. Served as
/// JSON at `/api-docs/openapi.json` and browsable through Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register, handlers::auth::login, handlers::auth::refresh,
        handlers::auth::logout, handlers::auth::logout_all, handlers::auth::me,
        handlers::auth::change_password, handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::otp::send_otp, handlers::otp::verify_otp,
        handlers::groups::register_group, handlers::groups::list_groups,
        handlers::groups::get_group, handlers::groups::my_group,
        handlers::groups::update_my_group, handlers::groups::document_upload_url,
        handlers::groups::record_document, handlers::groups::my_documents,
        handlers::groups::admin_list_groups, handlers::groups::admin_group_detail,
        handlers::groups::set_group_status, handlers::groups::document_download_url,
        handlers::catalog::list_active, handlers::catalog::admin_list,
        handlers::catalog::create_entry, handlers::catalog::update_entry,
        handlers::catalog::delete_entry,
        handlers::locations::list_locations, handlers::locations::get_location,
        handlers::locations::create_location, handlers::locations::update_location,
        handlers::locations::delete_location,
        handlers::inventory::list_item_types, handlers::inventory::create_item_type,
        handlers::inventory::update_item_type, handlers::inventory::delete_item_type,
        handlers::inventory::search_inventory, handlers::inventory::my_inventory,
        handlers::inventory::create_entry, handlers::inventory::update_entry,
        handlers::inventory::delete_entry, handlers::inventory::request_resupply,
        handlers::inventory::my_resupply, handlers::inventory::cancel_resupply,
        handlers::inventory::admin_list_resupply, handlers::inventory::decide_resupply,
        handlers::inventory::offer_donation, handlers::inventory::my_donations,
        handlers::inventory::cancel_donation, handlers::inventory::group_donations,
        handlers::inventory::decide_donation,
        handlers::requests::submit_request, handlers::requests::track_request,
        handlers::requests::my_requests, handlers::requests::cancel_my_request,
        handlers::requests::provider_requests, handlers::requests::accept_request,
        handlers::requests::update_progress, handlers::requests::admin_list_requests,
        handlers::requests::assign_request, handlers::requests::set_request_status,
        handlers::requests::set_request_alert,
        handlers::admin::get_admin_stats, handlers::admin::list_users,
        handlers::admin::set_user_active, handlers::admin::list_audit
    ),
    components(
        schemas(
            models::UserRole, models::GroupKind, models::GroupStatus, models::DocumentKind,
            models::OtpPurpose, models::CatalogKind, models::LocationLevel,
            models::Availability, models::ItemCondition, models::ResupplyStatus,
            models::DonationStatus, models::RequestStatus, models::Urgency,
        )
    ),
    tags(
        (name = "relief-portal", description = "Disaster relief coordination API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of every service a handler may need. Cloning
/// is cheap: each field is an `Arc` or small config value.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory for local runs and tests.
    pub repo: RepositoryState,
    /// Object storage for group documents (S3/MinIO or mock).
    pub storage: StorageState,
    /// Outbound SMS for OTP codes and password resets.
    pub sms: SmsState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Lets extractors (notably `AuthUser`) pull single components out of AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for SmsState {
    fn from_ref(app_state: &AppState) -> SmsState {
        app_state.sms.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards `authenticated_routes`. Extracting `AuthUser` runs the full token,
/// session and account check; any failure rejects with 401 before the handler.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Guards everything under `/admin`: 401 without valid credentials, 403 for
/// any role other than admin.
async fn admin_middleware(
    auth_user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(e) = auth_user.require_admin() {
        tracing::warn!(user_id = %auth_user.id, "non-admin attempted an admin route");
        return Err(e);
    }
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the routing tree, applies the scoped auth layers and the global
/// observability stack, and attaches the shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Every request gets an id, which the trace span records and the
                // response echoes back.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying method, uri and the request id, so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
