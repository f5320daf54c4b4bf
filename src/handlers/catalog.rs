use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::json;
use uuid::Uuid;

use super::{clean_text, record_audit};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{CatalogEntry, CatalogKind, CatalogPayload, UpdateCatalogPayload},
    validation::Validate,
};

/// [Public Route] Active entries of one catalog, by name.
#[utoipa::path(
    get,
    path = "/catalog/{kind}",
    params(("kind" = String, Path, description = "services | alert-categories | alert-statuses")),
    responses((status = 200, description = "Active entries", body = [CatalogEntry]))
)]
pub async fn list_active(
    State(state): State<AppState>,
    Path(kind): Path<CatalogKind>,
) -> AppResult<Json<Vec<CatalogEntry>>> {
    Ok(Json(state.repo.list_catalog(kind, false).await?))
}

/// [Admin Route] Every entry, including deactivated ones.
#[utoipa::path(
    get,
    path = "/admin/catalog/{kind}",
    params(("kind" = String, Path, description = "services | alert-categories | alert-statuses")),
    responses((status = 200, description = "All entries", body = [CatalogEntry]))
)]
pub async fn admin_list(
    State(state): State<AppState>,
    Path(kind): Path<CatalogKind>,
) -> AppResult<Json<Vec<CatalogEntry>>> {
    Ok(Json(state.repo.list_catalog(kind, true).await?))
}

/// create_entry
///
/// [Admin Route] Names are unique per catalog regardless of case.
#[utoipa::path(
    post,
    path = "/admin/catalog/{kind}",
    params(("kind" = String, Path, description = "services | alert-categories | alert-statuses")),
    request_body = CatalogPayload,
    responses(
        (status = 201, description = "Created", body = CatalogEntry),
        (status = 409, description = "Name taken")
    )
)]
pub async fn create_entry(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(kind): Path<CatalogKind>,
    Json(payload): Json<CatalogPayload>,
) -> AppResult<(StatusCode, Json<CatalogEntry>)> {
    payload.validate()?;
    let entry = state
        .repo
        .create_catalog_entry(
            kind,
            CatalogPayload {
                name: payload.name.trim().to_string(),
                description: clean_text(payload.description),
                is_active: payload.is_active,
            },
        )
        .await?;
    record_audit(
        &state,
        Some(admin.id),
        "catalog.created",
        kind.table(),
        Some(entry.id),
        json!({ "name": entry.name }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    put,
    path = "/admin/catalog/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "services | alert-categories | alert-statuses"),
        ("id" = Uuid, Path, description = "Entry ID")
    ),
    request_body = UpdateCatalogPayload,
    responses((status = 200, description = "Updated", body = CatalogEntry))
)]
pub async fn update_entry(
    admin: AuthUser,
    State(state): State<AppState>,
    Path((kind, id)): Path<(CatalogKind, Uuid)>,
    Json(mut payload): Json<UpdateCatalogPayload>,
) -> AppResult<Json<CatalogEntry>> {
    payload.validate()?;
    payload.name = payload.name.map(|n| n.trim().to_string());

    let entry = state
        .repo
        .update_catalog_entry(kind, id, payload)
        .await?
        .ok_or(AppError::NotFound("Catalog entry"))?;
    record_audit(
        &state,
        Some(admin.id),
        "catalog.updated",
        kind.table(),
        Some(id),
        json!({ "name": entry.name, "is_active": entry.is_active }),
    )
    .await;
    Ok(Json(entry))
}

/// [Admin Route] Entries still referenced by groups or requests answer 409;
/// deactivate those instead.
#[utoipa::path(
    delete,
    path = "/admin/catalog/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "services | alert-categories | alert-statuses"),
        ("id" = Uuid, Path, description = "Entry ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Still referenced")
    )
)]
pub async fn delete_entry(
    admin: AuthUser,
    State(state): State<AppState>,
    Path((kind, id)): Path<(CatalogKind, Uuid)>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_catalog_entry(kind, id).await? {
        return Err(AppError::NotFound("Catalog entry"));
    }
    record_audit(&state, Some(admin.id), "catalog.deleted", kind.table(), Some(id), json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}
