use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::json;
use uuid::Uuid;

use super::{clean_text, record_audit};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        CreateLocationRequest, Location, LocationFilter, LocationLevel, UpdateLocationRequest,
    },
    validation::Validate,
};

/// list_locations
///
/// [Public Route] Nodes of one level, optionally narrowed to a parent
/// (e.g. the districts of a state). Used to fill cascading pickers.
#[utoipa::path(
    get,
    path = "/locations/{level}",
    params(
        ("level" = String, Path, description = "states | districts | tehsils | villages"),
        LocationFilter
    ),
    responses((status = 200, description = "Locations", body = [Location]))
)]
pub async fn list_locations(
    State(state): State<AppState>,
    Path(level): Path<LocationLevel>,
    Query(filter): Query<LocationFilter>,
) -> AppResult<Json<Vec<Location>>> {
    Ok(Json(state.repo.list_locations(level, filter.parent_id).await?))
}

#[utoipa::path(
    get,
    path = "/locations/{level}/{id}",
    params(
        ("level" = String, Path, description = "states | districts | tehsils | villages"),
        ("id" = Uuid, Path, description = "Location ID")
    ),
    responses((status = 200, description = "Location", body = Location))
)]
pub async fn get_location(
    State(state): State<AppState>,
    Path((level, id)): Path<(LocationLevel, Uuid)>,
) -> AppResult<Json<Location>> {
    state
        .repo
        .get_location(level, id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("Location"))
}

/// create_location
///
/// [Admin Route] Every level below state needs an existing parent one level up.
/// Names are unique among siblings.
#[utoipa::path(
    post,
    path = "/admin/locations/{level}",
    params(("level" = String, Path, description = "states | districts | tehsils | villages")),
    request_body = CreateLocationRequest,
    responses(
        (status = 201, description = "Created", body = Location),
        (status = 409, description = "Name taken under this parent")
    )
)]
pub async fn create_location(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(level): Path<LocationLevel>,
    Json(payload): Json<CreateLocationRequest>,
) -> AppResult<(StatusCode, Json<Location>)> {
    payload.validate_for(level)?;
    if let (Some(parent_level), Some(parent_id)) = (level.parent(), payload.parent_id) {
        if state.repo.get_location(parent_level, parent_id).await?.is_none() {
            return Err(AppError::validation(
                "parent_id",
                format!("no such {}", parent_level.label().to_lowercase()),
            ));
        }
    }

    let location = state
        .repo
        .create_location(
            level,
            CreateLocationRequest {
                name: payload.name.trim().to_string(),
                code: clean_text(payload.code),
                parent_id: payload.parent_id,
            },
        )
        .await?;
    record_audit(
        &state,
        Some(admin.id),
        "location.created",
        level.table(),
        Some(location.id),
        json!({ "name": location.name, "parent_id": location.parent_id }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(location)))
}

#[utoipa::path(
    put,
    path = "/admin/locations/{level}/{id}",
    params(
        ("level" = String, Path, description = "states | districts | tehsils | villages"),
        ("id" = Uuid, Path, description = "Location ID")
    ),
    request_body = UpdateLocationRequest,
    responses((status = 200, description = "Updated", body = Location))
)]
pub async fn update_location(
    admin: AuthUser,
    State(state): State<AppState>,
    Path((level, id)): Path<(LocationLevel, Uuid)>,
    Json(mut payload): Json<UpdateLocationRequest>,
) -> AppResult<Json<Location>> {
    payload.validate()?;
    payload.name = payload.name.map(|n| n.trim().to_string());
    payload.code = payload.code.map(|c| c.trim().to_string());

    let location = state
        .repo
        .update_location(level, id, payload)
        .await?
        .ok_or(AppError::NotFound("Location"))?;
    record_audit(
        &state,
        Some(admin.id),
        "location.updated",
        level.table(),
        Some(id),
        json!({ "name": location.name }),
    )
    .await;
    Ok(Json(location))
}

/// [Admin Route] Refused with 409 while the node still has children.
#[utoipa::path(
    delete,
    path = "/admin/locations/{level}/{id}",
    params(
        ("level" = String, Path, description = "states | districts | tehsils | villages"),
        ("id" = Uuid, Path, description = "Location ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Has children or is referenced")
    )
)]
pub async fn delete_location(
    admin: AuthUser,
    State(state): State<AppState>,
    Path((level, id)): Path<(LocationLevel, Uuid)>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_location(level, id).await? {
        return Err(AppError::NotFound("Location"));
    }
    record_audit(&state, Some(admin.id), "location.deleted", level.table(), Some(id), json!({})).await;
    Ok(StatusCode::NO_CONTENT)
}
