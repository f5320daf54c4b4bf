use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::json;
use uuid::Uuid;

use super::record_audit;
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{AdminDashboardStats, AuditFilter, AuditLog, UserActiveUpdate, UserFilter, UserProfile},
};

/// get_admin_stats
///
/// [Admin Route] Headline counters for the moderation dashboard.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = AdminDashboardStats))
)]
pub async fn get_admin_stats(State(state): State<AppState>) -> AppResult<Json<AdminDashboardStats>> {
    Ok(Json(state.repo.get_stats().await?))
}

#[utoipa::path(
    get,
    path = "/admin/users",
    params(UserFilter),
    responses((status = 200, description = "Users", body = [UserProfile]))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let users = state.repo.list_users(filter.role).await?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

/// set_user_active
///
/// [Admin Route] Activates or deactivates an account. Deactivation revokes every
/// session at once, so outstanding access tokens stop working immediately.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/active",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UserActiveUpdate,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Admins cannot deactivate themselves")
    )
)]
pub async fn set_user_active(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserActiveUpdate>,
) -> AppResult<Json<UserProfile>> {
    if id == admin.id && !payload.is_active {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    let user = state
        .repo
        .set_user_active(id, payload.is_active)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let mut revoked = 0;
    if !payload.is_active {
        revoked = state.repo.revoke_user_sessions(id, None).await?;
        tracing::info!(user_id = %id, revoked, "account deactivated");
    }
    record_audit(
        &state,
        Some(admin.id),
        if payload.is_active { "user.activated" } else { "user.deactivated" },
        "user",
        Some(id),
        json!({ "revoked_sessions": revoked }),
    )
    .await;
    Ok(Json(UserProfile::from(&user)))
}

#[utoipa::path(
    get,
    path = "/admin/audit",
    params(AuditFilter),
    responses((status = 200, description = "Newest audit entries first", body = [AuditLog]))
)]
pub async fn list_audit(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
) -> AppResult<Json<Vec<AuditLog>>> {
    Ok(Json(state.repo.list_audit(&filter).await?))
}
