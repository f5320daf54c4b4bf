//! HTTP handlers, grouped by area. Each handler validates its payload, checks the
//! caller's role and ownership, then delegates to the repository.

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod groups;
pub mod inventory;
pub mod locations;
pub mod otp;
pub mod requests;

use axum::http::{HeaderMap, header};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    models::{GroupStatus, NewAuditLog, ReliefGroup},
};

/// record_audit
///
/// Appends an audit row. A failed write is logged and swallowed: losing an audit
/// line must never undo or fail the action that was just performed.
pub(crate) async fn record_audit(
    state: &AppState,
    actor_id: Option<Uuid>,
    action: &str,
    entity_type: &str,
    entity_id: Option<Uuid>,
    details: serde_json::Value,
) {
    let entry = NewAuditLog {
        actor_id,
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id,
        details,
    };
    if let Err(e) = state.repo.insert_audit(entry).await {
        tracing::error!(error = %e, action, entity_type, "failed to write audit log");
    }
}

/// The relief group owned by the calling provider, whatever its status.
pub(crate) async fn owned_group(state: &AppState, user: &AuthUser) -> Result<ReliefGroup, AppError> {
    user.require_provider()?;
    state
        .repo
        .get_group_by_owner(user.id)
        .await?
        .ok_or(AppError::NotFound("Relief group"))
}

/// Like `owned_group`, but stock and request work is reserved for approved groups.
pub(crate) async fn approved_group(
    state: &AppState,
    user: &AuthUser,
) -> Result<ReliefGroup, AppError> {
    let group = owned_group(state, user).await?;
    if group.status != GroupStatus::Approved {
        return Err(AppError::forbidden(
            "Your relief group has not been approved yet",
        ));
    }
    Ok(group)
}

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.chars().take(255).collect())
}

/// Trims a free-text field, turning blank input into `None`.
pub(crate) fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
