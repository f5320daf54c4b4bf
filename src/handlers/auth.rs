use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::json;

use super::{record_audit, user_agent};
use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult},
    models::{
        ChangePasswordRequest, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest,
        NewUser, RefreshRequest, RegisterRequest, ResetPasswordRequest, TokenResponse,
        UserProfile, UserRole,
    },
    validation::{self, Validate},
};

const FORGOT_PASSWORD_MESSAGE: &str =
    "If the number is registered, a reset code has been sent to it";

/// register
///
/// [Public Route] Citizen self-registration. Email is stored lowercased and the
/// phone normalized, so both uniqueness constraints see canonical values.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserProfile),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email or phone already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    payload.validate()?;
    let phone = validation::require_phone("phone", &payload.phone)?;

    let user = state
        .repo
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email: payload.email.trim().to_lowercase(),
            phone,
            password_hash: auth::hash_password(&payload.password)?,
            role: UserRole::Citizen,
        })
        .await?;

    tracing::info!(user_id = %user.id, "citizen registered");
    record_audit(&state, Some(user.id), "user.registered", "user", Some(user.id), json!({})).await;
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

/// login
///
/// [Public Route] `identifier` may be the email or the phone number. Unknown
/// accounts, wrong passwords and deactivated accounts all answer with the same 401.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let identifier = payload.identifier.trim();
    let user = if identifier.contains('@') {
        state.repo.find_user_by_email(identifier).await?
    } else {
        match validation::normalize_phone(identifier) {
            Some(phone) => state.repo.find_user_by_phone(&phone).await?,
            None => None,
        }
    };

    let Some(user) = user.filter(|u| auth::verify_password(&payload.password, &u.password_hash))
    else {
        tracing::warn!("login failed: bad credentials");
        return Err(AppError::Unauthorized);
    };
    if !user.is_active {
        tracing::warn!(user_id = %user.id, "login refused for deactivated account");
        return Err(AppError::Unauthorized);
    }

    if auth::needs_rehash(&user.password_hash) {
        let upgraded = auth::hash_password(&payload.password)?;
        if let Err(e) = state.repo.update_password(user.id, &upgraded).await {
            tracing::warn!(user_id = %user.id, error = %e, "password rehash failed");
        }
    }

    let tokens = auth::start_session(&state.repo, &state.config, &user, user_agent(&headers)).await?;
    record_audit(&state, Some(user.id), "auth.login", "user", Some(user.id), json!({})).await;
    Ok(Json(tokens))
}

/// [Public Route] Rotates the refresh token and issues a new access token.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Unknown, revoked or expired refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let tokens = auth::refresh_session(&state.repo, &state.config, &payload.refresh_token).await?;
    Ok(Json(tokens))
}

/// logout
///
/// [Authenticated Route] Revokes the session behind the presented access token.
/// The token stops working immediately, not at its expiry.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Session revoked"))
)]
pub async fn logout(user: AuthUser, State(state): State<AppState>) -> AppResult<StatusCode> {
    if let Some(session_id) = user.session_id {
        state.repo.revoke_session(session_id).await?;
        tracing::info!(user_id = %user.id, %session_id, "session revoked");
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses((status = 204, description = "Every session of the caller revoked"))
)]
pub async fn logout_all(user: AuthUser, State(state): State<AppState>) -> AppResult<StatusCode> {
    let revoked = state.repo.revoke_user_sessions(user.id, None).await?;
    tracing::info!(user_id = %user.id, revoked, "all sessions revoked");
    record_audit(
        &state,
        Some(user.id),
        "auth.logout_all",
        "user",
        Some(user.id),
        json!({ "revoked": revoked }),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

/// [Authenticated Route] Profile of the caller, read fresh from the store.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn me(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<UserProfile>> {
    let user = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(UserProfile::from(&user)))
}

/// change_password
///
/// [Authenticated Route] Requires the current password. Every other session of
/// the user is revoked; the one making the call stays signed in.
#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password wrong or new password too weak")
    )
)]
pub async fn change_password(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    payload.validate()?;
    let account = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    if !auth::verify_password(&payload.current_password, &account.password_hash) {
        return Err(AppError::validation("current_password", "is incorrect"));
    }

    state
        .repo
        .update_password(user.id, &auth::hash_password(&payload.new_password)?)
        .await?;
    let revoked = state
        .repo
        .revoke_user_sessions(user.id, user.session_id)
        .await?;

    record_audit(
        &state,
        Some(user.id),
        "auth.password_changed",
        "user",
        Some(user.id),
        json!({ "revoked_sessions": revoked }),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

/// forgot_password
///
/// [Public Route] Always answers 202 with the same body so the endpoint can't be
/// used to probe which numbers have accounts. When one does, a single-use reset
/// token is stored hashed and sent by SMS.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 202, description = "Accepted", body = ForgotPasswordResponse))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<(StatusCode, Json<ForgotPasswordResponse>)> {
    let phone = validation::require_phone("phone", &payload.phone)?;
    let mut debug_token = None;

    if let Some(user) = state
        .repo
        .find_user_by_phone(&phone)
        .await?
        .filter(|u| u.is_active)
    {
        let token = auth::generate_secret_token();
        let expires_at = Utc::now() + Duration::seconds(state.config.password_reset_ttl_secs);
        state
            .repo
            .create_password_reset(user.id, &auth::sha256_hex(&token), expires_at)
            .await?;

        let message = format!(
            "Your relief portal password reset code is {}. It expires in {} minutes.",
            token,
            (state.config.password_reset_ttl_secs / 60).max(1)
        );
        if let Err(e) = state.sms.send(&phone, &message).await {
            tracing::error!(error = %e, user_id = %user.id, "failed to deliver password reset SMS");
        }
        record_audit(
            &state,
            Some(user.id),
            "auth.password_reset_requested",
            "user",
            Some(user.id),
            json!({}),
        )
        .await;

        if state.config.is_local() {
            debug_token = Some(token);
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(ForgotPasswordResponse {
            message: FORGOT_PASSWORD_MESSAGE.to_string(),
            debug_token,
        }),
    ))
}

/// reset_password
///
/// [Public Route] Redeems a reset token. The token is burned atomically so it
/// works once; every session of the account is revoked afterwards.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password reset"),
        (status = 400, description = "Token invalid, used or expired")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    payload.validate()?;
    let reset = state
        .repo
        .consume_password_reset(&auth::sha256_hex(payload.token.trim()), Utc::now())
        .await?
        .ok_or_else(|| AppError::BadRequest("Reset token is invalid or has expired".to_string()))?;

    state
        .repo
        .update_password(reset.user_id, &auth::hash_password(&payload.new_password)?)
        .await?;
    let revoked = state.repo.revoke_user_sessions(reset.user_id, None).await?;

    tracing::info!(user_id = %reset.user_id, revoked, "password reset completed");
    record_audit(
        &state,
        Some(reset.user_id),
        "auth.password_reset",
        "user",
        Some(reset.user_id),
        json!({ "revoked_sessions": revoked }),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}
