use axum::{Json, extract::State};
use chrono::{Duration, Utc};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{NewOtp, SendOtpRequest, SendOtpResponse, VerifyOtpRequest, VerifyOtpResponse},
    otp::{self, CodeState, VerifyOutcome},
    validation,
};

/// send_otp
///
/// [Public Route] Issues a six-digit code to a phone number. Rate limited per
/// phone and purpose: a resend cooldown plus a quota per window, both answered
/// with 429 and `Retry-After`.
#[utoipa::path(
    post,
    path = "/otp/send",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Code sent", body = SendOtpResponse),
        (status = 429, description = "Cooldown or quota hit")
    )
)]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> AppResult<Json<SendOtpResponse>> {
    let policy = &state.config.otp;
    let phone = validation::require_phone("phone", &payload.phone)?;
    let now = Utc::now();

    let code = otp::generate_code();
    state
        .repo
        .issue_otp(
            NewOtp {
                phone: phone.clone(),
                purpose: payload.purpose,
                code_hash: otp::hash_code(&policy.pepper, &phone, &code),
                expires_at: now + Duration::seconds(policy.ttl_secs),
            },
            policy,
            now,
        )
        .await?;

    state
        .sms
        .send(&phone, &otp::otp_message(&code, policy.ttl_secs))
        .await
        .map_err(|e| AppError::Internal(format!("SMS delivery failed: {}", e)))?;
    tracing::info!(purpose = ?payload.purpose, "verification code sent");

    Ok(Json(SendOtpResponse {
        phone,
        expires_in: policy.ttl_secs,
        resend_after: policy.resend_cooldown_secs,
        debug_code: state.config.is_local().then_some(code),
    }))
}

/// verify_otp
///
/// [Public Route] Checks a code against the latest one issued for the phone.
/// A wrong code spends one attempt and reports how many are left.
#[utoipa::path(
    post,
    path = "/otp/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Phone verified", body = VerifyOtpResponse),
        (status = 400, description = "Wrong, expired or missing code"),
        (status = 429, description = "Attempts exhausted")
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> AppResult<Json<VerifyOtpResponse>> {
    let policy = &state.config.otp;
    let phone = validation::require_phone("phone", &payload.phone)?;
    let now = Utc::now();

    let request = state
        .repo
        .latest_otp(&phone, payload.purpose)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest("No code was requested for this number".to_string())
        })?;

    let verified_at = match otp::check_open(policy, &request, now)? {
        CodeState::AlreadyVerified => request.verified_at.unwrap_or(now),
        CodeState::Open => {
            // Spend the attempt before looking at the code.
            let spent = state
                .repo
                .reserve_otp_attempt(request.id, policy.max_attempts)
                .await?
                .ok_or_else(|| otp::attempts_exhausted(&request, now))?;

            match otp::compare_code(policy, &request, &payload.code, spent) {
                VerifyOutcome::Verified => {
                    if !state.repo.mark_otp_verified(request.id, now).await? {
                        return Err(AppError::BadRequest(
                            "Code already used, request a new one".to_string(),
                        ));
                    }
                    now
                }
                VerifyOutcome::Mismatch { remaining } => {
                    tracing::warn!(remaining, "wrong verification code submitted");
                    return Err(AppError::validation(
                        "code",
                        format!("is incorrect, {} attempts left", remaining),
                    ));
                }
            }
        }
    };

    let valid_for = (verified_at + Duration::seconds(policy.verified_validity_secs) - now)
        .num_seconds()
        .max(0);
    Ok(Json(VerifyOtpResponse {
        phone,
        verified: true,
        valid_for,
    }))
}
