use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// OtpPurpose
///
/// Codes are scoped by purpose so a code requested for one flow can't be redeemed
/// in another.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "otp_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OtpPurpose {
    #[default]
    GroupRegistration,
    PhoneVerification,
}

/// OtpRequest
///
/// One issued code. Only the peppered SHA-256 of the code is stored.
#[derive(Debug, Clone, FromRow)]
pub struct OtpRequest {
    pub id: Uuid,
    pub phone: String,
    pub purpose: OtpPurpose,
    pub code_hash: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewOtp {
    pub phone: String,
    pub purpose: OtpPurpose,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SendOtpRequest {
    #[schema(example = "9876543210")]
    pub phone: String,
    #[serde(default)]
    pub purpose: OtpPurpose,
}

/// SendOtpResponse
///
/// `resend_after` tells the client how long to grey out the resend button.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SendOtpResponse {
    pub phone: String,
    pub expires_in: i64,
    pub resend_after: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VerifyOtpRequest {
    pub phone: String,
    #[serde(default)]
    pub purpose: OtpPurpose,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VerifyOtpResponse {
    pub phone: String,
    pub verified: bool,
    /// Seconds left to complete the registration with this verification.
    pub valid_for: i64,
}
