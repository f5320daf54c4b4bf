//! Phone verification codes: generation, hashing and the rate-limit decisions.
//!
//! The functions here are pure; the repository and handlers feed them rows and
//! persist whatever they decide.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::auth::{constant_time_eq, sha256_hex};
use crate::config::OtpPolicy;
use crate::error::AppError;
use crate::models::OtpRequest;

pub const OTP_LENGTH: usize = 6;

/// Six random digits, leading zeros kept.
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// Peppered digest stored instead of the code. The phone is mixed in so equal
/// codes sent to different numbers hash differently.
pub fn hash_code(pepper: &str, phone: &str, code: &str) -> String {
    sha256_hex(&format!("{}:{}:{}", pepper, phone, code.trim()))
}

/// check_send_allowed
///
/// `recent` holds the codes issued for this phone and purpose inside the policy
/// window, newest first. Rejects with 429 when the window quota is used up or the
/// previous send is still inside the resend cooldown.
pub fn check_send_allowed(
    policy: &OtpPolicy,
    recent: &[OtpRequest],
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let window_start = now - Duration::seconds(policy.window_secs);
    let in_window: Vec<&OtpRequest> = recent
        .iter()
        .filter(|r| r.created_at > window_start)
        .collect();

    if let Some(latest) = in_window.iter().map(|r| r.created_at).max() {
        let ready_at = latest + Duration::seconds(policy.resend_cooldown_secs);
        if ready_at > now {
            return Err(AppError::TooManyRequests {
                message: "Please wait before requesting another code".to_string(),
                retry_after: (ready_at - now).num_seconds().max(1) as u64,
            });
        }
    }

    if in_window.len() >= policy.max_sends_per_window {
        let oldest = in_window
            .iter()
            .map(|r| r.created_at)
            .min()
            .unwrap_or(now);
        let frees_at = oldest + Duration::seconds(policy.window_secs);
        tracing::warn!("otp send quota exhausted");
        return Err(AppError::TooManyRequests {
            message: "Too many codes requested for this number, try again later".to_string(),
            retry_after: (frees_at - now).num_seconds().max(1) as u64,
        });
    }

    Ok(())
}

/// CodeState
///
/// Whether a stored code can still take a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeState {
    Open,
    /// Verified earlier and not yet redeemed; nothing to persist.
    AlreadyVerified,
}

/// check_open
///
/// Rejects codes that can no longer be guessed. Consumed or expired codes are a
/// 400, an exhausted attempt budget is a 429. The attempt count here is only a
/// fast path: the budget is enforced by reserving an attempt in the repository.
pub fn check_open(
    policy: &OtpPolicy,
    request: &OtpRequest,
    now: DateTime<Utc>,
) -> Result<CodeState, AppError> {
    if request.consumed_at.is_some() {
        return Err(AppError::BadRequest(
            "Code already used, request a new one".to_string(),
        ));
    }
    if request.verified_at.is_some() {
        return Ok(CodeState::AlreadyVerified);
    }
    if request.expires_at <= now {
        return Err(AppError::BadRequest(
            "Code expired, request a new one".to_string(),
        ));
    }
    if request.attempts >= policy.max_attempts {
        return Err(attempts_exhausted(request, now));
    }
    Ok(CodeState::Open)
}

pub fn attempts_exhausted(request: &OtpRequest, now: DateTime<Utc>) -> AppError {
    tracing::warn!("otp attempts exhausted");
    AppError::TooManyRequests {
        message: "Too many wrong attempts, request a new code".to_string(),
        retry_after: (request.expires_at - now).num_seconds().max(1) as u64,
    }
}

/// VerifyOutcome
///
/// Result of comparing a guess that already holds a reserved attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Correct code: mark the request verified.
    Verified,
    /// Wrong code. `remaining` is what is left after this one.
    Mismatch { remaining: i32 },
}

/// compare_code
///
/// `attempts_spent` counts the reserved attempt for this guess.
pub fn compare_code(
    policy: &OtpPolicy,
    request: &OtpRequest,
    submitted: &str,
    attempts_spent: i32,
) -> VerifyOutcome {
    let expected = request.code_hash.as_bytes();
    let actual = hash_code(&policy.pepper, &request.phone, submitted);
    if constant_time_eq(expected, actual.as_bytes()) {
        VerifyOutcome::Verified
    } else {
        VerifyOutcome::Mismatch {
            remaining: (policy.max_attempts - attempts_spent).max(0),
        }
    }
}

/// The earliest verification time still redeemable for a registration.
pub fn verified_since(policy: &OtpPolicy, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::seconds(policy.verified_validity_secs)
}

pub fn otp_message(code: &str, ttl_secs: i64) -> String {
    format!(
        "{} is your relief portal verification code. It expires in {} minutes. Do not share it.",
        code,
        (ttl_secs / 60).max(1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OtpPurpose;
    use uuid::Uuid;

    const PHONE: &str = "+919876543210";

    fn policy() -> OtpPolicy {
        OtpPolicy::default()
    }

    fn issued(code: &str, created_at: DateTime<Utc>) -> OtpRequest {
        let p = policy();
        OtpRequest {
            id: Uuid::new_v4(),
            phone: PHONE.to_string(),
            purpose: OtpPurpose::GroupRegistration,
            code_hash: hash_code(&p.pepper, PHONE, code),
            attempts: 0,
            created_at,
            expires_at: created_at + Duration::seconds(p.ttl_secs),
            verified_at: None,
            consumed_at: None,
        }
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), OTP_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hash_depends_on_phone() {
        assert_ne!(
            hash_code("p", "+919876543210", "123456"),
            hash_code("p", "+919876543211", "123456")
        );
    }

    #[test]
    fn first_send_is_allowed() {
        assert!(check_send_allowed(&policy(), &[], Utc::now()).is_ok());
    }

    #[test]
    fn resend_inside_cooldown_is_throttled() {
        let now = Utc::now();
        let recent = vec![issued("111111", now - Duration::seconds(10))];
        match check_send_allowed(&policy(), &recent, now) {
            Err(AppError::TooManyRequests { retry_after, .. }) => assert_eq!(retry_after, 50),
            other => panic!("expected throttling, got {:?}", other),
        }
    }

    #[test]
    fn window_quota_is_enforced() {
        let now = Utc::now();
        let recent = vec![
            issued("1", now - Duration::seconds(300)),
            issued("2", now - Duration::seconds(600)),
            issued("3", now - Duration::seconds(900)),
        ];
        let err = check_send_allowed(&policy(), &recent, now).unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests { .. }));

        // Sends older than the window no longer count.
        let old = vec![
            issued("1", now - Duration::seconds(300)),
            issued("2", now - Duration::seconds(4000)),
            issued("3", now - Duration::seconds(5000)),
        ];
        assert!(check_send_allowed(&policy(), &old, now).is_ok());
    }

    #[test]
    fn correct_code_verifies() {
        let now = Utc::now();
        let req = issued("482913", now);
        assert_eq!(check_open(&policy(), &req, now).unwrap(), CodeState::Open);
        assert_eq!(
            compare_code(&policy(), &req, "482913", 1),
            VerifyOutcome::Verified
        );
    }

    #[test]
    fn wrong_code_reports_remaining_attempts() {
        let now = Utc::now();
        let req = issued("482913", now);
        assert_eq!(
            compare_code(&policy(), &req, "000000", 4),
            VerifyOutcome::Mismatch { remaining: 1 }
        );
        assert_eq!(
            compare_code(&policy(), &req, "000000", policy().max_attempts),
            VerifyOutcome::Mismatch { remaining: 0 }
        );
    }

    #[test]
    fn exhausted_attempts_lock_the_code() {
        let now = Utc::now();
        let mut req = issued("482913", now);
        req.attempts = policy().max_attempts;
        assert!(matches!(
            check_open(&policy(), &req, now),
            Err(AppError::TooManyRequests { .. })
        ));
    }

    #[test]
    fn verified_code_stays_verified() {
        let now = Utc::now();
        let mut req = issued("482913", now);
        req.verified_at = Some(now);
        assert_eq!(
            check_open(&policy(), &req, now).unwrap(),
            CodeState::AlreadyVerified
        );
    }

    #[test]
    fn expired_code_is_rejected() {
        let created = Utc::now() - Duration::seconds(3600);
        let req = issued("482913", created);
        assert!(matches!(
            check_open(&policy(), &req, Utc::now()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn consumed_code_is_rejected() {
        let now = Utc::now();
        let mut req = issued("482913", now);
        req.verified_at = Some(now);
        req.consumed_at = Some(now);
        assert!(check_open(&policy(), &req, now).is_err());
    }
}
