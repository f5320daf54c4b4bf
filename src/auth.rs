use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::{NewSession, TokenResponse, User, UserProfile, UserRole},
    repository::RepositoryState,
};

pub const ACCESS_TOKEN_TYPE: &str = "access";
// Accounts hashed before the switch to Argon2id; verified, then rehashed at login.
const LEGACY_PASSWORD_SCHEME: &str = "sha256";
const LOCAL_BYPASS_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of an access token. `sid` ties the token to a `Session` row so that
/// revoking the session kills the token before it expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// Session id.
    pub sid: Uuid,
    pub role: UserRole,
    /// Token type, always "access". Guards against other HS256 tokens signed with the same key.
    pub typ: String,
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
    /// `None` when authenticated through the local-development header bypass.
    pub session_id: Option<Uuid>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("Administrator access required"))
        }
    }

    pub fn require_provider(&self) -> Result<(), AppError> {
        if self.role == UserRole::Provider {
            Ok(())
        } else {
            Err(AppError::forbidden("Relief group account required"))
        }
    }
}

// --- Hashing primitives ---

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// 32 random bytes, hex encoded. Used for refresh and password-reset tokens.
pub fn generate_secret_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Equality check whose running time doesn't depend on where the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// hash_password
///
/// Argon2id with a random salt, encoded as a PHC string (`$argon2id$v=19$...`).
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

/// verify_password
///
/// Accepts Argon2 PHC strings and the older `sha256$<iterations>$<salt>$<hash>`
/// encoding. Anything else never verifies.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    if encoded.starts_with("$argon2") {
        return PasswordHash::new(encoded)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false);
    }
    verify_legacy_password(password, encoded)
}

/// True when the stored hash predates Argon2 and should be replaced.
pub fn needs_rehash(encoded: &str) -> bool {
    !encoded.starts_with("$argon2")
}

fn stretch(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::new().chain_update(salt).chain_update(password).finalize());
    for _ in 1..iterations {
        let next = Sha256::new()
            .chain_update(digest)
            .chain_update(password)
            .finalize();
        digest.copy_from_slice(&next);
    }
    digest
}

fn verify_legacy_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != LEGACY_PASSWORD_SCHEME {
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        hex::decode(salt),
        hex::decode(expected),
    ) else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let digest = stretch(password.as_bytes(), &salt, iterations);
    constant_time_eq(&digest, &expected)
}

// --- Access tokens ---

pub fn issue_access_token(
    config: &AppConfig,
    user_id: Uuid,
    role: UserRole,
    session_id: Uuid,
) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        sid: session_id,
        role,
        typ: ACCESS_TOKEN_TYPE.to_string(),
        iat: now as usize,
        exp: (now + config.access_token_ttl_secs) as usize,
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    Ok(encode(&Header::default(), &claims, &key)?)
}

/// Verifies signature, expiry and token type. Every failure is a 401.
pub fn decode_access_token(config: &AppConfig, token: &str) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;

    let data = decode::<Claims>(token, &key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("access token expired"),
            other => tracing::debug!("access token rejected: {:?}", other),
        }
        AppError::Unauthorized
    })?;

    if data.claims.typ != ACCESS_TOKEN_TYPE {
        return Err(AppError::Unauthorized);
    }
    Ok(data.claims)
}

// --- Session flow ---

/// start_session
///
/// Creates a session for a freshly authenticated user and returns the token pair.
pub async fn start_session(
    repo: &RepositoryState,
    config: &AppConfig,
    user: &User,
    user_agent: Option<String>,
) -> Result<TokenResponse, AppError> {
    let refresh_token = generate_secret_token();
    let session = repo
        .create_session(NewSession {
            user_id: user.id,
            refresh_token_hash: sha256_hex(&refresh_token),
            user_agent,
            expires_at: Utc::now() + Duration::seconds(config.refresh_token_ttl_secs),
        })
        .await?;

    let access_token = issue_access_token(config, user.id, user.role, session.id)?;
    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: config.access_token_ttl_secs,
        user: UserProfile::from(user),
    })
}

/// refresh_session
///
/// Exchanges a refresh token for a new pair. The old refresh token stops working:
/// the stored hash is swapped with a compare-and-set, so two concurrent refreshes
/// with the same token can't both succeed.
pub async fn refresh_session(
    repo: &RepositoryState,
    config: &AppConfig,
    refresh_token: &str,
) -> Result<TokenResponse, AppError> {
    let old_hash = sha256_hex(refresh_token.trim());
    let now = Utc::now();

    let session = repo
        .find_session_by_refresh_hash(&old_hash)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !session.is_active_at(now) {
        tracing::info!(session_id = %session.id, "refresh attempted on inactive session");
        return Err(AppError::Unauthorized);
    }

    let user = repo
        .get_user(session.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Unauthorized)?;

    let new_refresh = generate_secret_token();
    let rotated = repo
        .rotate_session(
            session.id,
            &old_hash,
            &sha256_hex(&new_refresh),
            now + Duration::seconds(config.refresh_token_ttl_secs),
        )
        .await?;
    if !rotated {
        tracing::warn!(session_id = %session.id, "refresh token reused concurrently");
        return Err(AppError::Unauthorized);
    }

    let access_token = issue_access_token(config, user.id, user.role, session.id)?;
    Ok(TokenResponse {
        access_token,
        refresh_token: new_refresh,
        token_type: "Bearer".to_string(),
        expires_in: config.access_token_ttl_secs,
        user: UserProfile::from(&user),
    })
}

// --- Extractors ---

/// AuthUser extractor
///
/// 1. Local bypass: in `Env::Local` a known user id in `x-user-id` authenticates.
/// 2. Bearer token: signature, expiry and type checks.
/// 3. Session lookup: must exist, belong to the subject, be unrevoked and unexpired.
/// 4. User lookup: must exist and be active; the role is read fresh from the database.
///
/// Rejects with 401 on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get(LOCAL_BYPASS_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await?.filter(|u| u.is_active) {
                    return Ok(AuthUser {
                        id: user.id,
                        role: user.role,
                        session_id: None,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims = decode_access_token(&config, token)?;

        let session = repo
            .get_session(claims.sid)
            .await?
            .ok_or(AppError::Unauthorized)?;
        if session.user_id != claims.sub || !session.is_active_at(Utc::now()) {
            return Err(AppError::Unauthorized);
        }

        let user = repo
            .get_user(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser {
            id: user.id,
            role: user.role,
            session_id: Some(session.id),
        })
    }
}

/// Optional variant for routes that also serve anonymous callers. Absent
/// credentials yield `None`; credentials that are present but invalid still 401.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let has_credentials = parts.headers.contains_key(header::AUTHORIZATION)
            || parts.headers.contains_key(LOCAL_BYPASS_HEADER);
        if !has_credentials {
            return Ok(None);
        }
        <AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_hash(password: &str, iterations: u32) -> String {
        let salt = [7u8; 16];
        format!(
            "sha256${}${}${}",
            iterations,
            hex::encode(salt),
            hex::encode(stretch(password.as_bytes(), &salt, iterations))
        )
    }

    #[test]
    fn password_round_trip() {
        let encoded = hash_password("relief2024").unwrap();
        assert!(encoded.starts_with("$argon2id$"));
        assert!(verify_password("relief2024", &encoded));
        assert!(!verify_password("relief2025", &encoded));
        assert!(!needs_rehash(&encoded));
    }

    #[test]
    fn same_password_gets_different_salts() {
        assert_ne!(
            hash_password("relief2024").unwrap(),
            hash_password("relief2024").unwrap()
        );
    }

    #[test]
    fn legacy_hashes_still_verify_and_ask_for_rehash() {
        let encoded = legacy_hash("relief2024", 20_000);
        assert!(verify_password("relief2024", &encoded));
        assert!(!verify_password("relief2025", &encoded));
        assert!(needs_rehash(&encoded));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "sha256$abc$00$00"));
        assert!(!verify_password("x", "md5$1$00$00"));
        assert!(!verify_password("x", "sha256$0$00$00"));
        assert!(!verify_password("x", "$argon2id$garbage"));
    }

    #[test]
    fn access_token_round_trip() {
        let config = AppConfig::default();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let token = issue_access_token(&config, user_id, UserRole::Provider, session_id).unwrap();
        let claims = decode_access_token(&config, &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.sid, session_id);
        assert_eq!(claims.role, UserRole::Provider);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let config = AppConfig::default();
        let mut other = AppConfig::default();
        other.jwt_secret = "another-secret".to_string();
        let token =
            issue_access_token(&other, Uuid::new_v4(), UserRole::Citizen, Uuid::new_v4()).unwrap();
        assert!(matches!(
            decode_access_token(&config, &token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut config = AppConfig::default();
        config.access_token_ttl_secs = -60;
        let token =
            issue_access_token(&config, Uuid::new_v4(), UserRole::Citizen, Uuid::new_v4()).unwrap();
        assert!(decode_access_token(&config, &token).is_err());
    }

    #[test]
    fn secret_tokens_are_unique_hex() {
        let a = generate_secret_token();
        let b = generate_secret_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
