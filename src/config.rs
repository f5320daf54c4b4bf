use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared immutably through `AppState` (pulled into handlers via `FromRef`).
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls dev conveniences (x-user-id bypass, echoed codes).
    pub env: Env,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // Postgres connection string. `None` in local mode runs on the in-memory repository.
    pub db_url: Option<String>,
    // HMAC secret used to sign and verify access tokens.
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub password_reset_ttl_secs: i64,
    pub otp: OtpPolicy,
    pub sms: SmsConfig,
    pub s3: S3Config,
    // Problems found while reading the environment. Logged by `main` once the
    // subscriber is installed.
    pub warnings: Vec<String>,
}

/// Env
///
/// Defines the runtime context, used to switch between development utilities
/// (in-memory store, mock SMS, header bypass) and production infrastructure.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// OtpPolicy
///
/// Limits applied to phone verification codes. All durations are in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct OtpPolicy {
    // Mixed into every stored code hash so a leaked table cannot be brute-forced offline.
    pub pepper: String,
    pub ttl_secs: i64,
    pub max_attempts: i32,
    pub max_sends_per_window: usize,
    pub window_secs: i64,
    pub resend_cooldown_secs: i64,
    // How long a verified code may still be redeemed for a registration.
    pub verified_validity_secs: i64,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            pepper: "local-otp-pepper".to_string(),
            ttl_secs: 600,
            max_attempts: 5,
            max_sends_per_window: 3,
            window_secs: 3600,
            resend_cooldown_secs: 60,
            verified_validity_secs: 1800,
        }
    }
}

/// SMS gateway settings. Without an `api_url` (local mode only) the mock sender is used.
#[derive(Clone, Debug, Default)]
pub struct SmsConfig {
    pub api_url: Option<String>,
    pub api_key: String,
    pub sender_id: String,
}

/// S3-compatible object storage settings for group documents.
#[derive(Clone, Debug)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

impl Default for S3Config {
    fn default() -> Self {
        // Default MinIO credentials for local/testing convenience.
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "admin".to_string(),
            secret_key: "password".to_string(),
            bucket: "relief-documents".to_string(),
        }
    }
}

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

impl Default for AppConfig {
    /// Safe, non-panicking configuration for tests and scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: "127.0.0.1:3000".to_string(),
            db_url: None,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            password_reset_ttl_secs: 1800,
            otp: OtpPolicy::default(),
            sms: SmsConfig {
                api_url: None,
                api_key: String::new(),
                sender_id: "RELIEF".to_string(),
            },
            s3: S3Config::default(),
            warnings: Vec::new(),
        }
    }
}

/// Upper bound for every `*_SECS` setting (one year). Larger values would overflow
/// `chrono::Duration` arithmetic.
pub const MAX_DURATION_SECS: i64 = 365 * 24 * 3600;

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables, applying the fail-fast
    /// principle for production.
    ///
    /// # Panics
    /// Panics in `Env::Production` when `DATABASE_URL`, `JWT_SECRET`, `OTP_PEPPER`,
    /// the S3 credentials or the SMS gateway settings are missing, so the service
    /// never starts half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").unwrap_or_default().as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();
        let mut warnings = Vec::new();

        let secret = |key: &str, fallback: &str| -> String {
            match env {
                Env::Production => env::var(key)
                    .unwrap_or_else(|_| panic!("FATAL: {} must be set in production.", key)),
                Env::Local => env::var(key).unwrap_or_else(|_| fallback.to_string()),
            }
        };

        let db_url = match env {
            Env::Production => Some(
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in production"),
            ),
            Env::Local => env::var("DATABASE_URL").ok(),
        };

        let otp = OtpPolicy {
            pepper: secret("OTP_PEPPER", &defaults.otp.pepper),
            ttl_secs: secs("OTP_TTL_SECS", defaults.otp.ttl_secs, &mut warnings),
            max_attempts: bounded(
                "OTP_MAX_ATTEMPTS",
                defaults.otp.max_attempts,
                1,
                100,
                &mut warnings,
            ),
            max_sends_per_window: bounded(
                "OTP_MAX_SENDS_PER_WINDOW",
                defaults.otp.max_sends_per_window,
                1,
                100,
                &mut warnings,
            ),
            window_secs: secs("OTP_WINDOW_SECS", defaults.otp.window_secs, &mut warnings),
            resend_cooldown_secs: secs(
                "OTP_RESEND_COOLDOWN_SECS",
                defaults.otp.resend_cooldown_secs,
                &mut warnings,
            ),
            verified_validity_secs: secs(
                "OTP_VERIFIED_VALIDITY_SECS",
                defaults.otp.verified_validity_secs,
                &mut warnings,
            ),
        };

        let s3 = S3Config {
            endpoint: env::var("S3_ENDPOINT").unwrap_or(defaults.s3.endpoint),
            region: env::var("S3_REGION").unwrap_or(defaults.s3.region),
            access_key: secret("S3_ACCESS_KEY", &defaults.s3.access_key),
            secret_key: secret("S3_SECRET_KEY", &defaults.s3.secret_key),
            bucket: env::var("S3_BUCKET_NAME").unwrap_or(defaults.s3.bucket),
        };

        let sms = SmsConfig {
            api_url: match env {
                Env::Production => match secret("SMS_API_URL", "") {
                    url if url.trim().is_empty() => {
                        panic!("FATAL: SMS_API_URL must not be empty in production.")
                    }
                    url => Some(url),
                },
                Env::Local => env::var("SMS_API_URL").ok().filter(|u| !u.is_empty()),
            },
            api_key: secret("SMS_API_KEY", ""),
            sender_id: env::var("SMS_SENDER_ID").unwrap_or(defaults.sms.sender_id),
        };

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            db_url,
            jwt_secret: secret("JWT_SECRET", LOCAL_JWT_SECRET),
            access_token_ttl_secs: secs(
                "ACCESS_TOKEN_TTL_SECS",
                defaults.access_token_ttl_secs,
                &mut warnings,
            ),
            refresh_token_ttl_secs: secs(
                "REFRESH_TOKEN_TTL_SECS",
                defaults.refresh_token_ttl_secs,
                &mut warnings,
            ),
            password_reset_ttl_secs: secs(
                "PASSWORD_RESET_TTL_SECS",
                defaults.password_reset_ttl_secs,
                &mut warnings,
            ),
            otp,
            sms,
            s3,
            env,
            warnings,
        }
    }

    pub fn is_local(&self) -> bool {
        self.env == Env::Local
    }
}

/// A duration setting in seconds, between one second and a year.
fn secs(key: &str, default: i64, warnings: &mut Vec<String>) -> i64 {
    bounded(key, default, 1, MAX_DURATION_SECS, warnings)
}

/// Parses a numeric env var, keeping the default when it is unset or malformed and
/// clamping it into `[min, max]`. Each correction is recorded in `warnings`.
fn bounded<T>(key: &str, default: T, min: T, max: T, warnings: &mut Vec<String>) -> T
where
    T: FromStr + PartialOrd + Copy + Display,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value < min || value > max => {
            let clamped = if value < min { min } else { max };
            warnings.push(format!("{} = {} is out of range, using {}", key, value, clamped));
            clamped
        }
        Ok(value) => value,
        Err(_) => {
            warnings.push(format!("{} has an invalid value, using {}", key, default));
            default
        }
    }
}
