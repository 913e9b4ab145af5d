/*
 * Responsibility
 * - Load settings from the environment (.env is honoured)
 * - Validate eagerly: a bad key, IV or secret stops startup, never a request
 * - Keep secrets out of Debug output
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::identity_cipher::{IV_LEN, KEY_LEN};
use crate::services::lock::LockPolicy;
use crate::services::signature::{DEFAULT_SKEW_MILLIS, SignaturePolicy};
use crate::services::token::TokenSettings;
use crate::services::token::service::{
    DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS, MAX_TTL_SECONDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, PartialEq, Eq)]
pub enum SchedulerLockBackend {
    Disabled,
    Postgres { database_url: String },
    Valkey { url: String },
}

impl fmt::Debug for SchedulerLockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // URLs may embed credentials
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Postgres { .. } => f.write_str("Postgres"),
            Self::Valkey { .. } => f.write_str("Valkey"),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub gateway_secret: String,
    pub signature: SignaturePolicy,

    // Raw bytes of the shared AES key / IV, lengths already checked.
    pub identity_key: Vec<u8>,
    pub identity_iv: Vec<u8>,

    pub token_secret: String,
    pub token: TokenSettings,

    pub scheduler_lock: SchedulerLockBackend,
    pub lock_policy: LockPolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print secrets or key material
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("app_env", &self.app_env)
            .field("signature", &self.signature)
            .field("token", &self.token)
            .field("scheduler_lock", &self.scheduler_lock)
            .field("lock_policy", &self.lock_policy)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key → value source (the process env in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let port: u16 = get("PORT").and_then(|s| s.parse().ok()).unwrap_or(3000);
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(get("APP_ENV").as_deref());

        let gateway_secret = required("GATEWAY_SECRET")?;

        let skew_millis = match get("GATEWAY_SIGNATURE_SKEW_MS") {
            Some(v) => v
                .parse::<i64>()
                .ok()
                .filter(|ms| *ms >= 0)
                .ok_or(ConfigError::Invalid("GATEWAY_SIGNATURE_SKEW_MS"))?,
            None => DEFAULT_SKEW_MILLIS,
        };

        let mock_enabled = parse_flag(get("GATEWAY_MOCK_SIGNATURE_ENABLED").as_deref())
            .ok_or(ConfigError::Invalid("GATEWAY_MOCK_SIGNATURE_ENABLED"))?;
        if mock_enabled && app_env.is_production() {
            return Err(ConfigError::Invalid("GATEWAY_MOCK_SIGNATURE_ENABLED"));
        }

        let identity_key = required("IDENTITY_AES_KEY")?.into_bytes();
        if identity_key.len() != KEY_LEN {
            return Err(ConfigError::Invalid("IDENTITY_AES_KEY"));
        }
        let identity_iv = required("IDENTITY_AES_IV")?.into_bytes();
        if identity_iv.len() != IV_LEN {
            return Err(ConfigError::Invalid("IDENTITY_AES_IV"));
        }

        let token_secret = required("TOKEN_SECRET")?;
        let token = TokenSettings {
            issuer: get("TOKEN_ISSUER").unwrap_or_else(|| "gateway-trust".to_string()),
            access_ttl_seconds: parse_ttl(get("ACCESS_TOKEN_TTL_SECONDS"), "ACCESS_TOKEN_TTL_SECONDS")?
                .unwrap_or(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl_seconds: parse_ttl(
                get("REFRESH_TOKEN_TTL_SECONDS"),
                "REFRESH_TOKEN_TTL_SECONDS",
            )?
            .unwrap_or(DEFAULT_REFRESH_TTL_SECONDS),
        };

        let scheduler_lock = match get("SCHEDULER_LOCK_BACKEND")
            .unwrap_or_else(|| "none".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "none" | "disabled" => SchedulerLockBackend::Disabled,
            "postgres" => SchedulerLockBackend::Postgres {
                database_url: required("DATABASE_URL")?,
            },
            "valkey" | "redis" => SchedulerLockBackend::Valkey {
                url: required("VALKEY_URL")?,
            },
            _ => return Err(ConfigError::Invalid("SCHEDULER_LOCK_BACKEND")),
        };

        let defaults = LockPolicy::default();
        let lock_policy = LockPolicy {
            max_attempts: match get("SCHEDULER_LOCK_MAX_ATTEMPTS") {
                Some(v) => v
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::Invalid("SCHEDULER_LOCK_MAX_ATTEMPTS"))?,
                None => defaults.max_attempts,
            },
            backoff: parse_u64(get("SCHEDULER_LOCK_BACKOFF_MS"), "SCHEDULER_LOCK_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
            hold_for: parse_u64(get("SCHEDULER_LOCK_HOLD_SECONDS"), "SCHEDULER_LOCK_HOLD_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.hold_for),
        };

        Ok(Self {
            addr,
            app_env,
            gateway_secret,
            signature: SignaturePolicy {
                skew_millis,
                mock_enabled,
            },
            identity_key,
            identity_iv,
            token_secret,
            token,
            scheduler_lock,
            lock_policy,
        })
    }
}

fn parse_flag(raw: Option<&str>) -> Option<bool> {
    match raw.map(|v| v.trim().to_ascii_lowercase()) {
        None => Some(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
    }
}

fn parse_u64(raw: Option<String>, key: &'static str) -> Result<Option<u64>, ConfigError> {
    raw.map(|v| v.trim().parse::<u64>().map_err(|_| ConfigError::Invalid(key)))
        .transpose()
}

// Token lifetimes: 1..=MAX_TTL_SECONDS.
fn parse_ttl(raw: Option<String>, key: &'static str) -> Result<Option<u64>, ConfigError> {
    match parse_u64(raw, key)? {
        Some(ttl) if ttl == 0 || ttl > MAX_TTL_SECONDS => Err(ConfigError::Invalid(key)),
        ttl => Ok(ttl),
    }
}
