use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Ten years; keeps `now + ttl` well inside chrono's range.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_hours: i64,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("PARLOR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLOR_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let port = match get("PARLOR_PORT") {
            Some(v) => v.parse().with_context(|| format!("PARLOR_PORT is not a port: {}", v))?,
            None => 3000,
        };
        let token_ttl_hours: i64 = match get("PARLOR_TOKEN_TTL_HOURS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("PARLOR_TOKEN_TTL_HOURS is not a number: {}", v))?,
            None => 24 * 30,
        };
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            bail!("PARLOR_TOKEN_TTL_HOURS must be between 1 and {}", MAX_TOKEN_TTL_HOURS);
        }
        let max_body_bytes = match get("PARLOR_MAX_BODY_BYTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("PARLOR_MAX_BODY_BYTES is not a number: {}", v))?,
            None => 16 * 1024 * 1024,
        };

        Ok(Self {
            jwt_secret,
            db_path: get("PARLOR_DB_PATH").unwrap_or_else(|| "parlor.db".into()).into(),
            host: get("PARLOR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            token_ttl_hours,
            max_body_bytes,
        })
    }
}
