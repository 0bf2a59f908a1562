use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

/// Minimum signing secret length outside development.
pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// `None` disables rotation.
    pub rotation_period: Option<Duration>,
    pub db_path: PathBuf,
    pub db_readers: usize,
    pub trip_service_url: Option<Url>,
    pub trip_service_timeout: Duration,
    /// `trip:user:role` list for the static directory.
    pub trip_roles: String,
    pub event_buffer: usize,
    pub emit_timeout: Duration,
    pub request_timeout: Duration,
    pub addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let environment = match var("TRIPCHAT_ENV", "development").to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "development" | "dev" => Environment::Development,
            other => bail!("TRIPCHAT_ENV must be development or production, got '{other}'"),
        };

        let jwt_secret = lookup("TRIPCHAT_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TRIPCHAT_JWT_SECRET is unset or still a placeholder");
        }
        if environment == Environment::Production && jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            bail!(
                "TRIPCHAT_JWT_SECRET must be at least {} bytes in production",
                MIN_PRODUCTION_SECRET_LEN
            );
        }

        let rotation_secs: u64 = var("TRIPCHAT_JWT_ROTATION_SECS", "86400")
            .parse()
            .context("TRIPCHAT_JWT_ROTATION_SECS")?;

        let trip_service_url = match lookup("TRIPCHAT_TRIP_SERVICE_URL").filter(|v| !v.is_empty()) {
            Some(raw) => Some(Url::parse(&raw).context("TRIPCHAT_TRIP_SERVICE_URL")?),
            None => None,
        };

        let host = var("TRIPCHAT_HOST", "0.0.0.0");
        let port: u16 = var("TRIPCHAT_PORT", "3000").parse().context("TRIPCHAT_PORT")?;

        Ok(Self {
            environment,
            jwt_secret,
            jwt_issuer: var("TRIPCHAT_JWT_ISSUER", "tripchat"),
            rotation_period: (rotation_secs > 0).then(|| Duration::from_secs(rotation_secs)),
            db_path: var("TRIPCHAT_DB_PATH", "tripchat.db").into(),
            db_readers: var("TRIPCHAT_DB_READERS", "4")
                .parse()
                .context("TRIPCHAT_DB_READERS")?,
            trip_service_url,
            trip_service_timeout: millis(&var("TRIPCHAT_TRIP_SERVICE_TIMEOUT_MS", "2000"))
                .context("TRIPCHAT_TRIP_SERVICE_TIMEOUT_MS")?,
            trip_roles: var("TRIPCHAT_TRIP_ROLES", ""),
            event_buffer: var("TRIPCHAT_EVENT_BUFFER", "1024")
                .parse()
                .context("TRIPCHAT_EVENT_BUFFER")?,
            emit_timeout: millis(&var("TRIPCHAT_EMIT_TIMEOUT_MS", "500"))
                .context("TRIPCHAT_EMIT_TIMEOUT_MS")?,
            request_timeout: millis(&var("TRIPCHAT_REQUEST_TIMEOUT_MS", "10000"))
                .context("TRIPCHAT_REQUEST_TIMEOUT_MS")?,
            addr: format!("{}:{}", host, port)
                .parse()
                .context("TRIPCHAT_HOST")?,
        })
    }
}

fn millis(raw: &str) -> Result<Duration> {
    Ok(Duration::from_millis(raw.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("TRIPCHAT_JWT_SECRET", "short-dev-secret")]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.jwt_issuer, "tripchat");
        assert_eq!(config.rotation_period, Some(Duration::from_secs(86400)));
        assert_eq!(config.db_path, PathBuf::from("tripchat.db"));
        assert_eq!(config.db_readers, 4);
        assert!(config.trip_service_url.is_none());
        assert_eq!(config.event_buffer, 1024);
        assert_eq!(config.emit_timeout, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.addr.port(), 3000);
    }

    #[rstest]
    #[case::missing(&[])]
    #[case::placeholder(&[("TRIPCHAT_JWT_SECRET", "dev-secret-change-me")])]
    #[case::short_in_production(&[("TRIPCHAT_ENV", "production"), ("TRIPCHAT_JWT_SECRET", "only-twenty-bytes-xx")])]
    #[case::bad_env(&[("TRIPCHAT_ENV", "staging"), ("TRIPCHAT_JWT_SECRET", "whatever-secret")])]
    #[case::bad_port(&[("TRIPCHAT_JWT_SECRET", "whatever-secret"), ("TRIPCHAT_PORT", "http")])]
    #[case::bad_url(&[("TRIPCHAT_JWT_SECRET", "whatever-secret"), ("TRIPCHAT_TRIP_SERVICE_URL", "not a url")])]
    fn rejects_bad_config(#[case] pairs: &[(&str, &str)]) {
        assert!(load(pairs).is_err());
    }

    #[test]
    fn production_accepts_long_secret() {
        let secret = "p".repeat(MIN_PRODUCTION_SECRET_LEN);
        let config = load(&[
            ("TRIPCHAT_ENV", "production"),
            ("TRIPCHAT_JWT_SECRET", &secret),
            ("TRIPCHAT_JWT_ROTATION_SECS", "0"),
            ("TRIPCHAT_TRIP_SERVICE_URL", "http://trips.internal/api/"),
        ])
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(config.rotation_period.is_none());
        assert_eq!(
            config.trip_service_url.map(|u| u.to_string()),
            Some("http://trips.internal/api/".to_string())
        );
    }
}
