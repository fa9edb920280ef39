//! Environment-driven configuration.
//!
//! All knobs come from `WA_*` environment variables (loaded from `.env` by
//! the binary) with defaults that match a local WAHA-style gateway setup.

use chrono::FixedOffset;

use crate::error::{Error, Result};

/// Runtime configuration for the reminder engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Messaging gateway base URL, without a trailing slash.
    pub api_base: String,

    /// Send-text path appended to `api_base`.
    pub api_send_path: String,

    /// Gateway session identifier included in every send request.
    pub api_session: String,

    /// Path to the sqlite database file.
    pub database_path: String,

    /// Offset used to render schedule timestamps for humans. Storage is
    /// always UTC; this only affects message text and operator views.
    pub tz_offset: FixedOffset,

    /// Default reminder window length in days when a task does not set one.
    pub default_window_days: i64,

    /// Scheduler polling granularity in seconds.
    pub tick_seconds: u64,

    /// Bound on a single gateway call; a timeout counts as a failed send.
    pub gateway_timeout_secs: u64,

    /// Country calling code prepended to national phone numbers.
    pub default_country_code: String,

    /// Log filter passed to env_logger.
    pub log_level: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Policy(format!("invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Parse an offset like `+05:30` or `-08:00` into a `FixedOffset`.
fn parse_tz_offset(raw: &str) -> Result<FixedOffset> {
    let err = || Error::Policy(format!("invalid WA_TZ_OFFSET: {raw}"));
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1i32, &raw[1..]),
        Some(b'-') => (-1i32, &raw[1..]),
        _ => return Err(err()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(err)?;
    let hours: i32 = hours.parse().map_err(|_| err())?;
    let minutes: i32 = minutes.parse().map_err(|_| err())?;
    if hours > 14 || minutes > 59 {
        return Err(err());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(err)
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let api_base = env_or("WA_API_BASE", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            api_base,
            api_send_path: env_or("WA_API_SEND", "/api/sendText"),
            api_session: env_or("WA_API_SESSION", "default"),
            database_path: env_or("WA_DB_PATH", "wa_task_app.sqlite"),
            tz_offset: parse_tz_offset(&env_or("WA_TZ_OFFSET", "+05:30"))?,
            default_window_days: env_parsed("WA_DEFAULT_WINDOW_DAYS", 5)?,
            tick_seconds: env_parsed("WA_TICK_SECONDS", 30)?,
            gateway_timeout_secs: env_parsed("WA_GATEWAY_TIMEOUT_SECS", 20)?,
            default_country_code: env_or("WA_DEFAULT_COUNTRY_CODE", "91"),
            log_level: env_or("WA_LOG_LEVEL", "info"),
        })
    }

    /// Full URL for the gateway send-text endpoint.
    pub fn send_url(&self) -> String {
        format!("{}{}", self.api_base, self.api_send_path)
    }

    /// Fixed configuration for tests; never reads the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            api_base: "http://localhost:3000".to_string(),
            api_send_path: "/api/sendText".to_string(),
            api_session: "default".to_string(),
            database_path: ":memory:".to_string(),
            tz_offset: FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap(),
            default_window_days: 5,
            tick_seconds: 30,
            gateway_timeout_secs: 20,
            default_country_code: "91".to_string(),
            log_level: "info".to_string(),
        }
    }
}
