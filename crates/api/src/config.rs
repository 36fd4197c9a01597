//! Process configuration, read once from the environment at start-up.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value `{value}`")]
    Invalid { var: &'static str, value: String },
}

/// Timers of one dashboard pull session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardSettings {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub snapshot_timeout: Duration,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(14),
            snapshot_timeout: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub max_conflict_retries: u32,
    pub push_buffer: usize,
    pub dashboard: DashboardSettings,
    pub seed_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            database_url: None,
            max_conflict_retries: 5,
            push_buffer: 64,
            dashboard: DashboardSettings::default(),
            seed_file: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        Ok(Self {
            bind_addr: parse_or(get("BIND_ADDR"), "BIND_ADDR", defaults.bind_addr)?,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            max_conflict_retries: parse_or(
                get("TX_MAX_RETRIES"),
                "TX_MAX_RETRIES",
                defaults.max_conflict_retries,
            )?,
            push_buffer: positive(
                parse_or(get("PUSH_BUFFER"), "PUSH_BUFFER", defaults.push_buffer)?,
                "PUSH_BUFFER",
            )?,
            dashboard: DashboardSettings {
                poll_interval: millis(
                    get("DASHBOARD_POLL_MS"),
                    "DASHBOARD_POLL_MS",
                    defaults.dashboard.poll_interval,
                )?,
                heartbeat_interval: millis(
                    get("DASHBOARD_HEARTBEAT_MS"),
                    "DASHBOARD_HEARTBEAT_MS",
                    defaults.dashboard.heartbeat_interval,
                )?,
                snapshot_timeout: millis(
                    get("DASHBOARD_SNAPSHOT_TIMEOUT_MS"),
                    "DASHBOARD_SNAPSHOT_TIMEOUT_MS",
                    defaults.dashboard.snapshot_timeout,
                )?,
            },
            seed_file: get("SEED_FILE").map(PathBuf::from),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn positive(value: usize, var: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn millis(
    raw: Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let ms: u64 = parse_or(raw, var, default.as_millis() as u64)?;
    if ms == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: ms.to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}
