//! Runtime configuration
//!
//! Read from the environment (and `.env` when present). The base URL and the
//! per-resource poll intervals are never hardcoded in the components.

use crate::error::DashboardError;
use crate::models::Provider;
use crate::Result;
use std::env;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub status_interval: Duration,
    pub kpi_interval: Duration,
    pub insight_interval: Duration,
    /// Transport-level timeout handed to the HTTP client.
    pub http_timeout: Duration,
    pub default_provider: Provider,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            status_interval: Duration::from_secs(30),
            kpi_interval: Duration::from_secs(60),
            insight_interval: Duration::from_secs(300),
            http_timeout: Duration::from_secs(30),
            default_provider: Provider::Local,
        }
    }
}

impl DashboardConfig {
    /// Load `.env`, then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("DASHBOARD_API_URL")
            .or_else(|| lookup("NEXT_PUBLIC_API_URL"))
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(defaults.api_base_url)
            .trim()
            .trim_end_matches('/')
            .to_string();

        let default_provider = match lookup("DEFAULT_PROVIDER") {
            Some(raw) => raw
                .parse::<Provider>()
                .map_err(|e| DashboardError::Config(format!("DEFAULT_PROVIDER: {}", e)))?,
            None => defaults.default_provider,
        };

        let config = Self {
            api_base_url,
            status_interval: secs(&lookup, "STATUS_POLL_SECS", defaults.status_interval)?,
            kpi_interval: secs(&lookup, "KPI_POLL_SECS", defaults.kpi_interval)?,
            insight_interval: secs(&lookup, "INSIGHT_POLL_SECS", defaults.insight_interval)?,
            http_timeout: secs(&lookup, "HTTP_TIMEOUT_SECS", defaults.http_timeout)?,
            default_provider,
        };

        info!(
            api = %config.api_base_url,
            status_secs = config.status_interval.as_secs(),
            kpi_secs = config.kpi_interval.as_secs(),
            insight_secs = config.insight_interval.as_secs(),
            "Dashboard configuration loaded"
        );

        Ok(config)
    }
}

fn secs<F>(lookup: &F, name: &str, fallback: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(fallback);
    };

    match raw.trim().parse::<u64>() {
        Ok(0) => Err(DashboardError::Config(format!("{} must be greater than zero", name))),
        Ok(value) => Ok(Duration::from_secs(value)),
        Err(_) => Err(DashboardError::Config(format!(
            "{} must be a whole number of seconds, got '{}'",
            name, raw
        ))),
    }
}
