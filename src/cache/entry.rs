//! Cache keys and the snapshots renderers read.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::error::DashboardError;
use crate::models::Provider;

/// Logical name of one pollable backend resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn pipeline_status() -> Self {
        Self::new("pipeline-status")
    }

    pub fn kpis() -> Self {
        Self::new("kpis")
    }

    /// One key per provider, so switching providers never mixes insights.
    pub fn insight(provider: Provider) -> Self {
        Self(format!("insight:{}", provider))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

/// Point-in-time view of one cached resource.
///
/// `value` stays `None` until the first success; a failed refresh after that
/// keeps the previous value alongside `last_error`.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    pub value: Option<T>,
    pub status: FetchStatus,
    pub last_error: Option<Arc<DashboardError>>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// A fetch is in flight, including background refetches while `Ready`.
    pub is_fetching: bool,
}

impl<T> Default for CachedEntry<T> {
    fn default() -> Self {
        Self {
            value: None,
            status: FetchStatus::Idle,
            last_error: None,
            fetched_at: None,
            is_fetching: false,
        }
    }
}

/// A render that shows the last good value while the latest fetch failed.
/// Not a failure in itself.
#[derive(Debug, Clone)]
pub struct StaleDataWarning {
    pub last_error: Arc<DashboardError>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl fmt::Display for StaleDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fetched_at {
            Some(at) => write!(
                f,
                "showing data from {} ({})",
                at.to_rfc3339(),
                self.last_error.user_message()
            ),
            None => write!(f, "showing cached data ({})", self.last_error.user_message()),
        }
    }
}

impl<T> CachedEntry<T> {
    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_ready(&self) -> bool {
        self.status == FetchStatus::Ready
    }

    pub fn is_stale(&self) -> bool {
        self.status == FetchStatus::Error && self.value.is_some()
    }

    pub fn stale_warning(&self) -> Option<StaleDataWarning> {
        if !self.is_stale() {
            return None;
        }
        self.last_error.clone().map(|last_error| StaleDataWarning {
            last_error,
            fetched_at: self.fetched_at,
        })
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.is_fetching = true;
        if self.value.is_none() {
            self.status = FetchStatus::Loading;
        }
    }

    pub(crate) fn apply(&mut self, outcome: crate::Result<T>) {
        self.is_fetching = false;
        match outcome {
            Ok(value) => {
                self.value = Some(value);
                self.status = FetchStatus::Ready;
                self.last_error = None;
                self.fetched_at = Some(Utc::now());
            }
            Err(error) => {
                self.status = FetchStatus::Error;
                self.last_error = Some(Arc::new(error));
            }
        }
    }
}
