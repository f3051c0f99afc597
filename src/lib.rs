//! Finance Dashboard Client
//!
//! Client-side core of a financial-analytics dashboard:
//! - Polls pipeline status, KPIs and LLM insights through a shared,
//!   subscription-counted cache that deduplicates in-flight fetches
//! - Derives presentation-ready aggregates from raw KPI payloads
//! - Runs a serialized chat session against a selectable answer provider
//!
//! DATA FLOW:
//! BACKEND → POLLING CACHE → DERIVED METRICS → RENDERERS
//! SELECTION + QUESTION → SESSION → BACKEND → TRANSCRIPT

pub mod cache;
pub mod client;
pub mod config;
pub mod conversational;
pub mod dashboard;
pub mod error;
pub mod metrics;
pub mod models;
pub mod provider;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use cache::{CachedEntry, FetchStatus, PollingCache, ResourceKey, StaleDataWarning, Subscription};
pub use client::{ApiClient, DashboardBackend};
pub use config::DashboardConfig;
pub use conversational::{ConversationSession, Exchange, ExchangeState};
pub use dashboard::Dashboard;
pub use error::DashboardError;
