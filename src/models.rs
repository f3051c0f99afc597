//! Wire models for the analytics backend

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::DashboardError;

//
// ================= Enums =================
//

/// Answer/insight generation engine selectable by the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Local,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Human-facing name used next to answers and insights.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Local => "Ollama (Local)",
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic Claude",
        }
    }
}

impl FromStr for Provider {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Provider::Local),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(DashboardError::Validation(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

/// Display class of the pipeline's last reported status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineRunState {
    Success,
    Running,
    Other(String),
    Unknown,
}

//
// ================= Pipeline Status =================
//

/// `GET /status/pipeline`. Every field may be null when the pipeline has
/// never run; a null-filled payload is still a successful fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineStatus {
    #[serde(default)]
    pub last_run_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub records_processed: Option<u64>,
}

impl PipelineStatus {
    /// Last run converted to the local zone. Accepts RFC 3339 and naive
    /// ISO-8601 timestamps; naive ones are read as UTC.
    pub fn last_run_local(&self) -> Option<DateTime<Local>> {
        let raw = self.last_run_date.as_deref()?.trim();

        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Local));
        }

        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).with_timezone(&Local))
    }

    pub fn run_state(&self) -> PipelineRunState {
        match self.status.as_deref() {
            None => PipelineRunState::Unknown,
            Some(s) if s.eq_ignore_ascii_case("success") => PipelineRunState::Success,
            Some(s) if s.eq_ignore_ascii_case("running") => PipelineRunState::Running,
            Some(s) => PipelineRunState::Other(s.to_string()),
        }
    }
}

//
// ================= KPI Metrics =================
//

/// Category → amount mapping that keeps the backend's key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryAmounts(pub Vec<(String, f64)>);

impl CategoryAmounts {
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, v)| *v).sum()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for CategoryAmounts {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<'de> Deserialize<'de> for CategoryAmounts {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Map<String, Value>>::deserialize(deserializer)?;

        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(|(category, amount)| (category, amount.as_f64().unwrap_or(0.0)))
            .collect())
    }
}

impl Serialize for CategoryAmounts {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (category, amount) in &self.0 {
            map.serialize_entry(category, amount)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountTotal {
    #[serde(default)]
    pub account_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyTrend {
    #[serde(default)]
    pub month: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inflow: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub outflow: f64,
}

/// `GET /analytics/kpis`. Missing or null fields read as zero / empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KpiMetrics {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_moved_month: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_savings_inflow: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_outflow_month: f64,
    #[serde(default)]
    pub category_distribution: CategoryAmounts,
    #[serde(default)]
    pub spending_by_category: CategoryAmounts,
    #[serde(default, deserialize_with = "null_as_default")]
    pub top_inflow_accounts: Vec<AccountTotal>,
    /// Chronologically ascending, as sent by the backend.
    #[serde(default, deserialize_with = "null_as_default")]
    pub monthly_trend: Vec<MonthlyTrend>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

//
// ================= LLM =================
//

/// `GET /llm/generate_insight`. Only the latest one is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    #[serde(rename = "insight")]
    pub text: String,
    pub provider: String,
}

/// Body of `POST /llm/ask_rag`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AskRagRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AskRagResponse {
    pub answer: String,
    /// Provider that actually answered; the backend may fall back.
    pub provider: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

//
// ================= Model Config =================
//

/// `GET /config/model`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub current_provider: String,
    #[serde(default)]
    pub available_providers: Vec<String>,
}

impl ModelConfig {
    /// Reported providers this client knows how to select, in backend order.
    /// Names outside the closed set are dropped.
    pub fn known_providers(&self) -> Vec<Provider> {
        let mut known = Vec::with_capacity(self.available_providers.len());
        for name in &self.available_providers {
            if let Ok(provider) = name.parse::<Provider>() {
                if !known.contains(&provider) {
                    known.push(provider);
                }
            }
        }
        known
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_wire_names() {
        assert_eq!(serde_json::to_value(Provider::OpenAi).unwrap(), json!("openai"));
        assert_eq!("Anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("gemini".parse::<Provider>().is_err());
        assert_eq!(Provider::default(), Provider::Local);
    }

    #[test]
    fn null_pipeline_status_is_a_value() {
        let status: PipelineStatus = serde_json::from_value(json!({
            "last_run_date": null,
            "status": null,
            "records_processed": null
        }))
        .unwrap();

        assert_eq!(status, PipelineStatus::default());
        assert_eq!(status.run_state(), PipelineRunState::Unknown);
        assert!(status.last_run_local().is_none());
    }

    #[test]
    fn pipeline_timestamps_parse_with_and_without_zone() {
        let zoned = PipelineStatus {
            last_run_date: Some("2024-03-01T10:15:00+00:00".to_string()),
            status: Some("success".to_string()),
            records_processed: Some(1200),
        };
        let naive = PipelineStatus {
            last_run_date: Some("2024-03-01T10:15:00.123456".to_string()),
            ..zoned.clone()
        };

        let a = zoned.last_run_local().unwrap().with_timezone(&Utc);
        let b = naive.last_run_local().unwrap().with_timezone(&Utc);
        assert_eq!(a.timestamp(), b.timestamp());
        assert_eq!(zoned.run_state(), PipelineRunState::Success);
    }

    #[test]
    fn kpis_keep_category_order_and_default_missing_fields() {
        let kpis: KpiMetrics = serde_json::from_str(
            r#"{
                "total_moved_month": 1000,
                "spending_by_category": {"Transporte": 10, "Alimentos": 10, "Ocio": "n/a"},
                "monthly_trend": null
            }"#,
        )
        .unwrap();

        let order: Vec<&str> = kpis.spending_by_category.iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["Transporte", "Alimentos", "Ocio"]);
        assert_eq!(kpis.spending_by_category.0[2].1, 0.0);
        assert_eq!(kpis.total_outflow_month, 0.0);
        assert!(kpis.monthly_trend.is_empty());
        assert!(kpis.category_distribution.is_empty());
    }

    #[test]
    fn ask_request_omits_missing_provider() {
        let body = serde_json::to_value(AskRagRequest {
            question: "¿Cuánto gasté?".to_string(),
            provider: None,
        })
        .unwrap();
        assert_eq!(body, json!({"question": "¿Cuánto gasté?"}));
    }

    #[test]
    fn model_config_drops_unknown_providers() {
        let config = ModelConfig {
            current_provider: "local".to_string(),
            available_providers: vec![
                "local".to_string(),
                "gemini".to_string(),
                "anthropic".to_string(),
            ],
        };
        assert_eq!(
            config.known_providers(),
            vec![Provider::Local, Provider::Anthropic]
        );
    }
}
