//! Test doubles for the analytics backend: an in-process scripted backend
//! and a mock HTTP server.

use crate::client::DashboardBackend;
use crate::error::DashboardError;
use crate::models::{
    AskRagRequest, AskRagResponse, Insight, KpiMetrics, ModelConfig, PipelineStatus, Provider,
    Source,
};
use crate::Result;
use async_trait::async_trait;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn sample_kpis_json() -> Value {
    json!({
        "total_moved_month": 1000,
        "total_savings_inflow": 200,
        "total_outflow_month": 600,
        "category_distribution": {"Alimentos": 12, "Transporte": 6, "Ocio": 2},
        "spending_by_category": {"Alimentos": 300, "Transporte": 200, "Ocio": 100},
        "top_inflow_accounts": [
            {"account_id": "ACC-001", "total": 800},
            {"account_id": "ACC-002", "total": 200}
        ],
        "monthly_trend": [
            {"month": "2024-01-01", "inflow": 900, "outflow": 700},
            {"month": "2024-02-01", "inflow": 1000, "outflow": 600}
        ]
    })
}

pub fn sample_kpis() -> KpiMetrics {
    serde_json::from_value(sample_kpis_json()).expect("sample kpis are well-formed")
}

/// Start a mock backend on an ephemeral port and return its base URL.
pub async fn spawn_mock_backend() -> String {
    let router = Router::new()
        .route(
            "/status/pipeline",
            get(|| async {
                Json(json!({"last_run_date": null, "status": null, "records_processed": null}))
            }),
        )
        .route("/analytics/kpis", get(|| async { Json(sample_kpis_json()) }))
        .route("/llm/generate_insight", get(insight_handler))
        .route("/llm/ask_rag", post(ask_handler))
        .route(
            "/config/model",
            get(|| async {
                Json(json!({
                    "current_provider": "local",
                    "available_providers": ["local", "openai"]
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("mock backend address");

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    format!("http://{}", addr)
}

async fn insight_handler(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let provider = params
        .get("provider")
        .cloned()
        .unwrap_or_else(|| "local".to_string());
    Json(json!({
        "insight": format!("Resumen generado por {}", provider),
        "provider": provider
    }))
}

async fn ask_handler(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let question = body["question"].as_str().unwrap_or_default();
    if question == "fail" {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "Anthropic API key not configured"})),
        );
    }

    let provider = body["provider"].as_str().unwrap_or("local");
    (
        StatusCode::OK,
        Json(json!({
            "answer": format!("Respuesta a: {}", question),
            "provider": provider,
            "sources": [{"text": "2024-02-03 Supermercado 120.000", "metadata": {"category": "Alimentos"}}]
        })),
    )
}

/// In-process backend whose answers and failures are set by the test.
#[derive(Default)]
pub struct ScriptedBackend {
    pub kpis: Mutex<Option<KpiMetrics>>,
    pub model_config: Mutex<Option<ModelConfig>>,
    pub ask_gate: Option<Arc<Notify>>,
    pub ask_fails: AtomicBool,
    /// Provider echoed back instead of the requested one.
    pub fallback_provider: Mutex<Option<String>>,
    pub kpi_calls: AtomicUsize,
    pub ask_calls: AtomicUsize,
    pub last_ask: Mutex<Option<AskRagRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            kpis: Mutex::new(Some(sample_kpis())),
            model_config: Mutex::new(Some(ModelConfig {
                current_provider: "local".to_string(),
                available_providers: vec!["local".to_string(), "openai".to_string()],
            })),
            ..Self::default()
        }
    }

    /// Answers to `ask_rag` wait until the returned gate is notified.
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let backend = Self {
            ask_gate: Some(gate.clone()),
            ..Self::new()
        };
        (backend, gate)
    }
}

#[async_trait]
impl DashboardBackend for ScriptedBackend {
    async fn pipeline_status(&self) -> Result<PipelineStatus> {
        Ok(PipelineStatus::default())
    }

    async fn kpis(&self) -> Result<KpiMetrics> {
        self.kpi_calls.fetch_add(1, Ordering::SeqCst);
        self.kpis
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DashboardError::Network("kpis unavailable".to_string()))
    }

    async fn generate_insight(&self, provider: Provider) -> Result<Insight> {
        Ok(Insight {
            text: format!("Resumen generado por {}", provider),
            provider: provider.to_string(),
        })
    }

    async fn ask_rag(&self, request: &AskRagRequest) -> Result<AskRagResponse> {
        self.ask_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_ask.lock().unwrap() = Some(request.clone());

        if let Some(gate) = &self.ask_gate {
            gate.notified().await;
        }

        if self.ask_fails.load(Ordering::SeqCst) {
            return Err(DashboardError::Api {
                status: 500,
                detail: "vector store offline".to_string(),
            });
        }

        let provider = self
            .fallback_provider
            .lock()
            .unwrap()
            .clone()
            .or_else(|| request.provider.map(|p| p.to_string()))
            .unwrap_or_else(|| "local".to_string());

        Ok(AskRagResponse {
            answer: format!("Respuesta a: {}", request.question),
            provider,
            sources: vec![Source {
                text: "2024-02-03 Supermercado 120.000".to_string(),
                metadata: json!({"category": "Alimentos"}),
            }],
        })
    }

    async fn model_config(&self) -> Result<ModelConfig> {
        self.model_config
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DashboardError::Network("config unavailable".to_string()))
    }
}
