//! Conversational query session
//!
//! One chat transcript over the user's transactions. Submissions are
//! serialized: while an exchange is pending, new questions are rejected
//! rather than queued. Exchanges are only ever appended, so transcript
//! order is both submission and completion order.

use crate::client::DashboardBackend;
use crate::error::DashboardError;
use crate::models::{AskRagRequest, AskRagResponse, Provider, Source};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeState {
    Pending,
    Settled,
    Failed,
}

/// One question and its answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub exchange_id: Uuid,
    /// Trimmed, never empty.
    pub question: String,
    pub requested_provider: Provider,
    pub answer: Option<String>,
    /// Provider the backend says answered, which may differ from the one requested.
    pub provider: Option<String>,
    pub sources: Vec<Source>,
    pub state: ExchangeState,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Exchange {
    fn pending(question: String, provider: Provider) -> Self {
        Self {
            exchange_id: Uuid::new_v4(),
            question,
            requested_provider: provider,
            answer: None,
            provider: None,
            sources: Vec::new(),
            state: ExchangeState::Pending,
            error: None,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ExchangeState::Pending
    }

    /// Pending → Settled. Finished exchanges never change again.
    fn settle(&mut self, response: AskRagResponse) {
        if !self.is_pending() {
            return;
        }
        self.answer = Some(response.answer);
        self.provider = Some(response.provider);
        self.sources = response.sources;
        self.state = ExchangeState::Settled;
        self.completed_at = Some(Utc::now());
    }

    /// Pending → Failed. The question stays for a manual resubmit.
    fn fail(&mut self, error: &DashboardError) {
        if !self.is_pending() {
            return;
        }
        self.error = Some(error.user_message());
        self.state = ExchangeState::Failed;
        self.completed_at = Some(Utc::now());
    }
}

/// Chat session over one backend
#[derive(Clone)]
pub struct ConversationSession {
    backend: Arc<dyn DashboardBackend>,
    exchanges: Arc<RwLock<Vec<Exchange>>>,
}

impl ConversationSession {
    pub fn new(backend: Arc<dyn DashboardBackend>) -> Self {
        Self {
            backend,
            exchanges: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Whether `submit` would accept `question` right now. Drives the
    /// disabled state of the send action.
    pub async fn can_submit(&self, question: &str) -> bool {
        !question.trim().is_empty() && self.pending().await.is_none()
    }

    /// Ask `question` with `provider` and wait for the exchange to finish.
    ///
    /// Rejected with `Validation` for a blank question and with
    /// `SubmissionPending` while another exchange is in flight; neither
    /// touches the transcript. Backend failures are not errors here: they
    /// come back as a `Failed` exchange.
    pub async fn submit(&self, question: &str, provider: Provider) -> Result<Exchange> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DashboardError::Validation(
                "question must not be empty".to_string(),
            ));
        }

        let exchange_id = {
            let mut exchanges = self.exchanges.write().await;
            if exchanges.iter().any(Exchange::is_pending) {
                warn!("Submission rejected, an exchange is still pending");
                return Err(DashboardError::SubmissionPending);
            }

            let exchange = Exchange::pending(question.to_string(), provider);
            let exchange_id = exchange.exchange_id;
            exchanges.push(exchange);
            exchange_id
        };

        info!(%exchange_id, %provider, "Submitting question");

        let request = AskRagRequest {
            question: question.to_string(),
            provider: Some(provider),
        };

        // Runs detached so a dropped caller cannot strand a pending exchange.
        let backend = self.backend.clone();
        let exchanges = self.exchanges.clone();
        let task = tokio::spawn(async move {
            let outcome = backend.ask_rag(&request).await;
            Self::complete(&exchanges, exchange_id, outcome).await
        });

        match task.await {
            Ok(exchange) => exchange,
            Err(join_error) => {
                let error = DashboardError::Internal(format!("answer task failed: {}", join_error));
                Self::complete(&self.exchanges, exchange_id, Err(error)).await
            }
        }
    }

    async fn complete(
        exchanges: &RwLock<Vec<Exchange>>,
        exchange_id: Uuid,
        outcome: Result<AskRagResponse>,
    ) -> Result<Exchange> {
        let mut exchanges = exchanges.write().await;
        let exchange = exchanges
            .iter_mut()
            .rev()
            .find(|e| e.exchange_id == exchange_id)
            .ok_or_else(|| DashboardError::Internal(format!("exchange {} vanished", exchange_id)))?;

        match outcome {
            Ok(response) => {
                info!(
                    %exchange_id,
                    provider = %response.provider,
                    sources = response.sources.len(),
                    "Answer received"
                );
                exchange.settle(response);
            }
            Err(error) => {
                warn!(%exchange_id, "Question failed: {}", error);
                exchange.fail(&error);
            }
        }

        Ok(exchange.clone())
    }

    pub async fn pending(&self) -> Option<Exchange> {
        let exchanges = self.exchanges.read().await;
        exchanges.iter().find(|e| e.is_pending()).cloned()
    }

    /// Ordered copy of every exchange so far
    pub async fn transcript(&self) -> Vec<Exchange> {
        self.exchanges.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.exchanges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.exchanges.read().await.is_empty()
    }

    /// Plain-text rendering of the transcript
    pub async fn formatted_transcript(&self) -> String {
        let exchanges = self.exchanges.read().await;
        let mut text = String::new();

        for exchange in exchanges.iter() {
            text.push_str(&format!(
                "[{}] Q: {}\n",
                exchange.submitted_at.format("%H:%M:%S"),
                exchange.question
            ));

            match exchange.state {
                ExchangeState::Pending => text.push_str("A: ...\n"),
                ExchangeState::Settled => {
                    let provider = exchange
                        .provider
                        .as_deref()
                        .and_then(|p| p.parse::<Provider>().ok())
                        .map(|p| p.label().to_string())
                        .or_else(|| exchange.provider.clone())
                        .unwrap_or_default();
                    text.push_str(&format!(
                        "A: {}\n   ({} | {} source(s))\n",
                        exchange.answer.as_deref().unwrap_or_default(),
                        provider,
                        exchange.sources.len()
                    ));
                }
                ExchangeState::Failed => text.push_str(&format!(
                    "Error: {}\n",
                    exchange.error.as_deref().unwrap_or("unknown error")
                )),
            }
            text.push('\n');
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;
    use std::sync::atomic::Ordering;
    use tokio_test::assert_err;

    async fn wait_for_pending(session: &ConversationSession) {
        while session.pending().await.is_none() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn settles_with_server_answer() {
        let backend = Arc::new(ScriptedBackend::new());
        let session = ConversationSession::new(backend.clone());

        let exchange = session.submit("  ¿Cuánto gasté?  ", Provider::Local).await.unwrap();

        assert_eq!(exchange.state, ExchangeState::Settled);
        assert_eq!(exchange.question, "¿Cuánto gasté?");
        assert_eq!(exchange.answer.as_deref(), Some("Respuesta a: ¿Cuánto gasté?"));
        assert_eq!(exchange.provider.as_deref(), Some("local"));
        assert_eq!(exchange.sources.len(), 1);
        assert!(exchange.completed_at.is_some());

        let sent = backend.last_ask.lock().unwrap().clone().unwrap();
        assert_eq!(sent.question, "¿Cuánto gasté?");
        assert_eq!(sent.provider, Some(Provider::Local));

        assert_eq!(session.len().await, 1);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let session = ConversationSession::new(backend.clone());

        let err = assert_err!(session.submit("   ", Provider::Local).await);
        assert!(matches!(err, DashboardError::Validation(_)));
        assert!(session.is_empty().await);
        assert!(!session.can_submit("\t").await);
        assert_eq!(backend.ask_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_submit_while_pending_is_rejected() {
        let (backend, gate) = ScriptedBackend::gated();
        let backend = Arc::new(backend);
        let session = ConversationSession::new(backend.clone());

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.submit("¿Cuánto gasté?", Provider::Local).await }
        });
        wait_for_pending(&session).await;

        assert!(!session.can_submit("otra pregunta").await);
        let err = assert_err!(session.submit("otra pregunta", Provider::Local).await);
        assert!(matches!(err, DashboardError::SubmissionPending));
        assert_eq!(session.len().await, 1);

        gate.notify_one();
        let settled = first.await.unwrap().unwrap();
        assert_eq!(settled.state, ExchangeState::Settled);
        assert_eq!(backend.ask_calls.load(Ordering::SeqCst), 1);

        assert!(session.can_submit("otra pregunta").await);
    }

    #[tokio::test]
    async fn failure_is_recorded_inline_and_resubmit_appends() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.ask_fails.store(true, Ordering::SeqCst);
        let session = ConversationSession::new(backend.clone());

        let failed = session.submit("¿Mayores ingresos?", Provider::OpenAi).await.unwrap();
        assert_eq!(failed.state, ExchangeState::Failed);
        assert_eq!(failed.error.as_deref(), Some("vector store offline"));
        assert_eq!(failed.question, "¿Mayores ingresos?");
        assert!(failed.answer.is_none());

        backend.ask_fails.store(false, Ordering::SeqCst);
        let retried = session.submit(&failed.question, Provider::OpenAi).await.unwrap();
        assert_eq!(retried.state, ExchangeState::Settled);

        let transcript = session.transcript().await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].state, ExchangeState::Failed);
        assert_eq!(transcript[1].exchange_id, retried.exchange_id);
        assert_eq!(backend.ask_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn records_provider_fallback() {
        let backend = Arc::new(ScriptedBackend::new());
        *backend.fallback_provider.lock().unwrap() = Some("local".to_string());
        let session = ConversationSession::new(backend);

        let exchange = session.submit("Analiza mis gastos", Provider::Anthropic).await.unwrap();
        assert_eq!(exchange.requested_provider, Provider::Anthropic);
        assert_eq!(exchange.provider.as_deref(), Some("local"));

        let text = session.formatted_transcript().await;
        assert!(text.contains("Q: Analiza mis gastos"));
        assert!(text.contains("Ollama (Local)"));
    }

    #[tokio::test]
    async fn dropped_caller_still_settles() {
        let (backend, gate) = ScriptedBackend::gated();
        let session = ConversationSession::new(Arc::new(backend));

        let caller = tokio::spawn({
            let session = session.clone();
            async move { session.submit("¿Cuánto gasté?", Provider::Local).await }
        });
        wait_for_pending(&session).await;
        caller.abort();

        gate.notify_one();
        while session.pending().await.is_some() {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.transcript().await[0].state, ExchangeState::Settled);
    }
}
