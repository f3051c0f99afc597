//! Dashboard composition root
//!
//! Wires the backend into one polling cache per resource type, the provider
//! selection and the chat session. Views subscribe to what they render and
//! read snapshots; the KPI cache is shared by every view that needs KPIs.

use crate::cache::{CachedEntry, Fetcher, PollingCache, ResourceKey, Subscription};
use crate::client::DashboardBackend;
use crate::config::DashboardConfig;
use crate::conversational::{ConversationSession, Exchange};
use crate::metrics::{self, KpiSummary};
use crate::models::{Insight, KpiMetrics, PipelineStatus, Provider};
use crate::provider::{self, ProviderSelection, SharedProviderSelection};
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Dashboard {
    backend: Arc<dyn DashboardBackend>,
    config: DashboardConfig,
    status: PollingCache<PipelineStatus>,
    kpis: PollingCache<KpiMetrics>,
    insights: PollingCache<Insight>,
    selection: SharedProviderSelection,
    session: ConversationSession,
}

impl Dashboard {
    pub fn new(backend: Arc<dyn DashboardBackend>, config: DashboardConfig) -> Self {
        let selection = provider::shared(ProviderSelection::new(config.default_provider));
        let session = ConversationSession::new(backend.clone());

        Self {
            backend,
            config,
            status: PollingCache::new(),
            kpis: PollingCache::new(),
            insights: PollingCache::new(),
            selection,
            session,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn selection(&self) -> SharedProviderSelection {
        self.selection.clone()
    }

    // =============================
    // Pipeline status
    // =============================

    pub async fn watch_status(&self) -> Subscription {
        let backend = self.backend.clone();
        let fetcher: Arc<dyn Fetcher<PipelineStatus>> = Arc::new(move || {
            let backend = backend.clone();
            async move { backend.pipeline_status().await }
        });
        self.status
            .subscribe(ResourceKey::pipeline_status(), fetcher, self.config.status_interval)
            .await
    }

    pub async fn status(&self) -> CachedEntry<PipelineStatus> {
        self.status.snapshot(&ResourceKey::pipeline_status()).await
    }

    pub async fn unwatch_status(&self, subscription: Subscription) {
        self.status.unsubscribe(subscription).await
    }

    // =============================
    // KPIs
    // =============================

    pub async fn watch_kpis(&self) -> Subscription {
        let backend = self.backend.clone();
        let fetcher: Arc<dyn Fetcher<KpiMetrics>> = Arc::new(move || {
            let backend = backend.clone();
            async move { backend.kpis().await }
        });
        self.kpis
            .subscribe(ResourceKey::kpis(), fetcher, self.config.kpi_interval)
            .await
    }

    pub async fn kpis(&self) -> CachedEntry<KpiMetrics> {
        self.kpis.snapshot(&ResourceKey::kpis()).await
    }

    /// Derived metrics over the current KPI value, stale or not. `None`
    /// until a first fetch has succeeded.
    pub async fn kpi_summary(&self) -> Option<KpiSummary> {
        self.kpis().await.value.as_ref().map(metrics::summarize)
    }

    pub async fn refresh_kpis(&self) {
        self.kpis.refresh(&ResourceKey::kpis()).await
    }

    pub async fn unwatch_kpis(&self, subscription: Subscription) {
        self.kpis.unsubscribe(subscription).await
    }

    // =============================
    // Insights
    // =============================

    pub async fn watch_insight(&self, provider: Provider) -> Subscription {
        let backend = self.backend.clone();
        let fetcher: Arc<dyn Fetcher<Insight>> = Arc::new(move || {
            let backend = backend.clone();
            async move { backend.generate_insight(provider).await }
        });
        self.insights
            .subscribe(ResourceKey::insight(provider), fetcher, self.config.insight_interval)
            .await
    }

    pub async fn insight(&self, provider: Provider) -> CachedEntry<Insight> {
        self.insights.snapshot(&ResourceKey::insight(provider)).await
    }

    /// "Generate new insight": an out-of-band fetch for that provider.
    pub async fn regenerate_insight(&self, provider: Provider) {
        self.insights.refresh(&ResourceKey::insight(provider)).await
    }

    pub async fn unwatch_insight(&self, subscription: Subscription) {
        self.insights.unsubscribe(subscription).await
    }

    // =============================
    // Providers & chat
    // =============================

    /// Record which providers the backend currently offers. A failure
    /// leaves the previous set in place.
    pub async fn sync_providers(&self) -> Result<Vec<Provider>> {
        match self.backend.model_config().await {
            Ok(config) => {
                let mut selection = self.selection.write().await;
                selection.observe(&config);
                Ok(selection.available().to_vec())
            }
            Err(error) => {
                warn!("Failed to load model config, keeping previous providers: {}", error);
                Err(error)
            }
        }
    }

    pub async fn current_provider(&self) -> Provider {
        self.selection.read().await.current()
    }

    pub async fn select_provider(&self, provider: Provider) -> bool {
        let accepted = self.selection.write().await.set_provider(provider);
        if accepted {
            info!(%provider, "Provider selected");
        }
        accepted
    }

    /// Ask with whatever provider is selected at submission time.
    pub async fn ask(&self, question: &str) -> Result<Exchange> {
        let provider = self.current_provider().await;
        self.session.submit(question, provider).await
    }
}
