use finance_dashboard_client::{
    client::ApiClient,
    config::DashboardConfig,
    dashboard::Dashboard,
    metrics::KpiSummary,
    CachedEntry, FetchStatus, PipelineStatus,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Optional: number of refresh rounds before exiting (default: run forever)
    let rounds: Option<u64> = std::env::args().nth(1).map(|s| s.parse()).transpose()?;

    let config = DashboardConfig::from_env()?;
    let client = Arc::new(ApiClient::from_config(&config)?);

    info!("📊 Finance Dashboard");
    info!("📍 Backend: {}", client.base_url());

    let dashboard = Dashboard::new(client, config.clone());

    if let Err(e) = dashboard.sync_providers().await {
        warn!("Continuing with default provider: {}", e);
    }
    let provider = dashboard.current_provider().await;

    let status_sub = dashboard.watch_status().await;
    let kpi_sub = dashboard.watch_kpis().await;
    let insight_sub = dashboard.watch_insight(provider).await;

    let mut ticker = tokio::time::interval(config.status_interval);
    let mut round = 0u64;

    loop {
        ticker.tick().await;
        // Let the first fetches land before the first render.
        if round == 0 {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }

        println!("\n=== DASHBOARD ({}) ===", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        print_status(&dashboard.status().await);
        print_kpis(&dashboard.kpis().await, dashboard.kpi_summary().await);

        let insight = dashboard.insight(provider).await;
        match (&insight.value, insight.status) {
            (Some(value), _) => println!("\nInsight ({}):\n{}", value.provider, value.text),
            (None, FetchStatus::Error) => println!("\nInsight: error generating insight"),
            _ => println!("\nInsight: generating..."),
        }

        round += 1;
        if rounds.is_some_and(|limit| round >= limit) {
            break;
        }
    }

    dashboard.unwatch_status(status_sub).await;
    dashboard.unwatch_kpis(kpi_sub).await;
    dashboard.unwatch_insight(insight_sub).await;

    Ok(())
}

fn print_status(entry: &CachedEntry<PipelineStatus>) {
    println!("\nPipeline:");
    match &entry.value {
        Some(status) => {
            let last_run = status
                .last_run_local()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!("  Last run: {}", last_run);
            println!("  Status:   {}", status.status.as_deref().unwrap_or("unknown"));
            if let Some(records) = status.records_processed {
                println!("  Records:  {}", records);
            }
        }
        None if entry.status == FetchStatus::Error => println!("  error loading pipeline status"),
        None => println!("  loading..."),
    }
    if let Some(warning) = entry.stale_warning() {
        println!("  ⚠️  {}", warning);
    }
}

fn print_kpis(entry: &CachedEntry<finance_dashboard_client::KpiMetrics>, summary: Option<KpiSummary>) {
    println!("\nKPIs:");
    let Some(summary) = summary else {
        if entry.status == FetchStatus::Error {
            println!("  error loading KPIs");
        } else {
            println!("  loading...");
        }
        return;
    };

    println!("  Moved:    {:.2}", summary.total_moved);
    println!("  Outflow:  {:.2}", summary.total_outflow);
    println!("  Savings:  {:.2} (rate {:.1}%)", summary.total_savings, summary.savings_rate);
    println!(
        "  Net flow: {:.2} ({})",
        summary.net_flow.abs(),
        if summary.net_flow >= 0.0 { "surplus" } else { "deficit" }
    );

    if !summary.breakdown.is_empty() {
        println!("\n  Top spending:");
        for share in &summary.breakdown {
            println!("    {:<20} {:>12.0} {:>5.1}%", share.category, share.amount, share.percentage);
        }
    }

    println!(
        "\n  Monthly averages: in {:.2} / out {:.2} / net {:.2}",
        summary.averages.inflow, summary.averages.outflow, summary.averages.net
    );

    if let Some(warning) = entry.stale_warning() {
        println!("  ⚠️  {}", warning);
    }
}
