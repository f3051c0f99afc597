use finance_dashboard_client::{
    client::ApiClient, config::DashboardConfig, dashboard::Dashboard, ExchangeState, Provider,
};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Usage: ask [--provider local|openai|anthropic] <question...>
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut requested: Option<Provider> = None;
    if args.first().map(String::as_str) == Some("--provider") {
        if args.len() < 2 {
            return Err("--provider needs a value".into());
        }
        requested = Some(args[1].parse()?);
        args.drain(..2);
    }
    let question = args.join(" ");

    let config = DashboardConfig::from_env()?;
    let client = Arc::new(ApiClient::from_config(&config)?);
    let dashboard = Dashboard::new(client, config);

    if let Err(e) = dashboard.sync_providers().await {
        warn!("Could not load available providers: {}", e);
    }
    if let Some(provider) = requested {
        if !dashboard.select_provider(provider).await {
            eprintln!(
                "⚠️  Provider '{}' is not available, using '{}'",
                provider,
                dashboard.current_provider().await
            );
        }
    }

    let exchange = dashboard.ask(&question).await?;

    match exchange.state {
        ExchangeState::Settled => {
            println!("{}", exchange.answer.unwrap_or_default());
            println!(
                "\n-- {} | {} source(s)",
                exchange.provider.unwrap_or_default(),
                exchange.sources.len()
            );
            Ok(())
        }
        _ => {
            let message = exchange.error.unwrap_or_else(|| "no answer".to_string());
            eprintln!("Error: {}", message);
            Err(message.into())
        }
    }
}
