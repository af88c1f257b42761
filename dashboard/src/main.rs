use anyhow::Result;
use dashboard::render::{render_card, render_signals, render_summary};
use dashboard::{push, ApiClient, Poller, QueryCache, QueryKey, QuerySource, RetryPolicy};
use realtime::RealtimeClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn, Level};

/// Usage: dashboard [config.toml]
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("🚀 Starting Signal Dashboard");

    let config_path = std::env::args().nth(1);
    let config = common::load_config(config_path.as_deref())?;
    let settings = &config.dashboard;

    let cache = Arc::new(QueryCache::new());
    let source: Arc<dyn QuerySource> = Arc::new(ApiClient::new(settings.api_base_url.clone()));
    let retry = RetryPolicy::from_config(settings);

    let signals_every = Duration::from_secs(settings.signals_poll_secs.max(1));
    let analysis_every = Duration::from_secs(settings.analysis_poll_secs.max(1));

    let mut pollers = vec![Poller::new(QueryKey::Signals, signals_every, retry, cache.clone(), source.clone()).spawn()];
    for instrument in &settings.instruments {
        for key in [QueryKey::MarketAnalysis(*instrument), QueryKey::MarketRegime(*instrument)] {
            pollers.push(Poller::new(key, analysis_every, retry, cache.clone(), source.clone()).spawn());
        }
    }
    info!("✅ Started {} pollers against {}", pollers.len(), settings.api_base_url);

    let client = RealtimeClient::from_config(&config.notifier);
    let _subscriptions = push::attach(&client, cache.clone());
    if let Err(e) = client.connect().await {
        warn!("Push channel unavailable, polling only: {:#}", e);
    }

    let mut ticker = interval(Duration::from_secs(settings.render_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                push::ensure_connected(&client).await;
                println!("{}", render_screen(&cache, &settings.instruments));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("👋 Shutting down gracefully...");
                break;
            }
        }
    }

    client.disconnect().await;
    for poller in pollers {
        poller.abort();
    }
    Ok(())
}

fn render_screen(cache: &QueryCache, instruments: &[common::Instrument]) -> String {
    let signals = cache.state(QueryKey::Signals);
    let mut sections = vec![render_summary(&signals), render_signals(&signals)];
    for instrument in instruments {
        let analysis = cache.state(QueryKey::MarketAnalysis(*instrument));
        let regime = cache.state(QueryKey::MarketRegime(*instrument));
        sections.push(render_card(&format!("{} market analysis", instrument), &analysis, false));
        sections.push(render_card(&format!("{} market regime", instrument), &regime, false));
    }
    sections.join("\n")
}
