use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use courtwatch::api::{self, AppState};
use courtwatch::config::Config;
use courtwatch::engine::{AvailabilityCheck, Watcher};
use courtwatch::fetch::{self, HttpSlotFetcher};
use courtwatch::notify::TelegramSink;
use courtwatch::page::{HttpPageSource, PageCheck, PageCondition};
use courtwatch::scheduler;
use courtwatch::status::FileStatusReporter;
use courtwatch::store::JsonAlertStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    courtwatch::observability::init(config.metrics_port)?;

    // One client for every outbound request, dropped at shutdown.
    let client = fetch::http_client()?;
    let store = Arc::new(JsonAlertStore::open(&config.data_dir).await?);
    let sink = Arc::new(TelegramSink::new(
        client.clone(),
        &config.telegram_bot_token,
        &config.telegram_chat_id,
    ));
    let reporter = Arc::new(FileStatusReporter::new(&config.data_dir));

    let mut watcher = Watcher::new(store.clone(), sink, reporter, config.check_interval);
    if let Some(page) = &config.page {
        watcher = watcher.with_page(PageCheck {
            url: page.url.clone(),
            condition: page
                .condition_text
                .clone()
                .map_or(PageCondition::Unconfigured, PageCondition::TextPresent),
            source: Arc::new(HttpPageSource::new(client.clone(), page.timeout)),
        });
    }
    if let Some(avail) = &config.availability {
        watcher = watcher.with_availability(AvailabilityCheck {
            fetcher: Arc::new(HttpSlotFetcher::new(
                client.clone(),
                &avail.slot_api_url,
                avail.fetch_timeout,
            )),
            facility_id: avail.facility_id.clone(),
            booking_url: avail.booking_url.clone(),
            fetch_timeout: avail.fetch_timeout,
            standing: avail.standing.clone(),
        });
    }

    info!("courtwatch starting");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  page check: {}", config.page.as_ref().map_or("disabled", |p| p.url.as_str()));
    info!(
        "  availability check: {}",
        config
            .availability
            .as_ref()
            .map_or("disabled".to_string(), |a| format!("facility {}", a.facility_id))
    );
    info!("  api: http://{}", config.http_bind);

    let shutdown = CancellationToken::new();

    let listener = TcpListener::bind(config.http_bind).await?;
    let api_state = Arc::new(AppState {
        store: store.clone(),
        data_dir: config.data_dir.clone(),
    });
    let api_task = tokio::spawn(api::serve(listener, api_state, shutdown.clone()));

    tokio::spawn(cancel_on_signal(shutdown.clone()));

    watcher.announce_start().await;
    scheduler::run_watcher(watcher, shutdown.clone(), config.shutdown_grace).await;

    shutdown.cancel();
    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("api server error: {e}"),
        Err(e) => tracing::warn!("api task failed: {e}"),
    }

    info!("courtwatch stopped");
    Ok(())
}

/// Cancel `token` on ctrl-c or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received");
    token.cancel();
}
