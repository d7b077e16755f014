use std::{future::IntoFuture, process, sync::Arc};

use delivery_cache::{
    application::{error::AppError, sitemap::SitemapService},
    cache::{CacheConfig, CacheStore, DependencyIndex, InvalidationEngine, NotificationQueue},
    config,
    delivery::CachedDeliveryClient,
    infra::{
        delivery::HttpDeliveryClient,
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckConfig => {
            info!(
                target = "delivery_cache::config",
                addr = %settings.server.addr,
                endpoint = settings.delivery.endpoint(),
                preview = settings.delivery.preview_api_key.is_some(),
                "configuration is valid"
            );
            Ok(())
        }
    }
}

struct ApplicationContext {
    state: AppState,
    engine: Arc<InvalidationEngine>,
    store: CacheStore,
    config: CacheConfig,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let config = CacheConfig::from(&settings.cache);
    let client = Arc::new(HttpDeliveryClient::new(&settings.delivery)?);

    let index = Arc::new(DependencyIndex::default());
    let store = CacheStore::new(index, config.fetch_timeout());
    let queue = Arc::new(NotificationQueue::with_limit(config.queue_bound()));
    let engine = Arc::new(InvalidationEngine::new(
        config.clone(),
        store.clone(),
        queue,
    ));

    let delivery = CachedDeliveryClient::new(client, store.clone(), config.default_ttl());
    let sitemap = Arc::new(SitemapService::new(delivery.clone(), &settings.sitemap));

    Ok(ApplicationContext {
        state: AppState {
            delivery,
            engine: Arc::clone(&engine),
            sitemap,
        },
        engine,
        store,
        config,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    let mut background: Vec<JoinHandle<()>> = Vec::new();

    if let Some(period) = app.config.auto_consume_interval() {
        let engine = Arc::clone(&app.engine);
        background.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                if let Some(outcome) = engine.consume() {
                    debug!(
                        target = "delivery_cache::consume",
                        notifications = outcome.notifications,
                        purged = outcome.purged_entries,
                        "background consume"
                    );
                }
            }
        }));
    }

    if let Some(period) = app.config.sweep_interval() {
        let store = app.store.clone();
        background.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let swept = store.sweep_expired();
                if swept > 0 {
                    debug!(target = "delivery_cache::sweep", swept, "expired entries removed");
                }
            }
        }));
    }

    let result = serve_http(&settings, app.state).await;

    for handle in background {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::from(InfraError::Bind { addr, source }))?;

    info!(
        target = "delivery_cache::serve",
        %addr,
        endpoint = settings.delivery.endpoint(),
        "listening"
    );

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .into_future();
    tokio::pin!(server);

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            let _ = shutdown_rx.changed().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "delivery_cache::serve",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out, dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = "delivery_cache::serve", error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!(target = "delivery_cache::serve", "shutdown requested, draining connections");
}
