use std::{
    process,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use kasha::{
    application::{
        bus::WorkerBus,
        coordinator::{CoordinatorConfig, RenderCoordinator},
        janitor::CacheJanitor,
        pending::PendingRenders,
        repos::{SiteConfigRepo, SnapshotsRepo},
        sitemap::SitemapService,
        sites::SiteConfigResolver,
    },
    config,
    infra::{
        bus::{RedisWorkerBus, run_reply_pump},
        db::PostgresStore,
        error::InfraError,
        http::{GatewayState, ModeSettings, build_router},
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
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

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| InfraError::configuration(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Some(config::Command::Serve(_)) | None => run_serve(settings).await,
    }
}

/// Shutdown phases. Transitions are monotonic and idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Phase {
    Running = 0,
    Draining = 1,
    Closing = 2,
    Closed = 3,
}

#[derive(Clone)]
struct Lifecycle(Arc<AtomicU8>);

impl Lifecycle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(Phase::Running as u8)))
    }

    fn advance(&self, phase: Phase) {
        let previous = self.0.fetch_max(phase as u8, Ordering::SeqCst);
        if previous < phase as u8 {
            info!(target = "kasha::lifecycle", phase = ?phase, "lifecycle transition");
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), InfraError> {
    let instance = Uuid::new_v4();
    let lifecycle = Lifecycle::new();

    // Snapshot store
    let store_url = store_connection_url(&settings.store)?;
    let pool = PostgresStore::connect(&store_url, settings.store.pool_size.get())
        .await
        .map_err(|err| InfraError::store(err.to_string()))?;
    PostgresStore::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::store(err.to_string()))?;
    let store = Arc::new(PostgresStore::new(pool));

    // Worker bus
    let bus = Arc::new(
        RedisWorkerBus::connect(&settings.bus.writer, instance)
            .await
            .map_err(|err| InfraError::bus(err.to_string()))?,
    );

    let snapshots: Arc<dyn SnapshotsRepo> = store.clone();
    let site_repo: Arc<dyn SiteConfigRepo> = store.clone();

    let pending = Arc::new(PendingRenders::new(settings.worker.timeout));
    let coordinator = Arc::new(RenderCoordinator::new(
        snapshots.clone(),
        bus.clone(),
        pending.clone(),
        CoordinatorConfig {
            maxage: settings.cache.maxage,
            s_maxage: settings.cache.s_maxage,
            worker_timeout: settings.worker.timeout,
            callback_attempt_timeout: settings.callback.attempt_timeout,
        },
    ));
    let sites = Arc::new(SiteConfigResolver::new(
        site_repo,
        settings.site_config.ttl,
        settings.site_config.lookup_timeout,
    ));
    let sitemaps = Arc::new(SitemapService::new(snapshots.clone(), settings.cache.sitemap));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Reply pump: bus replies land in the pending registry via the coordinator.
    let pump_handle = tokio::spawn(run_reply_pump(
        settings.bus.reader.clone(),
        bus.reply_topic().to_string(),
        coordinator.clone(),
        shutdown_rx.clone(),
    ));

    // Pending sweep: resolves renders whose worker never answered.
    let sweeper_handle = {
        let pending = pending.clone();
        let mut shutdown = shutdown_rx.clone();
        let cadence = (settings.worker.timeout / 4).max(std::time::Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let swept = pending.sweep_expired();
                        if swept > 0 {
                            warn!(target = "kasha::coordinator", swept, "render jobs timed out");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        })
    };

    let janitor = CacheJanitor::new(
        snapshots.clone(),
        settings.cache.remove_after,
        format!("kasha-{instance}"),
    );
    info!(
        target = "kasha::janitor",
        interval_secs = janitor.interval().as_secs(),
        "janitor scheduled"
    );
    let janitor_handle = tokio::spawn(janitor.run(shutdown_rx.clone()));

    let state = GatewayState {
        coordinator,
        sitemaps,
        sites,
        snapshots,
        store: Some(store.clone()),
        mode: Arc::new(ModeSettings {
            api_hosts: settings.server.api_hosts.iter().cloned().collect(),
            enable_homepage: settings.server.enable_homepage,
            disallow_unknown_site: settings.server.disallow_unknown_site,
        }),
        cache: settings.cache,
    };

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::Io)?;
    info!(
        target = "kasha::server",
        addr = %settings.server.addr,
        instance = %instance,
        "gateway listening"
    );

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let router = build_router(state);
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.await;
            })
            .await
    });

    wait_for_signal().await;

    // Draining: stop accepting, let in-flight requests finish within grace.
    lifecycle.advance(Phase::Draining);
    let _ = drain_tx.send(());
    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server_handle).await {
        Ok(joined) => {
            joined
                .map_err(|err| InfraError::configuration(format!("server task failed: {err}")))?
                .map_err(InfraError::Io)?;
        }
        Err(_elapsed) => {
            warn!(
                target = "kasha::lifecycle",
                "grace period expired; aborting in-flight requests"
            );
            server_handle.abort();
        }
    }

    // Closing: bus subscription first, then the snapshot client, then the
    // janitor.
    lifecycle.advance(Phase::Closing);
    let _ = shutdown_tx.send(true);
    let _ = pump_handle.await;
    store.close().await;
    let _ = janitor_handle.await;
    let _ = sweeper_handle.await;

    lifecycle.advance(Phase::Closed);
    info!(target = "kasha::lifecycle", "gateway stopped");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable; relying on ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Compose the store connection URL, appending the configured database when
/// the URL does not already name one.
fn store_connection_url(store: &config::StoreSettings) -> Result<String, InfraError> {
    let raw = store
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("store.url is not configured"))?;

    let mut url = url::Url::parse(raw)
        .map_err(|err| InfraError::configuration(format!("invalid store.url: {err}")))?;
    if matches!(url.path(), "" | "/") && !store.database.is_empty() {
        url.set_path(&store.database);
    }
    Ok(url.into())
}
