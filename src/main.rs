use std::{net::SocketAddr, process, sync::Arc};

use feedline::{
    application::{
        error::AppError,
        feed::FeedService,
        health::HealthService,
        repos::FeedItemsRepo,
    },
    cache::{
        CacheBackend, CacheBackendKind, CacheConfig, ConsumerConfig, EventLog, EvictOutcome,
        InvalidationConsumer, MemoryCacheBackend, ResponseCache,
    },
    config,
    infra::{
        cache::RedisCacheBackend,
        db::{DetachedStore, PostgresRepositories},
        error::InfraError,
        http::{self, ApiRateLimiter, HttpState},
        redis::open_client,
        stream::RedisEventLog,
        telemetry,
    },
};
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SOURCE: &str = "feedline::main";

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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Invalidate(args) => run_invalidate(settings, args).await,
    }
}

/// Background pieces that must be torn down after the listener drains.
struct Runtime {
    state: HttpState,
    repositories: Option<PostgresRepositories>,
    consumer: Option<Arc<InvalidationConsumer>>,
    background: Vec<JoinHandle<()>>,
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runtime = build_runtime(&settings, shutdown_rx).await?;

    if let Some(consumer) = &runtime.consumer {
        consumer.start().await;
    }

    let result = serve_http(&settings, runtime.state.clone(), &shutdown_tx).await;

    shutdown_tx.send_replace(true);
    if let Some(consumer) = &runtime.consumer
        && timeout(settings.server.graceful_shutdown, consumer.stop())
            .await
            .is_err()
    {
        warn!(
            target = SOURCE,
            timeout_secs = settings.server.graceful_shutdown.as_secs(),
            "invalidation consumer did not stop in time"
        );
    }
    for task in runtime.background {
        if let Err(err) = task.await {
            warn!(target = SOURCE, error = %err, "background task failed during shutdown");
        }
    }
    if let Some(repositories) = &runtime.repositories {
        repositories.close().await;
    }
    info!(target = SOURCE, "shutdown complete");

    result
}

async fn build_runtime(
    settings: &config::Settings,
    shutdown: watch::Receiver<bool>,
) -> Result<Runtime, AppError> {
    let mut background = Vec::new();

    let (repo, repositories): (Arc<dyn FeedItemsRepo>, Option<PostgresRepositories>) =
        match settings.database.url.as_deref() {
            Some(url) => {
                let pool = PostgresRepositories::connect_lazy(
                    url,
                    settings.database.max_connections.get(),
                    settings.database.acquire_timeout,
                )
                .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
                let repositories = PostgresRepositories::new(pool);
                (Arc::new(repositories.clone()), Some(repositories))
            }
            None => {
                warn!(
                    target = SOURCE,
                    "database url is not configured; feed requests will fail"
                );
                (Arc::new(DetachedStore), None)
            }
        };

    let cache_config = CacheConfig::from(&settings.cache);
    let backend: Arc<dyn CacheBackend> = match (cache_config.enabled, cache_config.backend) {
        (true, CacheBackendKind::Redis) => {
            let client = open_client(&settings.redis.url)?;
            let backend = Arc::new(RedisCacheBackend::new(
                client,
                settings.redis.connect_timeout,
            ));
            backend.connect().await;
            background.push(
                Arc::clone(&backend).spawn_probe(settings.redis.probe_interval, shutdown.clone()),
            );
            backend
        }
        _ => Arc::new(MemoryCacheBackend::new()),
    };
    let cache = ResponseCache::new(backend, &cache_config);

    let consumer = if settings.stream.enabled && cache_config.enabled {
        let client = open_client(&settings.redis.url)?;
        let log: Arc<dyn EventLog> = Arc::new(RedisEventLog::new(
            client,
            settings.redis.connect_timeout,
        ));
        Some(Arc::new(InvalidationConsumer::new(
            log,
            cache.clone(),
            ConsumerConfig::from(&settings.stream),
        )))
    } else {
        info!(target = SOURCE, "invalidation consumer disabled");
        None
    };

    let rate_limiter = Arc::new(ApiRateLimiter::new(
        std::time::Duration::from_secs(u64::from(settings.rate_limit.window_seconds.get())),
        settings.rate_limit.max_requests.get(),
    ));
    background.push(Arc::clone(&rate_limiter).spawn_pruner(shutdown));

    let feeds = FeedService::new(repo, cache);
    let health = HealthService::new(feeds.clone(), consumer.clone());

    Ok(Runtime {
        state: HttpState {
            feeds,
            health,
            rate_limiter,
        },
        repositories,
        consumer,
        background,
    })
}

async fn serve_http(
    settings: &config::Settings,
    state: HttpState,
    shutdown_tx: &watch::Sender<bool>,
) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = SOURCE, addr = %settings.server.addr, "listening");

    let mut drain = shutdown_tx.subscribe();
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = drain.wait_for(|stop| *stop).await;
    });
    let mut server = tokio::spawn(server.into_future());

    let finished_early = tokio::select! {
        joined = &mut server => Some(joined),
        () = shutdown_signal() => None,
    };

    let joined = match finished_early {
        Some(joined) => joined,
        None => {
            info!(target = SOURCE, "shutdown signal received; draining connections");
            shutdown_tx.send_replace(true);
            match timeout(settings.server.graceful_shutdown, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        target = SOURCE,
                        timeout_secs = settings.server.graceful_shutdown.as_secs(),
                        "graceful shutdown timed out; aborting open connections"
                    );
                    server.abort();
                    Ok(Ok(()))
                }
            }
        }
    };

    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = SOURCE, error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = SOURCE, error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn run_invalidate(
    settings: config::Settings,
    args: config::InvalidateArgs,
) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    if cache_config.backend != CacheBackendKind::Redis {
        return Err(AppError::validation(
            "invalidate requires the redis cache backend",
        ));
    }

    let client = open_client(&settings.redis.url)?;
    let backend = Arc::new(RedisCacheBackend::new(
        client,
        settings.redis.connect_timeout,
    ));
    if !backend.connect().await {
        return Err(AppError::from(InfraError::redis(
            "could not connect to the cache",
        )));
    }

    // Force-enable: an operator asked for this eviction explicitly.
    let cache = ResponseCache::new(
        backend,
        &CacheConfig {
            enabled: true,
            ..cache_config
        },
    );

    info!(target = SOURCE, prefix = %args.prefix, "evicting cached pages");
    match cache.evict_prefix(&args.prefix).await {
        EvictOutcome::Evicted(count) => {
            info!(target = SOURCE, prefix = %args.prefix, evicted = count, "eviction complete");
            Ok(())
        }
        EvictOutcome::Skipped => Err(AppError::from(InfraError::redis(
            "cache became unavailable before eviction",
        ))),
        EvictOutcome::Failed(message) => Err(AppError::unexpected(format!(
            "eviction failed: {message}"
        ))),
    }
}
