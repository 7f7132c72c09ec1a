//! Quillstream server entry point.

#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use fred::interfaces::ClientLike;
use fred::types::config::Config as RedisConfig;
use quillstream_api::{AppState, Dispatcher, router};
use quillstream_common::{Config, IdGenerator};
use quillstream_core::{ChannelGuard, JsonRenderer};
use quillstream_db::repositories::{
    AddressRepository, ChannelRepository, ChatMessageRepository, UserRepository, VoteRepository,
};
use quillstream_realtime::{
    AddressRegistry, ChatBuffer, Fanout, FanoutBridge, FanoutRouter, VoteEngine, WorkerConfig,
    WorkerContext, workers,
};
use sea_orm::{ConnectOptions, Database};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quillstream=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting quillstream server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let mut db_opts = ConnectOptions::new(&config.database.url);
    db_opts
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections);

    let db = Database::connect(db_opts).await?;
    info!("Connected to database");

    // Connect to Redis (cache tier)
    let redis_config = RedisConfig::from_url(&config.redis.url)?;
    let redis = fred::clients::Client::new(redis_config, None, None, None);
    redis.init().await?;
    let redis = Arc::new(redis);
    info!("Connected to Redis");

    // Fanout router, bridged across processes unless disabled
    let fanout_router = FanoutRouter::new();
    let bridge = if config.realtime.bridge_enabled {
        let bridge = FanoutBridge::connect(&config.redis.url).await?;
        bridge.start(Arc::clone(&fanout_router)).await?;
        Some(Arc::new(bridge))
    } else {
        None
    };
    let fanout = match &bridge {
        Some(bridge) => Fanout::bridged(Arc::clone(&fanout_router), Arc::clone(bridge)),
        None => Fanout::local_only(Arc::clone(&fanout_router)),
    };

    // Initialize repositories
    let db = Arc::new(db);
    let channel_repo = ChannelRepository::new(Arc::clone(&db));
    let chat_repo = ChatMessageRepository::new(Arc::clone(&db));
    let vote_repo = VoteRepository::new(Arc::clone(&db));
    let user_repo = UserRepository::new(Arc::clone(&db));
    let address_repo = AddressRepository::new(Arc::clone(&db));

    // Initialize the realtime services
    let renderer = Arc::new(JsonRenderer);
    let engine = VoteEngine::new(
        Arc::clone(&redis),
        vote_repo.clone(),
        fanout.clone(),
        renderer.clone(),
    );
    let chat = ChatBuffer::new(
        Arc::clone(&redis),
        chat_repo,
        user_repo.clone(),
        config.realtime.message_cache_len,
        config.realtime.dedup_retention(),
    );
    let addresses = AddressRegistry::new(Arc::clone(&redis), address_repo);
    let guard = Arc::new(ChannelGuard::new(channel_repo));

    // Reconciliation: rebuild cache state for every open vote, then start
    // the periodic workers
    let worker_ctx = WorkerContext {
        engine: engine.clone(),
        chat: chat.clone(),
        addresses: addresses.clone(),
        votes: vote_repo,
    };
    workers::repopulate_active_votes(&worker_ctx).await?;
    let worker_config = WorkerConfig {
        chat_flush_interval: config.realtime.chat_flush_interval(),
        vote_close_interval: config.realtime.vote_close_interval(),
    };
    let worker_handles = workers::spawn(&worker_config, worker_ctx.clone());
    info!("Reconciliation workers started");

    // Create app state
    let state = AppState {
        fanout,
        engine,
        chat,
        guard,
        users: user_repo,
        addresses,
        renderer,
        dispatcher: Arc::new(Dispatcher::new()),
        id_gen: IdGenerator::new(),
    };

    // Build router
    let app = router().layer(TraceLayer::new_for_http()).with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Ordered teardown: stop the periodic workers, fold cache state back
    // into the durable store, then drop the Redis connections.
    for handle in worker_handles {
        handle.abort();
    }
    if let Err(e) = workers::shutdown_flush(&worker_ctx).await {
        tracing::error!(error = %e, "Shutdown flush failed");
    }
    if let Some(bridge) = bridge {
        bridge.shutdown().await?;
    }
    redis.quit().await?;

    info!("Server shutdown complete");
    Ok(())
}
