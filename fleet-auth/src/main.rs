use fleet_auth::{
    build_router,
    config::{AuthConfig, StorageBackend},
    db,
    services::{AuthStore, Database, InMemoryStore, JwksCache, KeycloakClient, SessionService},
    AppState, FederationDeps,
};
use service_core::error::AppError;
use service_core::observability::{init_metrics, init_tracing};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.common.otlp_endpoint.as_deref(),
    )?;
    let metrics = init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        storage = ?config.storage,
        federation = config.federation.enabled,
        "Starting authentication service"
    );

    let store: Arc<dyn AuthStore> = match config.storage {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool)
                .await
                .map_err(|e| AppError::InternalError(anyhow::anyhow!("Migration failed: {}", e)))?;
            tracing::info!("Database initialized successfully");
            Arc::new(Database::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let federation = if config.federation.enabled {
        let provider = Arc::new(
            KeycloakClient::new(&config.federation).map_err(AppError::ConfigError)?,
        );
        let keys = Arc::new(JwksCache::new());

        // A missing key set only fails token validation; keep serving local sessions.
        match keys.refresh(&*provider).await {
            Ok(count) => tracing::info!(keys = count, "Signing keys loaded"),
            Err(e) => tracing::error!(error = %e, "Initial signing key fetch failed"),
        }
        spawn_key_refresher(
            keys.clone(),
            provider.clone(),
            Duration::from_secs(config.federation.jwks_refresh_seconds.max(1)),
        );

        Some(FederationDeps { provider, keys })
    } else {
        None
    };

    let state = AppState::new(config.clone(), store, federation, metrics);
    spawn_session_sweeper(
        state.sessions.clone(),
        Duration::from_secs(config.session.sweep_interval_seconds.max(1)),
    );

    let app = build_router(state);

    let addr = config.common.bind_address()?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// Re-fetch the provider's key set periodically. A failed fetch keeps the last good set.
fn spawn_key_refresher(keys: Arc<JwksCache>, provider: Arc<KeycloakClient>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately and startup already fetched.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match keys.refresh(&*provider).await {
                Ok(count) => tracing::debug!(keys = count, "Signing keys refreshed"),
                Err(e) => tracing::error!(error = %e, "Signing key refresh failed; keeping previous keys"),
            }
        }
    });
}

fn spawn_session_sweeper(sessions: SessionService, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match sessions.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Expired sessions removed"),
                Err(e) => tracing::error!(error = %e, "Session sweep failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
