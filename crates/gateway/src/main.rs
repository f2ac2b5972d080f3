//! Gateway - token-authenticated, role-authorized HTTP gateway

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use crate::config::{Config, CorsConfig, LoggingConfig};
use gateway_api::{AppState, create_router};
use gateway_auth::login::{ACCESS_TOKEN_HEADER, REFRESH_TOKEN_HEADER};
use gateway_auth::{AuthorizationStage, DatabaseAuthenticator, FilterChain, LoginStage, TokenService};
use gateway_db::{Database, NewUser};
use gateway_proxy::{UpstreamClient, UpstreamRouter};

/// Gateway - token-authenticated, role-authorized HTTP gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "GATEWAY_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "GATEWAY_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db_url = format!("sqlite:{}?mode=rwc", config.database.path);
    let db = Database::new(&db_url)
        .await
        .context("Failed to open user database")?;

    seed_users(&db, &config).await?;

    // Token service and route policy
    let tokens = Arc::new(TokenService::new(config.token_config()?)?);
    let policy = Arc::new(config.route_policy()?);
    info!(
        "Loaded {} route rules ({} public)",
        policy.rules().count(),
        policy.rules().filter(|r| r.requirement.is_public()).count()
    );

    // Filter chain: login first, then authorization
    let authenticator = Arc::new(DatabaseAuthenticator::new(db)?);
    let chain = FilterChain::new()
        .with_stage(
            LoginStage::new(authenticator, tokens.clone()).with_path(&config.auth.login_path),
        )
        .with_stage(AuthorizationStage::new(policy, tokens.clone()));

    // Upstream services
    let upstreams = config
        .upstreams
        .iter()
        .map(|u| {
            UpstreamClient::new(u.client_config())
                .with_context(|| format!("Failed to create upstream {}", u.name))
        })
        .collect::<Result<Vec<_>>>()?;
    let upstreams = Arc::new(UpstreamRouter::new(upstreams));
    if upstreams.is_empty() {
        warn!("No upstreams configured; only gateway endpoints are served");
    }

    // Metrics recorder
    let metrics_handle = if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(Arc::new(handle))
    } else {
        None
    };

    // Create router
    let state = AppState::new(tokens, upstreams);
    let mut app = create_router(state, chain, metrics_handle).layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(&config.cors)? {
        app = app.layer(cors);
    }

    // Determine bind address
    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Create the configured users if the store is empty
async fn seed_users(db: &Database, config: &Config) -> Result<()> {
    if db.has_users().await? {
        return Ok(());
    }

    if config.auth.seed_users.is_empty() {
        warn!("User store is empty and no seed users are configured; nobody can log in");
        return Ok(());
    }

    for seed in &config.auth.seed_users {
        let password_hash = gateway_auth::hash_password(&seed.password)?;
        let user = db
            .insert_user(NewUser {
                email: seed.email.clone(),
                password_hash,
                roles: seed.roles.clone(),
            })
            .await
            .with_context(|| format!("Failed to seed user {}", seed.email))?;
        info!("Seeded user {} with roles {:?}", user.email, user.roles);
    }
    Ok(())
}

/// CORS for the browser UI origin, if configured
fn cors_layer(config: &CorsConfig) -> Result<Option<CorsLayer>> {
    let Some(origin) = &config.allowed_origin else {
        return Ok(None);
    };

    let origin = HeaderValue::from_str(origin.trim_end_matches('/'))
        .with_context(|| format!("Invalid CORS origin {}", origin))?;

    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .expose_headers([ACCESS_TOKEN_HEADER, REFRESH_TOKEN_HEADER])
            .allow_credentials(true),
    ))
}

/// Initialize logging
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
