// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Veil — per-user API obfuscating reverse proxy
//
//  Surface:  axum on tokio (swagger fetch, provisioning, proxy entry)
//  Engine:   seed-driven permutation of a Swagger 2.0 contract
//  Config:   YAML + VEIL_-prefixed environment variables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use veil_core::{SwaggerDoc, VeilConfig};
use veil_engine::MixerCache;
use veil_engine::mixer::MixerOptions;
use veil_proxy::Pipeline;
use veil_proxy::upstream::{UpstreamApi, UpstreamClient};
use veil_server::{AppState, build_router};
use veil_store::{AbuseLog, UserStore};

#[derive(Parser, Debug)]
#[command(name = "veil", version, about = "Veil — per-user API obfuscating reverse proxy")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Veil starting");

    // ── Config ──
    let config = Arc::new(VeilConfig::load(cli.config.as_deref())?);

    // ── Canonical contract ──
    let canonical = SwaggerDoc::from_file(&config.swagger_file)?;
    info!(
        path = %config.swagger_file.display(),
        operations = canonical.operations().count(),
        "Canonical Swagger document loaded"
    );

    // ── Persisted state ──
    let users = Arc::new(UserStore::load(&config.users_file()));
    let abuse = Arc::new(AbuseLog::load(
        &config.failures_file(),
        config.abuse.global_failure_threshold,
        config.abuse.max_failed_before_block,
    ));
    info!(users = users.len(), "State restored");

    // ── Upstream client ──
    let client = UpstreamClient::connect(&config.upstream).await?;
    let mut upstream_config = config.upstream.clone();
    upstream_config.auth_token = client.auth_token().to_string();
    let upstream: Arc<dyn UpstreamApi> = Arc::new(client);

    // ── Pipeline ──
    let options = MixerOptions {
        permute_methods: config.engine.permute_methods,
        ..MixerOptions::default()
    };
    let pipeline = Arc::new(Pipeline::new(
        canonical,
        upstream,
        Arc::clone(&users),
        abuse,
        MixerCache::with_default_capacity(),
        options,
        upstream_config,
    ));

    // ── Serve ──
    let state = AppState {
        config: Arc::clone(&config),
        users,
        pipeline,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Veil is ready — serving traffic");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Veil stopped");
    Ok(())
}

/// Resolve on SIGTERM (container stop) or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}
