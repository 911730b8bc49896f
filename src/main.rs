mod server;
mod ws;

use anyhow::{Context, Result};
use callscribe_audio::OUTPUT_SAMPLE_RATE;
use callscribe_core::{AppConfig, DestinationRouteConfig};
use callscribe_destination::DestinationHost;
use callscribe_engine::RecognizerRegistry;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "callscribe", about = "Real-time transcription of telephony media streams")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Listen port, overriding `server.port`
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {:?}", cli.config))?;
    if let Some(port) = cli.port {
        config.server.port = port;
        config.validate().context("invalid --port")?;
    }

    let env_filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    tracing::info!("callscribe starting");

    // Build one recognizer up front so a bad engine name or model fails at startup
    let engines = RecognizerRegistry::new();
    let engine_config = config
        .asr
        .engine_config()
        .context("failed to read ASR engine config")?;
    engines
        .build(&config.asr.engine, engine_config.clone(), OUTPUT_SAMPLE_RATE)
        .with_context(|| format!("failed to start ASR engine '{}'", config.asr.engine))?;
    tracing::info!("ASR engine '{}' ready", config.asr.engine);

    let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
    let mut dest_host = DestinationHost::new(transcript_rx);
    add_routes(&mut dest_host, &config).await?;
    dest_host.start();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx)?;

    let config = Arc::new(config);
    let state = server::AppState::new(
        Arc::clone(&config),
        engines,
        engine_config,
        transcript_tx,
        shutdown_rx.clone(),
    );
    let active_sessions = Arc::clone(&state.active_sessions);
    let app = server::router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        "listening on {addr} (media stream at {})",
        config.server.stream_path
    );

    let mut server_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            callscribe_session::shutdown_requested(&mut server_shutdown).await;
        })
        .await
        .context("server error")?;

    let grace = Duration::from_millis(config.server.shutdown_grace_ms);
    if !wait_for_sessions(&active_sessions, grace).await {
        tracing::warn!(
            remaining = active_sessions.load(Ordering::SeqCst),
            "sessions still open after shutdown grace period"
        );
    }

    if tokio::time::timeout(Duration::from_secs(2), dest_host.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("destination shutdown timed out");
    }

    tracing::info!("callscribe stopped");
    Ok(())
}

async fn add_routes(host: &mut DestinationHost, config: &AppConfig) -> Result<()> {
    if config.routes.is_empty() {
        // Fallback: log final transcripts when no routes are configured
        host.add_route("log", "", false, toml::Value::Table(Default::default()))
            .await
            .context("failed to add default log route")?;
        tracing::info!("no routes configured, logging final transcripts");
        return Ok(());
    }

    for route_cfg in &config.routes {
        let merged = merge_route_config(config.destinations.as_ref(), route_cfg);
        host.add_route(
            &route_cfg.plugin,
            &route_cfg.prefix,
            route_cfg.include_partials,
            merged,
        )
        .await
        .with_context(|| format!("failed to add destination route '{}'", route_cfg.plugin))?;

        tracing::info!(
            "routed transcripts → destination '{}' (prefix: {:?}, partials: {})",
            route_cfg.plugin,
            route_cfg.prefix,
            route_cfg.include_partials,
        );
    }
    Ok(())
}

/// Global `[destinations.<plugin>]` table overlaid with the route's own fields.
fn merge_route_config(
    destinations: Option<&toml::Value>,
    route_cfg: &DestinationRouteConfig,
) -> toml::Value {
    let mut merged = destinations
        .and_then(|dests| dests.get(&route_cfg.plugin))
        .cloned()
        .unwrap_or_else(|| toml::Value::Table(Default::default()));

    if let (Some(base), Some(extra)) = (merged.as_table_mut(), route_cfg.extra.as_table()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    merged
}

fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
        let _ = shutdown_tx.send(true);
    });
    Ok(())
}

/// Poll the live session count until it reaches zero or `grace` elapses.
async fn wait_for_sessions(active: &std::sync::atomic::AtomicUsize, grace: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + grace;
    while active.load(Ordering::SeqCst) > 0 {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    true
}
