use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use stylecanvas_core::session::{ImageSource, SessionUser, SourceImage};
use stylecanvas_core::style::Orientation;
use stylecanvas_engine::projections::entitlement_summary;
use stylecanvas_engine::{BatchOptions, EngineConfig, EngineOptions, PreviewEngine, StartOptions};
use stylecanvas_events::{HttpTelemetryForwarder, TelemetryLogger, UiSignal};
use stylecanvas_provider::{HttpEntitlementClient, HttpPreviewProvider};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::Instrument as _;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Generate style previews for one photo.
#[derive(Parser, Debug)]
#[command(name = "stylecanvas-worker", version)]
struct Cli {
    /// Photo to generate previews for.
    #[arg(long)]
    image: PathBuf,

    /// URL the preview service can fetch the photo from. Defaults to a
    /// `file://` URL of `--image`.
    #[arg(long)]
    source_url: Option<String>,

    /// Canvas orientation (square, horizontal, vertical).
    #[arg(long)]
    orientation: Option<Orientation>,

    /// Generate a single style instead of the popular set.
    #[arg(long)]
    style: Option<String>,

    /// Regenerate even when a preview is already available.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Signed-in user id.
    #[arg(long, requires = "access_token")]
    user_id: Option<String>,

    /// Bearer token for `--user-id`.
    #[arg(long, requires = "user_id")]
    access_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stylecanvas_worker=debug,stylecanvas_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("load configuration")?;

    let run_id = uuid::Uuid::new_v4();
    let output = run(cli, config)
        .instrument(tracing::info_span!("preview_run", %run_id))
        .await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(cli: Cli, config: EngineConfig) -> anyhow::Result<serde_json::Value> {
    let source = load_source(&cli.image, cli.source_url.clone()).await?;

    let mut provider = HttpPreviewProvider::new(&config.provider_url);
    if let Some(key) = &config.api_key {
        provider = provider.with_api_key(key);
    }
    let entitlements = HttpEntitlementClient::new(&config.entitlements_url);

    let engine = PreviewEngine::new(
        Arc::new(provider),
        Arc::new(entitlements),
        EngineOptions::from(&config),
    );

    let logger = tokio::spawn(TelemetryLogger::run(engine.telemetry().subscribe()));
    if let Some(url) = &config.telemetry_url {
        let forwarder = HttpTelemetryForwarder::new(url).context("build telemetry forwarder")?;
        tokio::spawn(forwarder.run(engine.telemetry().subscribe()));
    }
    tokio::spawn(log_signals(engine.signals().subscribe()));

    tracing::info!(
        provider = %config.provider_url,
        image_hash = %source.hash,
        "Preview worker starting",
    );

    if let (Some(id), Some(access_token)) = (cli.user_id, cli.access_token) {
        engine
            .set_session_user(Some(SessionUser { id, access_token }))
            .await;
    }
    engine.set_source_image(source).await;
    if let Some(orientation) = cli.orientation {
        engine.set_orientation(orientation).await;
    }
    if let Err(e) = engine.hydrate_entitlements().await {
        tracing::warn!(error = %e, "Continuing without entitlements");
    }

    let report = match &cli.style {
        Some(style_id) => {
            let style = engine.style(style_id)?.clone();
            let options = StartOptions {
                force: cli.force,
                ..Default::default()
            };
            let outcome = engine.start_preview(&style, options).await;
            serde_json::json!({ "style_id": style_id, "ready": outcome.is_ready() })
        }
        None => {
            let options = BatchOptions {
                force: cli.force,
                ..Default::default()
            };
            let report = engine.generate_previews(&config.popular_styles, options).await;
            serde_json::to_value(report)?
        }
    };

    let snapshot = engine.snapshot();
    let output = serde_json::json!({
        "report": report,
        "previews": snapshot.previews,
        "entitlements": entitlement_summary(&snapshot),
        "generation_count": snapshot.generation_count,
    });

    // Dropping the last engine handle closes the telemetry bus.
    drop(engine);
    match tokio::time::timeout(Duration::from_secs(2), logger).await {
        Ok(Ok(count)) => tracing::debug!(count, "Telemetry drained"),
        _ => tracing::debug!("Telemetry logger still busy at exit"),
    }

    Ok(output)
}

/// Log UI prompts until the signal bus closes. Returns how many were logged.
async fn log_signals(mut signals: broadcast::Receiver<UiSignal>) -> u64 {
    let mut logged = 0u64;
    loop {
        match signals.recv().await {
            Ok(signal) => {
                tracing::warn!(?signal, "UI prompt raised");
                logged += 1;
            }
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Signal listener lagged, some prompts were dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    logged
}

async fn load_source(path: &Path, source_url: Option<String>) -> anyhow::Result<SourceImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read image '{}'", path.display()))?;
    anyhow::ensure!(!bytes.is_empty(), "image '{}' is empty", path.display());

    let url = match source_url {
        Some(url) => url,
        None => {
            let absolute = std::fs::canonicalize(path)
                .with_context(|| format!("resolve image path '{}'", path.display()))?;
            format!("file://{}", absolute.display())
        }
    };
    Ok(SourceImage::from_bytes(&bytes, ImageSource::Url(url.clone())).with_display_url(url))
}
