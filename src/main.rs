use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eggcount::annotate::save_annotated;
use eggcount::cli::{Args, Command, DetectArgs, ServeArgs};
use eggcount::config::ServiceConfig;
use eggcount::fetch::resolve_reference;
use eggcount::model::{ModelSlot, OnnxModel};
use eggcount::pipeline::{EggCounter, run_detection};
use eggcount::service::{AppState, router};

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    ServiceConfig::load(path).context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Serve(serve) => run_server(serve).await,
        Command::Detect(detect) => run_detect(detect),
    }
}

async fn run_server(args: ServeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    init_tracing(config.debug);
    info!("{config}");

    let counter = EggCounter::new(ModelSlot::onnx(&config.model_path), config.detection_settings());
    // load up front so the first request doesn't pay for it; requests retry on failure
    if let Err(e) = counter.model().get() {
        warn!(error = %e, "model not loaded at startup");
    }

    let state = Arc::new(AppState::new(counter, config.download_dir.clone()));
    let addr = config.socket_addr().context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("egg counter listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

fn run_detect(args: DetectArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.overrides.apply(&mut config);
    config.validate()?;
    init_tracing(config.debug);

    let model = OnnxModel::default()
        .load_model(&config.model_path)
        .with_context(|| format!("failed to load model {}", config.model_path.display()))?;
    let image_path = resolve_reference(&args.source, &config.download_dir)?;
    let detections = run_detection(&image_path, &config.detection_settings(), &model)?;

    for detection in detections.set.iter().flat_map(|set| set.iter()) {
        info!(
            label = %detections.label(detection.class_id),
            confidence = detection.score,
            bbox = ?detection.bbox,
            "detection"
        );
    }
    println!("{}", serde_json::to_string_pretty(&detections.report())?);
    if let Some(output) = &args.output {
        save_annotated(&image_path, detections.set.as_ref(), output)?;
        info!(path = %output.display(), "annotated image written");
    }
    Ok(())
}
