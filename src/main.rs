//! MediaFlow - Main Entry Point
//!
//! Runs a small headless demo pipeline: a media player looping a test
//! pattern into its shared-memory frame channel while the presentation
//! side mirrors its state and frames.

use anyhow::Context;
use mediaflow_rs::{
    bus, ControlManager, NodeParams, NodeRegistry, PresentationManager, RuntimeConfig,
};
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mediaflow_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MediaFlow");

    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::load(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => RuntimeConfig::default(),
    };

    let (control, presentation) = bus::channels();
    let control_handle =
        ControlManager::spawn(control, NodeRegistry::with_builtins(), config.clone())
            .context("failed to spawn control manager")?;
    let mut ui = PresentationManager::new(presentation, config);

    let mut params = NodeParams::new();
    params.insert("media_path".into(), "test-pattern".into());
    let player = ui
        .create_node("MediaPlayer", true, params)
        .context("failed to create media player")?;
    ui.run_node(&player)?;

    // Mirror events for a couple of seconds, then tear down.
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut frames = 0usize;
    while Instant::now() < deadline {
        if !ui.pump() {
            break;
        }
        if let Some(frame) = ui.mirror(&player).and_then(|m| m.latest_frame()) {
            frames += 1;
            tracing::debug!(bytes = frame.len(), "frame mirrored");
        }
        std::thread::sleep(Duration::from_millis(16));
    }
    tracing::info!(frames, "demo finished");

    tracing::info!("Shutting down...");
    ui.shutdown()?;
    control_handle
        .join()
        .map_err(|_| anyhow::anyhow!("control manager panicked"))?;
    Ok(())
}
