pub mod aggregator;
pub mod alerts;
pub mod channel;
pub mod error;
pub mod models;
pub mod overlay;
pub mod sensing;
pub mod session;
pub mod settings;
mod utils;

use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

pub use error::MonitorError;
pub use session::{Collaborators, ControlCommand, ControlReply, DetectionSnapshot, SessionController};
pub use settings::{MonitorSettings, SettingsStore};

use alerts::{LogNotifier, StdoutControlSurface};
use channel::WebSocketConnector;
use overlay::{ElementTree, JsonFileElementTree, StaticElementTree};
use sensing::{StillImageSurface, UnavailableSurface, VideoSurface};

pub const CONFIG_PATH_ENV: &str = "INTEGRITY_MONITOR_CONFIG";
pub const FRAME_SOURCE_ENV: &str = "INTEGRITY_MONITOR_FRAME_SOURCE";
pub const ELEMENT_TREE_ENV: &str = "INTEGRITY_MONITOR_ELEMENT_TREE";

const DEFAULT_CONFIG_FILE: &str = "integrity-monitor.json";

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn video_surface_from_env() -> Arc<dyn VideoSurface> {
    match env_path(FRAME_SOURCE_ENV) {
        Some(path) => {
            log::info!("Sampling frames from {}", path.display());
            Arc::new(StillImageSurface::new(path))
        }
        None => {
            log::warn!("{FRAME_SOURCE_ENV} not set; every capture will be skipped");
            Arc::new(UnavailableSurface)
        }
    }
}

fn element_tree_from_env() -> Arc<dyn ElementTree> {
    match env_path(ELEMENT_TREE_ENV) {
        Some(path) => Arc::new(JsonFileElementTree::new(path)),
        None => Arc::new(StaticElementTree::new(Vec::new())),
    }
}

fn write_line(reply: &ControlReply) -> Result<()> {
    let line = serde_json::to_string(reply).context("failed to encode reply")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

/// Runs the monitor against stdin/stdout until stdin closes or Ctrl-C.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var); stdout carries the protocol.
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Integrity monitor starting up...");

    let settings_path = env_path(CONFIG_PATH_ENV).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let store = SettingsStore::new(settings_path)?;

    let controller = SessionController::launch(
        store.current(),
        Collaborators {
            surface: video_surface_from_env(),
            elements: element_tree_from_env(),
            connector: Arc::new(WebSocketConnector),
            control_surface: Arc::new(StdoutControlSurface),
            notifier: Arc::new(LogNotifier),
        },
    )
    .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read control input")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let reply = session::handle_line(&controller, line).await;
                write_line(&reply)?;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted; shutting down");
                break;
            }
        }
    }

    controller.shutdown().await
}
