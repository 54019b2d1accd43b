//! birbwatch - motion-triggered camera recorder
//!
//! This daemon:
//! 1. Opens the configured camera (RTSP/HTTP, local file, or `stub://`)
//! 2. Records every frame, timestamped, into rotating segment files
//! 3. Detects motion against a rolling buffer of recent frames
//! 4. Sends a webhook alert on motion, at most once per cooldown
//!
//! Stops on Ctrl-C, on `q` + Enter, at end of stream, or after `--max-frames`.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use birbwatch::{open_source, RunSummary, StopSignal, WatchError, Watcher, WatcherConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Record a camera and alert on motion")]
struct Args {
    /// Camera URL (rtsp://, http(s)://, file://, stub://) or a local video path.
    /// Overrides the config file and BIRBWATCH_CAMERA_URL.
    camera_url: Option<String>,

    /// Config file (.toml, or JSON for any other extension).
    #[arg(long, env = "BIRBWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory segments are written to.
    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Discord-style webhook that receives motion alerts.
    #[arg(long)]
    webhook_url: Option<String>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Write the latest annotated frame to this JPEG path.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Do not watch stdin for `q`.
    #[arg(long)]
    no_quit_key: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(summary) => {
            log::info!(
                "done: {} frames, {} segments, stop reason {:?}",
                summary.frames,
                summary.segments_opened,
                summary.stop_reason
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(args: Args) -> Result<RunSummary, WatchError> {
    let mut cfg = WatcherConfig::load(args.config.as_deref()).map_err(WatchError::Config)?;
    if let Some(url) = args.camera_url {
        cfg.camera.url = url;
    }
    if let Some(path) = args.storage_path {
        cfg.storage.path = path;
    }
    if let Some(url) = args.webhook_url {
        cfg.alerts.webhook_url = Some(url);
    }
    if let Some(path) = args.preview {
        cfg.preview = Some(birbwatch::config::PreviewSettings {
            path,
            every_frames: 1,
        });
    }
    cfg.validate().map_err(WatchError::Config)?;

    if cfg.alerts.webhook_url.is_none() {
        log::warn!("no webhook configured; motion will be logged but not alerted");
    }

    let stop = StopSignal::new();
    stop.install_ctrlc().map_err(WatchError::Config)?;
    if !args.no_quit_key {
        stop.watch_quit_key().map_err(WatchError::Config)?;
        log::info!("press q then Enter to stop");
    }

    let source = open_source(&cfg.source_settings(args.max_frames)).map_err(WatchError::Source)?;
    let mut watcher = Watcher::from_config(source, &cfg)?
        .with_stop_signal(stop)
        .with_max_frames(args.max_frames);

    log::info!(
        "birbwatch running: camera={} storage={} rotation={}s ({:?}) cooldown={}s",
        cfg.camera.url,
        cfg.storage.path.display(),
        cfg.storage.rotation_period.as_secs(),
        cfg.storage.rotation_policy,
        cfg.alerts.cooldown.as_secs()
    );
    watcher.run()
}
