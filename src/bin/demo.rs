//! demo - run the watcher against a synthetic yard scene.
//!
//! No camera or webhook is needed: alerts go to the log and segments land in
//! `--out-dir`. Prints the run summary as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use birbwatch::{
    open_source, AlertThrottle, LogNotifier, MjpegSinkFactory, MotionSettings, RecordingPlan,
    RotationPolicy, SourceSettings, Watcher,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Birb Watcher demo on a synthetic scene")]
struct Args {
    /// Number of frames to process.
    #[arg(long, default_value_t = 200)]
    frames: u64,

    /// Output directory for segments.
    #[arg(long, default_value = "birbwatch-demo")]
    out_dir: PathBuf,

    /// Frame width.
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Frame height.
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Alert cooldown in seconds.
    #[arg(long, default_value_t = 180)]
    cooldown_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output directory {}", args.out_dir.display()))?;
    let source = open_source(&SourceSettings {
        url: "stub://demo_yard".to_string(),
        target_fps: 20,
        width: args.width,
        height: args.height,
        max_frames: Some(args.frames),
    })?;

    let plan = RecordingPlan::new(&args.out_dir, Box::new(MjpegSinkFactory::default()))
        .with_rotation(Duration::from_secs(1800), RotationPolicy::Aligned);
    let mut watcher = Watcher::new(source, MotionSettings::default(), plan)?
        .with_notifier(Some(Box::new(LogNotifier)))
        .with_throttle(AlertThrottle::new(Duration::from_secs(args.cooldown_secs)));

    let summary = watcher.run()?;
    let json = serde_json::to_string_pretty(&summary).context("serialize run summary")?;
    println!("{json}");
    println!("segments written to {}", args.out_dir.display());
    Ok(())
}
