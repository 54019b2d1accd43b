use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use birbwatch::config::{Container, WatcherConfig};
use birbwatch::RotationPolicy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "BIRBWATCH_CONFIG",
        "BIRBWATCH_CAMERA_URL",
        "BIRBWATCH_STORAGE_PATH",
        "BIRBWATCH_WEBHOOK_URL",
        "BIRBWATCH_ROTATION_SECS",
        "BIRBWATCH_ALERT_COOLDOWN_SECS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_json_config_from_env_path_with_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "camera": { "url": "rtsp://birdfeeder", "target_fps": 15, "width": 800, "height": 600 },
            "storage": { "path": "/var/lib/birbwatch", "container": "ffmpeg", "rotation_secs": 900 },
            "alerts": { "webhook_url": "https://example.com/hook", "cooldown_secs": 60, "queue": false },
            "motion": { "buffer_depth": 6, "threshold": 40 }
        }"#,
    );

    std::env::set_var("BIRBWATCH_CONFIG", file.path());
    std::env::set_var("BIRBWATCH_STORAGE_PATH", "/tmp/clips");
    std::env::set_var("BIRBWATCH_ALERT_COOLDOWN_SECS", "300");

    let cfg = WatcherConfig::load(None).expect("load config");

    assert_eq!(cfg.camera.url, "rtsp://birdfeeder");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!((cfg.camera.width, cfg.camera.height), (800, 600));
    assert_eq!(cfg.storage.path, PathBuf::from("/tmp/clips"));
    assert_eq!(cfg.storage.container, Container::Ffmpeg);
    assert_eq!(cfg.storage.rotation_period, Duration::from_secs(900));
    assert_eq!(cfg.alerts.webhook_url.as_deref(), Some("https://example.com/hook"));
    assert_eq!(cfg.alerts.cooldown, Duration::from_secs(300));
    assert!(!cfg.alerts.queue);
    assert_eq!(cfg.motion.buffer_depth, 6);
    assert_eq!(cfg.motion.threshold, 40);
    assert_eq!(cfg.motion.blur_kernel, 15);
    assert_eq!(cfg.motion.dilate_iterations, 2);

    clear_env();
}

#[test]
fn loads_toml_config_from_explicit_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
health_interval_secs = 30

[camera]
url = "stub://garden"

[storage]
rotation_policy = "elapsed"
jpeg_quality = 70

[preview]
path = "/tmp/birbwatch-preview.jpg"
"#,
    );
    std::env::set_var("BIRBWATCH_ROTATION_SECS", "120");

    let cfg = WatcherConfig::load(Some(file.path())).expect("load config");

    assert_eq!(cfg.camera.url, "stub://garden");
    assert_eq!(cfg.storage.rotation_policy, RotationPolicy::Elapsed);
    assert_eq!(cfg.storage.rotation_period, Duration::from_secs(120));
    assert_eq!(cfg.storage.jpeg_quality, 70);
    assert_eq!(cfg.health_interval, Duration::from_secs(30));
    let preview = cfg.preview.expect("preview configured");
    assert_eq!(preview.path, PathBuf::from("/tmp/birbwatch-preview.jpg"));
    assert_eq!(preview.every_frames, 10);

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = WatcherConfig::load(None).expect("load defaults");
    assert_eq!(cfg.camera.url, "stub://front_camera");
    assert_eq!(cfg.storage.rotation_period, Duration::from_secs(1800));
    assert_eq!(cfg.alerts.cooldown, Duration::from_secs(180));
    assert!(cfg.alerts.webhook_url.is_none());
    assert!(cfg.preview.is_none());
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let even_kernel = write_config(".json", r#"{ "motion": { "blur_kernel": 14 } }"#);
    assert!(WatcherConfig::load(Some(even_kernel.path())).is_err());

    let unknown_field = write_config(".json", r#"{ "camera": { "uri": "rtsp://x" } }"#);
    assert!(WatcherConfig::load(Some(unknown_field.path())).is_err());

    std::env::set_var("BIRBWATCH_WEBHOOK_URL", "ftp://example.com/hook");
    assert!(WatcherConfig::load(None).is_err());
    clear_env();

    std::env::set_var("BIRBWATCH_ROTATION_SECS", "half-an-hour");
    assert!(WatcherConfig::load(None).is_err());
    clear_env();

    std::env::set_var("BIRBWATCH_ROTATION_SECS", "0");
    assert!(WatcherConfig::load(None).is_err());
    clear_env();
}
