//! Alert delivery.
//!
//! The watcher only sees the `Notifier` trait. `WebhookNotifier` posts to a
//! Discord-style webhook with a hard request timeout; `QueuedNotifier` moves
//! dispatch onto a worker thread so a slow endpoint never holds up capture.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// One-shot text notification transport. Retries, if any, belong to the
/// implementation.
pub trait Notifier: Send {
    fn send(&self, text: &str) -> Result<()>;

    /// Wait for anything still in flight and return how many messages that
    /// `send` accepted were later lost. Transports that deliver inside `send`
    /// have nothing to report.
    fn drain(&mut self) -> u64 {
        0
    }
}

/// Human-readable alert text for motion seen at `at`.
pub fn alert_message(at: DateTime<Local>) -> String {
    format!("Motion detected at {}", at.format("%Y/%m/%d %H:%M:%S"))
}

// ----------------------------------------------------------------------------
// Webhook
// ----------------------------------------------------------------------------

pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(url).context("parse webhook url")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported webhook scheme '{}'; expected http(s)",
                parsed.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            url: url.to_string(),
            agent,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, text: &str) -> Result<()> {
        let body = serde_json::json!({ "content": text }).to_string();
        self.agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .context("post webhook message")?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Log-only (no endpoint configured for the demo)
// ----------------------------------------------------------------------------

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, text: &str) -> Result<()> {
        log::info!("alert: {}", text);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Background queue
// ----------------------------------------------------------------------------

/// Hands messages to a worker thread. `send` never blocks; if the queue is full
/// the message is rejected and the caller sees an error. Failures that happen on
/// the worker are counted and reported by `drain`.
pub struct QueuedNotifier {
    tx: Option<SyncSender<String>>,
    worker: Option<JoinHandle<()>>,
    failed: Arc<AtomicU64>,
}

impl QueuedNotifier {
    pub fn spawn(inner: Box<dyn Notifier>, capacity: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<String>(capacity.max(1));
        let failed = Arc::new(AtomicU64::new(0));
        let worker_failed = failed.clone();
        let worker = std::thread::Builder::new()
            .name("birbwatch-notify".to_string())
            .spawn(move || {
                for text in rx {
                    if let Err(e) = inner.send(&text) {
                        worker_failed.fetch_add(1, Ordering::SeqCst);
                        log::warn!("notification dispatch failed: {:#}", e);
                    }
                }
            })
            .context("spawn notification worker")?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            failed,
        })
    }

    /// Messages the worker failed to deliver so far.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("notification worker panicked");
            }
        }
    }
}

impl Notifier for QueuedNotifier {
    fn send(&self, text: &str) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("notification queue closed"))?;
        match tx.try_send(text.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow!("notification queue full; alert dropped")),
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("notification worker stopped")),
        }
    }

    fn drain(&mut self) -> u64 {
        self.close();
        self.failed()
    }
}

impl Drop for QueuedNotifier {
    fn drop(&mut self) {
        self.close();
    }
}
