//! Cooperative stop request shared between the watcher loop and whatever asks
//! it to stop (Ctrl-C, a `q` on stdin, a test).

use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C / SIGTERM to this signal. Can only be installed once per process.
    pub fn install_ctrlc(&self) -> Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            log::info!("stop requested by signal");
            signal.request();
        })
        .context("install Ctrl-C handler")
    }

    /// Watch stdin on a background thread; a line reading `q` requests a stop.
    pub fn watch_quit_key(&self) -> Result<()> {
        let signal = self.clone();
        std::thread::Builder::new()
            .name("birbwatch-quit-key".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if is_quit_key(&line) {
                        log::info!("stop requested from keyboard");
                        signal.request();
                        break;
                    }
                }
            })
            .context("spawn quit-key watcher")?;
        Ok(())
    }
}

fn is_quit_key(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_requests() {
        let signal = StopSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_requested());
        signal.request();
        assert!(observer.is_requested());
    }

    #[test]
    fn quit_key_accepts_q_only() {
        assert!(is_quit_key("q"));
        assert!(is_quit_key(" Q \n"));
        assert!(!is_quit_key("quit"));
        assert!(!is_quit_key(""));
    }
}
