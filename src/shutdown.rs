// Graceful shutdown on process signals

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often `wait` re-checks the shutdown flag
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Shared shutdown flag, set by signal handlers or tests
#[derive(Clone, Debug)]
pub struct ShutdownState {
    requested: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request_shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        log::info!("Shutdown requested");
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        while !self.is_shutdown_requested() {
            tokio::time::sleep(SHUTDOWN_CHECK_INTERVAL).await;
        }
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

/// Register signal handlers for graceful shutdown
/// This sets up handlers for SIGINT (Ctrl+C), SIGTERM, and SIGHUP
#[cfg(unix)]
pub fn register_signal_handlers(state: ShutdownState) -> Result<()> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
        .map_err(|e| anyhow::anyhow!("Failed to register signal handlers: {}", e))?;

    thread::spawn(move || {
        for signal in signals.forever() {
            let name = match signal {
                SIGINT => "SIGINT (Ctrl+C)",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => continue,
            };
            log::info!("Received {}", name);
            state.request_shutdown();
        }
    });

    log::debug!("Signal handlers registered (SIGINT, SIGTERM, SIGHUP)");
    Ok(())
}

/// Register signal handlers for Windows
#[cfg(windows)]
pub fn register_signal_handlers(state: ShutdownState) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C");
        state.request_shutdown();
    })
    .map_err(|e| anyhow::anyhow!("Failed to register Ctrl+C handler: {}", e))?;

    log::debug!("Signal handler registered (Ctrl+C)");
    Ok(())
}
