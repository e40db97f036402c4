//! Signal handling for graceful shutdown.
//!
//! SIGTERM or SIGINT (Ctrl+C on Windows) flips a [`Shutdown`] flag. The
//! engine checks it between cycles and while sleeping, so in-flight session
//! calls and ledger writes always finish before the process exits.
//!
//! ```text
//! Signal received (SIGTERM/SIGINT)
//!    │
//!    ▼
//! Shutdown::trigger()
//!    │
//!    ├─► cycle in progress: finishes, loop exits
//!    └─► sleeping: sleep is cut short, loop exits
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Result;

/// Cloneable shutdown flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Spawn a task that triggers shutdown on the first SIGTERM or SIGINT.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(()) => shutdown.trigger(),
                Err(e) => error!(error = %e, "Failed to install signal handlers"),
            }
        })
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, stopping after the current cycle");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, stopping after the current cycle");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, stopping after the current cycle");
    }

    Ok(())
}
