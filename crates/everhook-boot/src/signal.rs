//! Shutdown signals for the host loop: SIGINT/SIGTERM from the OS, or a
//! request from inside the process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strum::Display;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::BootError;

/// Why the host loop was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ShutdownSignal {
    /// Ctrl-C / SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    Requested,
}

const CHANNEL_CAPACITY: usize = 8;

/// Clones share one stop flag and one channel.
#[derive(Clone)]
pub struct SignalHandler {
    tx: broadcast::Sender<ShutdownSignal>,
    stopping: Arc<AtomicBool>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
            stopping: Arc::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.tx.subscribe()
    }

    /// Raise the stop flag and wake every subscriber.
    pub fn send(&self, signal: ShutdownSignal) {
        let first = !self.stopping.swap(true, Ordering::SeqCst);
        debug!(%signal, first, "Shutdown signal");
        // Having no receivers is fine, the flag is polled every frame.
        let _ = self.tx.send(signal);
    }

    pub fn request_shutdown(&self) {
        self.send(ShutdownSignal::Requested);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Forward SIGINT and SIGTERM. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn setup_os_signals(&self) -> Result<(), BootError> {
        use tokio::signal::unix::SignalKind;

        self.forward(SignalKind::interrupt(), ShutdownSignal::Interrupt)?;
        self.forward(SignalKind::terminate(), ShutdownSignal::Terminate)?;
        info!("Listening for SIGINT and SIGTERM");
        Ok(())
    }

    #[cfg(unix)]
    fn forward(
        &self,
        kind: tokio::signal::unix::SignalKind,
        as_signal: ShutdownSignal,
    ) -> Result<(), BootError> {
        let mut stream = tokio::signal::unix::signal(kind)
            .map_err(|e| BootError::SignalSetup(format!("{as_signal}: {e}")))?;
        let handler = self.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                info!("Received {}", as_signal);
                handler.send(as_signal);
            }
        });
        Ok(())
    }

    /// Forward Ctrl-C. Must be called inside a tokio runtime.
    #[cfg(not(unix))]
    pub fn setup_os_signals(&self) -> Result<(), BootError> {
        let handler = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C");
                handler.send(ShutdownSignal::Interrupt);
            }
        });
        info!("Listening for Ctrl-C");
        Ok(())
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
