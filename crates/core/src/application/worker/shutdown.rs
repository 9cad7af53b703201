// Shutdown and abandon signals

use tokio::sync::watch;

/// One-shot broadcast signal, observed at every suspension point
///
/// Used for the process-wide shutdown request and for the per-cycle
/// abandon order (grace period or cycle deadline expired).
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if the signal was fired
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the signal is fired
    ///
    /// Returns immediately if it already was. If the sender is dropped
    /// without firing, never returns.
    pub async fn wait(&mut self) {
        let sender_dropped = self.rx.wait_for(|fired| *fired).await.is_err();
        if sender_dropped {
            std::future::pending::<()>().await;
        }
    }
}

/// Firing side of a signal
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Fire the signal (idempotent)
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another token observing this signal
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a signal channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
