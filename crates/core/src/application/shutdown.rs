// Stop signal shared by background loops

use tokio::sync::watch;

/// Held by the daemon; flips every token at once
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Token for one more background loop
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Ask every loop to stop
    ///
    /// # Returns
    /// Number of tokens still alive, i.e. loops that will observe the signal
    pub fn shutdown(&self) -> usize {
        self.tx.send_replace(true);
        self.tx.receiver_count()
    }
}

/// Handed to a background loop
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested or the sender is gone
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
