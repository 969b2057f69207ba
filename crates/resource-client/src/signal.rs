//! Payload-less change signals.
//!
//! A [`ChangeSignal`] only says "something changed"; receivers re-fetch full
//! state. Delivery is at-least-once and notifications coalesce: while one
//! notification is pending, further ones are dropped.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;

/// Creates a connected notifier/signal pair.
pub fn change_channel() -> (ChangeNotifier, ChangeSignal) {
    let (tx, rx) = mpsc::channel(1);
    (ChangeNotifier { tx }, ChangeSignal { rx, task: None })
}

/// Sending half of a change signal.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: mpsc::Sender<()>,
}

impl ChangeNotifier {
    /// Records that something changed.
    ///
    /// Returns `false` once the receiving [`ChangeSignal`] has been dropped.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Closed(())) => false,
        }
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a change signal.
///
/// If the signal is backed by a watch task, dropping it stops the task.
#[derive(Debug)]
pub struct ChangeSignal {
    rx: mpsc::Receiver<()>,
    task: Option<AbortHandle>,
}

impl ChangeSignal {
    pub(crate) fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = Some(task);
        self
    }

    /// Waits for the next change.
    ///
    /// Returns `false` when every notifier is gone and nothing is pending.
    /// Cancel safe, so it can be used as a `tokio::select!` branch.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Consumes a pending notification without waiting.
    pub fn take_pending(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

impl Drop for ChangeSignal {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
