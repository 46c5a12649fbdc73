use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Stop/resume switch shared with the host, possibly from another thread.
///
/// Only one parked evaluation is tracked. Parking a second one replaces the
/// first, which then never resumes.
#[derive(Debug, Default)]
pub struct PauseControl {
    stopped: AtomicBool,
    slot: Mutex<Option<oneshot::Sender<()>>>,
}

impl PauseControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        if let Some(sender) = self.slot.lock().take() {
            let _ = sender.send(());
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_while_stopped(&self) {
        while self.is_stopped() {
            let (sender, receiver) = oneshot::channel();
            *self.slot.lock() = Some(sender);
            // A resume may have run before the sender was installed.
            if !self.is_stopped() {
                self.slot.lock().take();
                return;
            }
            tracing::trace!("evaluation parked");
            if receiver.await.is_err() {
                // Displaced by a newer suspension.
                std::future::pending::<()>().await;
            }
        }
    }
}
