//! Background sync emitter.
//!
//! One named thread per sender, started lazily with the first frame. The
//! interval sleep doubles as the shutdown wait, so `stop` takes effect
//! immediately instead of after a full interval.

use super::SenderShared;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) struct SyncEmitter {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl SyncEmitter {
    pub fn spawn(shared: Arc<Mutex<SenderShared>>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new().name("drishti-sync".to_string()).spawn(move || {
            log::debug!("sync emitter started, interval {interval:?}");
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => shared.lock().emit_sync(false),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("sync emitter stopped");
        })?;
        Ok(Self { stop_tx, handle })
    }

    /// Signals the thread and waits for it to exit. The thread wakes from
    /// its interval sleep as soon as the signal lands.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            log::error!("sync emitter thread panicked");
        }
    }
}
