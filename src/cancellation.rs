// Cooperative cancellation for wipe sessions
//
// The token is polled by the chunk loop before every chunk; it never interrupts a write
// in flight. Clones share the same flag, so a signal handler thread can hold one clone
// while the session polls another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to stop at the next chunk boundary. Safe from any thread.
    pub fn request_cancellation(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            log::info!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
