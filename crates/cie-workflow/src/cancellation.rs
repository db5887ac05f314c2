// cancellation.rs — a dependency-free, synchronous cancellation token
// (spec §4.W+). `cie-impact` is synchronous, so pulling in
// `tokio_util::sync::CancellationToken` for one bool would add an async
// runtime dependency the analyzer itself never needs; this is the same
// contract with an `Arc<AtomicBool>` underneath.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
