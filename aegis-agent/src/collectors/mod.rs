pub mod command;
pub mod log;
pub mod metrics;
pub mod process;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type ShutdownFlag = Arc<AtomicBool>;

pub fn shutdown_flag() -> ShutdownFlag {
    Arc::new(AtomicBool::new(false))
}

pub fn is_shutting_down(flag: &ShutdownFlag) -> bool {
    flag.load(Ordering::Relaxed)
}

/// A long-lived producer. `start` begins emitting into the spool until
/// `shutdown` is set; never blocks indefinitely on the sink — on sink
/// failure it logs and drops that tick's record rather than stalling.
pub trait Collector {
    async fn start(&mut self, shutdown: ShutdownFlag);
}
