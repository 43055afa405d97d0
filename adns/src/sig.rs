use adns_client::Resolver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Spawn a future that waits for a CTRL-C interrupt (SIGINT on Unix), sets the
/// `interrupted` boolean to `true`, and cancels every query `resolver` is running.
pub fn finish_on_interrupt(handle: &Handle, resolver: Resolver, interrupted: Arc<AtomicBool>) -> JoinHandle<()> {
    handle.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(message = "interrupted, canceling outstanding queries");
            interrupted.store(true, Ordering::Release);
            resolver.finish();
        }
    })
}
