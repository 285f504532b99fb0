//! Executor abstraction for driving admitted requests.

use futures::future::BoxFuture;

/// Something that can run a detached future to completion.
///
/// Dispatch layers spawn one task per admitted request so that completion
/// bookkeeping (permit release, queue drain) happens whether or not the caller
/// is polling its response future.
///
/// # Example
///
/// ```rust,no_run
/// use tower_dispatch_core::Executor;
/// use tokio::runtime::Handle;
///
/// # async fn example() {
/// // Tokio runtime handles implement Executor
/// let handle = Handle::current();
/// handle.spawn_detached(Box::pin(async {}));
/// # }
/// ```
pub trait Executor: Send + Sync + 'static {
    /// Spawns `future` without waiting for it.
    fn spawn_detached(&self, future: BoxFuture<'static, ()>);
}

impl Executor for tokio::runtime::Handle {
    fn spawn_detached(&self, future: BoxFuture<'static, ()>) {
        drop(tokio::runtime::Handle::spawn(self, future));
    }
}
