//! Per-item handler trait.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// WorkHandler
// ============================================================================

/// Processes one queued item.
///
/// Return `Ok(true)` when the item is done and `Ok(false)` to keep it at
/// the head of the queue for another attempt. Errors are logged by the
/// worker and the item is treated as done.
#[async_trait]
pub trait WorkHandler<T>: Send + Sync + 'static {
    /// Handles `item`.
    async fn handle(&self, item: &T) -> Result<bool>;
}

// ============================================================================
// FnHandler
// ============================================================================

/// Adapts a synchronous closure into a [`WorkHandler`].
pub struct FnHandler<F>(F);

/// Wraps `f` as a [`WorkHandler`].
#[inline]
pub fn handler_fn<T, F>(f: F) -> FnHandler<F>
where
    F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<T, F> WorkHandler<T> for FnHandler<F>
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
{
    async fn handle(&self, item: &T) -> Result<bool> {
        (self.0)(item)
    }
}
