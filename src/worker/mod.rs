//! Serial event workers.
//!
//! A [`SerialWorker`] owns one tokio task that drains a bounded FIFO queue
//! through a [`WorkHandler`], one item at a time, in offer order. Each
//! session runs two of them: inbound (socket → reassembler) and outbound
//! (events → socket).
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted ──start()──► Active ◄──resume()── Paused
//!      │                    │ └────pause()────►  │
//!      └──────stop()────────┴──────stop()────────┴──► Shutdown
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handler` | Per-item handler trait and closure adapter |
//! | `serial` | The worker itself |

// ============================================================================
// Submodules
// ============================================================================

/// Per-item handler trait.
pub mod handler;

/// Single-task FIFO worker.
pub mod serial;

// ============================================================================
// Re-exports
// ============================================================================

pub use handler::{FnHandler, WorkHandler, handler_fn};
pub use serial::{SerialWorker, WorkerOptions, WorkerState};
