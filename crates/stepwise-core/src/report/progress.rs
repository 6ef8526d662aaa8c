//! Progress reporting. The runner emits one event per finished case, in
//! completion order; the console layer consumes them through a sink.

use std::sync::Arc;

/// How many cases are done out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

/// Called by the runner each time a case completes. Implementations may throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
