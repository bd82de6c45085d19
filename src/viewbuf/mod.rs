//! View-buffer synthesis.
//!
//! Turning a view time and page duration into displayable samples happens
//! in three steps, all driven from [`RenderContext::materialize`]:
//!
//! - [`planner`] works out which records of each recording cover the page
//!   and where each recording's bytes go in the shared view buffer
//! - [`prefilter`] replays the history before the page through every
//!   stateful composition and checkpoints the filter state
//! - [`materialize`] reads the visible records, zero-filling past the end
//!   of a recording, and lays out each composition's on-screen samples
//!
//! A frame is committed only when every step succeeded; any error leaves
//! the previously displayed frame, view times and filter checkpoints as they
//! were. Filtered samples are pulled afterwards through [`trace`].

pub mod context;
pub mod materialize;
pub mod planner;
pub mod prefilter;
pub mod trace;

pub use crate::composition::{CompositionId, RecordingId};
pub use context::{FrameSummary, RenderContext, SharedRenderContext};
pub use planner::{FramePlan, RecordingPlan, VisibleRange};
pub use prefilter::WarmupWindow;
pub use trace::Trace;

use thiserror::Error;

use crate::filters::FilterError;
use crate::recording::RecordError;

// ============================================================================
// Error Types
// ============================================================================

/// Errors returned by the view-buffer API
#[derive(Debug, Error)]
pub enum ViewError {
    /// A read failed; the frame was abandoned
    #[error("Failed to read recording: {0}")]
    Io(#[from] RecordError),

    /// The view buffer would not fit under the ceiling
    #[error("View buffer of {requested} bytes exceeds the {ceiling} byte limit")]
    Capacity { requested: u64, ceiling: u64 },

    /// A filter could not be built for a composition
    #[error("Invalid filter: {0}")]
    FilterConstruction(#[from] FilterError),

    /// A composition does not fit its recording
    #[error("Invalid composition: {0}")]
    Configuration(String),

    #[error("Unknown {0}")]
    UnknownRecording(RecordingId),

    #[error("Unknown {0}")]
    UnknownComposition(CompositionId),

    /// The caller's cancellation check fired
    #[error("Cancelled")]
    Cancelled,

    /// Another navigation request is still running
    #[error("A frame is already being built")]
    Busy,
}

/// Optional cancellation check supplied by an embedding caller
pub type CancelCheck<'a> = Option<&'a dyn Fn() -> bool>;

/// Fail with [`ViewError::Cancelled`] if the caller asked to stop
#[inline]
pub(crate) fn check_cancel(cancel: CancelCheck<'_>) -> Result<(), ViewError> {
    match cancel {
        Some(f) if f() => Err(ViewError::Cancelled),
        _ => Ok(()),
    }
}
