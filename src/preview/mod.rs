// ============================================================================
// LIVE PREVIEW: coalesced background rendering of the current filter request
// ============================================================================
//
// Two lanes:
//   - display lane: `PreviewSession`, owns the coalescer, applies edits,
//     handles completions, presents frames.  Strictly serial.
//   - worker lane: `RenderWorker`, runs one render at a time.
// Both talk over mpsc channels; the coalescer state is only ever touched on
// the display lane.
// ============================================================================

pub mod coalescer;
pub mod session;
pub mod sink;
pub mod worker;

use thiserror::Error;

pub use coalescer::{
    CoalescerStats, DisplaySink, RenderCoalescer, RenderCompletion, RenderJob, RenderState,
    RenderedImage, RequestUpdate,
};
pub use session::{EditorHandle, LaneEvent, PreviewSession};
pub use sink::{FrameFileSink, LatestFrame};
pub use worker::RenderWorker;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not start thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("render worker stopped before job #{0} could be dispatched")]
    WorkerGone(u64),
    #[error("preview thread panicked")]
    Panicked,
}
