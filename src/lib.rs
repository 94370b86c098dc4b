//! Filterscope: a live filter preview core.
//!
//! Edits to the current filter request are coalesced so at most one render
//! runs at a time and at most one more is queued; the newest parameters always
//! win.  See [`preview::RenderCoalescer`] for the state machine and
//! [`preview::PreviewSession`] for the threaded display/worker lanes.

pub mod assets;
pub mod cli;
pub mod filter;
pub mod io;
pub mod logger;
pub mod ops;
pub mod preview;
pub mod render;
pub mod settings;
