//! edfview - view-buffer synthesis for EDF and BDF recordings
//!
//! This library turns a view time and page duration into the bytes and
//! filtered samples a viewer draws: it plans which data records cover the
//! page, warms stateful filters up on the history before it, reads the
//! records into a shared buffer and hands out filtered traces on demand.
//!
//! ## Module Structure
//!
//! - [`clock`] - Fixed-point tick arithmetic and header date handling
//! - [`recording`] - Headers, sample decoding and record stores
//!   - `edf` - EDF/BDF header parsing and writing
//!   - `store` - Buffered, memory-mapped and in-memory record access
//! - [`filters`] - Stateful filter stages and filter chains
//! - [`composition`] - Derived signals built from weighted channels
//! - [`viewbuf`] - Frame planning, filter warm-up and materialization
//!   - `planner` - Record ranges and buffer layout
//!   - `prefilter` - Warm-up windows and replay
//!   - `materialize` - Reads and zero fill
//!   - `context` - The render context and shared access
//!   - `trace` - Filtered traces
//! - [`settings`] - View settings persistence

pub mod clock;
pub mod composition;
pub mod filters;
pub mod recording;
pub mod settings;
pub mod viewbuf;
