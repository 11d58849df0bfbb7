//! Live tailing of the operation log.
//!
//! This module provides:
//! - [`TailingStream`] - Owns one tailable cursor and pushes records to a handler
//! - [`StreamState`] - Lifecycle state of a stream
//! - [`StreamSummary`] - What one streaming loop did before it returned

mod state;
mod stream;

pub use state::StreamState;
pub use stream::{CursorHandle, StreamExit, StreamSummary, TailingStream};
