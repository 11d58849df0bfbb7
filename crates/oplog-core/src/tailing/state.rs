//! Stream lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`TailingStream`](super::TailingStream).
///
/// ```text
/// Idle --open--> Tailing --stream--> Streaming --loop exit--> Tailing
///                   |                    |
///                   +-------stop---------+--> Stopped --dispose--> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    /// No cursor is open.
    Idle = 0,
    /// A cursor is open and no loop is running.
    Tailing = 1,
    /// A loop is pulling and delivering records.
    Streaming = 2,
    /// Stop was requested; the cursor stays open until dispose.
    Stopped = 3,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Idle,
            1 => StreamState::Tailing,
            2 => StreamState::Streaming,
            _ => StreamState::Stopped,
        }
    }
}

/// Atomic cell shared between the streaming loop and its controllers.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(StreamState::Idle as u8))
    }

    pub(crate) fn load(&self) -> StreamState {
        StreamState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: StreamState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to`, or return the state actually found.
    pub(crate) fn transition(&self, from: StreamState, to: StreamState) -> Result<(), StreamState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(StreamState::from_u8)
    }

    /// Mark the stream stopped if a cursor is open. Returns whether the state changed.
    pub(crate) fn request_stop(&self) -> bool {
        let mut current = self.load();
        loop {
            match current {
                StreamState::Tailing | StreamState::Streaming => {
                    match self.transition(current, StreamState::Stopped) {
                        Ok(()) => return true,
                        Err(actual) => current = actual,
                    }
                }
                StreamState::Idle | StreamState::Stopped => return false,
            }
        }
    }

    /// Leave `Streaming` after a loop returns. A pending stop is kept.
    pub(crate) fn finish_streaming(&self) {
        let _ = self.transition(StreamState::Streaming, StreamState::Tailing);
    }
}
