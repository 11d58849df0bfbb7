//! The tailing stream: cursor ownership and the pull/deliver loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use oplog_proto::{LogRecord, LogicalTimestamp};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::state::{StateCell, StreamState};
use crate::config::TailConfig;
use crate::error::{Error, HandlerError};
use crate::resolver::ResumePointResolver;
use crate::store::{CursorOptions, LogStore, TimestampFilter};

/// Names the cursor a [`TailingStream`] currently has open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle {
    id: u64,
}

impl CursorHandle {
    /// Per-stream identifier of the cursor.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Why a streaming loop returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// A stop was requested.
    Stopped,
    /// The configured number of pulls was performed.
    IterationLimit,
}

/// Outcome of one call to [`TailingStream::stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Pull operations performed.
    pub pulls: u64,
    /// Records handed to the handler successfully.
    pub delivered: u64,
    /// Why the loop returned.
    pub exit: StreamExit,
}

struct OpenCursor<C> {
    id: u64,
    cursor: C,
}

/// Leaves `Streaming` when a loop ends, including when its future is dropped.
struct StreamingGuard<'a>(&'a StateCell);

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_streaming();
    }
}

/// Resumable tail over a [`LogStore`].
///
/// A stream owns at most one tailable cursor. Typical use:
///
/// ```ignore
/// let stream = Arc::new(TailingStream::new(store, TailConfig::default())?);
/// let handle = stream.open(resume_after.as_ref()).await?;
/// stream.stream(handle, |record| apply(record), None).await?;
/// stream.dispose().await;
/// ```
///
/// [`stop`](Self::stop) may be called from another task while a loop runs. It
/// is observed at the head of the loop, before the next pull, so an in-flight
/// pull and the delivery of its batch always complete first.
pub struct TailingStream<S: LogStore> {
    store: Arc<S>,
    config: TailConfig,
    state: StateCell,
    /// Held by a running loop for its whole duration.
    cursor: Mutex<Option<OpenCursor<S::Cursor>>>,
    next_cursor_id: AtomicU64,
}

impl<S: LogStore> TailingStream<S> {
    /// Create an idle stream over `store`.
    ///
    /// Fails with [`Error::Configuration`] if the settings are invalid or the
    /// store cannot be tailed.
    pub fn new(store: Arc<S>, config: TailConfig) -> Result<Self, Error> {
        config.validate()?;
        store.check_tailable()?;

        Ok(Self {
            store,
            config,
            state: StateCell::new(),
            cursor: Mutex::new(None),
            next_cursor_id: AtomicU64::new(1),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state.load()
    }

    /// Whether a loop is actively pulling and delivering records.
    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// The settings this stream was created with.
    pub fn config(&self) -> &TailConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Open a tailable cursor over records strictly after `resume_after`, or
    /// over the whole log when no resume point is given.
    ///
    /// Several records can share a timestamp. Resuming after a record skips
    /// any later-appended record with exactly the same timestamp.
    pub async fn open(&self, resume_after: Option<&LogRecord>) -> Result<CursorHandle, Error> {
        if self.state() != StreamState::Idle {
            return Err(Error::AlreadyOpen);
        }

        let mut slot = self.cursor.lock().await;
        self.state
            .transition(StreamState::Idle, StreamState::Tailing)
            .map_err(|_| Error::AlreadyOpen)?;

        let filter = match resume_after {
            Some(record) => TimestampFilter::After(record.timestamp),
            None => TimestampFilter::Unbounded,
        };

        let cursor = match self
            .store
            .open_tailable_cursor(filter, CursorOptions::from(&self.config))
            .await
        {
            Ok(cursor) => cursor,
            Err(e) => {
                self.state.store(StreamState::Idle);
                return Err(e);
            }
        };

        let id = self.next_cursor_id.fetch_add(1, Ordering::SeqCst);
        *slot = Some(OpenCursor { id, cursor });

        info!(
            cursor = id,
            resume_after = ?resume_after.map(|r| r.timestamp),
            "tailing cursor opened"
        );
        Ok(CursorHandle { id })
    }

    /// Resolve the resume point for `boundary` and open a cursor after it.
    ///
    /// Returns the resolved record alongside the handle; `None` means the log
    /// had no record at or before the boundary and the cursor covers the
    /// whole log.
    pub async fn open_resuming(
        &self,
        boundary: Option<LogicalTimestamp>,
    ) -> Result<(CursorHandle, Option<LogRecord>), Error> {
        let resume_after = ResumePointResolver::new(self.store.clone())
            .find_most_recent_at_or_before(boundary)
            .await?;
        let handle = self.open(resume_after.as_ref()).await?;
        Ok((handle, resume_after))
    }

    /// Pull batches from the open cursor and hand each record to `on_record`.
    ///
    /// Runs until a stop is requested or, when `max_iterations` is set, until
    /// that many pulls have been performed. The cap counts pulls, not records:
    /// a pull may return zero, one, or many records, and the batch that
    /// reaches the cap is delivered in full.
    ///
    /// A handler error is returned immediately as [`Error::Handler`]. The rest
    /// of that batch is not delivered and will not be seen again on this
    /// cursor. The cursor is left open in every case; release it with
    /// [`dispose`](Self::dispose).
    ///
    /// Dropping the returned future ends the loop at its current await point.
    /// The stream then leaves `Streaming` as if the loop had returned, and any
    /// batch being pulled is lost to this cursor.
    pub async fn stream<F, E>(
        &self,
        handle: CursorHandle,
        mut on_record: F,
        max_iterations: Option<u64>,
    ) -> Result<StreamSummary, Error>
    where
        F: FnMut(LogRecord) -> Result<(), E>,
        E: Into<HandlerError>,
    {
        match self.state() {
            StreamState::Idle => return Err(Error::NotOpen),
            StreamState::Streaming => return Err(Error::AlreadyStreaming),
            StreamState::Tailing | StreamState::Stopped => {}
        }

        // A held slot means another loop owns the cursor or open/dispose is running.
        let mut slot = self
            .cursor
            .try_lock()
            .map_err(|_| Error::AlreadyStreaming)?;
        let open = slot.as_mut().ok_or(Error::NotOpen)?;
        if open.id != handle.id {
            return Err(Error::StaleCursor {
                expected: open.id,
                actual: handle.id,
            });
        }

        let mut summary = StreamSummary {
            pulls: 0,
            delivered: 0,
            exit: StreamExit::Stopped,
        };

        match self
            .state
            .transition(StreamState::Tailing, StreamState::Streaming)
        {
            Ok(()) => {}
            Err(StreamState::Stopped) => {
                debug!(cursor = open.id, "stop already requested, not pulling");
                return Ok(summary);
            }
            Err(StreamState::Streaming) => return Err(Error::AlreadyStreaming),
            Err(StreamState::Idle | StreamState::Tailing) => return Err(Error::NotOpen),
        }

        let guard = StreamingGuard(&self.state);
        debug!(cursor = open.id, max_iterations = ?max_iterations, "streaming started");
        let result = self
            .pull_loop(open, &mut on_record, max_iterations, &mut summary)
            .await;
        drop(guard);

        let exit = result?;
        summary.exit = exit;
        info!(
            cursor = open.id,
            pulls = summary.pulls,
            delivered = summary.delivered,
            exit = ?exit,
            "streaming finished"
        );
        Ok(summary)
    }

    async fn pull_loop<F, E>(
        &self,
        open: &mut OpenCursor<S::Cursor>,
        on_record: &mut F,
        max_iterations: Option<u64>,
        summary: &mut StreamSummary,
    ) -> Result<StreamExit, Error>
    where
        F: FnMut(LogRecord) -> Result<(), E>,
        E: Into<HandlerError>,
    {
        loop {
            if self.state() == StreamState::Stopped {
                return Ok(StreamExit::Stopped);
            }
            if max_iterations.is_some_and(|max| summary.pulls >= max) {
                return Ok(StreamExit::IterationLimit);
            }

            let batch = self.store.pull(&mut open.cursor).await?;
            summary.pulls += 1;
            debug!(cursor = open.id, pull = summary.pulls, records = batch.len(), "pulled batch");

            for record in batch {
                let timestamp = record.timestamp;
                if let Err(e) = on_record(record) {
                    let e = e.into();
                    warn!(
                        cursor = open.id,
                        timestamp = %timestamp,
                        error = %e,
                        "record handler failed, abandoning the rest of the batch"
                    );
                    return Err(Error::Handler(e));
                }
                summary.delivered += 1;
            }
        }
    }

    /// Ask a running loop to return before its next pull.
    ///
    /// Does not interrupt an in-flight pull or handler call. Has no effect when
    /// no cursor is open.
    pub fn stop(&self) {
        if self.state.request_stop() {
            info!("stop requested");
        }
    }

    /// Close the open cursor, if any, and return to [`StreamState::Idle`].
    ///
    /// A running loop is stopped first and its in-flight pull is allowed to
    /// finish. Calling this with no cursor open is a no-op. The stop request is
    /// cleared, so the stream can be opened again.
    pub async fn dispose(&self) {
        self.state.request_stop();

        let mut slot = self.cursor.lock().await;
        if let Some(open) = slot.take() {
            self.store.close(open.cursor);
            info!(cursor = open.id, "tailing cursor disposed");
        }
        self.state.store(StreamState::Idle);
    }
}

impl<S: LogStore> Drop for TailingStream<S> {
    fn drop(&mut self) {
        if let Some(open) = self.cursor.get_mut().take() {
            self.store.close(open.cursor);
            debug!(cursor = open.id, "tailing cursor closed on drop");
        }
    }
}
