//! Command implementations.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use oplog_core::{LogStore, OpLog, ResumePointResolver, StreamSummary, TailingStream};
use oplog_proto::{LogRecord, LogicalTimestamp, OpKind};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{AppendArgs, ResumeFrom, TailOptions};
use crate::error::CliError;
use crate::formatter::{format_record, OutputFormat};

/// Open the oplog at `path`.
///
/// With `create` unset the directory must already hold an oplog.
pub fn open_log(path: &Path, create: bool) -> Result<Arc<OpLog>, CliError> {
    let db = sled::open(path)?;
    let log = if create {
        OpLog::open(&db)?
    } else {
        let log = OpLog::open_existing(&db)?;
        log.check_tailable()?;
        log
    };
    debug!(path = %path.display(), records = log.len(), "oplog opened");
    Ok(Arc::new(log))
}

fn encode_body(body: Option<serde_json::Value>) -> Result<Option<Vec<u8>>, CliError> {
    body.map(|v| serde_json::to_vec(&v))
        .transpose()
        .map_err(CliError::from)
}

/// Append a clock-stamped record.
pub fn append(log: &OpLog, args: AppendArgs) -> Result<LogRecord, CliError> {
    let body = args
        .body
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()?;
    let record = log.append_now(args.op.into(), args.namespace, args.id, encode_body(body)?)?;
    info!(timestamp = %record.timestamp, "record appended");
    Ok(record)
}

/// Resolve the most recent record at or before `boundary`.
pub async fn latest(
    log: Arc<OpLog>,
    boundary: Option<LogicalTimestamp>,
) -> Result<Option<LogRecord>, CliError> {
    let record = ResumePointResolver::new(log)
        .find_most_recent_at_or_before(boundary)
        .await?;
    Ok(record)
}

/// Open a cursor per `options`, write every delivered record to `out`, and
/// release the cursor when the loop returns.
pub async fn tail<W: Write>(
    stream: &TailingStream<OpLog>,
    options: &TailOptions,
    format: OutputFormat,
    out: &mut W,
) -> Result<StreamSummary, CliError> {
    let handle = match options.resume {
        ResumeFrom::Beginning => stream.open(None).await?,
        ResumeFrom::After(ts) => stream.open(Some(&LogRecord::noop(ts))).await?,
        ResumeFrom::Resolved(boundary) => {
            let (handle, resumed) = stream.open_resuming(boundary).await?;
            info!(
                boundary = ?boundary,
                resume_after = ?resumed.map(|r| r.timestamp),
                "resume point resolved"
            );
            handle
        }
    };

    let result = stream
        .stream(
            handle,
            |record| writeln!(out, "{}", format_record(&record, format)),
            options.max_iterations,
        )
        .await;

    stream.dispose().await;
    Ok(result?)
}

fn default_op() -> OpKind {
    OpKind::Insert
}

/// One JSON input line for `tail --ingest-stdin`.
#[derive(Debug, Deserialize)]
struct IngestLine {
    #[serde(default = "default_op")]
    op: OpKind,
    namespace: String,
    #[serde(alias = "id")]
    document_id: String,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

/// Append records read as JSON lines from `reader` until it is exhausted.
///
/// Malformed lines are logged and skipped. Returns the number of records
/// appended. A read or append failure ends the task and is logged as it
/// happens.
pub fn spawn_ingest<R>(log: Arc<OpLog>, reader: R) -> JoinHandle<Result<u64, CliError>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = ingest(&log, reader).await;
        match &result {
            Ok(appended) => info!(appended, "input closed, ingest finished"),
            Err(e) => error!(error = %e, "ingest failed, no further input will be appended"),
        }
        result
    })
}

async fn ingest<R>(log: &OpLog, reader: R) -> Result<u64, CliError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut appended = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input: IngestLine = match serde_json::from_str(line) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "skipping malformed input line");
                continue;
            }
        };

        let record = log.append_now(
            input.op,
            input.namespace,
            input.document_id,
            encode_body(input.body)?,
        )?;
        debug!(timestamp = %record.timestamp, "ingested record");
        appended += 1;
    }

    Ok(appended)
}

/// Settle an ingest task once tailing is over.
///
/// A task that already finished has its outcome returned, errors included.
/// One still waiting on input is aborted and yields `None`.
pub async fn finish_ingest(
    task: JoinHandle<Result<u64, CliError>>,
) -> Result<Option<u64>, CliError> {
    if task.is_finished() {
        return Ok(Some(task.await??));
    }
    task.abort();
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use oplog_core::{StreamExit, TailConfig};

    use super::*;
    use crate::config::OpArg;

    fn temp_log() -> (tempfile::TempDir, Arc<OpLog>) {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir.path().join("log"), true).unwrap();
        (dir, log)
    }

    fn append_args(id: &str, body: Option<&str>) -> AppendArgs {
        AppendArgs {
            op: OpArg::Insert,
            namespace: "shop.orders".to_string(),
            id: id.to_string(),
            body: body.map(str::to_string),
        }
    }

    fn options(resume: ResumeFrom, max_iterations: u64) -> TailOptions {
        TailOptions {
            resume,
            max_iterations: Some(max_iterations),
            ingest_stdin: false,
            tail: TailConfig::new().with_await_interval(Duration::from_millis(10)),
        }
    }

    #[test]
    fn test_open_existing_requires_oplog() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_log(&dir.path().join("empty"), false);
        assert!(matches!(
            result,
            Err(CliError::Core(oplog_core::Error::Configuration(_)))
        ));
    }

    #[test]
    fn test_append_rejects_invalid_body() {
        let (_dir, log) = temp_log();
        let result = append(&log, append_args("a", Some("{not json")));
        assert!(matches!(result, Err(CliError::Json(_))));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_append_then_latest() {
        let (_dir, log) = temp_log();
        append(&log, append_args("a", None)).unwrap();
        let second = append(&log, append_args("b", Some(r#"{"qty":1}"#))).unwrap();

        let found = latest(log.clone(), None).await.unwrap().unwrap();
        assert_eq!(found, second);
        assert!(latest(log, Some(LogicalTimestamp::MIN)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tail_writes_lines_and_disposes() {
        let (_dir, log) = temp_log();
        let first = append(&log, append_args("a", None)).unwrap();
        append(&log, append_args("b", None)).unwrap();

        let options = options(ResumeFrom::After(first.timestamp), 2);
        let stream = TailingStream::new(log.clone(), options.tail.clone()).unwrap();
        let mut out = Vec::new();
        let summary = tail(&stream, &options, OutputFormat::Text, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("shop.orders b"));
        assert_eq!(summary.exit, StreamExit::IterationLimit);
        assert_eq!(log.open_cursor_count(), 0);
    }

    #[tokio::test]
    async fn test_ingest_appends_valid_lines() {
        let (_dir, log) = temp_log();
        let input: &'static [u8] = b"{\"namespace\":\"shop.orders\",\"id\":\"o-1\",\"body\":{\"qty\":3}}\n\
              not json\n\
              \n\
              {\"op\":\"delete\",\"namespace\":\"shop.orders\",\"document_id\":\"o-1\"}\n";

        let appended = spawn_ingest(log.clone(), input).await.unwrap().unwrap();
        assert_eq!(appended, 2);

        let newest = latest(log, None).await.unwrap().unwrap();
        assert_eq!(newest.op, OpKind::Delete);
        assert_eq!(newest.document_id, "o-1");
    }

    #[tokio::test]
    async fn test_ingest_failure_is_reported() {
        let (_dir, log) = temp_log();
        let input: &'static [u8] =
            b"{\"namespace\":\"shop.orders\",\"id\":\"o-1\"}\n\xff\xfe\n";

        let task = spawn_ingest(log.clone(), input);
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }

        let result = finish_ingest(task).await;
        assert!(matches!(result, Err(CliError::Io(_))));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_finish_ingest_aborts_pending_task() {
        let (_dir, log) = temp_log();
        let (_writer, reader) = tokio::io::duplex(64);

        let task = spawn_ingest(log.clone(), tokio::io::BufReader::new(reader));
        tokio::task::yield_now().await;

        assert!(matches!(finish_ingest(task).await, Ok(None)));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_finish_ingest_returns_count() {
        let (_dir, log) = temp_log();
        let input: &'static [u8] = b"{\"namespace\":\"shop.orders\",\"id\":\"o-1\"}\n";

        let task = spawn_ingest(log, input);
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(finish_ingest(task).await, Ok(Some(1))));
    }
}
