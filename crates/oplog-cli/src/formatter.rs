//! Output formatting for log records.

use clap::ValueEnum;
use oplog_proto::{LogRecord, OpKind};
use serde::Serialize;

/// Output format for records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Space-separated columns
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Text => write!(f, "text"),
        }
    }
}

#[derive(Serialize)]
struct RecordView<'a> {
    timestamp: String,
    op: OpKind,
    namespace: &'a str,
    document_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
}

/// Decode a record body for display: JSON when it parses, text otherwise.
fn body_value(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Format a record as a single output line.
pub fn format_record(record: &LogRecord, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let view = RecordView {
                timestamp: record.timestamp.to_string(),
                op: record.op,
                namespace: &record.namespace,
                document_id: &record.document_id,
                body: record.body.as_deref().map(body_value),
            };
            serde_json::to_string(&view).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
        }
        OutputFormat::Text => {
            let op = serde_json::to_value(record.op)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            let body = record
                .body
                .as_deref()
                .map(|b| body_value(b).to_string())
                .unwrap_or_default();
            format!(
                "{} {} {} {} {}",
                record.timestamp, op, record.namespace, record.document_id, body
            )
            .trim_end()
            .to_string()
        }
    }
}

/// Format the absence of a record.
pub fn format_none(format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => "null".to_string(),
        OutputFormat::Text => "(none)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use oplog_proto::LogicalTimestamp;

    use super::*;

    fn sample(body: Option<&[u8]>) -> LogRecord {
        LogRecord::new(
            LogicalTimestamp::new(12, 3),
            OpKind::Update,
            "shop.orders",
            "o-9",
            body.map(|b| b.to_vec()),
        )
    }

    #[test]
    fn test_json_embeds_json_body() {
        let line = format_record(&sample(Some(br#"{"qty":2}"#)), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["timestamp"], "12:3");
        assert_eq!(value["op"], "update");
        assert_eq!(value["body"]["qty"], 2);
    }

    #[test]
    fn test_json_falls_back_to_text_body() {
        let line = format_record(&sample(Some(b"not json")), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["body"], "not json");
    }

    #[test]
    fn test_json_omits_missing_body() {
        let line = format_record(&sample(None), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(value.get("body").is_none());
    }

    #[test]
    fn test_text_columns() {
        assert_eq!(
            format_record(&sample(None), OutputFormat::Text),
            "12:3 update shop.orders o-9"
        );
    }

    #[test]
    fn test_format_none() {
        assert_eq!(format_none(OutputFormat::Json), "null");
    }
}
