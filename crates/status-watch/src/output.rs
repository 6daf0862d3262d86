//! Output formatting for status-watch (raw, ping, json)

use std::io::{self, Write};

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use status_stream::StatusSink;
use tokio::sync::mpsc;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Status text exactly as received (default)
    #[default]
    Raw,
    /// Decode ping records into UP/DOWN lines
    Ping,
    /// One JSON object per status
    Json,
}

/// Context for output rendering
#[derive(Debug, Clone)]
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }
}

// =============================================================================
// Ping records
// =============================================================================

/// One health check result as published by the status server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PingRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub service_id: Option<u64>,
    pub http_response: u16,
    /// Read as UTC when the server sends no offset
    #[serde(deserialize_with = "utc_or_naive")]
    pub pinged_at: DateTime<Utc>,
}

fn utc_or_naive<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    if let Ok(at) = DateTime::parse_from_rfc3339(&text) {
        return Ok(at.with_timezone(&Utc));
    }
    text.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

impl PingRecord {
    /// Decode a status payload, `None` if it is not a ping record
    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn is_up(&self) -> bool {
        (200..400).contains(&self.http_response)
    }

    /// "UP (HTTP 200) at 2024-05-01 10:00:00 UTC"
    pub fn summary(&self, colorize: bool) -> String {
        let state = if self.is_up() { "UP" } else { "DOWN" };
        let state = match (colorize, self.is_up()) {
            (false, _) => state.to_string(),
            (true, true) => state.green().bold().to_string(),
            (true, false) => state.red().bold().to_string(),
        };
        format!(
            "{} (HTTP {}) at {}",
            state,
            self.http_response,
            self.pinged_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

#[derive(Debug, Serialize)]
struct JsonLine<'a> {
    service: &'a str,
    status: &'a str,
    received_at: DateTime<Utc>,
}

/// Render one status payload in `format`
pub fn render_status(format: OutputFormat, service: &str, text: &str, colorize: bool) -> String {
    match format {
        OutputFormat::Raw => text.to_string(),
        OutputFormat::Ping => PingRecord::decode(text)
            .map(|ping| ping.summary(colorize))
            .unwrap_or_else(|| text.to_string()),
        OutputFormat::Json => {
            let line = JsonLine {
                service,
                status: text,
                received_at: Utc::now(),
            };
            serde_json::to_string(&line).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

// =============================================================================
// Terminal sink
// =============================================================================

/// Prints every status of one service to stdout
///
/// Write failures (a closed pipe, for one) are reported on `write_errors`
/// instead of panicking.
pub struct TerminalSink {
    service: String,
    format: OutputFormat,
    prefix: bool,
    write_errors: mpsc::UnboundedSender<io::Error>,
}

impl TerminalSink {
    /// `prefix` labels each line with the service name
    pub fn new(
        service: impl Into<String>,
        format: OutputFormat,
        prefix: bool,
        write_errors: mpsc::UnboundedSender<io::Error>,
    ) -> Self {
        Self {
            service: service.into(),
            format,
            prefix,
            write_errors,
        }
    }

    fn line(&self, text: &str, colorize: bool) -> String {
        let status = render_status(self.format, &self.service, text, colorize);
        if self.prefix && self.format != OutputFormat::Json {
            let label = if colorize {
                self.service.bold().to_string()
            } else {
                self.service.clone()
            };
            format!("{}: {}", label, status)
        } else {
            status
        }
    }

    fn write_to<W: Write>(&self, out: &mut W, text: &str, colorize: bool) {
        let result = writeln!(out, "{}", self.line(text, colorize)).and_then(|_| out.flush());
        if let Err(e) = result {
            // The receiver is gone only once the watch has stopped
            let _ = self.write_errors.send(e);
        }
    }
}

impl StatusSink for TerminalSink {
    fn display(&self, text: &str) {
        self.write_to(&mut io::stdout().lock(), text, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PING_UP: &str = r#"{"id": 12, "service_id": 7, "http_response": 200, "pinged_at": "2024-05-01T10:00:00.123456+00:00"}"#;
    const PING_DOWN: &str =
        r#"{"id": 13, "service_id": 7, "http_response": 503, "pinged_at": "2024-05-01T12:30:05+02:00"}"#;

    #[test]
    fn test_decode_ping_record() {
        let ping = PingRecord::decode(PING_UP).unwrap();
        assert_eq!(ping.id, Some(12));
        assert_eq!(ping.service_id, Some(7));
        assert_eq!(ping.http_response, 200);
        assert!(ping.is_up());
    }

    #[test]
    fn test_ping_summary() {
        let up = PingRecord::decode(PING_UP).unwrap();
        assert_eq!(up.summary(false), "UP (HTTP 200) at 2024-05-01 10:00:00 UTC");

        // Offsets are normalized to UTC
        let down = PingRecord::decode(PING_DOWN).unwrap();
        assert_eq!(down.summary(false), "DOWN (HTTP 503) at 2024-05-01 10:30:05 UTC");
    }

    #[test]
    fn test_ping_without_offset_read_as_utc() {
        let ping = PingRecord::decode(
            r#"{"id": 3, "service_id": 1, "http_response": 500, "pinged_at": "2024-05-01T10:00:00.123456"}"#,
        )
        .unwrap();
        assert!(!ping.is_up());
        assert_eq!(ping.summary(false), "DOWN (HTTP 500) at 2024-05-01 10:00:00 UTC");

        let ping = PingRecord::decode(
            r#"{"http_response": 200, "pinged_at": "2024-05-01T10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(ping.summary(false), "UP (HTTP 200) at 2024-05-01 10:00:00 UTC");
    }

    #[test]
    fn test_redirect_counts_as_up() {
        let ping = PingRecord::decode(
            r#"{"http_response": 301, "pinged_at": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(ping.is_up());
        assert_eq!(ping.id, None);
    }

    #[test]
    fn test_render_raw_is_verbatim() {
        assert_eq!(
            render_status(OutputFormat::Raw, "svc", PING_UP, false),
            PING_UP
        );
    }

    #[test]
    fn test_render_ping_falls_back_to_text() {
        assert_eq!(
            render_status(OutputFormat::Ping, "svc", "healthy", false),
            "healthy"
        );
        assert_eq!(
            render_status(OutputFormat::Ping, "svc", r#"{"http_response": 200}"#, false),
            r#"{"http_response": 200}"#
        );
    }

    #[test]
    fn test_render_json() {
        let line = render_status(OutputFormat::Json, "checkout-api", "healthy", false);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["service"], "checkout-api");
        assert_eq!(value["status"], "healthy");
        assert!(value["received_at"].is_string());
    }

    fn terminal_sink(
        format: OutputFormat,
        prefix: bool,
    ) -> (TerminalSink, mpsc::UnboundedReceiver<io::Error>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TerminalSink::new("checkout-api", format, prefix, tx), rx)
    }

    /// Writer whose reader has gone away
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_prefix() {
        let (sink, _rx) = terminal_sink(OutputFormat::Ping, true);
        assert_eq!(
            sink.line(PING_UP, false),
            "checkout-api: UP (HTTP 200) at 2024-05-01 10:00:00 UTC"
        );

        let (sink, _rx) = terminal_sink(OutputFormat::Raw, false);
        assert_eq!(sink.line("healthy", false), "healthy");
    }

    #[test]
    fn test_sink_writes_lines() {
        let (sink, mut rx) = terminal_sink(OutputFormat::Raw, true);
        let mut out = Vec::new();

        sink.write_to(&mut out, "healthy", false);
        sink.write_to(&mut out, "degraded", false);

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "checkout-api: healthy\ncheckout-api: degraded\n"
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_pipe_reported_not_panicking() {
        let (sink, mut rx) = terminal_sink(OutputFormat::Raw, false);

        sink.write_to(&mut ClosedPipe, "healthy", false);

        let err = rx.try_recv().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_format_from_config_value() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: OutputFormat,
        }
        let w: Wrapper = toml::from_str(r#"format = "ping""#).unwrap();
        assert_eq!(w.format, OutputFormat::Ping);
    }
}
