//! Protocol I/O for JSONL message parsing and serialization
//!
//! This module provides:
//! - `parse_graceful` for classifying a single line without failing the stream
//! - `serialize_line` for serializing messages to one JSON line
//! - `JsonlReader` for streaming JSONL reads (script stdout, host transport)

use std::io::{self, BufRead, BufReader, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Maximum length for raw JSON in logs (prevents huge payloads in logs)
const MAX_RAW_LOG_PREVIEW: usize = 200;

/// Get a truncated preview of raw JSON for logging
pub fn log_preview(raw: &str) -> (&str, usize) {
    let len = raw.len();
    if len > MAX_RAW_LOG_PREVIEW {
        let mut end = MAX_RAW_LOG_PREVIEW;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        (&raw[..end], len)
    } else {
        (raw, len)
    }
}

/// Result type for graceful message parsing
#[derive(Debug)]
pub enum ParseResult<T> {
    Ok(T),
    /// Valid JSON object with neither a `type` nor an `action` discriminant
    MissingType { raw: String },
    /// Discriminant present but the rest of the object does not fit
    InvalidPayload {
        message_type: String,
        error: String,
        raw: String,
    },
    /// JSON parsing failed entirely (syntax error)
    ParseError(serde_json::Error),
}

/// Parse a line, classifying failures instead of returning a bare error
///
/// Parses to `serde_json::Value` first so the discriminant can be reported
/// even when the typed conversion fails.
pub fn parse_graceful<T: DeserializeOwned>(line: &str) -> ParseResult<T> {
    let (preview, _) = log_preview(line);

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return ParseResult::ParseError(e),
    };

    let message_type = match value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(|t| t.as_str())
    {
        Some(t) => t.to_string(),
        None => {
            return ParseResult::MissingType {
                raw: preview.to_string(),
            }
        }
    };

    match serde_json::from_value::<T>(value) {
        Ok(msg) => ParseResult::Ok(msg),
        Err(e) => ParseResult::InvalidPayload {
            message_type,
            error: e.to_string(),
            raw: preview.to_string(),
        },
    }
}

/// Serialize a message to a single JSON line (without newline)
pub fn serialize_line<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Write one message followed by a newline and flush
pub fn write_line<T: Serialize, W: Write>(writer: &mut W, msg: &T) -> io::Result<()> {
    let json = serialize_line(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let (preview, len) = log_preview(&json);
    debug!(raw_preview = %preview, raw_len = len, "Writing JSONL line");
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// JSONL reader for streaming message reads
///
/// Uses a reusable line buffer to avoid allocating a new String per line read.
pub struct JsonlReader<R: Read> {
    reader: BufReader<R>,
    line_buffer: String,
}

impl<R: Read> JsonlReader<R> {
    pub fn new(reader: R) -> Self {
        JsonlReader {
            reader: BufReader::new(reader),
            line_buffer: String::with_capacity(1024),
        }
    }

    /// Read the next message, skipping lines that do not parse
    ///
    /// # Returns
    /// * `Ok(Some(msg))` - Successfully parsed message
    /// * `Ok(None)` - End of stream
    /// * `Err(e)` - IO error (parse problems are logged and skipped)
    pub fn next_message_graceful<T: DeserializeOwned>(&mut self) -> io::Result<Option<T>> {
        loop {
            self.line_buffer.clear();
            if self.reader.read_line(&mut self.line_buffer)? == 0 {
                debug!("Reached end of JSONL stream");
                return Ok(None);
            }

            let trimmed = self.line_buffer.trim();
            if trimmed.is_empty() {
                continue;
            }

            let (preview, raw_len) = log_preview(trimmed);

            match parse_graceful::<T>(trimmed) {
                ParseResult::Ok(msg) => return Ok(Some(msg)),
                ParseResult::MissingType { .. } => {
                    warn!(
                        raw_preview = %preview,
                        raw_len = raw_len,
                        "Skipping message with missing 'type' field"
                    );
                }
                ParseResult::InvalidPayload {
                    message_type,
                    error,
                    ..
                } => {
                    warn!(
                        message_type = %message_type,
                        error = %error,
                        raw_preview = %preview,
                        raw_len = raw_len,
                        "Skipping message with invalid payload"
                    );
                }
                ParseResult::ParseError(e) => {
                    // Scripts print debug output on stdout; not fatal
                    warn!(
                        error = %e,
                        raw_preview = %preview,
                        raw_len = raw_len,
                        "Skipping non-JSON line"
                    );
                }
            }
        }
    }
}
