//! DAP wire framing
//!
//! Standard `Content-Length`-delimited JSON messages, the same framing both
//! directions. The reader tolerates unknown headers and CRLF or LF line
//! endings.

use std::io::{BufRead, BufReader, Read, Write};

use serde::Serialize;
use serde_json::Value;

use crate::error::{DebugError, DebugResult};

/// Read one framed JSON message from `reader`.
pub fn read_message<R: BufRead>(reader: &mut R) -> DebugResult<Value> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Err(DebugError::Disconnected);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value.trim().parse().ok();
        }
    }

    let len = content_length.ok_or_else(|| {
        DebugError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "missing Content-Length header",
        ))
    })?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Write one framed JSON message to `writer`.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> DebugResult<()> {
    let payload = serde_json::to_vec(message)?;
    write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Buffered read half of a DAP connection.
pub struct FramedReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> FramedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }

    pub fn read(&mut self) -> DebugResult<Value> {
        read_message(&mut self.inner)
    }
}
