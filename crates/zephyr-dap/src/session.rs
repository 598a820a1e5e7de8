//! DAP session write half
//!
//! One session per connected client. The session owns the shared write side
//! of the connection and the outgoing sequence counter; both the DAP request
//! thread (responses) and the VM thread (events) send through it, so writes
//! serialize on an internal lock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use tracing::warn;

use crate::error::{DebugError, DebugResult};
use crate::protocol::{Event, EventMessage, Request, Response};
use crate::transport::write_message;

/// Sink for adapter-emitted events.
///
/// The execution controller and breakpoint engine emit through this rather
/// than holding the concrete session, so tests can record events instead.
pub trait EventSink: Send + Sync {
    fn send_event(&self, event: Event);
}

/// The write half of one client connection.
pub struct DapSession {
    writer: Mutex<Box<dyn std::io::Write + Send>>,
    next_seq: AtomicI64,
}

impl DapSession {
    pub fn new(writer: Box<dyn std::io::Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            next_seq: AtomicI64::new(1),
        }
    }

    fn next_seq(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a success response with an optional body.
    pub fn respond_success(
        &self,
        request: &Request,
        body: Option<serde_json::Value>,
    ) -> DebugResult<()> {
        self.write(&Response {
            seq: self.next_seq(),
            kind: "response",
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        })
    }

    /// Send an error response carrying the error's message.
    pub fn respond_error(&self, request: &Request, error: &DebugError) -> DebugResult<()> {
        self.write(&Response {
            seq: self.next_seq(),
            kind: "response",
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(error.to_string()),
            body: None,
        })
    }

    /// Send an event.
    pub fn send(&self, event: &Event) -> DebugResult<()> {
        self.write(&EventMessage {
            seq: self.next_seq(),
            kind: "event",
            event: event.name(),
            body: event.body()?,
        })
    }

    fn write<T: serde::Serialize>(&self, message: &T) -> DebugResult<()> {
        let mut writer = self.writer.lock().unwrap();
        write_message(&mut *writer, message)
    }
}

impl EventSink for DapSession {
    fn send_event(&self, event: Event) {
        if let Err(err) = self.send(&event) {
            warn!(event = event.name(), %err, "failed to send event");
        }
    }
}
