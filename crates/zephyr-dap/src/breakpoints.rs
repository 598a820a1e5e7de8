//! Breakpoint engine
//!
//! Stores source-line and function breakpoints and answers the hot-path
//! question: must execution halt at this instruction? A fired record is
//! remembered so a line that expands to many instructions reports exactly
//! one stop per visit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use zephyr_vm::FrameStack;

use crate::cache::BinaryCache;
use crate::error::{DebugError, DebugResult};
use crate::protocol::{
    Breakpoint, BreakpointEventBody, Event, FunctionBreakpoint, Source, SourceBreakpoint,
};
use crate::refs::{breakpoint_id, script_reference, source_reference, ScriptRef};
use crate::session::EventSink;

// ── Records ──────────────────────────────────────────────────────────────────

/// One installed breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointRecord {
    /// Stable id: `(script_ref << 32) | line`.
    pub id: i64,
    pub line: u32,
    /// Bound instruction index, when known.
    pub instruction: Option<u32>,
    /// Set for function breakpoints on native functions.
    pub is_native: bool,
}

/// All source breakpoints of one script.
#[derive(Debug, Clone)]
pub struct ScriptBreakpoints {
    pub script_ref: ScriptRef,
    pub source: Source,
    pub lines: BTreeMap<u32, BreakpointRecord>,
}

#[derive(Default)]
struct BreakpointState {
    /// Source breakpoints keyed by script reference.
    source: HashMap<ScriptRef, ScriptBreakpoints>,
    /// Function breakpoints keyed by lowercased `Class.Function`.
    functions: HashMap<String, BreakpointRecord>,
    /// Id of the record most recently reported as hit; suppresses repeat
    /// fires while the PC stays on the same line.
    last_seen: Option<i64>,
}

// ── BreakpointManager ────────────────────────────────────────────────────────

/// Owner of the breakpoint table.
pub struct BreakpointManager {
    cache: Arc<BinaryCache>,
    state: Mutex<BreakpointState>,
    /// Event sink of the active session, for breakpoint-changed events.
    sink: Mutex<Option<Arc<dyn EventSink>>>,
}

impl BreakpointManager {
    pub fn new(cache: Arc<BinaryCache>) -> Self {
        Self {
            cache,
            state: Mutex::new(BreakpointState::default()),
            sink: Mutex::new(None),
        }
    }

    /// Attach the active session's event sink (cleared on session end).
    pub fn set_sink(&self, sink: Option<Arc<dyn EventSink>>) {
        *self.sink.lock().unwrap() = sink;
    }

    fn emit(&self, event: Event) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.send_event(event);
        }
    }

    // ── Installation ─────────────────────────────────────────────────────────

    /// Replace all breakpoints for one source.
    ///
    /// Verification means the script resolved and the line was recorded;
    /// lines are not checked against reachable bytecode.
    pub fn set_source_breakpoints(
        &self,
        source: &Source,
        requested: &[SourceBreakpoint],
    ) -> DebugResult<Vec<Breakpoint>> {
        let Some(binary) = self.cache.get_script_source(source) else {
            let shown = source.path.clone().unwrap_or_default();
            return Err(DebugError::NotLoaded(shown));
        };
        let script_ref = {
            let by_source = source_reference(source);
            if by_source.is_valid() {
                by_source
            } else {
                binary.script_ref
            }
        };

        let mut info = ScriptBreakpoints {
            script_ref,
            source: source.clone(),
            lines: BTreeMap::new(),
        };
        let mut verified = Vec::with_capacity(requested.len());
        for request in requested {
            let line = request.line.max(0) as u32;
            let id = breakpoint_id(script_ref, line);
            info.lines.insert(
                line,
                BreakpointRecord {
                    id,
                    line,
                    instruction: None,
                    is_native: false,
                },
            );
            verified.push(Breakpoint {
                id: Some(id),
                verified: true,
                message: None,
                source: Some(source.clone()),
                line: Some(i64::from(line)),
            });
        }
        debug!(%script_ref, count = info.lines.len(), "source breakpoints set");

        let mut state = self.state.lock().unwrap();
        state.source.insert(script_ref, info);
        Ok(verified)
    }

    /// Replace the whole function-breakpoint set.
    ///
    /// Names must be `Class.Function` (case-insensitive). Entries that do
    /// not resolve come back unverified with a message instead of failing
    /// the request.
    pub fn set_function_breakpoints(
        &self,
        requested: &[FunctionBreakpoint],
    ) -> Vec<Breakpoint> {
        let mut records = HashMap::new();
        let mut reply = Vec::with_capacity(requested.len());

        for request in requested {
            match self.resolve_function_record(&request.name) {
                Ok(record) => {
                    reply.push(Breakpoint {
                        id: Some(record.id),
                        verified: true,
                        message: None,
                        source: None,
                        line: Some(i64::from(record.line)),
                    });
                    records.insert(request.name.to_ascii_lowercase(), record);
                }
                Err(err) => {
                    warn!(name = %request.name, %err, "function breakpoint rejected");
                    reply.push(Breakpoint {
                        verified: false,
                        message: Some(err.to_string()),
                        ..Breakpoint::default()
                    });
                }
            }
        }

        let mut state = self.state.lock().unwrap();
        state.functions = records;
        reply
    }

    fn resolve_function_record(&self, name: &str) -> DebugResult<BreakpointRecord> {
        let mut parts = name.split('.');
        let (Some(class_name), Some(func_name), None) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(DebugError::UnknownFunction(name.to_string()));
        };
        let Some((func, record_source)) = self.cache.find_function(class_name, func_name) else {
            return Err(DebugError::UnknownFunction(name.to_string()));
        };

        let script_ref = record_source
            .as_deref()
            .map(script_reference)
            .unwrap_or(ScriptRef::INVALID);
        let (line, is_native) = if func.is_native() {
            (1, true)
        } else {
            (func.first_line().unwrap_or(1), false)
        };
        Ok(BreakpointRecord {
            id: breakpoint_id(script_ref, line),
            line,
            instruction: None,
            is_native,
        })
    }

    /// Instruction breakpoints are not supported by the VM.
    pub fn set_instruction_breakpoints(&self) -> DebugResult<Vec<Breakpoint>> {
        Err(DebugError::NotSupported("instruction breakpoints"))
    }

    // ── Invalidation ─────────────────────────────────────────────────────────

    /// Drop all source breakpoints; with `emit_changed`, report each dropped
    /// record as unverified first.
    pub fn clear_all(&self, emit_changed: bool) {
        let drained: Vec<ScriptBreakpoints> = {
            let mut state = self.state.lock().unwrap();
            state.last_seen = None;
            state.source.drain().map(|(_, info)| info).collect()
        };
        if emit_changed {
            for info in &drained {
                self.emit_invalidated(info);
            }
        }
    }

    /// Drop one script's breakpoints, reporting each as unverified. No-op
    /// when the script has none.
    pub fn invalidate_for_script(&self, script_ref: ScriptRef) {
        let removed = {
            let mut state = self.state.lock().unwrap();
            state.source.remove(&script_ref)
        };
        if let Some(info) = removed {
            self.emit_invalidated(&info);
        }
    }

    fn emit_invalidated(&self, info: &ScriptBreakpoints) {
        for record in info.lines.values() {
            self.emit(Event::BreakpointChanged(BreakpointEventBody {
                reason: "changed",
                breakpoint: Breakpoint {
                    id: Some(record.id),
                    verified: false,
                    message: None,
                    source: Some(info.source.clone()),
                    line: Some(i64::from(record.line)),
                },
            }));
        }
    }

    // ── Hot path ─────────────────────────────────────────────────────────────

    /// Decide whether the VM is at a breakpoint it has not yet reported.
    ///
    /// Never fails: anomalies (no frames, unmapped PC) clear the last-seen
    /// record and return `false`.
    pub fn is_at_breakpoint(&self, stack: &FrameStack) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.source.is_empty() && state.functions.is_empty() {
            state.last_seen = None;
            return false;
        }
        let Some(frame) = stack.top_frame() else {
            state.last_seen = None;
            return false;
        };

        // Function breakpoints fire for native and script functions alike.
        let qualified = frame.func.qualified_name.to_ascii_lowercase();
        if let Some(record) = state.functions.get(&qualified) {
            let id = record.id;
            if state.last_seen == Some(id) {
                return false;
            }
            state.last_seen = Some(id);
            return true;
        }

        if frame.func.is_native() {
            state.last_seen = None;
            return false;
        }
        let Some(source_path) = frame.func.source_path.as_deref() else {
            state.last_seen = None;
            return false;
        };
        let script_ref = script_reference(source_path);
        let Some(script) = state.source.get(&script_ref) else {
            state.last_seen = None;
            return false;
        };

        let record = frame
            .func
            .pc_to_line(frame.pc)
            .and_then(|line| script.lines.get(&line));
        match record {
            Some(record) => {
                let id = record.id;
                if state.last_seen == Some(id) {
                    return false;
                }
                state.last_seen = Some(id);
                true
            }
            None => {
                state.last_seen = None;
                false
            }
        }
    }

    /// Number of installed source breakpoint records for a script.
    pub fn source_breakpoint_count(&self, script_ref: ScriptRef) -> usize {
        let state = self.state.lock().unwrap();
        state
            .source
            .get(&script_ref)
            .map_or(0, |info| info.lines.len())
    }
}
