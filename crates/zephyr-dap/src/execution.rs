//! Execution controller
//!
//! The state machine coordinating the VM thread (which enters the
//! instruction hook synchronously) with the DAP session thread. Pausing
//! parks the VM thread inside the hook on a coarse sleep loop; `continue`,
//! `step`, and `close` release it by mutating the state under the
//! instruction mutex.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;
use zephyr_vm::{FrameStack, StackRegistry, VmFunction};

use crate::breakpoints::BreakpointManager;
use crate::nodes::RuntimeState;
use crate::protocol::{ContinuedEventBody, Event, StoppedEventBody};
use crate::session::EventSink;

/// How long the paused VM thread sleeps between state checks.
const PAUSE_POLL: Duration = Duration::from_millis(100);

// ── States ───────────────────────────────────────────────────────────────────

/// Debugger execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    Running,
    Paused,
    Stepping,
}

/// Which step operation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    StepIn,
    StepOver,
    StepOut,
}

/// Why the VM stopped, as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseReason {
    Step,
    Breakpoint,
    Paused,
}

impl PauseReason {
    fn as_str(self) -> &'static str {
        match self {
            PauseReason::Step => "step",
            PauseReason::Breakpoint => "breakpoint",
            PauseReason::Paused => "paused",
        }
    }
}

/// Hook decision for the current instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckResult {
    /// Keep executing.
    None,
    /// A step target disappeared; fall back to free running.
    Continuing,
    /// Halt here.
    Pause(PauseReason),
}

/// Context of an in-flight step, captured when the step was requested.
struct StepContext {
    stack_id: u32,
    /// Identity of the frame the step started from, with its function for
    /// cross-checking recycled activation records.
    frame: Option<(u64, Arc<VmFunction>)>,
    kind: StepType,
}

struct ExecState {
    state: DebuggerState,
    closed: bool,
    session: Option<Arc<dyn EventSink>>,
    step: Option<StepContext>,
}

// ── ExecutionManager ─────────────────────────────────────────────────────────

/// Owner of the debugger state machine and the pause rendezvous.
pub struct ExecutionManager {
    inner: Mutex<ExecState>,
    breakpoints: Arc<BreakpointManager>,
    runtime: Arc<RuntimeState>,
    stacks: Arc<dyn StackRegistry>,
}

impl ExecutionManager {
    pub fn new(
        runtime: Arc<RuntimeState>,
        breakpoints: Arc<BreakpointManager>,
        stacks: Arc<dyn StackRegistry>,
    ) -> Self {
        Self {
            inner: Mutex::new(ExecState {
                state: DebuggerState::Running,
                closed: true,
                session: None,
                step: None,
            }),
            breakpoints,
            runtime,
            stacks,
        }
    }

    pub fn state(&self) -> DebuggerState {
        self.inner.lock().unwrap().state
    }

    // ── Session lifecycle ────────────────────────────────────────────────────

    pub fn open(&self, session: Arc<dyn EventSink>) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = false;
        inner.session = Some(session);
    }

    /// Force the VM loose and detach the session. Guarantees that subsequent
    /// hook entries return immediately; taking the instruction mutex here
    /// also means the VM thread is not mid-decision while we detach.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = DebuggerState::Running;
        inner.closed = true;
        inner.session = None;
        inner.step = None;
    }

    // ── DAP-side transitions ─────────────────────────────────────────────────

    /// Resume free running.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.state = DebuggerState::Running;
        inner.step = None;
        if let Some(session) = &inner.session {
            session.send_event(Event::Continued(ContinuedEventBody {
                thread_id: 1,
                all_threads_continued: true,
            }));
        }
        true
    }

    /// Request a pause; the stop is reported lazily from the next hook entry.
    pub fn pause(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == DebuggerState::Paused {
            return false;
        }
        inner.state = DebuggerState::Paused;
        true
    }

    /// Begin a step from the paused state.
    pub fn step(&self, stack_id: u32, kind: StepType) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != DebuggerState::Paused {
            return false;
        }
        let Some(stack) = self.stacks.stack(stack_id) else {
            return false;
        };
        let frame = stack
            .top_frame()
            .map(|frame| (frame.id, frame.func.clone()));
        inner.step = Some(StepContext {
            stack_id,
            frame,
            kind,
        });
        inner.state = DebuggerState::Stepping;
        debug!(stack_id, ?kind, "stepping");
        true
    }

    // ── VM-side hook ─────────────────────────────────────────────────────────

    /// The per-instruction hook, called synchronously on the VM thread.
    ///
    /// May block for the whole duration of a pause; returns once the state
    /// leaves `Paused` or the controller is closed.
    pub fn handle_instruction(&self, stack: &Arc<FrameStack>) {
        if self.inner.lock().unwrap().closed {
            return;
        }

        let decision = self.check_state(stack);
        match decision {
            CheckResult::None => {}
            CheckResult::Continuing => {
                let mut inner = self.inner.lock().unwrap();
                inner.state = DebuggerState::Running;
                inner.step = None;
                if let Some(session) = &inner.session {
                    session.send_event(Event::Continued(ContinuedEventBody {
                        thread_id: i64::from(stack.id),
                        all_threads_continued: true,
                    }));
                }
            }
            CheckResult::Pause(reason) => {
                let mut inner = self.inner.lock().unwrap();
                // The VM stack is thread-local state; publish it so the DAP
                // thread can reach the paused frames.
                self.runtime.set_global_stack(stack.clone());
                inner.state = DebuggerState::Paused;
                inner.step = None;
                if let Some(session) = &inner.session {
                    session.send_event(Event::Stopped(StoppedEventBody {
                        reason: reason.as_str(),
                        thread_id: Some(i64::from(stack.id)),
                        all_threads_stopped: true,
                    }));
                }
            }
        }

        loop {
            let inner = self.inner.lock().unwrap();
            if inner.state != DebuggerState::Paused || inner.closed {
                break;
            }
            drop(inner);
            thread::sleep(PAUSE_POLL);
        }

        if decision != CheckResult::None {
            let inner = self.inner.lock().unwrap();
            self.runtime.reset();
            if inner.state != DebuggerState::Running {
                self.runtime.set_global_stack(stack.clone());
            }
        }
    }

    fn check_state(&self, stack: &Arc<FrameStack>) -> CheckResult {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            DebuggerState::Paused => CheckResult::Pause(PauseReason::Paused),
            DebuggerState::Running => {
                drop(inner);
                if self.breakpoints.is_at_breakpoint(stack) {
                    CheckResult::Pause(PauseReason::Breakpoint)
                } else {
                    CheckResult::None
                }
            }
            DebuggerState::Stepping => {
                // Breakpoints take precedence over step conditions.
                if self.breakpoints.is_at_breakpoint(stack) {
                    return CheckResult::Pause(PauseReason::Breakpoint);
                }
                let Some(step) = &inner.step else {
                    // Step context without frames: run until the stack drains.
                    if !stack.has_frames() {
                        return CheckResult::Continuing;
                    }
                    return CheckResult::None;
                };
                if self.stacks.stack(step.stack_id).is_none() {
                    // The stack we were stepping through is gone.
                    return CheckResult::Continuing;
                }
                let Some((frame_id, func)) = &step.frame else {
                    if !stack.has_frames() {
                        return CheckResult::Continuing;
                    }
                    return CheckResult::None;
                };
                if !stack.has_frames() {
                    return CheckResult::None;
                }

                // Index of the recorded frame in the current list, top first.
                // A recycled activation record only counts if it still runs
                // the same function.
                let step_frame_index = stack
                    .frames_top_first()
                    .position(|frame| frame.id == *frame_id && Arc::ptr_eq(&frame.func, func));
                let fire = match step.kind {
                    StepType::StepIn => true,
                    StepType::StepOut => step_frame_index.is_none(),
                    StepType::StepOver => step_frame_index.is_none_or(|index| index == 0),
                };
                if fire {
                    CheckResult::Pause(PauseReason::Step)
                } else {
                    CheckResult::None
                }
            }
        }
    }
}
