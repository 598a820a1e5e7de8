//! Call frames and frame stacks
//!
//! An activation record carries its function, current PC, and the four
//! register banks plus the parameter bank. The debugger only ever sees a
//! stack while the VM thread is parked inside the instruction hook, so the
//! whole structure is plain shared data.

use std::sync::{Arc, Mutex};

use crate::reflect::VmFunction;
use crate::value::{VmString, VmValue};

/// Size of one encoded instruction in bytes.
pub const OPCODE_SIZE: u64 = 4;

// ── VmFrame ──────────────────────────────────────────────────────────────────

/// One activation record.
#[derive(Debug)]
pub struct VmFrame {
    /// Stable identity of this activation, assigned by the VM at call time.
    /// Survives register mutation; never reused within a run.
    pub id: u64,
    pub func: Arc<VmFunction>,
    /// Current program counter (absolute address).
    pub pc: u64,
    pub int_regs: Vec<i32>,
    pub float_regs: Vec<f64>,
    pub string_regs: Vec<VmString>,
    /// Address registers; the leading entries hold the implicit arguments
    /// (`self` for methods, `self`/`invoker`/`state_pointer` for actions).
    pub addr_regs: Vec<u64>,
    /// Parameter slots pushed for the next call.
    pub params: Vec<VmValue>,
    /// Parameter slots currently in use.
    pub num_param: u32,
}

impl VmFrame {
    /// Number of parameter slots available.
    pub fn max_param(&self) -> u32 {
        self.params.len() as u32
    }
}

// ── FrameStack ───────────────────────────────────────────────────────────────

/// A VM execution stack. Frames are ordered bottom to top; the last entry is
/// the currently executing frame.
#[derive(Debug)]
pub struct FrameStack {
    pub id: u32,
    pub frames: Vec<VmFrame>,
}

impl FrameStack {
    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn top_frame(&self) -> Option<&VmFrame> {
        self.frames.last()
    }

    /// Frames in debugger order: top (innermost) first.
    pub fn frames_top_first(&self) -> impl Iterator<Item = &VmFrame> {
        self.frames.iter().rev()
    }
}

// ── StackRegistry ────────────────────────────────────────────────────────────

/// Lookup of live execution stacks by id.
///
/// The debugger resolves step targets through this instead of holding raw
/// stack references; a stack that has finished simply stops resolving.
pub trait StackRegistry: Send + Sync {
    fn stack(&self, id: u32) -> Option<Arc<FrameStack>>;
}

/// Registry for the single-stack execution model: one script stack that the
/// host publishes while it runs and retires when it unwinds.
#[derive(Debug, Default)]
pub struct SingleStackRegistry {
    current: Mutex<Option<Arc<FrameStack>>>,
}

impl SingleStackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the stack (host side, on run).
    pub fn publish(&self, stack: Arc<FrameStack>) {
        *self.current.lock().unwrap() = Some(stack);
    }

    /// Retire the stack (host side, on unwind).
    pub fn retire(&self) {
        *self.current.lock().unwrap() = None;
    }
}

impl StackRegistry for SingleStackRegistry {
    fn stack(&self, id: u32) -> Option<Arc<FrameStack>> {
        let current = self.current.lock().unwrap();
        current.as_ref().filter(|s| s.id == id).cloned()
    }
}
