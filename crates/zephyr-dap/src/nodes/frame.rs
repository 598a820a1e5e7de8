//! Stack frame serialization
//!
//! Projects one activation record into its protocol `StackFrame`. Native
//! frames get the ` <Native>` name suffix and no source; script frames carry
//! the resolved source, the PC-derived line, and a hexadecimal instruction
//! pointer reference.

use zephyr_vm::VmFrame;

use crate::cache::BinaryCache;
use crate::protocol::StackFrame;

pub fn serialize_stack_frame(node_id: u32, frame: &VmFrame, cache: &BinaryCache) -> StackFrame {
    if frame.func.is_native() {
        return StackFrame {
            id: i64::from(node_id),
            name: format!("{} <Native>", frame.func.printable_name),
            ..StackFrame::default()
        };
    }

    let mut out = StackFrame {
        id: i64::from(node_id),
        name: frame.func.printable_name.clone(),
        ..StackFrame::default()
    };
    let source = frame
        .func
        .source_path
        .as_deref()
        .and_then(|path| cache.source_data(path));
    if let Some(source) = source {
        out.source = Some(source);
        if frame.pc != 0 {
            if let Some(line) = frame.func.pc_to_line(frame.pc) {
                out.line = i64::from(line);
                out.column = 1;
            }
            out.instruction_pointer_reference = Some(format!("{:#x}", frame.pc));
        }
    }
    out
}
