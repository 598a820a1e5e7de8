//! Zephyr VM introspection interface
//!
//! The typed surface the debug adapter consumes from the VM:
//! - Runtime values and strings
//! - Type reflection (classes, structs, namespaces)
//! - Functions, frames, and frame stacks
//! - The object heap and pointer-validity rules
//! - The archive mount (container-qualified script lookup)
//!
//! The VM itself lives in the engine; this crate only carries the data the
//! debugger needs to walk a paused interpreter.

pub mod archive;
pub mod frame;
pub mod heap;
pub mod reflect;
pub mod value;

pub use archive::{ArchiveFs, Lump, MemoryFs};
pub use frame::{FrameStack, SingleStackRegistry, StackRegistry, VmFrame, OPCODE_SIZE};
pub use heap::{MemoryHeap, ObjectHeap, VmObject, OBJECT_MAGIC};
pub use reflect::{
    ClassDesc, CompositeDesc, FieldDesc, FunctionFlags, IntKind, LineEntry, Namespace, StructDesc,
    TypeDesc, VmFunction, VmImage,
};
pub use value::{VmString, VmValue};
