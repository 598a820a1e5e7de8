//! Object heap access
//!
//! The debugger reaches live objects through raw addresses found in pointer
//! registers and fields. Dereferencing goes through [`ObjectHeap`], which
//! validates the address and hands back a typed view; a resolved object is
//! only trusted if it still carries the engine's magic word.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::reflect::CompositeDesc;
use crate::value::VmValue;

/// Magic word stamped into every live object header.
pub const OBJECT_MAGIC: u32 = 0x5a4f_424a;

// ── VmObject ─────────────────────────────────────────────────────────────────

/// A typed view of one heap object.
#[derive(Debug)]
pub struct VmObject {
    /// Header magic; anything other than [`OBJECT_MAGIC`] means the address
    /// points at freed or foreign memory.
    pub magic: u32,
    pub composite: CompositeDesc,
    /// Field slots keyed by lowercased field name.
    fields: HashMap<String, VmValue>,
}

impl VmObject {
    /// Create a live object of the given composite type with all fields void.
    pub fn new(composite: CompositeDesc) -> Self {
        Self {
            magic: OBJECT_MAGIC,
            composite,
            fields: HashMap::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.magic == OBJECT_MAGIC
    }

    /// Set a field slot. Names are stored lowercased.
    pub fn set_field(&mut self, name: &str, value: VmValue) {
        self.fields.insert(name.to_ascii_lowercase(), value);
    }

    /// Typed field accessor; name lookup is case-insensitive. Unset fields
    /// read as void.
    pub fn field(&self, name: &str) -> VmValue {
        self.fields
            .get(&name.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

// ── ObjectHeap ───────────────────────────────────────────────────────────────

/// Address-to-object resolution provided by the VM.
pub trait ObjectHeap: Send + Sync {
    /// Resolve an address to the object living there, if any.
    fn object_at(&self, addr: u64) -> Option<Arc<VmObject>>;
}

/// In-memory heap used by tests and the standalone server binary.
#[derive(Debug, Default)]
pub struct MemoryHeap {
    objects: Mutex<HashMap<u64, Arc<VmObject>>>,
}

impl MemoryHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, addr: u64, object: VmObject) -> Arc<VmObject> {
        let object = Arc::new(object);
        self.objects.lock().unwrap().insert(addr, object.clone());
        object
    }
}

impl ObjectHeap for MemoryHeap {
    fn object_at(&self, addr: u64) -> Option<Arc<VmObject>> {
        self.objects.lock().unwrap().get(&addr).cloned()
    }
}
