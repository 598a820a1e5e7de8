//! Object node helpers
//!
//! An object node represents a class or struct value reached through a
//! pointer. It dereferences exactly once: the node's own fields become
//! children on demand, and pointer-typed fields become further object nodes,
//! so cyclic class graphs never recurse at display time.

use std::sync::Arc;

use zephyr_vm::{CompositeDesc, ObjectHeap, TypeDesc, VmObject, VmValue};

/// Resolve the live object behind a value, applying both pointer-safety
/// checks: the low 32 bits of the address must be non-zero, and the
/// resolved object must still carry the heap magic.
pub fn resolve_object(heap: &dyn ObjectHeap, value: &VmValue) -> Option<Arc<VmObject>> {
    if !value.ptr_is_valid() {
        return None;
    }
    heap.object_at(value.addr()?).filter(|obj| obj.is_live())
}

/// Field children of an object: `(lowercased name, value, type)` in
/// declaration order, inherited fields first.
///
/// With no live object (null or stale pointer) there are no children.
pub fn field_children(
    heap: &dyn ObjectHeap,
    composite: &CompositeDesc,
    value: &VmValue,
) -> Vec<(String, VmValue, TypeDesc)> {
    let Some(object) = resolve_object(heap, value) else {
        return Vec::new();
    };
    composite
        .fields()
        .into_iter()
        .map(|field| {
            let name = field.name.to_ascii_lowercase();
            let field_value = object.field(&name);
            (name, field_value, field.ty)
        })
        .collect()
}

/// Display text of an object value: the address plus the composite name for
/// live objects, `<NULL>` otherwise.
pub fn object_value_text(
    heap: &dyn ObjectHeap,
    composite: &CompositeDesc,
    value: &VmValue,
) -> String {
    match resolve_object(heap, value) {
        Some(_) => format!(
            "{:#010x} {{{}}}",
            value.addr().unwrap_or(0),
            composite.name()
        ),
        None => format!("{} <NULL>", composite.name()),
    }
}
