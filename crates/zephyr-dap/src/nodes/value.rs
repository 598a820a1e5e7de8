//! Leaf value projection
//!
//! Renders a typed VM value into the `{type, value}` pair shown by the
//! client. Scalars render by semantic kind; pointers render their address
//! without dereferencing (composite pointers are handled by object nodes).

use zephyr_vm::{IntKind, TypeDesc, VmValue};

/// A projected leaf value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub type_name: String,
    pub value_text: String,
}

fn null_of(ty: &TypeDesc) -> Projection {
    Projection {
        type_name: ty.descriptive_name(),
        value_text: "<NULL>".to_string(),
    }
}

/// Project a typed value.
pub fn project(ty: &TypeDesc, value: &VmValue) -> Projection {
    match ty {
        TypeDesc::String => {
            let text = match value {
                VmValue::String(s) => s.as_str().filter(|t| !t.is_empty()),
                _ => None,
            };
            Projection {
                type_name: "string".to_string(),
                value_text: match text {
                    Some(t) => format!("\"{t}\""),
                    None => "<EMPTY>".to_string(),
                },
            }
        }
        TypeDesc::ClassPointer(class) => Projection {
            type_name: "ClassPointer".to_string(),
            value_text: class.name.clone(),
        },
        TypeDesc::FunctionPointer(symbol) => Projection {
            type_name: "FunctionPointer".to_string(),
            value_text: symbol.clone(),
        },
        TypeDesc::Pointer(_) => {
            if !value.ptr_is_valid() {
                return null_of(ty);
            }
            Projection {
                type_name: ty.descriptive_name(),
                value_text: format!("{:#010x}", value.addr().unwrap_or(0)),
            }
        }
        TypeDesc::Int(kind) => {
            let VmValue::Int(i) = value else {
                return null_of(ty);
            };
            let value_text = match kind {
                IntKind::Color => format!("#{:04x}", i),
                IntKind::UInt32 => (*i as u32).to_string(),
                _ => i.to_string(),
            };
            Projection {
                type_name: kind.type_name().to_string(),
                value_text,
            }
        }
        TypeDesc::Bool => {
            let VmValue::Int(i) = value else {
                return null_of(ty);
            };
            Projection {
                type_name: "bool".to_string(),
                value_text: if *i != 0 { "true" } else { "false" }.to_string(),
            }
        }
        TypeDesc::Float32 | TypeDesc::Float64 => {
            let VmValue::Float(f) = value else {
                return null_of(ty);
            };
            Projection {
                type_name: ty.descriptive_name(),
                value_text: format!("{f:.6}"),
            }
        }
        TypeDesc::Void | TypeDesc::Class(_) | TypeDesc::Struct(_) => null_of(ty),
    }
}
