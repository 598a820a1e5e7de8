//! Register bank nodes
//!
//! A frame exposes its raw register file under the `Registers` scope: one
//! indexed container per bank, each with a fixed element type, plus the
//! parameter bank typed from the function's argument vector where available.

use std::sync::Arc;

use zephyr_vm::{IntKind, TypeDesc, VmFrame, VmValue};

/// The register banks of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankKind {
    Params,
    Int,
    Float,
    String,
    Pointer,
}

pub const ALL_BANKS: [BankKind; 5] = [
    BankKind::Params,
    BankKind::Int,
    BankKind::Float,
    BankKind::String,
    BankKind::Pointer,
];

impl BankKind {
    /// Child name under the `Registers` scope.
    pub fn child_name(self) -> &'static str {
        match self {
            BankKind::Params => "Params",
            BankKind::Int => "IntReg",
            BankKind::Float => "FloatReg",
            BankKind::String => "StringReg",
            BankKind::Pointer => "PointerReg",
        }
    }

    fn kind_word(self) -> &'static str {
        match self {
            BankKind::Params => "Params",
            BankKind::Int => "Int",
            BankKind::Float => "Float",
            BankKind::String => "String",
            BankKind::Pointer => "Pointer",
        }
    }

    /// Type column shown for the bank container itself.
    pub fn type_text(self) -> String {
        format!("{} Registers", self.kind_word())
    }

    /// Value column shown for the bank container.
    pub fn value_text(self, frame: &VmFrame) -> String {
        match self {
            BankKind::Params => format!(
                "Params - Max: {}, In Use: {}",
                frame.max_param(),
                frame.num_param
            ),
            _ => format!("{}[{}]", self.kind_word(), self.len(frame)),
        }
    }

    /// Number of registers in this bank for the given frame.
    pub fn len(self, frame: &VmFrame) -> usize {
        match self {
            BankKind::Params => frame.params.len(),
            BankKind::Int => frame.int_regs.len(),
            BankKind::Float => frame.float_regs.len(),
            BankKind::String => frame.string_regs.len(),
            BankKind::Pointer => frame.addr_regs.len(),
        }
    }

    /// Value of one register slot.
    pub fn register_value(self, frame: &VmFrame, index: usize) -> VmValue {
        match self {
            BankKind::Params => frame.params.get(index).cloned().unwrap_or_default(),
            BankKind::Int => frame
                .int_regs
                .get(index)
                .map(|&i| VmValue::Int(i))
                .unwrap_or_default(),
            BankKind::Float => frame
                .float_regs
                .get(index)
                .map(|&f| VmValue::Float(f))
                .unwrap_or_default(),
            BankKind::String => frame
                .string_regs
                .get(index)
                .map(|s| VmValue::String(s.clone()))
                .unwrap_or_default(),
            BankKind::Pointer => frame
                .addr_regs
                .get(index)
                .map(|&a| VmValue::Addr(a))
                .unwrap_or_default(),
        }
    }

    /// Element type of one register slot.
    pub fn register_type(self, frame: &VmFrame, index: usize) -> TypeDesc {
        match self {
            BankKind::Int => TypeDesc::Int(IntKind::Int32),
            BankKind::Float => TypeDesc::Float64,
            BankKind::String => TypeDesc::String,
            BankKind::Pointer => TypeDesc::Pointer(Arc::new(TypeDesc::Void)),
            BankKind::Params => frame
                .func
                .arg_types
                .get(index)
                .cloned()
                .unwrap_or(TypeDesc::Pointer(Arc::new(TypeDesc::Void))),
        }
    }
}
