//! Type reflection
//!
//! Descriptors for everything the debugger can name: scalar kinds, pointers,
//! classes and structs with their field lists, script functions with their
//! line tables, and the namespace tree the source cache scans.

use std::sync::Arc;

// ── Scalar kinds ─────────────────────────────────────────────────────────────

/// Semantic kind of an integer-backed scalar.
///
/// ZephyrScript stores many distinct source-level types in integer registers;
/// the kind drives both the displayed type name and the value rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    UInt32,
    Int32,
    UInt16,
    Int16,
    UInt8,
    Int8,
    Enum,
    Name,
    SpriteId,
    TextureId,
    TranslationId,
    Sound,
    Color,
    StateLabel,
}

impl IntKind {
    /// The type name shown to the debugger client.
    pub fn type_name(self) -> &'static str {
        match self {
            IntKind::UInt32 => "uint32",
            IntKind::Int32 => "int32",
            IntKind::UInt16 => "uint16",
            IntKind::Int16 => "int16",
            IntKind::UInt8 => "uint8",
            IntKind::Int8 => "int8",
            IntKind::Enum => "Enum",
            IntKind::Name => "Name",
            IntKind::SpriteId => "SpriteID",
            IntKind::TextureId => "TextureID",
            IntKind::TranslationId => "TranslationID",
            IntKind::Sound => "Sound",
            IntKind::Color => "Color",
            IntKind::StateLabel => "StateLabel",
        }
    }
}

// ── TypeDesc ─────────────────────────────────────────────────────────────────

/// A reflected type.
#[derive(Debug, Clone)]
pub enum TypeDesc {
    /// No type information (native frames, unresolved slots).
    Void,
    /// Integer-backed scalar with a semantic kind.
    Int(IntKind),
    Bool,
    Float32,
    Float64,
    String,
    /// Pointer to another type (object, struct, or scalar storage).
    Pointer(Arc<TypeDesc>),
    /// Pointer to a class descriptor (metaclass reference).
    ClassPointer(Arc<ClassDesc>),
    /// Pointer to a function; carries the symbolic name.
    FunctionPointer(String),
    Class(Arc<ClassDesc>),
    Struct(Arc<StructDesc>),
}

impl TypeDesc {
    /// Descriptive name as shown in type columns and pointer renderings.
    pub fn descriptive_name(&self) -> String {
        match self {
            TypeDesc::Void => "Void".to_string(),
            TypeDesc::Int(kind) => kind.type_name().to_string(),
            TypeDesc::Bool => "bool".to_string(),
            TypeDesc::Float32 => "float".to_string(),
            TypeDesc::Float64 => "double".to_string(),
            TypeDesc::String => "string".to_string(),
            TypeDesc::Pointer(pointed) => format!("Pointer({})", pointed.descriptive_name()),
            TypeDesc::ClassPointer(class) => format!("ClassPointer({})", class.name),
            TypeDesc::FunctionPointer(name) => format!("FunctionPointer({name})"),
            TypeDesc::Class(class) => class.name.clone(),
            TypeDesc::Struct(st) => st.name.clone(),
        }
    }

    /// Returns `true` for scalar (non-composite, non-pointer) types.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            TypeDesc::Int(_)
                | TypeDesc::Bool
                | TypeDesc::Float32
                | TypeDesc::Float64
                | TypeDesc::String
        )
    }

    /// The composite this type projects to when expanded, dereferencing one
    /// pointer level. `None` for scalars and opaque pointers.
    pub fn composite(&self) -> Option<CompositeDesc> {
        match self {
            TypeDesc::Class(class) => Some(CompositeDesc::Class(class.clone())),
            TypeDesc::Struct(st) => Some(CompositeDesc::Struct(st.clone())),
            TypeDesc::Pointer(pointed) => pointed.composite(),
            _ => None,
        }
    }
}

// ── Fields and composites ────────────────────────────────────────────────────

/// A declared field of a class or struct.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: String,
    pub ty: TypeDesc,
}

impl FieldDesc {
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A reflected class.
#[derive(Debug)]
pub struct ClassDesc {
    pub name: String,
    /// Parent class in the descriptor chain, if any.
    pub parent: Option<Arc<ClassDesc>>,
    /// Fields declared on this class only (inherited fields come via `parent`).
    pub fields: Vec<FieldDesc>,
    /// Qualified path of the script that declared this class; `None` for
    /// native-only classes.
    pub source_path: Option<String>,
    /// Member functions (script and native).
    pub functions: Vec<Arc<VmFunction>>,
}

impl ClassDesc {
    /// All fields visible on an instance, inherited first (descriptor-chain
    /// order, root ancestor down to this class).
    pub fn all_fields(&self) -> Vec<FieldDesc> {
        let mut fields = match &self.parent {
            Some(parent) => parent.all_fields(),
            None => Vec::new(),
        };
        fields.extend(self.fields.iter().cloned());
        fields
    }

    /// Find a member function by bare name, case-insensitively.
    pub fn find_function(&self, name: &str) -> Option<Arc<VmFunction>> {
        self.functions
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}

/// A reflected struct.
#[derive(Debug)]
pub struct StructDesc {
    pub name: String,
    pub fields: Vec<FieldDesc>,
    pub functions: Vec<Arc<VmFunction>>,
}

impl StructDesc {
    pub fn find_function(&self, name: &str) -> Option<Arc<VmFunction>> {
        self.functions
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}

/// Either side of the class/struct divide, for code that walks field lists.
#[derive(Debug, Clone)]
pub enum CompositeDesc {
    Class(Arc<ClassDesc>),
    Struct(Arc<StructDesc>),
}

impl CompositeDesc {
    pub fn name(&self) -> &str {
        match self {
            CompositeDesc::Class(c) => &c.name,
            CompositeDesc::Struct(s) => &s.name,
        }
    }

    /// Fields in display order (inherited first for classes).
    pub fn fields(&self) -> Vec<FieldDesc> {
        match self {
            CompositeDesc::Class(c) => c.all_fields(),
            CompositeDesc::Struct(s) => s.fields.clone(),
        }
    }
}

// ── Functions ────────────────────────────────────────────────────────────────

/// One entry of a function's line table: instruction index → source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub instruction: u32,
    pub line: u32,
}

/// Behavior flags on a function.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionFlags {
    pub native: bool,
    pub method: bool,
    /// Action functions take the implicit `self`, `invoker`, `state_pointer`
    /// parameter triple.
    pub action: bool,
    pub is_abstract: bool,
}

/// A VM function: script or native.
#[derive(Debug)]
pub struct VmFunction {
    /// Bare name, e.g. `Die`.
    pub name: String,
    /// Qualified name, e.g. `Actor.Die`.
    pub qualified_name: String,
    /// Display name used in stack traces.
    pub printable_name: String,
    pub flags: FunctionFlags,
    /// Qualified path of the declaring script; `None` for native functions.
    pub source_path: Option<String>,
    /// Line table sorted by instruction index. Empty for native functions.
    pub line_info: Vec<LineEntry>,
    /// First byte of this function's bytecode in VM address space.
    pub code_start: u64,
    /// Bytecode size in bytes.
    pub code_size: u32,
    /// Declared argument types, implicit parameters included.
    pub arg_types: Vec<TypeDesc>,
}

impl VmFunction {
    pub fn is_native(&self) -> bool {
        self.flags.native
    }

    pub fn is_action(&self) -> bool {
        self.flags.action
    }

    pub fn is_method(&self) -> bool {
        self.flags.method
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract
    }

    /// End of this function's bytecode (exclusive).
    pub fn code_end(&self) -> u64 {
        self.code_start + u64::from(self.code_size)
    }

    /// Map an absolute PC to a source line via the line table.
    ///
    /// Instructions between two entries belong to the closest preceding
    /// entry's line. Returns `None` for PCs outside this function's code
    /// range or when no line info exists.
    pub fn pc_to_line(&self, pc: u64) -> Option<u32> {
        if pc < self.code_start || pc >= self.code_end() {
            return None;
        }
        let index = ((pc - self.code_start) / crate::frame::OPCODE_SIZE) as u32;
        let slot = match self
            .line_info
            .binary_search_by_key(&index, |entry| entry.instruction)
        {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        Some(self.line_info[slot].line)
    }

    /// Line of the first line-table entry (function breakpoint anchor).
    pub fn first_line(&self) -> Option<u32> {
        self.line_info.first().map(|entry| entry.line)
    }

    /// Lowest and highest source lines covered by this function.
    pub fn line_span(&self) -> Option<(u32, u32)> {
        let first = self.line_info.iter().map(|e| e.line).min()?;
        let last = self.line_info.iter().map(|e| e.line).max()?;
        Some((first, last))
    }
}

// ── Namespaces and the VM image ──────────────────────────────────────────────

/// One namespace of the loaded VM image, tied to the archive container its
/// scripts were read from.
#[derive(Debug, Default)]
pub struct Namespace {
    /// Archive container index, when the namespace came from an archive.
    pub container: Option<usize>,
    pub classes: Vec<Arc<ClassDesc>>,
    pub structs: Vec<Arc<StructDesc>>,
}

/// Everything the VM has loaded, as visible to the debugger.
#[derive(Debug, Default)]
pub struct VmImage {
    pub namespaces: Vec<Namespace>,
}

impl VmImage {
    /// Find a class by name across all namespaces, case-insensitively.
    pub fn find_class(&self, name: &str) -> Option<Arc<ClassDesc>> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.classes.iter())
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Find a struct by name across all namespaces, case-insensitively.
    pub fn find_struct(&self, name: &str) -> Option<Arc<StructDesc>> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.structs.iter())
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}
