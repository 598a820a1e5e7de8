//! Runtime introspection tree
//!
//! An id-addressed tree projecting the paused VM into protocol payloads:
//! threads → frames → scopes → register banks / objects / leaf values.
//! Nodes are created on demand, children are memoized per parent, and the
//! whole tree is scoped to one paused instant; ids come from a session-wide
//! monotonic provider and are never reused.

pub mod frame;
pub mod object;
pub mod registers;
pub mod value;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;
use zephyr_vm::{FrameStack, ObjectHeap, TypeDesc, VmFrame, VmValue};

use crate::cache::BinaryCache;
use crate::error::{DebugError, DebugResult};
use crate::idprovider::IdProvider;
use crate::protocol::{Scope, StackFrame, Thread, Variable};
use registers::{BankKind, ALL_BANKS};

const LOCAL_SCOPE: &str = "Local";
const REGISTERS_SCOPE: &str = "Registers";
const SELF_NAME: &str = "self";
const INVOKER_NAME: &str = "invoker";
const STATE_POINTER_NAME: &str = "state_pointer";

// ── Node ─────────────────────────────────────────────────────────────────────

/// One node of the introspection tree.
#[derive(Debug, Clone)]
pub enum Node {
    Thread {
        stack: Arc<FrameStack>,
    },
    /// A stack frame; `index` counts from the top (innermost = 0).
    Frame {
        stack: Arc<FrameStack>,
        index: usize,
    },
    LocalScope {
        stack: Arc<FrameStack>,
        index: usize,
    },
    RegistersScope {
        stack: Arc<FrameStack>,
        index: usize,
    },
    RegisterBank {
        stack: Arc<FrameStack>,
        index: usize,
        kind: BankKind,
    },
    /// A class/struct value reached through a pointer.
    Object {
        name: String,
        value: VmValue,
        ty: TypeDesc,
    },
    /// A scalar value.
    Leaf {
        name: String,
        value: VmValue,
        ty: TypeDesc,
    },
}

/// Frame lookup by top-first index.
fn frame_of(stack: &FrameStack, index: usize) -> Option<&VmFrame> {
    let slot = stack.frames.len().checked_sub(1 + index)?;
    stack.frames.get(slot)
}

/// Pick the node type for a named value: composites (after one pointer
/// dereference) become object nodes, everything else is a leaf.
fn make_variable_node(name: String, value: VmValue, ty: TypeDesc) -> Node {
    if ty.composite().is_some() {
        Node::Object { name, value, ty }
    } else {
        Node::Leaf { name, value, ty }
    }
}

// ── RuntimeState ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct TreeState {
    nodes: HashMap<u32, Node>,
    /// Memoized children per parent: `(name, node id)` in display order.
    children: HashMap<u32, Vec<(String, u32)>>,
    /// Thread id → root node id.
    threads: HashMap<u32, u32>,
    /// The paused VM stack, published by the execution controller.
    global_stack: Option<Arc<FrameStack>>,
}

/// The per-pause introspection state.
///
/// Discarded on resume; the id provider survives so handles are never
/// reused within a session.
pub struct RuntimeState {
    ids: Arc<IdProvider>,
    heap: Arc<dyn ObjectHeap>,
    state: Mutex<TreeState>,
}

impl RuntimeState {
    pub fn new(ids: Arc<IdProvider>, heap: Arc<dyn ObjectHeap>) -> Self {
        Self {
            ids,
            heap,
            state: Mutex::new(TreeState::default()),
        }
    }

    /// Publish the paused VM stack for the DAP thread.
    pub fn set_global_stack(&self, stack: Arc<FrameStack>) {
        self.state.lock().unwrap().global_stack = Some(stack);
    }

    pub fn global_stack(&self) -> Option<Arc<FrameStack>> {
        self.state.lock().unwrap().global_stack.clone()
    }

    /// Discard the tree and the published stack. Ids are retained.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.nodes.clear();
        state.children.clear();
        state.threads.clear();
        state.global_stack = None;
    }

    // ── Resolution ───────────────────────────────────────────────────────────

    /// Resolve a slash-joined, case-insensitive path starting with a thread
    /// id, e.g. `"1/0/Local/self"`.
    pub fn resolve_path(&self, path: &str) -> DebugResult<u32> {
        let mut segments = path.split('/');
        let thread_segment = segments.next().unwrap_or_default();
        let thread_id: u32 = thread_segment
            .parse()
            .map_err(|_| DebugError::InvalidHandle(0))?;
        let mut current = self.thread_node(thread_id)?;
        for segment in segments {
            let children = self.ensure_children(current)?;
            current = children
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(segment))
                .map(|&(_, id)| id)
                .ok_or(DebugError::InvalidHandle(i64::from(current)))?;
        }
        Ok(current)
    }

    /// Children of the node at `path`, as ids in display order.
    pub fn children_by_path(&self, path: &str) -> DebugResult<Vec<u32>> {
        let id = self.resolve_path(path)?;
        Ok(self.ensure_children(id)?.into_iter().map(|(_, id)| id).collect())
    }

    /// Children of the node with the given protocol handle.
    pub fn children_by_id(&self, handle: i64) -> DebugResult<Vec<u32>> {
        let id = u32::try_from(handle).map_err(|_| DebugError::InvalidHandle(handle))?;
        if !self.state.lock().unwrap().nodes.contains_key(&id) {
            return Err(DebugError::InvalidHandle(handle));
        }
        Ok(self.ensure_children(id)?.into_iter().map(|(_, id)| id).collect())
    }

    fn thread_node(&self, thread_id: u32) -> DebugResult<u32> {
        let mut state = self.state.lock().unwrap();
        if let Some(&id) = state.threads.get(&thread_id) {
            return Ok(id);
        }
        let stack = state
            .global_stack
            .clone()
            .filter(|stack| stack.id == thread_id)
            .ok_or(DebugError::InvalidHandle(i64::from(thread_id)))?;
        let id = self.ids.next();
        state.nodes.insert(id, Node::Thread { stack });
        state.threads.insert(thread_id, id);
        Ok(id)
    }

    // ── Child construction ───────────────────────────────────────────────────

    /// Build (or fetch the memoized) children of a node.
    fn ensure_children(&self, id: u32) -> DebugResult<Vec<(String, u32)>> {
        let node = {
            let state = self.state.lock().unwrap();
            if let Some(children) = state.children.get(&id) {
                return Ok(children.clone());
            }
            state
                .nodes
                .get(&id)
                .cloned()
                .ok_or(DebugError::InvalidHandle(i64::from(id)))?
        };

        let built = self.build_children(&node);
        let mut state = self.state.lock().unwrap();
        let mut children = Vec::with_capacity(built.len());
        for (name, child) in built {
            let child_id = self.ids.next();
            state.nodes.insert(child_id, child);
            children.push((name, child_id));
        }
        state.children.insert(id, children.clone());
        Ok(children)
    }

    fn build_children(&self, node: &Node) -> Vec<(String, Node)> {
        match node {
            Node::Thread { stack } => (0..stack.frames.len())
                .map(|index| {
                    (
                        index.to_string(),
                        Node::Frame {
                            stack: stack.clone(),
                            index,
                        },
                    )
                })
                .collect(),

            Node::Frame { stack, index } => {
                let Some(frame) = frame_of(stack, *index) else {
                    return Vec::new();
                };
                let mut children = Vec::new();
                if !frame.func.is_native() {
                    children.push((
                        LOCAL_SCOPE.to_string(),
                        Node::LocalScope {
                            stack: stack.clone(),
                            index: *index,
                        },
                    ));
                }
                children.push((
                    REGISTERS_SCOPE.to_string(),
                    Node::RegistersScope {
                        stack: stack.clone(),
                        index: *index,
                    },
                ));
                children
            }

            Node::LocalScope { stack, index } => {
                let Some(frame) = frame_of(stack, *index) else {
                    return Vec::new();
                };
                let mut names: Vec<(&str, usize)> = Vec::new();
                if frame.func.is_action() {
                    names.push((SELF_NAME, 0));
                    names.push((INVOKER_NAME, 1));
                    names.push((STATE_POINTER_NAME, 2));
                } else if frame.func.is_method() {
                    names.push((SELF_NAME, 0));
                }

                let mut children = Vec::new();
                for (name, param_index) in names {
                    let Some(&addr) = frame.addr_regs.get(param_index) else {
                        warn!(
                            func = %frame.func.qualified_name,
                            name,
                            "implicit argument register missing"
                        );
                        continue;
                    };
                    let Some(ty) = frame.func.arg_types.get(param_index) else {
                        warn!(
                            func = %frame.func.qualified_name,
                            name,
                            "implicit argument type missing"
                        );
                        continue;
                    };
                    children.push((
                        name.to_string(),
                        make_variable_node(name.to_string(), VmValue::Addr(addr), ty.clone()),
                    ));
                }
                children
            }

            Node::RegistersScope { stack, index } => ALL_BANKS
                .iter()
                .map(|&kind| {
                    (
                        kind.child_name().to_string(),
                        Node::RegisterBank {
                            stack: stack.clone(),
                            index: *index,
                            kind,
                        },
                    )
                })
                .collect(),

            Node::RegisterBank { stack, index, kind } => {
                let Some(frame) = frame_of(stack, *index) else {
                    return Vec::new();
                };
                (0..kind.len(frame))
                    .map(|slot| {
                        let name = slot.to_string();
                        let node = make_variable_node(
                            name.clone(),
                            kind.register_value(frame, slot),
                            kind.register_type(frame, slot),
                        );
                        (name, node)
                    })
                    .collect()
            }

            Node::Object { name, value, ty } => {
                let Some(composite) = ty.composite() else {
                    warn!(name = %name, "object node without composite type");
                    return Vec::new();
                };
                object::field_children(self.heap.as_ref(), &composite, value)
                    .into_iter()
                    .map(|(field_name, field_value, field_ty)| {
                        (
                            field_name.clone(),
                            make_variable_node(field_name, field_value, field_ty),
                        )
                    })
                    .collect()
            }

            Node::Leaf { .. } => Vec::new(),
        }
    }

    // ── Serialization ────────────────────────────────────────────────────────

    fn node(&self, id: u32) -> Option<Node> {
        self.state.lock().unwrap().nodes.get(&id).cloned()
    }

    pub fn serialize_thread(&self, id: u32) -> Option<Thread> {
        match self.node(id)? {
            Node::Thread { stack } => Some(Thread {
                id: i64::from(stack.id),
                name: "Main Thread".to_string(),
            }),
            _ => None,
        }
    }

    pub fn serialize_stack_frame(&self, id: u32, cache: &BinaryCache) -> DebugResult<StackFrame> {
        match self.node(id) {
            Some(Node::Frame { stack, index }) => {
                let frame =
                    frame_of(&stack, index).ok_or(DebugError::InvalidHandle(i64::from(id)))?;
                Ok(frame::serialize_stack_frame(id, frame, cache))
            }
            _ => Err(DebugError::InvalidHandle(i64::from(id))),
        }
    }

    /// Serialize a scope node; `None` for nodes that are not scopes.
    pub fn serialize_scope(&self, id: u32) -> Option<Scope> {
        let (name, hint) = match self.node(id)? {
            Node::LocalScope { .. } => (LOCAL_SCOPE, "locals"),
            Node::RegistersScope { .. } => (REGISTERS_SCOPE, "registers"),
            _ => return None,
        };
        let named = self.ensure_children(id).map(|c| c.len()).unwrap_or(0);
        Some(Scope {
            name: name.to_string(),
            presentation_hint: Some(hint.to_string()),
            variables_reference: i64::from(id),
            named_variables: Some(named as i64),
            indexed_variables: Some(0),
            expensive: false,
        })
    }

    /// Serialize a variable node; `None` for nodes that are not variables.
    pub fn serialize_variable(&self, id: u32) -> Option<Variable> {
        match self.node(id)? {
            Node::RegisterBank { stack, index, kind } => {
                let frame = frame_of(&stack, index)?;
                Some(Variable {
                    name: kind.child_name().to_string(),
                    value: kind.value_text(frame),
                    type_name: Some(kind.type_text()),
                    variables_reference: i64::from(id),
                    named_variables: None,
                    indexed_variables: Some(kind.len(frame) as i64),
                })
            }
            Node::Object { name, value, ty } => {
                let composite = ty.composite()?;
                let live = object::resolve_object(self.heap.as_ref(), &value).is_some();
                Some(Variable {
                    name,
                    value: object::object_value_text(self.heap.as_ref(), &composite, &value),
                    type_name: Some(ty.descriptive_name()),
                    variables_reference: if live { i64::from(id) } else { 0 },
                    named_variables: live.then(|| composite.fields().len() as i64),
                    indexed_variables: None,
                })
            }
            Node::Leaf { name, value, ty } => {
                let projected = value::project(&ty, &value);
                Some(Variable {
                    name,
                    value: projected.value_text,
                    type_name: Some(projected.type_name),
                    variables_reference: 0,
                    named_variables: None,
                    indexed_variables: None,
                })
            }
            _ => None,
        }
    }
}
