//! Zephyr Script debug adapter
//!
//! A Debug Adapter Protocol server embedded inside the Zephyr scripting VM:
//! - Breakpoint engine: source-line and function breakpoints, hot-path halt
//!   decisions with duplicate-fire suppression
//! - Execution controller: pause/continue/step rendezvous between the VM
//!   thread and the DAP session thread
//! - Introspection tree: id-addressed projection of threads, frames, scopes,
//!   register banks, and typed values
//! - Source/binary cache: qualified-path resolution, per-unit function
//!   indices, source content service
//!
//! The VM is consumed through the `zephyr-vm` interface crate; the TCP
//! front end lives in [`server`].

pub mod adapter;
pub mod breakpoints;
pub mod cache;
pub mod config;
pub mod error;
pub mod execution;
pub mod idprovider;
pub mod nodes;
pub mod protocol;
pub mod ranges;
pub mod refs;
pub mod server;
pub mod session;
pub mod transport;

pub use adapter::Debugger;
pub use breakpoints::{BreakpointManager, BreakpointRecord};
pub use cache::{Binary, BinaryCache};
pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{DebugError, DebugResult};
pub use execution::{DebuggerState, ExecutionManager, StepType};
pub use idprovider::IdProvider;
pub use nodes::RuntimeState;
pub use refs::{breakpoint_id, script_reference, source_reference, ScriptRef};
pub use server::DebugServer;
pub use session::{DapSession, EventSink};
