//! DAP request surface
//!
//! Translates client requests into calls against the cache, breakpoint
//! engine, execution controller, and introspection tree, and emits the
//! adapter-side events. One `Debugger` lives for the process; sessions come
//! and go with client connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{error, info};
use zephyr_vm::{ArchiveFs, FrameStack, ObjectHeap, StackRegistry, VmImage};

use crate::breakpoints::BreakpointManager;
use crate::cache::BinaryCache;
use crate::error::{DebugError, DebugResult};
use crate::execution::{ExecutionManager, StepType};
use crate::idprovider::IdProvider;
use crate::nodes::RuntimeState;
use crate::protocol::{
    AttachArguments, Capabilities, ContinueResponseBody, Event, LaunchArguments,
    LoadedSourceEventBody, LoadedSourcesResponseBody, OutputEventBody, Request,
    ScopesArguments, ScopesResponseBody, SetBreakpointsArguments,
    SetBreakpointsResponseBody, SetFunctionBreakpointsArguments, Source, SourceArguments,
    SourceResponseBody, StackTraceArguments, StackTraceResponseBody, StepArguments, Thread,
    ThreadsResponseBody, VariablesArguments, VariablesResponseBody,
};
use crate::refs::{qualify, source_reference, ScriptRef};
use crate::session::{DapSession, EventSink};

#[derive(Default)]
struct ProjectState {
    path: String,
    archive: String,
    /// Client-provided source descriptors, preferred over our own by ref.
    sources: HashMap<ScriptRef, Source>,
}

// ── Debugger ─────────────────────────────────────────────────────────────────

/// The debug adapter: owns the four core subsystems and the active session.
pub struct Debugger {
    cache: Arc<BinaryCache>,
    breakpoints: Arc<BreakpointManager>,
    execution: Arc<ExecutionManager>,
    runtime: Arc<RuntimeState>,
    session: Mutex<Option<Arc<DapSession>>>,
    project: Mutex<ProjectState>,
}

impl Debugger {
    pub fn new(
        image: Arc<VmImage>,
        heap: Arc<dyn ObjectHeap>,
        fs: Arc<dyn ArchiveFs>,
        stacks: Arc<dyn StackRegistry>,
    ) -> Self {
        let ids = Arc::new(IdProvider::new());
        let runtime = Arc::new(RuntimeState::new(ids, heap));
        let cache = Arc::new(BinaryCache::new(image, fs));
        let breakpoints = Arc::new(BreakpointManager::new(cache.clone()));
        let execution = Arc::new(ExecutionManager::new(
            runtime.clone(),
            breakpoints.clone(),
            stacks,
        ));
        Self {
            cache,
            breakpoints,
            execution,
            runtime,
            session: Mutex::new(None),
            project: Mutex::new(ProjectState::default()),
        }
    }

    pub fn cache(&self) -> &Arc<BinaryCache> {
        &self.cache
    }

    pub fn breakpoints(&self) -> &Arc<BreakpointManager> {
        &self.breakpoints
    }

    pub fn execution(&self) -> &Arc<ExecutionManager> {
        &self.execution
    }

    pub fn runtime(&self) -> &Arc<RuntimeState> {
        &self.runtime
    }

    // ── Session lifecycle ────────────────────────────────────────────────────

    pub fn start_session(&self, session: Arc<DapSession>) {
        {
            let mut current = self.session.lock().unwrap();
            if let Some(previous) = current.take() {
                error!("session is already active, ending it first");
                previous.send_event(Event::Terminated);
                drop(current);
                self.end_session();
                *self.session.lock().unwrap() = Some(session.clone());
            } else {
                *current = Some(session.clone());
            }
        }
        let sink: Arc<dyn EventSink> = session;
        self.breakpoints.set_sink(Some(sink.clone()));
        self.execution.open(sink);
        info!("debug session started");
    }

    pub fn end_session(&self) {
        self.execution.close();
        self.breakpoints.set_sink(None);
        self.breakpoints.clear_all(false);
        *self.session.lock().unwrap() = None;
        let mut project = self.project.lock().unwrap();
        project.path.clear();
        project.archive.clear();
        project.sources.clear();
        info!("debug session ended");
    }

    fn current_session(&self) -> Option<Arc<DapSession>> {
        self.session.lock().unwrap().clone()
    }

    // ── Host-facing entry points ─────────────────────────────────────────────

    /// The VM's per-instruction hook.
    pub fn handle_instruction(&self, stack: &Arc<FrameStack>) {
        self.execution.handle_instruction(stack);
    }

    /// Forward one host log line to the client console.
    pub fn log_output(&self, message: &str) {
        if let Some(session) = self.current_session() {
            session.send_event(Event::Output(OutputEventBody {
                category: "console",
                output: format!("{message}\r\n"),
            }));
        }
    }

    // ── Request dispatch ─────────────────────────────────────────────────────

    /// Handle one client request end to end: dispatch, respond, and send
    /// any post-response event.
    pub fn handle_request(&self, request: &Request) {
        let result = self.dispatch(request);
        let Some(session) = self.current_session() else {
            return;
        };
        match result {
            Ok(body) => {
                if let Err(err) = session.respond_success(request, body) {
                    error!(command = %request.command, %err, "failed to send response");
                    return;
                }
            }
            Err(err) => {
                error!(command = %request.command, %err, "request failed");
                let _ = session.respond_error(request, &err);
                return;
            }
        }
        if request.command == "initialize" {
            session.send_event(Event::Initialized);
        }
    }

    fn dispatch(&self, request: &Request) -> DebugResult<Option<Value>> {
        let args = request.arguments.clone();
        match request.command.as_str() {
            "initialize" => self.initialize(),
            "configurationDone" => Ok(None),
            "launch" => {
                let args: LaunchArguments = serde_json::from_value(args)?;
                self.attach_impl(args.attach)
            }
            "attach" => {
                let args: AttachArguments = serde_json::from_value(args)?;
                self.attach_impl(args)
            }
            "disconnect" => Ok(None),
            "threads" => self.threads(),
            "setBreakpoints" => {
                let args: SetBreakpointsArguments = serde_json::from_value(args)?;
                self.set_breakpoints(args)
            }
            "setFunctionBreakpoints" => {
                let args: SetFunctionBreakpointsArguments = serde_json::from_value(args)?;
                let breakpoints = self.breakpoints.set_function_breakpoints(&args.breakpoints);
                Ok(Some(serde_json::to_value(SetBreakpointsResponseBody {
                    breakpoints,
                })?))
            }
            "setInstructionBreakpoints" => {
                self.breakpoints.set_instruction_breakpoints()?;
                Ok(None)
            }
            "stackTrace" => {
                let args: StackTraceArguments = serde_json::from_value(args)?;
                self.stack_trace(args)
            }
            "scopes" => {
                let args: ScopesArguments = serde_json::from_value(args)?;
                self.scopes(args)
            }
            "variables" => {
                let args: VariablesArguments = serde_json::from_value(args)?;
                self.variables(args)
            }
            "source" => {
                let args: SourceArguments = serde_json::from_value(args)?;
                self.source(args)
            }
            "loadedSources" => self.loaded_sources(),
            "continue" => {
                self.execution.resume();
                Ok(Some(serde_json::to_value(ContinueResponseBody {
                    all_threads_continued: true,
                })?))
            }
            "pause" => {
                if !self.execution.pause() {
                    return Err(DebugError::InvalidState("pause"));
                }
                Ok(None)
            }
            "next" => self.step(args, StepType::StepOver),
            "stepIn" => self.step(args, StepType::StepIn),
            "stepOut" => self.step(args, StepType::StepOut),
            _ => Err(DebugError::NotSupported("command")),
        }
    }

    // ── Handlers ─────────────────────────────────────────────────────────────

    fn initialize(&self) -> DebugResult<Option<Value>> {
        let capabilities = Capabilities {
            supports_configuration_done_request: true,
            supports_loaded_sources_request: true,
            supports_function_breakpoints: true,
            supported_checksum_algorithms: vec!["CRC32".to_string()],
        };
        Ok(Some(serde_json::to_value(capabilities)?))
    }

    fn attach_impl(&self, args: AttachArguments) -> DebugResult<Option<Value>> {
        let mut project = self.project.lock().unwrap();
        project.path = args.project_path.unwrap_or_default();
        project.archive = args.project_archive.unwrap_or_default();
        project.sources.clear();
        if args.restart.is_none() {
            self.cache.clear();
        }
        for source in args.project_sources.unwrap_or_default() {
            let script_ref = source_reference(&source);
            if !script_ref.is_valid() {
                continue;
            }
            // Keep the client's reference unset so it serves its own file
            // from the project tree instead of requesting ours.
            project.sources.insert(
                script_ref,
                Source {
                    source_reference: None,
                    ..source
                },
            );
        }
        info!(path = %project.path, archive = %project.archive, "attached");
        Ok(None)
    }

    fn threads(&self) -> DebugResult<Option<Value>> {
        let threads = vec![Thread {
            id: 1,
            name: "Main Thread".to_string(),
        }];
        Ok(Some(serde_json::to_value(ThreadsResponseBody { threads })?))
    }

    fn set_breakpoints(&self, args: SetBreakpointsArguments) -> DebugResult<Option<Value>> {
        let mut source = args.source.clone();
        let script_ref = source_reference(&source);
        {
            let project = self.project.lock().unwrap();
            if let Some(project_source) = project.sources.get(&script_ref) {
                source = project_source.clone();
            } else if script_ref.is_valid() {
                // Not part of the project's imported sources: point the
                // client back at us for the content.
                source.source_reference = Some(i64::from(script_ref.0));
            }
        }
        if let Some(path) = source.path.clone() {
            let qualified = match source.origin.as_deref() {
                Some(origin) if !origin.is_empty() => qualify(origin, &path),
                _ => path,
            };
            self.check_source_loaded(&qualified);
        }

        let requested = args.breakpoints.unwrap_or_default();
        let breakpoints = self
            .breakpoints
            .set_source_breakpoints(&source, &requested)?;
        Ok(Some(serde_json::to_value(SetBreakpointsResponseBody {
            breakpoints,
        })?))
    }

    fn stack_trace(&self, args: StackTraceArguments) -> DebugResult<Option<Value>> {
        if args.thread_id < 0 {
            return Err(DebugError::InvalidHandle(args.thread_id));
        }
        let frames = self
            .runtime
            .children_by_path(&args.thread_id.to_string())
            .map_err(|_| DebugError::InvalidHandle(args.thread_id))?;

        let start = args.start_frame.unwrap_or(0).max(0) as usize;
        let levels = args.levels.unwrap_or(0).max(0) as usize;
        let end = if levels == 0 {
            frames.len()
        } else {
            (start + levels).min(frames.len())
        };

        let mut stack_frames = Vec::new();
        for &frame_id in frames.get(start..end).unwrap_or_default() {
            stack_frames.push(self.runtime.serialize_stack_frame(frame_id, &self.cache)?);
        }
        Ok(Some(serde_json::to_value(StackTraceResponseBody {
            total_frames: frames.len() as i64,
            stack_frames,
        })?))
    }

    fn scopes(&self, args: ScopesArguments) -> DebugResult<Option<Value>> {
        let children = self.runtime.children_by_id(args.frame_id)?;
        let scopes = children
            .into_iter()
            .filter_map(|id| self.runtime.serialize_scope(id))
            .collect();
        Ok(Some(serde_json::to_value(ScopesResponseBody { scopes })?))
    }

    fn variables(&self, args: VariablesArguments) -> DebugResult<Option<Value>> {
        let children = self.runtime.children_by_id(args.variables_reference)?;
        let limit = match args.count {
            Some(count) if count > 0 => count as usize,
            _ => children.len(),
        };
        let variables = children
            .into_iter()
            .filter_map(|id| self.runtime.serialize_variable(id))
            .take(limit)
            .collect();
        Ok(Some(serde_json::to_value(VariablesResponseBody {
            variables,
        })?))
    }

    fn source(&self, args: SourceArguments) -> DebugResult<Option<Value>> {
        let source = args.source.unwrap_or_else(|| Source {
            source_reference: args.source_reference,
            ..Source::default()
        });
        if source.path.is_none() && source.source_reference.unwrap_or(0) <= 0 {
            return Err(DebugError::NotLoaded("<no source>".to_string()));
        }
        let content = self
            .cache
            .decompiled_source(&source)
            .ok_or_else(|| DebugError::NotLoaded(source.path.clone().unwrap_or_default()))?;
        Ok(Some(serde_json::to_value(SourceResponseBody {
            content: String::from_utf8_lossy(&content).into_owned(),
        })?))
    }

    fn loaded_sources(&self) -> DebugResult<Option<Value>> {
        let sources = self.cache.loaded_sources();
        let project = self.project.lock().unwrap();
        let sources = sources
            .into_iter()
            .map(|source| {
                let script_ref = source_reference(&source);
                project
                    .sources
                    .get(&script_ref)
                    .cloned()
                    .unwrap_or(source)
            })
            .collect();
        Ok(Some(serde_json::to_value(LoadedSourcesResponseBody {
            sources,
        })?))
    }

    fn step(&self, args: Value, kind: StepType) -> DebugResult<Option<Value>> {
        let args: StepArguments = serde_json::from_value(args)?;
        let thread_id =
            u32::try_from(args.thread_id).map_err(|_| DebugError::InvalidHandle(args.thread_id))?;
        if !self.execution.step(thread_id, kind) {
            return Err(DebugError::InvalidState("step"));
        }
        Ok(None)
    }

    /// Announce a script the client has not seen yet. Emits one
    /// `loadedSource` event the first time a script resolves into the cache.
    fn check_source_loaded(&self, qualified_path: &str) {
        if self.cache.has_script_path(qualified_path) {
            return;
        }
        let Some(source) = self.cache.source_data(qualified_path) else {
            return;
        };
        let script_ref = source_reference(&source);
        let source = {
            let project = self.project.lock().unwrap();
            project.sources.get(&script_ref).cloned().unwrap_or(source)
        };
        if let Some(session) = self.current_session() {
            session.send_event(Event::LoadedSource(LoadedSourceEventBody {
                reason: "new",
                source,
            }));
        }
    }
}
