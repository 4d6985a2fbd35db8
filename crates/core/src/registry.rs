//! Tool registry with lazy, memoized resolution.
//!
//! Tools are registered by name at startup. An entry either carries its
//! implementation directly or a resolver that builds it on first use (so a
//! process that never calls, say, a browser tool never pays to start one).
//!
//! Execution never fails from the caller's point of view: unknown names,
//! resolver failures, tool errors, and panics all come back as
//! `{"error": "..."}` strings that can be handed to the backend as a
//! regular tool result.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::tool::{BlockingTool, Tool, ToolArguments, ToolCall, ToolResult, ToolSpec, error_envelope};

/// A resolved tool implementation.
#[derive(Clone)]
pub enum ToolImpl {
    Async(Arc<dyn Tool>),
    Blocking(Arc<dyn BlockingTool>),
}

impl ToolImpl {
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

type Resolver = Box<dyn Fn() -> Result<ToolImpl, ToolError> + Send + Sync>;

struct Entry {
    spec: ToolSpec,
    resolver: Option<Resolver>,
    resolved: OnceLock<ToolImpl>,
    init: Mutex<()>,
}

impl Entry {
    fn eager(spec: ToolSpec, tool: ToolImpl) -> Self {
        let resolved = OnceLock::new();
        let _ = resolved.set(tool);
        Self {
            spec,
            resolver: None,
            resolved,
            init: Mutex::new(()),
        }
    }

    fn resolve(&self) -> Result<ToolImpl, ToolError> {
        if let Some(tool) = self.resolved.get() {
            return Ok(tool.clone());
        }

        // Serialize first-use construction so the resolver runs once.
        let _init = self.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tool) = self.resolved.get() {
            return Ok(tool.clone());
        }

        let resolver = self.resolver.as_ref().ok_or_else(|| ToolError::Unavailable {
            tool_name: self.spec.name.clone(),
            reason: "no implementation registered".into(),
        })?;
        let tool = resolver()?;
        debug!(tool = %self.spec.name, "Resolved lazy tool");
        Ok(self.resolved.get_or_init(|| tool).clone())
    }
}

/// A registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let spec = tool.to_spec();
        self.tools
            .insert(spec.name.clone(), Entry::eager(spec, ToolImpl::Async(tool)));
    }

    /// Register a synchronous tool.
    pub fn register_blocking(&mut self, tool: Arc<dyn BlockingTool>) {
        let spec = tool.to_spec();
        self.tools
            .insert(spec.name.clone(), Entry::eager(spec, ToolImpl::Blocking(tool)));
    }

    /// Register a tool whose implementation is built on first use.
    ///
    /// A resolver error is reported to the caller of that execution and the
    /// resolver is tried again next time.
    pub fn register_lazy<F>(&mut self, spec: ToolSpec, resolver: F)
    where
        F: Fn() -> Result<ToolImpl, ToolError> + Send + Sync + 'static,
    {
        self.tools.insert(
            spec.name.clone(),
            Entry {
                spec,
                resolver: Some(Box::new(resolver)),
                resolved: OnceLock::new(),
                init: Mutex::new(()),
            },
        );
    }

    /// Resolve a tool implementation by name.
    pub fn resolve(&self, name: &str) -> Result<ToolImpl, ToolError> {
        self.tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?
            .resolve()
    }

    /// Get a tool by name, resolving it if needed.
    pub fn get(&self, name: &str) -> Option<ToolImpl> {
        self.resolve(name).ok()
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|e| &e.spec)
    }

    /// All tool specs, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|e| e.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Whether the implementation behind `name` has been built yet.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .is_some_and(|e| e.resolved.get().is_some())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool from synchronous code.
    ///
    /// Blocking tools run inline; async tools are refused with an error
    /// envelope because there is no runtime to drive them here.
    pub fn execute(&self, name: &str, arguments: ToolArguments) -> String {
        let tool = match self.resolve(name) {
            Ok(tool) => tool,
            Err(e) => return resolution_failure(name, e),
        };

        let ToolImpl::Blocking(tool) = tool else {
            return error_envelope(format!("Tool {name} is async; use execute_async"));
        };

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| tool.execute(arguments)))
            .unwrap_or_else(|payload| Err(ToolError::ExecutionFailed(panic_message(payload))));
        finish(name, outcome)
    }

    /// Execute a tool from async code.
    ///
    /// Async tools are awaited directly; blocking tools run on the blocking
    /// thread pool so the caller's worker thread stays free.
    pub async fn execute_async(&self, name: &str, arguments: ToolArguments) -> String {
        let tool = match self.resolve(name) {
            Ok(tool) => tool,
            Err(e) => return resolution_failure(name, e),
        };

        let started = Instant::now();
        let outcome = match tool {
            ToolImpl::Async(tool) => AssertUnwindSafe(tool.execute(arguments))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(ToolError::ExecutionFailed(panic_message(payload)))),
            ToolImpl::Blocking(tool) => {
                match tokio::task::spawn_blocking(move || tool.execute(arguments)).await {
                    Ok(outcome) => outcome,
                    Err(join) if join.is_panic() => {
                        Err(ToolError::ExecutionFailed(panic_message(join.into_panic())))
                    }
                    Err(join) => Err(ToolError::ExecutionFailed(join.to_string())),
                }
            }
        };

        debug!(tool = %name, latency_ms = started.elapsed().as_millis() as u64, "Tool finished");
        finish(name, outcome)
    }

    /// Execute a parsed tool call, pairing the output with the tool name.
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        ToolResult {
            tool_name: call.name.clone(),
            result: self.execute_async(&call.name, call.arguments.clone()).await,
        }
    }
}

fn resolution_failure(name: &str, error: ToolError) -> String {
    match error {
        ToolError::NotFound(_) => {
            warn!(tool = %name, "Backend requested an unknown tool");
            error_envelope(error.to_string())
        }
        other => {
            warn!(tool = %name, error = %other, "Tool could not be resolved");
            error_envelope(format!("Tool execution failed: {other}"))
        }
    }
}

fn finish(name: &str, outcome: Result<String, ToolError>) -> String {
    match outcome {
        Ok(output) => output,
        Err(e) => {
            warn!(tool = %name, error = %e, "Tool execution failed");
            error_envelope(format!("Tool execution failed: {e}"))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
