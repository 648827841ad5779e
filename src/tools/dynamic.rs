//! Dynamic Tools
//!
//! Tools that add and remove other tools at runtime, plus helpers for
//! exercising client notification handling: list-changed events, progress
//! reporting from a long-running task, and resource change signals.

use chrono::Local;
use futures_util::future::FutureExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::core::error::{ToolError, ToolResult};
use crate::core::protocol::MCPTool;
use crate::core::registry::{ToolContext, ToolHandler, ToolRegistry, context_handler, sync_handler};
use crate::core::server::AppState;
use crate::core::utils::{
    AppConfig, optional_bool, optional_count, optional_str, python_repr, required_str,
};

/// Number of tools registered by this module before any are added.
pub const BASE_TOOLS: usize = 6;
const DEFAULT_MAX_DURATION: u64 = 300;
const STEP: Duration = Duration::from_secs(1);

fn timestamp() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

fn to_text(value: Value) -> ToolResult {
    serde_json::to_string(&value).map_err(|e| ToolError::Failed(e.to_string()))
}

/// Owns the set of runtime-added tools.
pub struct DynamicTools {
    registry: Weak<ToolRegistry>,
    /// Added tool names, in insertion order.
    added: Mutex<Vec<String>>,
    server_name: String,
    server_version: String,
}

impl DynamicTools {
    pub fn new(registry: &Arc<ToolRegistry>, state: &AppState) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            added: Mutex::new(Vec::new()),
            server_name: state.server_name.clone(),
            server_version: state.server_version.clone(),
        }
    }

    fn registry(&self) -> Result<Arc<ToolRegistry>, ToolError> {
        self.registry
            .upgrade()
            .ok_or_else(|| ToolError::Failed("tool registry is gone".to_string()))
    }

    pub fn list(&self) -> ToolResult {
        let tools = self.added.lock().clone();
        to_text(json!({
            "dynamic_tools": tools,
            "count": tools.len(),
            "timestamp": timestamp(),
        }))
    }

    pub fn add(&self, args: &Value, ctx: &ToolContext) -> ToolResult {
        let name = required_str(args, "name")?;
        let description = optional_str(args, "description", "Dynamic tool")?;
        let registry = self.registry()?;

        let tool = MCPTool::new(
            name,
            description,
            json!({
                "type": "object",
                "properties": {
                    "data": {"type": "string", "description": "Input data"}
                }
            }),
        );
        // Hold the list lock across registration so list and registry agree.
        let mut added = self.added.lock();
        if !registry.try_register(tool, echo_handler(name.to_string())) {
            return to_text(json!({"error": format!("Tool '{name}' already exists")}));
        }
        added.push(name.to_string());
        drop(added);

        tracing::info!(tool = name, "dynamic tool added");
        ctx.notifier.tools_changed();
        to_text(json!({
            "success": true,
            "tool": name,
            "message": format!("Tool '{name}' added successfully"),
        }))
    }

    pub fn remove(&self, args: &Value, ctx: &ToolContext) -> ToolResult {
        let name = required_str(args, "name")?;
        let registry = self.registry()?;

        let mut added = self.added.lock();
        let Some(idx) = added.iter().position(|n| n == name) else {
            return to_text(json!({"error": format!("Tool '{name}' not found or is not removable")}));
        };
        added.remove(idx);
        registry.unregister(name);
        drop(added);

        tracing::info!(tool = name, "dynamic tool removed");
        ctx.notifier.tools_changed();
        to_text(json!({
            "success": true,
            "tool": name,
            "message": format!("Tool '{name}' removed successfully"),
        }))
    }

    pub fn server_info(&self) -> ToolResult {
        to_text(json!({
            "name": self.server_name,
            "version": self.server_version,
            "capabilities": {
                "tools": {
                    "base_tools": BASE_TOOLS,
                    "dynamic_tools": self.added.lock().len(),
                },
                "notifications": ["tools_changed", "resources_changed", "progress"],
            },
            "timestamp": timestamp(),
        }))
    }
}

/// Handler for an added tool: echoes its input.
fn echo_handler(name: String) -> ToolHandler {
    sync_handler(move |args| {
        to_text(json!({
            "tool": name,
            "input": args.clone(),
            "result": format!("Executed {} with {}", name, python_repr(&args)),
            "timestamp": timestamp(),
        }))
    })
}

/// Sleep one step per second of `duration`, reporting progress per step.
pub async fn long_running_task(duration: u64, with_progress: bool, ctx: ToolContext) -> ToolResult {
    tracing::debug!(duration, with_progress, "long running task started");
    let token = ctx.progress_token.as_ref().filter(|_| with_progress);
    for step in 1..=duration {
        if let Some(token) = token {
            ctx.notifier.progress(
                token,
                step as f64,
                Some(duration as f64),
                Some(format!("Processing step {step} of {duration}")),
            );
        }
        tokio::time::sleep(STEP).await;
    }
    to_text(json!({
        "completed": true,
        "duration": duration,
        "timestamp": timestamp(),
    }))
}

pub fn register(registry: &Arc<ToolRegistry>, config: &AppConfig, state: &AppState) -> Arc<DynamicTools> {
    let dynamic = Arc::new(DynamicTools::new(registry, state));
    let max_duration = config.tool_u64("long_running_task", "max_duration", DEFAULT_MAX_DURATION);

    let d = dynamic.clone();
    registry.register(
        MCPTool::new(
            "list_dynamic_tools",
            "List all dynamically added tools.",
            json!({"type": "object", "properties": {}}),
        ),
        sync_handler(move |_| d.list()),
    );

    let d = dynamic.clone();
    registry.register(
        MCPTool::new(
            "add_tool",
            "Add a new tool dynamically.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Name of the tool to add"},
                    "description": {
                        "type": "string",
                        "description": "Tool description",
                        "default": "Dynamic tool"
                    }
                },
                "required": ["name"]
            }),
        ),
        context_handler(move |args, ctx| d.add(&args, ctx)),
    );

    let d = dynamic.clone();
    registry.register(
        MCPTool::new(
            "remove_tool",
            "Remove a dynamically added tool.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Name of the tool to remove"}
                },
                "required": ["name"]
            }),
        ),
        context_handler(move |args, ctx| d.remove(&args, ctx)),
    );

    let long_running: ToolHandler = Arc::new(move |args: Value, ctx: ToolContext| {
        async move {
            let duration = optional_count(&args, "duration", 5, max_duration)?;
            let with_progress = optional_bool(&args, "with_progress", true)?;
            long_running_task(duration, with_progress, ctx).await
        }
        .boxed()
    });
    registry.register(
        MCPTool::new(
            "long_running_task",
            "Execute a long-running task with optional progress updates.",
            json!({
                "type": "object",
                "properties": {
                    "duration": {
                        "type": "integer",
                        "description": "Duration in seconds",
                        "default": 5
                    },
                    "with_progress": {
                        "type": "boolean",
                        "description": "Send progress notifications",
                        "default": true
                    }
                },
                "required": []
            }),
        ),
        long_running,
    );

    registry.register(
        MCPTool::new(
            "trigger_resource_change",
            "Trigger a resource change notification.",
            json!({"type": "object", "properties": {}}),
        ),
        context_handler(|_, ctx| {
            ctx.notifier.resources_changed();
            to_text(json!({
                "success": true,
                "message": "Resource change notification sent",
            }))
        }),
    );

    let d = dynamic.clone();
    registry.register(
        MCPTool::new(
            "get_server_info",
            "Get information about the server.",
            json!({"type": "object", "properties": {}}),
        ),
        sync_handler(move |_| d.server_info()),
    );

    dynamic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notify::{Notifier, PROGRESS, RESOURCES_LIST_CHANGED, TOOLS_LIST_CHANGED};

    fn setup() -> (Arc<ToolRegistry>, Arc<DynamicTools>, Notifier) {
        let registry = Arc::new(ToolRegistry::new());
        let state = AppState {
            server_name: "dynamic-server".to_string(),
            server_version: "1.0.0".to_string(),
        };
        let dynamic = register(&registry, &AppConfig::default(), &state);
        (registry, dynamic, Notifier::new())
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn add_call_and_remove_tool() {
        let (registry, dynamic, notifier) = setup();
        let mut rx = notifier.subscribe();
        let ctx = ToolContext::new(notifier.clone(), None);
        assert_eq!(registry.len(), BASE_TOOLS);

        let out = parse(&dynamic.add(&json!({"name": "greet"}), &ctx).unwrap());
        assert_eq!(out["success"], true);
        assert_eq!(out["message"], "Tool 'greet' added successfully");
        assert_eq!(rx.recv().await.unwrap().method, TOOLS_LIST_CHANGED);

        let tool = registry.list().into_iter().find(|t| t.name == "greet").unwrap();
        assert_eq!(tool.description, "Dynamic tool");

        let handler = registry.handler("greet").unwrap();
        let out = parse(&handler(json!({"data": "hi"}), ctx.clone()).await.unwrap());
        assert_eq!(out["tool"], "greet");
        assert_eq!(out["input"], json!({"data": "hi"}));
        assert_eq!(out["result"], "Executed greet with {'data': 'hi'}");

        let listed = parse(&dynamic.list().unwrap());
        assert_eq!(listed["dynamic_tools"], json!(["greet"]));
        assert_eq!(listed["count"], 1);

        let out = parse(&dynamic.remove(&json!({"name": "greet"}), &ctx).unwrap());
        assert_eq!(out["message"], "Tool 'greet' removed successfully");
        assert_eq!(rx.recv().await.unwrap().method, TOOLS_LIST_CHANGED);
        assert!(registry.handler("greet").is_none());
    }

    #[test]
    fn duplicate_and_base_tools_are_protected() {
        let (registry, dynamic, notifier) = setup();
        let ctx = ToolContext::new(notifier, None);

        dynamic.add(&json!({"name": "x"}), &ctx).unwrap();
        let out = parse(&dynamic.add(&json!({"name": "x"}), &ctx).unwrap());
        assert_eq!(out["error"], "Tool 'x' already exists");

        let out = parse(&dynamic.add(&json!({"name": "add_tool"}), &ctx).unwrap());
        assert_eq!(out["error"], "Tool 'add_tool' already exists");

        let out = parse(&dynamic.remove(&json!({"name": "get_server_info"}), &ctx).unwrap());
        assert_eq!(out["error"], "Tool 'get_server_info' not found or is not removable");
        assert!(registry.handler("get_server_info").is_some());
    }

    #[test]
    fn server_info_counts_tools() {
        let (_registry, dynamic, notifier) = setup();
        let ctx = ToolContext::new(notifier, None);
        dynamic.add(&json!({"name": "a", "description": "A"}), &ctx).unwrap();

        let info = parse(&dynamic.server_info().unwrap());
        assert_eq!(info["name"], "dynamic-server");
        assert_eq!(info["version"], "1.0.0");
        assert_eq!(info["capabilities"]["tools"]["base_tools"], 6);
        assert_eq!(info["capabilities"]["tools"]["dynamic_tools"], 1);
    }

    #[tokio::test]
    async fn trigger_resource_change_notifies() {
        let (registry, _dynamic, notifier) = setup();
        let mut rx = notifier.subscribe();
        let handler = registry.handler("trigger_resource_change").unwrap();
        let out = parse(&handler(json!({}), ToolContext::new(notifier.clone(), None)).await.unwrap());
        assert_eq!(out["success"], true);
        assert_eq!(rx.recv().await.unwrap().method, RESOURCES_LIST_CHANGED);
    }

    #[tokio::test(start_paused = true)]
    async fn long_running_task_reports_each_step() {
        let (registry, _dynamic, notifier) = setup();
        let mut rx = notifier.subscribe();
        let ctx = ToolContext::new(notifier.clone(), Some(json!(7)));
        let handler = registry.handler("long_running_task").unwrap();

        let started = tokio::time::Instant::now();
        let out = parse(&handler(json!({"duration": 3}), ctx).await.unwrap());
        assert_eq!(out["completed"], true);
        assert_eq!(out["duration"], 3);
        assert!(started.elapsed() >= Duration::from_secs(3));

        for step in 1..=3 {
            let n = rx.recv().await.unwrap();
            assert_eq!(n.method, PROGRESS);
            let params = n.params.unwrap();
            assert_eq!(params["progressToken"], 7);
            assert_eq!(params["progress"], step as f64);
            assert_eq!(params["message"], format!("Processing step {step} of 3"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn long_running_task_validates_duration() {
        let (registry, _dynamic, notifier) = setup();
        let mut rx = notifier.subscribe();
        let handler = registry.handler("long_running_task").unwrap();
        let ctx = ToolContext::new(notifier.clone(), Some(json!("t")));

        assert!(handler(json!({"duration": -1}), ctx.clone()).await.is_err());
        assert!(handler(json!({"duration": 301}), ctx.clone()).await.is_err());

        handler(json!({"duration": 2, "with_progress": false}), ctx).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
