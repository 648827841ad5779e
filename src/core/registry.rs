//! Tool Registry
//!
//! Maintains the tool definitions advertised by `tools/list` and the handler
//! executed for each name by `tools/call`. The registry sits behind a lock so
//! tools can be added and removed while the server is running.

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::ToolResult;
use crate::core::notify::Notifier;
use crate::core::protocol::MCPTool;

/// Per-call context handed to every tool handler.
#[derive(Clone)]
pub struct ToolContext {
    pub notifier: Notifier,
    /// `_meta.progressToken` of the request, falling back to the request id.
    pub progress_token: Option<Value>,
}

impl ToolContext {
    pub fn new(notifier: Notifier, progress_token: Option<Value>) -> Self {
        Self {
            notifier,
            progress_token,
        }
    }
}

pub type ToolFuture = BoxFuture<'static, ToolResult>;

/// Tool handler function type definition.
///
/// Handlers take the JSON arguments and a call context and resolve to the
/// text returned to the client.
pub type ToolHandler = Arc<dyn Fn(Value, ToolContext) -> ToolFuture + Send + Sync>;

/// Wrap a synchronous closure as a `ToolHandler`.
pub fn sync_handler<F>(f: F) -> ToolHandler
where
    F: Fn(Value) -> ToolResult + Send + Sync + 'static,
{
    Arc::new(move |args, _ctx| {
        let result = f(args);
        async move { result }.boxed()
    })
}

/// Like `sync_handler`, for closures that publish notifications.
pub fn context_handler<F>(f: F) -> ToolHandler
where
    F: Fn(Value, &ToolContext) -> ToolResult + Send + Sync + 'static,
{
    Arc::new(move |args, ctx| {
        let result = f(args, &ctx);
        async move { result }.boxed()
    })
}

#[derive(Default)]
struct RegistryInner {
    /// List of all registered tools (for tools/list method)
    tools: Vec<MCPTool>,
    /// Map of tool names to their handler functions (for tools/call method)
    handlers: HashMap<String, ToolHandler>,
}

/// Registry of available MCP tools.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any existing tool with the same name in place.
    pub fn register(&self, tool: MCPTool, handler: ToolHandler) {
        let mut inner = self.inner.write();
        let name = tool.name.clone();
        match inner.tools.iter().position(|t| t.name == name) {
            Some(idx) => inner.tools[idx] = tool,
            None => inner.tools.push(tool),
        }
        inner.handlers.insert(name, handler);
    }

    /// Register a tool only if the name is free. Returns false on conflict.
    pub fn try_register(&self, tool: MCPTool, handler: ToolHandler) -> bool {
        let mut inner = self.inner.write();
        if inner.handlers.contains_key(&tool.name) {
            return false;
        }
        inner.handlers.insert(tool.name.clone(), handler);
        inner.tools.push(tool);
        true
    }

    /// Remove a tool. Returns false when no such tool exists.
    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.handlers.remove(name).is_none() {
            return false;
        }
        inner.tools.retain(|t| t.name != name);
        true
    }

    pub fn list(&self) -> Vec<MCPTool> {
        self.inner.read().tools.clone()
    }

    pub fn handler(&self, name: &str) -> Option<ToolHandler> {
        self.inner.read().handlers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> MCPTool {
        MCPTool::new(name, "test tool", json!({"type": "object"}))
    }

    #[tokio::test]
    async fn registered_handler_is_callable() {
        let registry = ToolRegistry::new();
        registry.register(tool("echo"), sync_handler(|args| Ok(args["message"].to_string())));

        let handler = registry.handler("echo").unwrap();
        let ctx = ToolContext::new(Notifier::new(), None);
        let out = handler(json!({"message": "hi"}), ctx).await.unwrap();
        assert_eq!(out, "\"hi\"");
    }

    #[test]
    fn try_register_rejects_duplicates() {
        let registry = ToolRegistry::new();
        assert!(registry.try_register(tool("a"), sync_handler(|_| Ok(String::new()))));
        assert!(!registry.try_register(tool("a"), sync_handler(|_| Ok(String::new()))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_replaces_in_place() {
        let registry = ToolRegistry::new();
        registry.register(tool("a"), sync_handler(|_| Ok(String::new())));
        registry.register(tool("b"), sync_handler(|_| Ok(String::new())));
        registry.register(
            MCPTool::new("a", "replaced", json!({})),
            sync_handler(|_| Ok(String::new())),
        );
        let names: Vec<_> = registry.list().into_iter().map(|t| t.description).collect();
        assert_eq!(names, vec!["replaced", "test tool"]);
    }

    #[test]
    fn unregister_removes_definition_and_handler() {
        let registry = ToolRegistry::new();
        registry.register(tool("a"), sync_handler(|_| Ok(String::new())));
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.is_empty());
        assert!(registry.handler("a").is_none());
    }
}
