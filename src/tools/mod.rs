//! Tools Module
//!
//! Each demo server lives in its own module exporting a `register` function
//! that adds its tools to the registry during server initialization.

use clap::ValueEnum;
use std::sync::Arc;

use crate::core::registry::ToolRegistry;
use crate::core::server::{AppState, ResourceProvider};
use crate::core::utils::AppConfig;

pub mod calculator;
pub mod data;
pub mod dynamic;
pub mod expression;
pub mod filter;
pub mod time;

/// Which handler table the process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServerKind {
    Calculator,
    Data,
    Time,
    Dynamic,
    All,
}

impl ServerKind {
    /// Server name reported when none is configured.
    pub fn default_name(self) -> &'static str {
        match self {
            ServerKind::Calculator => "calculator-server",
            ServerKind::Data => "data-server",
            ServerKind::Time => "time-server",
            ServerKind::Dynamic => "dynamic-server",
            ServerKind::All => "demo-mcp-servers",
        }
    }
}

/// Register the tools of one demo server, or of all of them.
///
/// # Arguments
/// * `kind` - Which tool table to register
/// * `registry` - Registry receiving the tools
/// * `config` - Per-tool settings from the YAML configuration
/// * `state` - Server metadata reported by `get_server_info`
///
/// # Returns
/// The resource providers owned by the registered tools.
pub fn register_all(
    kind: ServerKind,
    registry: &Arc<ToolRegistry>,
    config: &AppConfig,
    state: &AppState,
) -> Vec<Arc<dyn ResourceProvider>> {
    let mut resources: Vec<Arc<dyn ResourceProvider>> = Vec::new();
    let all = kind == ServerKind::All;

    if all || kind == ServerKind::Calculator {
        calculator::register(registry, config);
    }
    if all || kind == ServerKind::Data {
        resources.push(data::register(registry, config));
    }
    if all || kind == ServerKind::Time {
        time::register(registry);
    }
    if all || kind == ServerKind::Dynamic {
        dynamic::register(registry, config, state);
    }

    tracing::debug!(server = ?kind, tools = registry.len(), "tools registered");
    resources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState {
            server_name: "test".to_string(),
            server_version: "0.0.0".to_string(),
        }
    }

    #[test]
    fn single_server_tables() {
        let registry = Arc::new(ToolRegistry::new());
        let resources = register_all(ServerKind::Time, &registry, &AppConfig::default(), &state());
        assert!(resources.is_empty());
        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["get_current_time", "get_date", "time_until", "timezone_converter"]
        );
    }

    #[test]
    fn all_servers_share_one_registry() {
        let registry = Arc::new(ToolRegistry::new());
        let resources = register_all(ServerKind::All, &registry, &AppConfig::default(), &state());
        assert_eq!(resources.len(), 1);
        assert_eq!(registry.len(), 5 + 6 + 4 + 6);
        for name in ["calculate", "query_data", "get_date", "add_tool"] {
            assert!(registry.handler(name).is_some(), "{name} missing");
        }
    }
}
