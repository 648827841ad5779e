//! Core Server Framework Module
//!
//! - protocol.rs: JSON-RPC and MCP message types
//! - registry.rs: tool definitions and handlers
//! - notify.rs: server-to-client notifications
//! - server.rs: request dispatch plus the HTTP and STDIO transports
//! - utils.rs: configuration and argument helpers
//! - error.rs: tool and configuration errors

pub mod error;
pub mod notify;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod utils;
