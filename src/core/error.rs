//! Error Types
//!
//! Tool handlers return `ToolError`; the dispatcher renders it as an
//! `Error: <message>` text result. `ConfigError` covers loading the optional
//! YAML configuration file.

use thiserror::Error;

/// Failure raised by a tool handler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("Invalid characters in expression: {0}")]
    InvalidCharacters(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("math domain error")]
    MathDomain,

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ToolError::InvalidParam {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ToolResult = Result<String, ToolError>;

/// Failure while loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_rendered_text() {
        assert_eq!(
            ToolError::MissingParam("expression".into()).to_string(),
            "Missing required parameter: expression"
        );
        assert_eq!(ToolError::MathDomain.to_string(), "math domain error");
        assert_eq!(
            ToolError::invalid("count", "must be non-negative").to_string(),
            "Invalid parameter 'count': must be non-negative"
        );
    }
}
