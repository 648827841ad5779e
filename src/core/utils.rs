//! Utility Functions for Configuration and Argument Handling
//!
//! This module loads the optional YAML configuration file, exposes
//! tool-specific settings, and provides the loose argument accessors and
//! number rendering shared by all tools.

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::core::error::{ConfigError, ToolError};

/// Configuration loaded from `kmcp.yaml`.
///
/// ```yaml
/// tools:
///   calculate:
///     max_history: 500
///   long_running_task:
///     max_duration: 60
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tools: HashMap<String, Map<String, Value>>,
}

impl AppConfig {
    /// Unsigned integer setting for a tool with a default fallback.
    pub fn tool_u64(&self, tool_name: &str, key: &str, default: u64) -> u64 {
        self.tools
            .get(tool_name)
            .and_then(|cfg| cfg.get(key))
            .and_then(Value::as_u64)
            .unwrap_or(default)
    }
}

/// Load configuration from a YAML file.
///
/// A missing file yields the default (empty) configuration; an unreadable or
/// malformed file is an error.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&contents).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_config(contents: &str) -> Result<AppConfig, serde_yaml::Error> {
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(contents)
}

fn present<'a>(args: &'a Value, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|v| !v.is_null())
}

pub fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    let value = present(args, name).ok_or_else(|| ToolError::MissingParam(name.to_string()))?;
    value
        .as_str()
        .ok_or_else(|| ToolError::invalid(name, "expected a string"))
}

pub fn optional_str<'a>(args: &'a Value, name: &str, default: &'a str) -> Result<&'a str, ToolError> {
    match present(args, name) {
        None => Ok(default),
        Some(v) => v.as_str().ok_or_else(|| ToolError::invalid(name, "expected a string")),
    }
}

/// Numbers are accepted as JSON numbers or numeric strings.
fn to_f64(name: &str, value: &Value) -> Result<f64, ToolError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ToolError::invalid(name, "number out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ToolError::invalid(name, format!("could not convert string to float: '{s}'"))),
        _ => Err(ToolError::invalid(name, "expected a number")),
    }
}

pub fn required_f64(args: &Value, name: &str) -> Result<f64, ToolError> {
    let value = present(args, name).ok_or_else(|| ToolError::MissingParam(name.to_string()))?;
    to_f64(name, value)
}

pub fn optional_f64(args: &Value, name: &str, default: f64) -> Result<f64, ToolError> {
    present(args, name).map_or(Ok(default), |v| to_f64(name, v))
}

/// Integers may also arrive as integral floats (`5.0`).
pub fn optional_i64(args: &Value, name: &str, default: i64) -> Result<i64, ToolError> {
    let Some(value) = present(args, name) else {
        return Ok(default);
    };
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(ToolError::invalid(name, "expected an integer")),
    }
}

/// Non-negative count argument, bounded by `max`.
pub fn optional_count(args: &Value, name: &str, default: u64, max: u64) -> Result<u64, ToolError> {
    let value = optional_i64(args, name, default as i64)?;
    if value < 0 {
        return Err(ToolError::invalid(name, "must be non-negative"));
    }
    let value = value as u64;
    if value > max {
        return Err(ToolError::invalid(name, format!("must be at most {max}")));
    }
    Ok(value)
}

pub fn optional_bool(args: &Value, name: &str, default: bool) -> Result<bool, ToolError> {
    match present(args, name) {
        None => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| ToolError::invalid(name, "expected a boolean")),
    }
}

/// Render a float the way Python's `repr` does: `14.0`, `0.1`, `1e+20`, `1e-05`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let sci = format!("{value:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        let fixed = format!("{value}");
        if fixed.contains('.') {
            fixed
        } else {
            format!("{fixed}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

/// Integers print as integers, everything else through `format_float`.
pub fn format_number(number: &Number) -> String {
    if number.is_i64() || number.is_u64() {
        number.to_string()
    } else {
        format_float(number.as_f64().unwrap_or(f64::NAN))
    }
}

/// Python-style list rendering: `[1, 2.5, 3]`.
pub fn format_number_list(numbers: &[Number]) -> String {
    let items: Vec<String> = numbers.iter().map(format_number).collect();
    format!("[{}]", items.join(", "))
}

fn python_str_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Render a JSON value the way Python's `repr` renders the decoded object:
/// `{'data': 'hi', 'n': 1.5, 'ok': True}`.
pub fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => python_str_repr(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(python_repr).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", python_str_repr(k), python_repr(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// Round to `places` decimal digits, as generated prices and ratings are.
/// Values too large to scale are returned unchanged.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn float_rendering() {
        assert_eq!(format_float(14.0), "14.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-3.0), "-3.0");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1e-5), "1e-05");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(1.2676506002282294e30), "1.2676506002282294e+30");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn python_style_repr() {
        assert_eq!(python_repr(&json!({"data": "hi"})), "{'data': 'hi'}");
        assert_eq!(
            python_repr(&json!({"n": 1, "x": 2.0, "ok": true, "none": null, "list": [1, "a"]})),
            "{'n': 1, 'x': 2.0, 'ok': True, 'none': None, 'list': [1, 'a']}"
        );
        assert_eq!(python_repr(&json!("it's")), "\"it's\"");
        assert_eq!(python_repr(&json!("a'b\"c\n")), "'a\\'b\"c\\n'");
        assert_eq!(python_repr(&json!({})), "{}");
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(2.345_67, 2), 2.35);
        assert_eq!(round_to(4.26, 1), 4.3);
        assert_eq!(round_to(1.7e308, 2), 1.7e308);
    }

    #[test]
    fn number_list_keeps_integers() {
        let nums: Vec<Number> = vec![1.into(), Number::from_f64(2.5).unwrap(), 3.into()];
        assert_eq!(format_number_list(&nums), "[1, 2.5, 3]");
    }

    #[test]
    fn argument_accessors() {
        let args = json!({"s": "text", "n": "3.5", "i": 4.0, "neg": -1, "b": true, "nil": null});
        assert_eq!(required_str(&args, "s").unwrap(), "text");
        assert_eq!(
            required_str(&args, "missing"),
            Err(ToolError::MissingParam("missing".into()))
        );
        assert_eq!(required_f64(&args, "n").unwrap(), 3.5);
        assert_eq!(optional_i64(&args, "i", 0).unwrap(), 4);
        assert_eq!(optional_str(&args, "nil", "UTC").unwrap(), "UTC");
        assert!(optional_bool(&args, "b", false).unwrap());
        assert!(optional_count(&args, "neg", 10, 100).is_err());
        assert_eq!(optional_count(&args, "absent", 10, 100).unwrap(), 10);
        assert!(required_f64(&json!({"x": "abc"}), "x").is_err());
    }

    #[test]
    fn config_sections_and_defaults() {
        let cfg = parse_config("tools:\n  calculate:\n    max_history: 5\n").unwrap();
        assert_eq!(cfg.tool_u64("calculate", "max_history", 1000), 5);
        assert_eq!(cfg.tool_u64("history", "max_history", 1000), 1000);
        assert_eq!(cfg.tool_u64("unknown", "max_history", 7), 7);
        assert!(parse_config("").unwrap().tools.is_empty());
    }

    #[test]
    fn load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tools:\n  long_running_task:\n    max_duration: 7").unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.tool_u64("long_running_task", "max_duration", 300), 7);

        let missing = load_config(Path::new("/nonexistent/kmcp.yaml")).unwrap();
        assert!(missing.tools.is_empty());
    }

    #[test]
    fn malformed_config_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tools: [unclosed").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Yaml { .. })));
    }
}
