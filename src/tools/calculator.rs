//! Calculator Tools
//!
//! `calculate`, `scientific_calc`, `statistics`, `unit_convert` and `history`.
//! Arithmetic and scientific results are remembered so later expressions can
//! refer to the previous result as `ans`.

use num_bigint::BigUint;
use parking_lot::Mutex;
use serde_json::{Number, Value, json};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::error::{ToolError, ToolResult};
use crate::core::protocol::MCPTool;
use crate::core::registry::{ToolRegistry, sync_handler};
use crate::core::utils::{
    AppConfig, format_float, format_number, format_number_list, optional_count, optional_f64,
    required_f64, required_str,
};
use crate::tools::expression::safe_eval;

const DEFAULT_MAX_HISTORY: u64 = 1000;
const DEFAULT_MAX_FACTORIAL: u64 = 10_000;

/// Last result as it is substituted for `ans`.
#[derive(Debug, Clone, PartialEq)]
enum Answer {
    Float(f64),
    Int(BigUint),
}

impl Answer {
    fn render(&self) -> String {
        match self {
            Answer::Float(value) => format_float(*value),
            Answer::Int(value) => value.to_string(),
        }
    }
}

#[derive(Default)]
struct CalculatorState {
    history: VecDeque<String>,
    last_result: Option<Answer>,
}

/// Calculation history and the `ans` register.
pub struct Calculator {
    state: Mutex<CalculatorState>,
    max_history: usize,
    max_factorial: u64,
}

impl Calculator {
    pub fn new(max_history: usize, max_factorial: u64) -> Self {
        Self {
            state: Mutex::new(CalculatorState::default()),
            max_history,
            max_factorial,
        }
    }

    fn record(&self, entry: String, result: Answer) {
        let mut state = self.state.lock();
        state.last_result = Some(result);
        state.history.push_back(entry);
        while state.history.len() > self.max_history {
            state.history.pop_front();
        }
    }

    /// Evaluate an arithmetic expression, substituting `ans` with the last result.
    pub fn calculate(&self, expression: &str) -> ToolResult {
        let expression = if expression.to_lowercase().contains("ans") {
            let ans = match &self.state.lock().last_result {
                Some(answer) => answer.render(),
                None => "0".to_string(),
            };
            expression.to_lowercase().replace("ans", &ans)
        } else {
            expression.to_string()
        };

        let result = safe_eval(&expression)?;
        let entry = format!("{} = {}", expression, format_float(result));
        self.record(entry.clone(), Answer::Float(result));
        Ok(entry)
    }

    /// Scientific function of `value`; trigonometry works in degrees.
    pub fn scientific(&self, operation: &str, value: f64, base: Option<f64>) -> ToolResult {
        let result = match operation {
            "factorial" => Answer::Int(factorial(value, self.max_factorial)?),
            _ => {
                let Some(result) = scientific_fn(operation, value, base)? else {
                    return Ok(format!("Unknown operation: {operation}"));
                };
                Answer::Float(result)
            }
        };

        let entry = format!("{}({}) = {}", operation, format_float(value), result.render());
        self.record(entry.clone(), result);
        Ok(entry)
    }

    /// The last `limit` history entries, oldest first.
    pub fn history(&self, limit: usize) -> String {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(limit);
        let recent: Vec<&str> = state.history.iter().skip(skip).map(String::as_str).collect();
        if recent.is_empty() {
            return "No calculation history".to_string();
        }
        format!("Recent calculations:\n{}", recent.join("\n"))
    }
}

/// Returns Ok(None) for an unknown operation.
fn scientific_fn(operation: &str, value: f64, base: Option<f64>) -> Result<Option<f64>, ToolError> {
    let result = match operation {
        "sin" => value.to_radians().sin(),
        "cos" => value.to_radians().cos(),
        "tan" => value.to_radians().tan(),
        "log" => {
            let base = base.unwrap_or(10.0);
            if value <= 0.0 || base <= 0.0 {
                return Err(ToolError::MathDomain);
            }
            if base == 1.0 {
                return Err(ToolError::Failed("float division by zero".to_string()));
            }
            value.ln() / base.ln()
        }
        "ln" => {
            if value <= 0.0 {
                return Err(ToolError::MathDomain);
            }
            value.ln()
        }
        "sqrt" => {
            if value < 0.0 {
                return Err(ToolError::MathDomain);
            }
            value.sqrt()
        }
        "pow" => {
            let exponent = base.unwrap_or(2.0);
            if (value == 0.0 && exponent < 0.0) || (value < 0.0 && exponent.fract() != 0.0) {
                return Err(ToolError::MathDomain);
            }
            let result = value.powf(exponent);
            if result.is_infinite() {
                return Err(ToolError::Failed("math range error".to_string()));
            }
            result
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Exact factorial of the integer part of `value`, up to `max`.
fn factorial(value: f64, max: u64) -> Result<BigUint, ToolError> {
    if value.is_nan() {
        return Err(ToolError::Failed("cannot convert float NaN to integer".to_string()));
    }
    if value.is_infinite() {
        return Err(ToolError::Failed(
            "cannot convert float infinity to integer".to_string(),
        ));
    }
    let n = value.trunc();
    if n < 0.0 {
        return Err(ToolError::Failed(
            "factorial() not defined for negative values".to_string(),
        ));
    }
    if n > max as f64 {
        return Err(ToolError::Failed(format!(
            "factorial() argument should not exceed {max}"
        )));
    }
    Ok((1..=n as u64).map(BigUint::from).product())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatOp {
    Mean,
    Median,
    Mode,
    StdDev,
    Sum,
}

impl StatOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "mean" => Some(StatOp::Mean),
            "median" => Some(StatOp::Median),
            "mode" => Some(StatOp::Mode),
            "std_dev" => Some(StatOp::StdDev),
            "sum" => Some(StatOp::Sum),
            _ => None,
        }
    }
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn mean(numbers: &[Number]) -> f64 {
    numbers.iter().map(as_f64).sum::<f64>() / numbers.len() as f64
}

/// Compute a statistic over a non-empty list; the result is pre-rendered.
pub fn statistic(numbers: &[Number], op: StatOp) -> String {
    match op {
        StatOp::Mean => format_float(mean(numbers)),
        StatOp::Median => {
            let mut sorted = numbers.to_vec();
            sorted.sort_by(|a, b| as_f64(a).total_cmp(&as_f64(b)));
            let n = sorted.len();
            if n % 2 == 0 {
                format_float((as_f64(&sorted[n / 2 - 1]) + as_f64(&sorted[n / 2])) / 2.0)
            } else {
                format_number(&sorted[n / 2])
            }
        }
        StatOp::Mode => {
            // (first-seen value, count), insertion ordered
            let mut counts: Vec<(Number, usize)> = Vec::new();
            for n in numbers {
                match counts.iter_mut().find(|(seen, _)| as_f64(seen) == as_f64(n)) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((n.clone(), 1)),
                }
            }
            let max_count = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
            let modes: Vec<Number> = counts
                .into_iter()
                .filter(|(_, c)| *c == max_count)
                .map(|(n, _)| n)
                .collect();
            if modes.len() == 1 {
                format_number(&modes[0])
            } else {
                format_number_list(&modes)
            }
        }
        StatOp::StdDev => {
            let mean = mean(numbers);
            let variance =
                numbers.iter().map(|x| (as_f64(x) - mean).powi(2)).sum::<f64>() / numbers.len() as f64;
            format_float(variance.sqrt())
        }
        StatOp::Sum => {
            let ints: Option<Vec<i128>> = numbers
                .iter()
                .map(|n| n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from)))
                .collect();
            match ints {
                Some(ints) => ints.iter().sum::<i128>().to_string(),
                None => format_float(numbers.iter().map(as_f64).sum()),
            }
        }
    }
}

fn statistics(args: &Value) -> ToolResult {
    let numbers = args
        .get("numbers")
        .filter(|v| !v.is_null())
        .ok_or_else(|| ToolError::MissingParam("numbers".to_string()))?
        .as_array()
        .ok_or_else(|| ToolError::invalid("numbers", "expected a list of numbers"))?
        .iter()
        .map(|v| match v {
            Value::Number(n) => Ok(n.clone()),
            _ => Err(ToolError::invalid("numbers", "expected a list of numbers")),
        })
        .collect::<Result<Vec<Number>, _>>()?;
    let operation = required_str(args, "operation")?;

    if numbers.is_empty() {
        return Ok("No numbers provided".to_string());
    }
    let Some(op) = StatOp::parse(operation) else {
        return Ok(format!("Unknown operation: {operation}"));
    };

    Ok(format!(
        "{} of {} = {}",
        operation,
        format_number_list(&numbers),
        statistic(&numbers, op)
    ))
}

/// Convert between supported unit pairs; None when the pair is unsupported.
pub fn convert_units(value: f64, from_unit: &str, to_unit: &str) -> Option<f64> {
    let result = match (from_unit, to_unit) {
        ("km", "miles") => value * 0.621371,
        ("miles", "km") => value * 1.60934,
        ("m", "ft") => value * 3.28084,
        ("ft", "m") => value / 3.28084,
        ("celsius", "fahrenheit") => value * 9.0 / 5.0 + 32.0,
        ("fahrenheit", "celsius") => (value - 32.0) * 5.0 / 9.0,
        ("kg", "lbs") => value * 2.20462,
        ("lbs", "kg") => value / 2.20462,
        _ => return None,
    };
    Some(result)
}

fn unit_convert(args: &Value) -> ToolResult {
    let value = required_f64(args, "value")?;
    let from_unit = required_str(args, "from_unit")?.to_lowercase();
    let to_unit = required_str(args, "to_unit")?.to_lowercase();

    Ok(match convert_units(value, &from_unit, &to_unit) {
        Some(result) => format!("{} {} = {:.4} {}", format_float(value), from_unit, result, to_unit),
        None => format!("Conversion from {from_unit} to {to_unit} not supported"),
    })
}

/// Register the calculator tools.
///
/// # Arguments
/// * `registry` - Registry receiving the tools
/// * `config` - Reads `calculate.max_history` and `scientific_calc.max_factorial`
///
/// # Returns
/// The calculator whose history and `ans` register back the tools.
pub fn register(registry: &ToolRegistry, config: &AppConfig) -> Arc<Calculator> {
    let max_history = config.tool_u64("calculate", "max_history", DEFAULT_MAX_HISTORY) as usize;
    let max_factorial = config.tool_u64("scientific_calc", "max_factorial", DEFAULT_MAX_FACTORIAL);
    let calculator = Arc::new(Calculator::new(max_history, max_factorial));

    let calc = calculator.clone();
    registry.register(
        MCPTool::new(
            "calculate",
            "Perform basic arithmetic calculation",
            json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Math expression (e.g., '2 + 3 * 4', '(10 - 5) / 2')"
                    }
                },
                "required": ["expression"]
            }),
        ),
        sync_handler(move |args| calc.calculate(required_str(&args, "expression")?)),
    );

    let calc = calculator.clone();
    registry.register(
        MCPTool::new(
            "scientific_calc",
            "Perform scientific calculations",
            json!({
                "type": "object",
                "properties": {
                    "operation": {
                        "type": "string",
                        "enum": ["sin", "cos", "tan", "log", "ln", "sqrt", "pow", "factorial"],
                        "description": "Scientific operation"
                    },
                    "value": {
                        "type": "number",
                        "description": "Input value"
                    },
                    "base": {
                        "type": "number",
                        "description": "Base for log, exponent for pow (optional)"
                    }
                },
                "required": ["operation", "value"]
            }),
        ),
        sync_handler(move |args| {
            let operation = required_str(&args, "operation")?;
            let value = required_f64(&args, "value")?;
            let base = match args.get("base").filter(|v| !v.is_null()) {
                Some(_) => Some(optional_f64(&args, "base", 0.0)?),
                None => None,
            };
            calc.scientific(operation, value, base)
        }),
    );

    registry.register(
        MCPTool::new(
            "statistics",
            "Calculate statistics for a list of numbers",
            json!({
                "type": "object",
                "properties": {
                    "numbers": {
                        "type": "array",
                        "items": {"type": "number"},
                        "description": "List of numbers"
                    },
                    "operation": {
                        "type": "string",
                        "enum": ["mean", "median", "mode", "std_dev", "sum"],
                        "description": "Statistical operation"
                    }
                },
                "required": ["numbers", "operation"]
            }),
        ),
        sync_handler(|args| statistics(&args)),
    );

    registry.register(
        MCPTool::new(
            "unit_convert",
            "Convert between units",
            json!({
                "type": "object",
                "properties": {
                    "value": {
                        "type": "number",
                        "description": "Value to convert"
                    },
                    "from_unit": {
                        "type": "string",
                        "description": "Source unit (e.g., 'km', 'miles', 'celsius', 'fahrenheit')"
                    },
                    "to_unit": {
                        "type": "string",
                        "description": "Target unit"
                    }
                },
                "required": ["value", "from_unit", "to_unit"]
            }),
        ),
        sync_handler(|args| unit_convert(&args)),
    );

    let calc = calculator.clone();
    registry.register(
        MCPTool::new(
            "history",
            "Show calculation history",
            json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "description": "Number of recent calculations to show",
                        "default": 10
                    }
                }
            }),
        ),
        sync_handler(move |args| {
            let limit = optional_count(&args, "limit", 10, u32::MAX as u64)?;
            Ok(calc.history(limit as usize))
        }),
    );

    calculator
}
