//! Time and Date Tools
//!
//! Current time and date in a handful of named zones, countdowns to a target
//! date, and wall-clock conversion between zones.

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz};
use serde_json::{Value, json};

use crate::core::error::{ToolError, ToolResult};
use crate::core::protocol::MCPTool;
use crate::core::registry::{ToolRegistry, sync_handler};
use crate::core::utils::{optional_str, required_str};

/// Supported timezone codes.
pub const TIMEZONES: &[(&str, Tz)] = &[
    ("UTC", Tz::UTC),
    ("EST", Tz::America__New_York),
    ("PST", Tz::America__Los_Angeles),
    ("CST", Tz::America__Chicago),
    ("MST", Tz::America__Denver),
    ("GMT", Tz::Europe__London),
    ("CET", Tz::Europe__Paris),
    ("JST", Tz::Asia__Tokyo),
    ("AEST", Tz::Australia__Sydney),
];

/// Resolve a timezone code. Unknown codes fall back to UTC.
pub fn resolve_zone(code: &str) -> Tz {
    TIMEZONES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, tz)| *tz)
        .unwrap_or(Tz::UTC)
}

fn zone_codes() -> String {
    TIMEZONES
        .iter()
        .map(|(code, _)| *code)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_date(value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ToolError::invalid("target_date", format!("'{value}' does not match format YYYY-MM-DD"))
    })
}

fn parse_time(name: &str, value: &str) -> Result<NaiveTime, ToolError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ToolError::invalid(name, format!("'{value}' does not match format HH:MM")))
}

/// Attach a zone to a wall-clock time, preferring standard time: an
/// ambiguous time takes the later (standard) instant and a time skipped by a
/// DST jump is read with the zone's standard offset.
fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(_, standard) => standard,
        LocalResult::None => {
            let standard = tz.offset_from_utc_datetime(&naive).base_utc_offset();
            tz.from_utc_datetime(&(naive - standard))
        }
    }
}

pub fn current_time(now: DateTime<Utc>, code: &str, format: &str) -> String {
    let local = now.with_timezone(&resolve_zone(code));
    let pattern = if format == "12h" { "%I:%M:%S %p" } else { "%H:%M:%S" };
    format!("Current time in {}: {}", code, local.format(pattern))
}

pub fn current_date(now: DateTime<Utc>, code: &str, format: &str) -> String {
    let local = now.with_timezone(&resolve_zone(code));
    let pattern = match format {
        "us" => "%m/%d/%Y",
        "eu" => "%d/%m/%Y",
        _ => "%Y-%m-%d",
    };
    format!("Current date in {}: {}", code, local.format(pattern))
}

pub fn time_until(now: DateTime<Utc>, target_date: &str, target_time: &str, code: &str) -> ToolResult {
    let date = parse_date(target_date)?;
    let time = parse_time("target_time", target_time)?;
    let target_str = format!("{target_date} {target_time}");
    let target = localize(resolve_zone(code), date.and_time(time));

    let diff = target.with_timezone(&Utc) - now;
    if diff.num_seconds() < 0 {
        return Ok(format!("The target date {target_str} has already passed!"));
    }

    let days = diff.num_days();
    let seconds = diff.num_seconds() - days * 86_400;
    Ok(format!(
        "Time until {} {}: {} days, {} hours, {} minutes",
        target_str,
        code,
        days,
        seconds / 3600,
        (seconds % 3600) / 60
    ))
}

/// Convert `time` on `today` from one zone's wall clock to another's.
pub fn convert_time(today: NaiveDate, time: &str, from: &str, to: &str) -> ToolResult {
    let wall = parse_time("time", time)?;
    let source = localize(resolve_zone(from), today.and_time(wall));
    let target = source.with_timezone(&resolve_zone(to));
    Ok(format!("{} {} = {} {}", time, from, target.format("%H:%M"), to))
}

pub fn register(registry: &ToolRegistry) {
    let codes = zone_codes();

    registry.register(
        MCPTool::new(
            "get_current_time",
            "Get current time in specified timezone",
            json!({
                "type": "object",
                "properties": {
                    "timezone": {
                        "type": "string",
                        "description": format!("Timezone code: {codes}"),
                        "default": "UTC"
                    },
                    "format": {
                        "type": "string",
                        "description": "Time format: '12h' or '24h'",
                        "default": "24h"
                    }
                },
                "required": []
            }),
        ),
        sync_handler(|args: Value| {
            let code = optional_str(&args, "timezone", "UTC")?;
            let format = optional_str(&args, "format", "24h")?;
            Ok(current_time(Utc::now(), code, format))
        }),
    );

    registry.register(
        MCPTool::new(
            "get_date",
            "Get current date in specified timezone",
            json!({
                "type": "object",
                "properties": {
                    "timezone": {
                        "type": "string",
                        "description": format!("Timezone code: {codes}"),
                        "default": "UTC"
                    },
                    "format": {
                        "type": "string",
                        "description": "Date format: 'iso', 'us', 'eu'",
                        "default": "iso"
                    }
                },
                "required": []
            }),
        ),
        sync_handler(|args: Value| {
            let code = optional_str(&args, "timezone", "UTC")?;
            let format = optional_str(&args, "format", "iso")?;
            Ok(current_date(Utc::now(), code, format))
        }),
    );

    registry.register(
        MCPTool::new(
            "time_until",
            "Calculate time until a future date",
            json!({
                "type": "object",
                "properties": {
                    "target_date": {
                        "type": "string",
                        "description": "Target date in YYYY-MM-DD format"
                    },
                    "target_time": {
                        "type": "string",
                        "description": "Target time in HH:MM format (24h)",
                        "default": "00:00"
                    },
                    "timezone": {
                        "type": "string",
                        "description": format!("Timezone code: {codes}"),
                        "default": "UTC"
                    }
                },
                "required": ["target_date"]
            }),
        ),
        sync_handler(|args: Value| {
            let date = required_str(&args, "target_date")?;
            let time = optional_str(&args, "target_time", "00:00")?;
            let code = optional_str(&args, "timezone", "UTC")?;
            time_until(Utc::now(), date, time, code)
        }),
    );

    registry.register(
        MCPTool::new(
            "timezone_converter",
            "Convert time between timezones",
            json!({
                "type": "object",
                "properties": {
                    "time": {
                        "type": "string",
                        "description": "Time in HH:MM format (24h)"
                    },
                    "from_timezone": {
                        "type": "string",
                        "description": format!("Source timezone: {codes}")
                    },
                    "to_timezone": {
                        "type": "string",
                        "description": format!("Target timezone: {codes}")
                    }
                },
                "required": ["time", "from_timezone", "to_timezone"]
            }),
        ),
        sync_handler(|args: Value| {
            let time = required_str(&args, "time")?;
            let from = required_str(&args, "from_timezone")?;
            let to = required_str(&args, "to_timezone")?;
            convert_time(Local::now().date_naive(), time, from, to)
        }),
    );
}
