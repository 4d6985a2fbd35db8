//! Current date and time, with ready-made date ranges.
//!
//! Small backends are bad at date arithmetic, so the tool hands over the
//! ranges for "last week" style questions directly.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use turnstile_core::error::ToolError;
use turnstile_core::tool::{BlockingTool, ToolArguments};

pub struct CurrentDateTimeTool;

impl BlockingTool for CurrentDateTimeTool {
    fn name(&self) -> &str {
        "get_current_datetime"
    }

    fn description(&self) -> &str {
        "Get the current date and time. ALWAYS call this first when answering questions about \
         time periods like 'last week', 'this month', 'recently'. Returns UTC and local time \
         with date range hints."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn execute(&self, _arguments: ToolArguments) -> Result<String, ToolError> {
        Ok(describe(Utc::now(), Local::now()).to_string())
    }
}

fn describe<L: TimeZone>(now: DateTime<Utc>, local: DateTime<L>) -> serde_json::Value
where
    L::Offset: std::fmt::Display,
{
    let today = now.format("%Y-%m-%d").to_string();
    let range = |days: i64| {
        format!(
            "{} to {today}",
            (now - Duration::days(days)).format("%Y-%m-%d")
        )
    };

    serde_json::json!({
        "utc": {
            "iso": now.to_rfc3339(),
            "date": today,
            "time": now.format("%H:%M:%S").to_string(),
            "day_of_week": now.format("%A").to_string(),
            "timestamp": now.timestamp(),
        },
        "local": {
            "iso": local.to_rfc3339(),
            "date": local.format("%Y-%m-%d").to_string(),
            "time": local.format("%H:%M:%S").to_string(),
            "day_of_week": local.format("%A").to_string(),
        },
        "hints": {
            "last_7_days": range(7),
            "last_30_days": range(30),
            "last_90_days": range(90),
        }
    })
}
