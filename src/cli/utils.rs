use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputFormat;

const LABEL_WIDTH: usize = 30;

/// Report a completed command: a check line for humans, an envelope for `--json`
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let envelope = json!({
                "success": true,
                "message": message,
                "data": data.unwrap_or(Value::Null),
            });
            output_json(&envelope)
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            Ok(())
        }
    }
}

pub fn output_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_header(left: &str, right: &str) {
    print_row(left, right);
    println!("{}", "-".repeat(LABEL_WIDTH + 10));
}

pub fn print_row(left: impl std::fmt::Display, right: impl std::fmt::Display) {
    println!("{:<width$} {}", left.to_string(), right, width = LABEL_WIDTH);
}
