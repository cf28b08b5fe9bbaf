//! Output formatting for textembed CLI
//!
//! Two formats: a human-readable table (default) and JSON for machine
//! consumption. Colors are dropped automatically when stdout is not a TTY.

use clap::ValueEnum;
use serde::Serialize;
use std::io::IsTerminal;
use std::str::FromStr;

/// Output format for CLI results
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format (default)
    #[default]
    Table,
    /// JSON format for machine consumption
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: '{}'", s)),
        }
    }
}

/// Types that can be shown as a table or serialized as JSON.
pub trait TableDisplay: Serialize {
    /// Convert to table format string
    fn to_table(&self) -> String;
}

/// Render `data` in the requested format.
pub fn render<T: TableDisplay>(data: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => data.to_table(),
        OutputFormat::Json => serde_json::to_string_pretty(data)
            .unwrap_or_else(|e| format!("{{\n  \"error\": \"{}\"\n}}", e)),
    }
}

/// Render and print to stdout.
pub fn print<T: TableDisplay>(data: &T, format: OutputFormat) {
    println!("{}", render(data, format));
}

/// Disable colors when stdout is redirected, unless overridden.
pub fn configure_colors(color_override: Option<bool>) {
    let use_color = color_override.unwrap_or_else(|| std::io::stdout().is_terminal());
    colored::control::set_override(use_color);
}
