//! Structured output: JSON, YAML and tables, with optional JMESPath filtering

use anyhow::{Context, Result};
use comfy_table::Table;
use jpx_core::Runtime;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::sync::OnceLock;

use crate::cli;

static JMESPATH_RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn jmespath_runtime() -> &'static Runtime {
    JMESPATH_RUNTIME.get_or_init(|| Runtime::builder().with_all_extensions().build())
}

/// Quote bare backtick literals so `` `READY` `` reads as `` `"READY"` ``.
///
/// JMESPath allows the quotes to be elided; the runtime wants valid JSON.
fn normalize_backtick_literals(query: &str) -> String {
    static BACKTICK_RE: OnceLock<Regex> = OnceLock::new();
    let re = BACKTICK_RE.get_or_init(|| {
        Regex::new(r"`([^`\\]*(?:\\.[^`\\]*)*)`").expect("backtick pattern is valid")
    });

    re.replace_all(query, |caps: &regex::Captures| {
        let content = &caps[1];
        let trimmed = content.trim();
        if serde_json::from_str::<Value>(trimmed).is_ok() {
            format!("`{}`", content)
        } else {
            let escaped = trimmed.replace('\\', "\\\\").replace('"', "\\\"");
            format!("`\"{}\"`", escaped)
        }
    })
    .into_owned()
}

pub fn compile_jmespath(
    query: &str,
) -> Result<jpx_core::Expression<'static>, jpx_core::JmespathError> {
    jmespath_runtime().compile(&normalize_backtick_literals(query))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Table,
}

impl OutputFormat {
    /// Structured format for a CLI choice; `Auto` has none unless a query
    /// forces JSON.
    pub fn structured(format: cli::OutputFormat, query: Option<&str>) -> Option<Self> {
        match format {
            cli::OutputFormat::Json => Some(Self::Json),
            cli::OutputFormat::Yaml => Some(Self::Yaml),
            cli::OutputFormat::Table => Some(Self::Table),
            cli::OutputFormat::Auto if query.is_some() => Some(Self::Json),
            cli::OutputFormat::Auto => None,
        }
    }
}

pub fn print_output<T: Serialize>(data: T, format: OutputFormat, query: Option<&str>) -> Result<()> {
    println!("{}", render(data, format, query)?);
    Ok(())
}

/// Print a workflow report: its status lines for `auto`, otherwise the
/// serialized form.
pub fn print_report<R: Serialize + Display>(
    report: &R,
    format: cli::OutputFormat,
    query: Option<&str>,
) -> Result<()> {
    match OutputFormat::structured(format, query) {
        Some(format) => print_output(report, format, query),
        None => {
            println!("{}", report);
            Ok(())
        }
    }
}

pub fn render<T: Serialize>(data: T, format: OutputFormat, query: Option<&str>) -> Result<String> {
    let mut value = serde_json::to_value(data)?;

    if let Some(query_str) = query {
        let expr = compile_jmespath(query_str)
            .with_context(|| format!("Invalid JMESPath expression: {}", query_str))?;
        value = expr.search(&value).context("JMESPath query failed")?;
    }

    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&value)?,
        OutputFormat::Yaml => serde_yaml::to_string(&value)?,
        OutputFormat::Table => table(&value),
    })
}

fn table(value: &Value) -> String {
    match value {
        Value::Array(items) if !items.is_empty() => {
            let mut table = Table::new();
            if let Value::Object(first) = &items[0] {
                let headers: Vec<String> = first.keys().cloned().collect();
                table.set_header(&headers);
                for item in items {
                    if let Value::Object(obj) = item {
                        table.add_row(
                            headers
                                .iter()
                                .map(|h| format_value(obj.get(h).unwrap_or(&Value::Null))),
                        );
                    }
                }
            } else {
                table.set_header(vec!["Value"]);
                for item in items {
                    table.add_row(vec![format_value(item)]);
                }
            }
            table.to_string()
        }
        // Reports wrap their rows in a single field, e.g. `{"operations": [...]}`
        Value::Object(obj) if obj.len() == 1 && obj.values().all(Value::is_array) => {
            obj.values().next().map(table).unwrap_or_default()
        }
        Value::Object(obj) => {
            let mut table = Table::new();
            table.set_header(vec!["Key", "Value"]);
            for (key, val) in obj {
                table.add_row(vec![key.clone(), format_value(val)]);
            }
            table.to_string()
        }
        _ => format_value(value),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) if arr.iter().all(Value::is_string) => arr
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}
