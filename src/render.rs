//! Uniform output of command results.
//!
//! Text mode projects the payload through a [`RenderSpec`] into a table or a
//! key/value block; JSON and YAML modes print the payload as received.

use anyhow::{Context as _, Result};
use cmpkit::value::{lookup, scalar_text};
use colored::Colorize;
use prettytable::{Cell, Row, Table, format};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Default maximum width of a text cell, in characters.
pub const DEFAULT_MAX_CELL_WIDTH: usize = 60;

const ELLIPSIS: &str = "...";

/// Output format selected with `-o`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    Json,
    Yaml,
}

impl Format {
    pub const NAMES: [&'static str; 3] = ["text", "json", "yaml"];
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Yaml => "yaml",
        })
    }
}

/// Per-column value transform, applied after projection.
pub type Transform = fn(&Value) -> Value;

/// One displayed column.
#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    /// Dotted path into each row.
    pub field: String,
    pub transform: Option<Transform>,
}

/// How a payload is shown in text mode.
#[derive(Debug, Clone)]
pub struct RenderSpec {
    /// Dotted path of the container inside the payload (e.g. `users`).
    pub key: Option<String>,
    pub columns: Vec<Column>,
    /// Two-column key/value view instead of a table.
    pub details: bool,
    pub max_cell_width: usize,
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self {
            key: None,
            columns: Vec::new(),
            details: false,
            max_cell_width: DEFAULT_MAX_CELL_WIDTH,
        }
    }
}

impl RenderSpec {
    /// Table of `key` with `(header, field)` columns.
    pub fn table(key: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            key: (!key.is_empty()).then(|| key.to_string()),
            columns: columns
                .iter()
                .map(|(header, field)| Column {
                    header: (*header).to_string(),
                    field: (*field).to_string(),
                    transform: None,
                })
                .collect(),
            ..Self::default()
        }
    }

    /// Key/value view of the object at `key`, every top-level field shown.
    pub fn details(key: &str) -> Self {
        Self {
            key: (!key.is_empty()).then(|| key.to_string()),
            details: true,
            ..Self::default()
        }
    }

    /// Attach a transform to the column reading `field`.
    #[must_use]
    pub fn transform(mut self, field: &str, f: Transform) -> Self {
        for column in self.columns.iter_mut().filter(|c| c.field == field) {
            column.transform = Some(f);
        }
        self
    }

    #[must_use]
    pub fn max_width(mut self, width: usize) -> Self {
        self.max_cell_width = width;
        self
    }
}

/// Render a payload. `colored` enables ANSI styling of table headers.
pub fn render(payload: &Value, format: Format, spec: &RenderSpec, colored: bool) -> Result<String> {
    match format {
        Format::Json => serde_json::to_string_pretty(payload).context("Failed to encode JSON"),
        Format::Yaml => serde_yaml::to_string(payload).context("Failed to encode YAML"),
        Format::Text => Ok(render_text(payload, spec, colored)),
    }
}

fn render_text(payload: &Value, spec: &RenderSpec, colored: bool) -> String {
    let container = match &spec.key {
        Some(key) => match lookup(payload, key) {
            Some(container) => container,
            None if payload.is_null() => return String::new(),
            None => {
                log::warn!("Response has no '{key}', showing it as received");
                let fallback = RenderSpec {
                    max_cell_width: spec.max_cell_width,
                    ..RenderSpec::details("")
                };
                return key_values(payload, &fallback, colored);
            }
        },
        None => payload,
    };

    match container {
        Value::Array(rows) if !spec.details => table(rows, spec, colored),
        Value::Object(_) | Value::Array(_) => key_values(container, spec, colored),
        Value::Null => String::new(),
        scalar => format!("{}\n", truncate(&scalar_text(scalar), spec.max_cell_width)),
    }
}

fn table(rows: &[Value], spec: &RenderSpec, colored: bool) -> String {
    let columns = if spec.columns.is_empty() {
        inferred_columns(rows)
    } else {
        spec.columns.clone()
    };

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.set_titles(Row::new(
        columns.iter().map(|c| Cell::new(&c.header)).collect(),
    ));
    for row in rows {
        table.add_row(Row::new(
            columns
                .iter()
                .map(|c| Cell::new(&cell_text(row, c, spec.max_cell_width)))
                .collect(),
        ));
    }

    style_header(&table.to_string(), colored)
}

fn key_values(container: &Value, spec: &RenderSpec, colored: bool) -> String {
    let pairs: Vec<(String, String)> = if spec.columns.is_empty() {
        match container {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), truncate(&display_text(v), spec.max_cell_width)))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), truncate(&display_text(v), spec.max_cell_width)))
                .collect(),
            _ => Vec::new(),
        }
    } else {
        spec.columns
            .iter()
            .map(|c| (c.header.clone(), cell_text(container, c, spec.max_cell_width)))
            .collect()
    };

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.set_titles(Row::new(vec![Cell::new("field"), Cell::new("value")]));
    for (k, v) in pairs {
        table.add_row(Row::new(vec![Cell::new(&k), Cell::new(&v)]));
    }
    style_header(&table.to_string(), colored)
}

fn inferred_columns(rows: &[Value]) -> Vec<Column> {
    rows.first()
        .and_then(Value::as_object)
        .map(|first| {
            first
                .iter()
                .filter(|(_, v)| !v.is_object() && !v.is_array())
                .map(|(k, _)| Column {
                    header: k.clone(),
                    field: k.clone(),
                    transform: None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Project, transform, then truncate one cell.
fn cell_text(row: &Value, column: &Column, max_width: usize) -> String {
    let value = lookup(row, &column.field).unwrap_or(&Value::Null);
    let text = match column.transform {
        Some(f) => display_text(&f(value)),
        None => display_text(value),
    };
    truncate(&text, max_width)
}

fn display_text(value: &Value) -> String {
    match value {
        Value::Array(items) if items.iter().all(|i| !i.is_object() && !i.is_array()) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(","),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        scalar => scalar_text(scalar),
    }
}

/// Cut `text` to `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_string();
    }
    if max <= ELLIPSIS.len() {
        return ELLIPSIS.chars().take(max).collect();
    }
    let kept: String = text.chars().take(max - ELLIPSIS.len()).collect();
    format!("{kept}{ELLIPSIS}")
}

fn style_header(rendered: &str, colored: bool) -> String {
    if !colored {
        return rendered.to_string();
    }
    let mut lines = rendered.lines();
    let Some(header) = lines.next() else {
        return String::new();
    };
    let mut out = format!("{}\n", header.cyan().bold());
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}
