//! Output formatting helpers for human-readable and JSON output.

use positioning::{Scope, Value};

/// Render rows as aligned columns under a header line.
///
/// `headers` and each row in `rows` must have the same length.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = line(headers.to_vec());
    for row in rows {
        out.push('\n');
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }
    println!("{}", render_table(headers, rows));
}

/// A scope as a JSON object of its components.
pub fn scope_json(scope: &Scope) -> serde_json::Value {
    scope
        .components()
        .iter()
        .map(|(column, value)| {
            let value = match value {
                Value::Null => serde_json::Value::Null,
                Value::Bool(b) => (*b).into(),
                Value::Int(i) => (*i).into(),
                Value::Text(s) => s.clone().into(),
            };
            (column.clone(), value)
        })
        .collect::<serde_json::Map<_, _>>()
        .into()
}

pub fn optional(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
