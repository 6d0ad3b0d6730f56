//! Value to text rendering.
//!
//! Readable mode produces text the reader can parse back (strings are quoted
//! and escaped); display mode emits strings verbatim, as `str` and `println`
//! need.

use std::fmt::{self, Write};

use crate::ast::Value;

/// Render a value. `readable` selects escaped, round-trippable strings.
pub fn render(value: &Value, readable: bool) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_value(&mut out, value, readable);
    out
}

/// Render each value and join the results with `separator`
pub fn render_joined(values: &[Value], readable: bool, separator: &str) -> String {
    values
        .iter()
        .map(|v| render(v, readable))
        .collect::<Vec<_>>()
        .join(separator)
}

fn write_value<W: Write>(out: &mut W, value: &Value, readable: bool) -> fmt::Result {
    match value {
        Value::Nil => write!(out, "nil"),
        Value::Bool(b) => write!(out, "{b}"),
        Value::Number(n) => write!(out, "{n}"),
        Value::Symbol(s) => write!(out, "{s}"),
        Value::String(s) if readable => write_escaped(out, s),
        Value::String(s) => write!(out, "{s}"),
        Value::List(items) => write_seq(out, items, readable, '(', ')'),
        Value::Vector(items) => write_seq(out, items, readable, '[', ']'),
        Value::Map(items) => write_seq(out, items, readable, '{', '}'),
        Value::Atom(cell) => {
            write!(out, "(atom ")?;
            write_value(out, &cell.borrow(), readable)?;
            write!(out, ")")
        }
        Value::Function(closure) if closure.is_macro => write!(out, "#<macro>"),
        Value::Function(_) => write!(out, "#<function>"),
        Value::BuiltinFunction { id, .. } => write!(out, "#<builtin-function:{id}>"),
    }
}

fn write_seq<W: Write>(
    out: &mut W,
    items: &[Value],
    readable: bool,
    open: char,
    close: char,
) -> fmt::Result {
    out.write_char(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.write_char(' ')?;
        }
        write_value(out, item, readable)?;
    }
    out.write_char(close)
}

fn write_escaped<W: Write>(out: &mut W, s: &str) -> fmt::Result {
    out.write_char('"')?;
    for ch in s.chars() {
        match ch {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, true)
    }
}
