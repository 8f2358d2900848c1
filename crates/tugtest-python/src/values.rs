//! Values crossing the oracle boundary.
//!
//! Arguments travel from literal text to typed [`ArgValue`]s sent to the
//! worker; results come back as structured [`PyValue`]s which render to
//! Python literal text for embedding in generated assertions.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

// ============================================================================
// Arguments
// ============================================================================

/// Inferred type of a synthesized argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Float,
    String,
}

/// An argument value as sent to the worker.
///
/// Numbers travel as text so arbitrarily large integers and exact float
/// spellings survive the JSON hop; the worker converts with `int()`/`float()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgValue {
    Int { text: String },
    Float { text: String },
    Str { value: String },
}

impl ArgValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ArgValue::Int { .. } => ValueType::Integer,
            ArgValue::Float { .. } => ValueType::Float,
            ArgValue::Str { .. } => ValueType::String,
        }
    }
}

/// Convert literal text to an argument value.
///
/// Digit-only text is an integer; text that is digit-only after dropping a
/// single `.` is a float; anything else is a string, with one layer of
/// double quotes removed when present.
pub fn coerce_literal(text: &str) -> ArgValue {
    if is_digits(text) {
        return ArgValue::Int {
            text: text.to_string(),
        };
    }
    if is_digits(&text.replacen('.', "", 1)) {
        return ArgValue::Float {
            text: text.to_string(),
        };
    }
    let value = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text);
    ArgValue::Str {
        value: value.to_string(),
    }
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

// ============================================================================
// Results
// ============================================================================

/// A Python value returned by the oracle.
///
/// Builtin containers and scalars are carried structurally. Values whose
/// `repr` evaluates back as a literal arrive as [`PyValue::Literal`]; anything
/// else is [`PyValue::Opaque`] and only its type name is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PyValue {
    None,
    Bool { value: bool },
    Int { repr: String },
    Float { repr: String },
    Str { value: String },
    List { items: Vec<PyValue> },
    Tuple { items: Vec<PyValue> },
    Set { items: Vec<PyValue> },
    Frozenset { items: Vec<PyValue> },
    Dict { entries: Vec<(PyValue, PyValue)> },
    Literal { type_name: String, repr: String },
    Opaque { type_name: String },
}

impl PyValue {
    /// Render as Python source text, or `None` when the value (or anything
    /// nested in it) is opaque.
    pub fn to_literal(&self) -> Option<String> {
        let mut out = String::new();
        self.write_literal(&mut out).then_some(out)
    }

    /// Python type name of the value.
    pub fn type_name(&self) -> &str {
        match self {
            PyValue::None => "NoneType",
            PyValue::Bool { .. } => "bool",
            PyValue::Int { .. } => "int",
            PyValue::Float { .. } => "float",
            PyValue::Str { .. } => "str",
            PyValue::List { .. } => "list",
            PyValue::Tuple { .. } => "tuple",
            PyValue::Set { .. } => "set",
            PyValue::Frozenset { .. } => "frozenset",
            PyValue::Dict { .. } => "dict",
            PyValue::Literal { type_name, .. } | PyValue::Opaque { type_name } => type_name,
        }
    }

    fn write_literal(&self, out: &mut String) -> bool {
        match self {
            PyValue::None => out.push_str("None"),
            PyValue::Bool { value } => out.push_str(if *value { "True" } else { "False" }),
            PyValue::Int { repr } => out.push_str(repr),
            PyValue::Float { repr } => match repr.as_str() {
                "inf" | "-inf" | "nan" => {
                    let _ = write!(out, "float(\"{}\")", repr);
                }
                _ => out.push_str(repr),
            },
            PyValue::Str { value } => out.push_str(&python_string_literal(value)),
            PyValue::List { items } => {
                out.push('[');
                if !write_items(items, out) {
                    return false;
                }
                out.push(']');
            }
            PyValue::Tuple { items } => {
                out.push('(');
                if !write_items(items, out) {
                    return false;
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            PyValue::Set { items } if items.is_empty() => out.push_str("set()"),
            PyValue::Set { items } => {
                out.push('{');
                if !write_items(items, out) {
                    return false;
                }
                out.push('}');
            }
            PyValue::Frozenset { items } if items.is_empty() => out.push_str("frozenset()"),
            PyValue::Frozenset { items } => {
                out.push_str("frozenset({");
                if !write_items(items, out) {
                    return false;
                }
                out.push_str("})");
            }
            PyValue::Dict { entries } => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if !key.write_literal(out) {
                        return false;
                    }
                    out.push_str(": ");
                    if !value.write_literal(out) {
                        return false;
                    }
                }
                out.push('}');
            }
            PyValue::Literal { repr, .. } => out.push_str(repr),
            PyValue::Opaque { .. } => return false,
        }
        true
    }
}

fn write_items(items: &[PyValue], out: &mut String) -> bool {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if !item.write_literal(out) {
            return false;
        }
    }
    true
}

/// Render `value` as a double-quoted Python string literal.
pub fn python_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\x7f' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ============================================================================
// Tests
// ============================================================================
