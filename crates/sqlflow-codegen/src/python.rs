//! Python literal rendering

use sqlflow_ir::{CredentialField, SessionConfig, Value};
use std::fmt::Write as _;

/// Render a `WITH` value as a Python literal
pub fn literal(value: &Value) -> String {
    match value {
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => float(*f),
        Value::String(s) => string(s),
        Value::List(items) => list(items.iter().map(literal)),
    }
}

pub fn float(f: f64) -> String {
    if f.is_finite() {
        format!("{f:?}")
    } else if f.is_nan() {
        "float(\"nan\")".to_string()
    } else if f > 0.0 {
        "float(\"inf\")".to_string()
    } else {
        "float(\"-inf\")".to_string()
    }
}

/// Double-quoted Python string literal
pub fn string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items: Vec<S> = items.into_iter().collect();
    let parts: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
    format!("[{}]", parts.join(", "))
}

/// `{"key": value, ...}` with already-rendered values, in iteration order
pub fn dict<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let parts: Vec<String> = entries
        .into_iter()
        .map(|(key, value)| format!("{}: {}", string(key), value))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn credential_kwarg(field: CredentialField) -> &'static str {
    match field {
        CredentialField::StorageLocation => "hive_location",
        CredentialField::NamenodeAddr => "hdfs_namenode_addr",
        CredentialField::User => "hdfs_user",
        CredentialField::Password => "hdfs_pass",
    }
}

/// Keyword arguments for every credential the session carries
pub fn credential_kwargs(session: &SessionConfig) -> Vec<(&'static str, String)> {
    session
        .credentials
        .present()
        .into_iter()
        .map(|(field, value)| (credential_kwarg(field), string(value)))
        .collect()
}
