//! Parameter trees: set-params request parsing and dump conversion.
//!
//! A set-params request is a JSON object mapping node name to a nested
//! parameter object. Nested objects are flattened into `a/b/c` keys; any
//! non-object value ends the descent. Keys keep their JSON order so the
//! queue applies them in the order the client wrote them.

use std::fmt;

use serde_json::{Map, Value};

/// A leaf parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Arrays and nulls have no scalar form; they are passed through as JSON.
    Json(String),
}

impl ParamValue {
    fn from_leaf(value: &Value) -> Self {
        match value {
            Value::Bool(b) => ParamValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ParamValue::Text(s.clone()),
            Value::Null | Value::Array(_) => ParamValue::Json(value.to_string()),
            // Objects never reach a leaf; flatten() recurses into them.
            Value::Object(_) => ParamValue::Json(value.to_string()),
        }
    }

    /// The value as a command-line argument.
    pub fn as_arg(&self) -> String {
        match self {
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => s.clone(),
            ParamValue::Json(j) => j.clone(),
        }
    }
}

/// JSON-style rendering, used in status lines (`"fast"`, `0.5`, `true`).
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => write!(f, "{}", Value::String(s.clone())),
            other => f.write_str(&other.as_arg()),
        }
    }
}

/// One queued parameter change against one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamCommand {
    pub node: String,
    pub param_name: String,
    pub param_val: ParamValue,
}

impl ParamCommand {
    /// Human-readable description, used in diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "Setting node {} parameter {} to {}",
            self.node, self.param_name, self.param_val
        )
    }
}

/// What a set-params text turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamRequest {
    /// Parameter changes in arrival order.
    Apply(Vec<ParamCommand>),
    /// Not a JSON object at all; forwarded to clients verbatim.
    Diagnostic(String),
    /// Looked like JSON but failed to parse. The message is client-facing.
    Invalid(String),
}

impl ParamRequest {
    pub fn parse(text: &str) -> Self {
        if !text.starts_with('{') {
            return ParamRequest::Diagnostic(text.to_string());
        }
        let root: Map<String, Value> = match serde_json::from_str(text) {
            Ok(map) => map,
            Err(e) => return ParamRequest::Invalid(format!("{text} is invalid JSON: {e}")),
        };

        let mut commands = Vec::new();
        for (node, tree) in &root {
            let mut flat = Vec::new();
            if let Value::Object(obj) = tree {
                flatten(obj, "", &mut flat);
            }
            commands.extend(flat.into_iter().map(|(param_name, param_val)| ParamCommand {
                node: node.clone(),
                param_name,
                param_val,
            }));
        }
        ParamRequest::Apply(commands)
    }
}

/// Depth-first flattening of a parameter object into `path/segments` keys.
pub fn flatten(obj: &Map<String, Value>, prefix: &str, out: &mut Vec<(String, ParamValue)>) {
    for (key, value) in obj {
        let path = format!("{prefix}{key}");
        match value {
            Value::Object(child) => flatten(child, &format!("{path}/"), out),
            leaf => out.push((path, ParamValue::from_leaf(leaf))),
        }
    }
}

/// Convert one node's `dynparam get` output (a Python dict literal) to JSON
/// and drop the `groups` entry, which only describes UI layout.
pub fn parse_dynparam_dump(text: &str) -> Result<Value, serde_json::Error> {
    let swapped = text
        .replace('\'', "\"")
        .replace("True", "true")
        .replace("False", "false");
    let mut value: Value = serde_json::from_str(swapped.trim())?;
    if let Value::Object(map) = &mut value {
        map.remove("groups");
    }
    Ok(value)
}
