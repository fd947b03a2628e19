//! Loose validation of dynamic expressions.
//!
//! An expression is JSON: either a literal, or an array whose first element
//! names a function and whose remaining elements are its arguments. Nesting
//! is unlimited. Only the shape and the function names are checked here; the
//! types of arguments are left to the app that evaluates them.

use serde_json::Value;

/// Functions the expression language knows about.
pub const FUNCTIONS: &[&str] = &[
    "equals",
    "notEquals",
    "greaterThan",
    "lessThan",
    "greaterThanEq",
    "lessThanEq",
    "concat",
    "and",
    "or",
    "not",
    "if",
    "contains",
    "notContains",
    "commaContains",
    "startsWith",
    "endsWith",
    "lowerCase",
    "upperCase",
    "stringLength",
    "text",
    "language",
    "displayValue",
    "round",
    "instanceContext",
    "frontendSettings",
    "dataModel",
    "component",
];

/// Parse `text` and check that it is a well-formed expression.
pub fn parse(text: &str) -> Result<Value, String> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| format!("not valid JSON: {}", e))?;
    validate(&value)?;
    Ok(value)
}

pub fn validate(value: &Value) -> Result<(), String> {
    match value {
        Value::Object(_) => Err("objects are not valid expressions".to_string()),
        Value::Array(items) => validate_call(items),
        _ => Ok(()),
    }
}

fn validate_call(items: &[Value]) -> Result<(), String> {
    let Some((head, args)) = items.split_first() else {
        return Err("empty array is not a function call".to_string());
    };
    let Some(name) = head.as_str() else {
        return Err(format!("function name must be a string, got {}", head));
    };
    if !FUNCTIONS.contains(&name) {
        return Err(format!("unknown function '{}'", name));
    }

    match name {
        "dataModel" | "component" | "instanceContext" | "frontendSettings" | "text"
        | "displayValue" => {
            if args.is_empty() {
                return Err(format!("'{}' needs an argument", name));
            }
        }
        "not" => {
            if args.len() != 1 {
                return Err("'not' takes exactly one argument".to_string());
            }
        }
        "if" => match args.len() {
            2 => {}
            4 => {
                if args[2].as_str() != Some("else") {
                    return Err("third argument of a 4-argument 'if' must be \"else\"".to_string());
                }
            }
            n => return Err(format!("'if' takes 2 or 4 arguments, got {}", n)),
        },
        _ => {}
    }

    args.iter().try_for_each(validate)
}

/// Every path referenced through `["dataModel", "<path>"]`, in order of appearance.
pub fn data_model_paths(value: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(value, &mut paths);
    paths
}

fn collect_paths(value: &Value, paths: &mut Vec<String>) {
    let Value::Array(items) = value else {
        return;
    };
    if items.first().and_then(Value::as_str) == Some("dataModel") {
        if let Some(path) = items.get(1).and_then(Value::as_str) {
            paths.push(path.to_string());
        }
    }
    for item in items.iter().skip(1) {
        collect_paths(item, paths);
    }
}
