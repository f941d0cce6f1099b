//! Predicate evaluation shared by device-state triggers and `logic.if`.
//!
//! Comparison is numeric whenever both sides coerce to numbers (JSON numbers
//! or numeric strings); otherwise only `eq`/`neq` apply, using loose string
//! comparison.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Comparison operator for trigger predicates and `logic.if` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// Equal (numeric or loose string).
    #[default]
    Eq,
    /// Not equal (numeric or loose string).
    Neq,
    /// Greater than (numeric only).
    Gt,
    /// Greater than or equal (numeric only).
    Gte,
    /// Less than (numeric only).
    Lt,
    /// Less than or equal (numeric only).
    Lte,
    /// The target exists. Device-state triggers read this as key presence;
    /// `logic.if` conditions require the path to resolve to a non-null
    /// value.
    Exists,
}

/// Resolves a dot-delimited path through nested JSON objects.
///
/// An empty path resolves to the root. A path segment that does not land on
/// an object member resolves to `None`.
#[must_use]
pub fn resolve_path<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Evaluates `op` against an optional actual value and an expected value.
///
/// `actual` is `None` when the key or path did not resolve. `exists` here
/// follows the condition-path rule: truthy iff the value resolved and is
/// non-null. Device-state triggers answer their presence-only `exists`
/// before delegating to this function.
#[must_use]
pub fn matches(op: CompareOp, actual: Option<&JsonValue>, expected: &JsonValue) -> bool {
    if op == CompareOp::Exists {
        return actual.is_some_and(|v| !v.is_null());
    }

    let Some(actual) = actual else {
        return false;
    };

    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return match op {
            CompareOp::Eq => a == b,
            CompareOp::Neq => a != b,
            CompareOp::Gt => a > b,
            CompareOp::Gte => a >= b,
            CompareOp::Lt => a < b,
            CompareOp::Lte => a <= b,
            CompareOp::Exists => unreachable!(),
        };
    }

    // Non-numeric operands support loose string comparison only.
    match op {
        CompareOp::Eq => loose_string(actual) == loose_string(expected),
        CompareOp::Neq => loose_string(actual) != loose_string(expected),
        _ => false,
    }
}

/// Coerces a JSON value to a number: JSON numbers directly, strings via parse.
fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Renders a JSON value as a bare string for loose equality.
fn loose_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_path_resolves_to_root() {
        let root = json!({"a": 1});
        assert_eq!(resolve_path(&root, ""), Some(&root));
    }

    #[test]
    fn nested_path_resolution() {
        let root = json!({"state": {"motion": true, "lux": 40}});
        assert_eq!(resolve_path(&root, "state.motion"), Some(&json!(true)));
        assert_eq!(resolve_path(&root, "state.lux"), Some(&json!(40)));
        assert_eq!(resolve_path(&root, "state.missing"), None);
        assert_eq!(resolve_path(&root, "state.lux.deeper"), None);
    }

    #[test]
    fn numeric_comparison_when_both_sides_coerce() {
        assert!(matches(CompareOp::Gt, Some(&json!(21.5)), &json!(20)));
        assert!(matches(CompareOp::Lte, Some(&json!("7")), &json!(7)));
        assert!(matches(CompareOp::Eq, Some(&json!(3)), &json!("3")));
        assert!(!matches(CompareOp::Gte, Some(&json!(1)), &json!(2)));
    }

    #[test]
    fn loose_string_equality_for_non_numeric() {
        assert!(matches(CompareOp::Eq, Some(&json!(true)), &json!(true)));
        assert!(matches(CompareOp::Eq, Some(&json!("on")), &json!("on")));
        assert!(matches(CompareOp::Neq, Some(&json!("on")), &json!("off")));
        // Booleans compare loosely against their string rendering.
        assert!(matches(CompareOp::Eq, Some(&json!(true)), &json!("true")));
    }

    #[test]
    fn ordering_ops_never_match_non_numeric() {
        assert!(!matches(CompareOp::Gt, Some(&json!("on")), &json!("off")));
        assert!(!matches(CompareOp::Lt, Some(&json!(true)), &json!(false)));
    }

    #[test]
    fn absent_value_never_matches_value_ops() {
        assert!(!matches(CompareOp::Eq, None, &json!(1)));
        assert!(!matches(CompareOp::Neq, None, &json!(1)));
    }

    #[test]
    fn exists_on_condition_paths_requires_non_null() {
        assert!(matches(CompareOp::Exists, Some(&json!(0)), &JsonValue::Null));
        assert!(!matches(CompareOp::Exists, Some(&JsonValue::Null), &JsonValue::Null));
        assert!(!matches(CompareOp::Exists, None, &JsonValue::Null));
    }

    #[test]
    fn compare_op_serde_names() {
        assert_eq!(serde_json::to_string(&CompareOp::Gte).unwrap(), "\"gte\"");
        let op: CompareOp = serde_json::from_str("\"neq\"").unwrap();
        assert_eq!(op, CompareOp::Neq);
    }
}
