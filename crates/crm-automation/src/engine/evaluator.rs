//! Condition evaluation.
//!
//! Shared by the `condition` step and the approval-rule matcher. Clauses are
//! combined with AND only; there is no OR or grouping.
//!
//! Semantics:
//! - dotted paths resolve key by key (numeric segments index arrays); a
//!   missing intermediate yields `None` ("undefined")
//! - every operator except `equals`/`notEquals` is false on undefined
//! - `equals` treats undefined like JSON null and compares loosely, so
//!   `"500"` equals `500`
//! - numeric comparisons coerce both sides; anything non-numeric is false
//! - `contains` is a case-insensitive substring test on string-coerced values
//! - `in` requires an array operand

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    Exists,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::Contains => "contains",
            Operator::GreaterThan => "greaterThan",
            Operator::LessThan => "lessThan",
            Operator::Exists => "exists",
            Operator::In => "in",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Operator::Equals),
            "notEquals" => Ok(Operator::NotEquals),
            "contains" => Ok(Operator::Contains),
            "greaterThan" => Ok(Operator::GreaterThan),
            "lessThan" => Ok(Operator::LessThan),
            "exists" => Ok(Operator::Exists),
            "in" => Ok(Operator::In),
            other => Err(AppError::Validation(format!("Unknown operator: {}", other))),
        }
    }
}

/// One `field operator value` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

/// Resolve a dotted path inside a JSON value.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }

    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Stateless clause evaluator.
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Apply `operator` to a resolved value.
    pub fn compare(&self, operator: Operator, actual: Option<&Value>, expected: &Value) -> bool {
        match operator {
            Operator::Equals => loose_equals(actual.unwrap_or(&Value::Null), expected),
            Operator::NotEquals => !loose_equals(actual.unwrap_or(&Value::Null), expected),
            Operator::Exists => matches!(actual, Some(v) if !v.is_null()),
            Operator::Contains => match actual {
                Some(actual) => coerce_string(actual)
                    .to_lowercase()
                    .contains(&coerce_string(expected).to_lowercase()),
                None => false,
            },
            Operator::GreaterThan => compare_numeric(actual, expected, |a, b| a > b),
            Operator::LessThan => compare_numeric(actual, expected, |a, b| a < b),
            Operator::In => match (actual, expected) {
                (Some(actual), Value::Array(items)) => {
                    items.iter().any(|item| loose_equals(actual, item))
                }
                _ => false,
            },
        }
    }

    /// Evaluate one clause against `subject`.
    pub fn evaluate_clause(&self, clause: &Clause, subject: &Value) -> bool {
        let actual = lookup_path(subject, &clause.field);
        self.compare(clause.operator, actual, &clause.value)
    }

    /// True when every clause holds. An empty list holds.
    pub fn evaluate_all(&self, clauses: &[Clause], subject: &Value) -> bool {
        clauses.iter().all(|c| self.evaluate_clause(c, subject))
    }
}

fn loose_equals(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            match (s.trim().parse::<f64>(), n.as_f64()) {
                (Ok(parsed), Some(number)) => parsed == number,
                _ => false,
            }
        }
        (Value::String(s), Value::Bool(flag)) | (Value::Bool(flag), Value::String(s)) => {
            s.trim() == flag.to_string()
        }
        _ => false,
    }
}

/// Strings are used raw; everything else as its JSON text.
pub(crate) fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn compare_numeric<F>(actual: Option<&Value>, expected: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (actual.and_then(coerce_number), coerce_number(expected)) {
        (Some(a), Some(b)) if !a.is_nan() && !b.is_nan() => cmp(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clause(field: &str, operator: Operator, value: Value) -> Clause {
        Clause {
            field: field.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn test_lookup_path() {
        let doc = json!({"deal": {"contacts": [{"email": "a@b.c"}]}});
        assert_eq!(lookup_path(&doc, "deal.contacts.0.email"), Some(&json!("a@b.c")));
        assert!(lookup_path(&doc, "deal.owner.name").is_none());
        assert!(lookup_path(&doc, "deal.contacts.x").is_none());
    }

    #[test]
    fn test_equals_is_loose() {
        let evaluator = ConditionEvaluator::new();
        assert!(evaluator.compare(Operator::Equals, Some(&json!("500")), &json!(500)));
        assert!(evaluator.compare(Operator::Equals, Some(&json!(1.0)), &json!(1)));
        assert!(evaluator.compare(Operator::Equals, None, &Value::Null));
        assert!(!evaluator.compare(Operator::Equals, Some(&json!("won")), &json!("lost")));
        assert!(evaluator.compare(Operator::NotEquals, None, &json!("x")));
    }

    #[test]
    fn test_undefined_is_false_for_other_operators() {
        let evaluator = ConditionEvaluator::new();
        for op in [
            Operator::Contains,
            Operator::GreaterThan,
            Operator::LessThan,
            Operator::Exists,
            Operator::In,
        ] {
            assert!(!evaluator.compare(op, None, &json!([1])), "{} on undefined", op);
        }
    }

    #[test]
    fn test_numeric_coercion() {
        let evaluator = ConditionEvaluator::new();
        assert!(evaluator.compare(Operator::GreaterThan, Some(&json!("1500")), &json!(1000)));
        assert!(!evaluator.compare(Operator::GreaterThan, Some(&json!(500)), &json!(1000)));
        assert!(evaluator.compare(Operator::LessThan, Some(&json!(500)), &json!("1000")));
        assert!(!evaluator.compare(Operator::LessThan, Some(&json!("abc")), &json!(1000)));
    }

    #[test]
    fn test_contains_case_insensitive() {
        let evaluator = ConditionEvaluator::new();
        assert!(evaluator.compare(Operator::Contains, Some(&json!("Need PRICING info")), &json!("pricing")));
        assert!(evaluator.compare(Operator::Contains, Some(&json!(12345)), &json!("234")));
        assert!(!evaluator.compare(Operator::Contains, Some(&json!("hello")), &json!("bye")));
    }

    #[test]
    fn test_in_requires_array() {
        let evaluator = ConditionEvaluator::new();
        assert!(evaluator.compare(Operator::In, Some(&json!("vip")), &json!(["vip", "lead"])));
        assert!(!evaluator.compare(Operator::In, Some(&json!("vip")), &json!("vip")));
    }

    #[test]
    fn test_evaluate_all_is_and() {
        let evaluator = ConditionEvaluator::new();
        let subject = json!({"amount": 5000, "stage": "negotiation"});
        let clauses = vec![
            clause("amount", Operator::GreaterThan, json!(1000)),
            clause("stage", Operator::Equals, json!("negotiation")),
        ];
        assert!(evaluator.evaluate_all(&clauses, &subject));

        let clauses = vec![
            clause("amount", Operator::GreaterThan, json!(1000)),
            clause("stage", Operator::Equals, json!("closed")),
        ];
        assert!(!evaluator.evaluate_all(&clauses, &subject));
        assert!(evaluator.evaluate_all(&[], &subject));
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!("greaterThan".parse::<Operator>().unwrap(), Operator::GreaterThan);
        assert!("between".parse::<Operator>().is_err());
    }
}
