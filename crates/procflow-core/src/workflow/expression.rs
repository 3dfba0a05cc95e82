//! JEXL conditions for `branch` and `validate_rule` steps.
//!
//! The run context is handed to the evaluator as data. Context values are
//! never spliced into the expression text, so a value such as
//! `"1 == 1"` stays a string.
//!
//! Transforms available to expressions:
//!
//! | transform          | result                                            |
//! |--------------------|---------------------------------------------------|
//! | `lower`, `upper`, `trim` | string case / whitespace                    |
//! | `contains(s)`, `startsWith(s)`, `endsWith(s)` | substring tests        |
//! | `length`           | chars of a string, items of an array or object    |
//! | `number`           | numeric value of `"1,200.50"`-style strings       |
//! | `empty`            | null, `""`, `[]` or `{}`                          |
//! | `default(x)`       | `x` when the subject is null                      |

use procflow_types::workflow::RunContext;
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("cannot evaluate '{expression}': {reason}")]
    Eval { expression: String, reason: String },
}

/// Evaluates conditions against a run context.
pub struct ConditionEvaluator {
    inner: jexl_eval::Evaluator<'static>,
}

fn str_arg(args: &[Value], index: usize) -> &str {
    args.get(index).and_then(Value::as_str).unwrap_or("")
}

/// Parse numbers the way they show up in extracted documents: thousands
/// separators, currency symbols and surrounding whitespace are ignored.
fn parse_number(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
                .collect();
            cleaned
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

/// JavaScript-style truthiness of an expression result.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        let inner = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| Ok(json!(str_arg(args, 0).to_lowercase())))
            .with_transform("upper", |args: &[Value]| Ok(json!(str_arg(args, 0).to_uppercase())))
            .with_transform("trim", |args: &[Value]| Ok(json!(str_arg(args, 0).trim())))
            .with_transform("contains", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).contains(str_arg(args, 1))))
            })
            .with_transform("startsWith", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).starts_with(str_arg(args, 1))))
            })
            .with_transform("endsWith", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).ends_with(str_arg(args, 1))))
            })
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("number", |args: &[Value]| {
                Ok(args.first().map(parse_number).unwrap_or(Value::Null))
            })
            .with_transform("empty", |args: &[Value]| {
                Ok(json!(args.first().is_none_or(is_empty)))
            })
            .with_transform("default", |args: &[Value]| {
                Ok(match args.first() {
                    Some(Value::Null) | None => args.get(1).cloned().unwrap_or(Value::Null),
                    Some(v) => v.clone(),
                })
            });

        Self { inner }
    }

    /// Evaluate `expression` and return the raw result.
    pub fn eval(&self, expression: &str, context: &RunContext) -> Result<Value, ExpressionError> {
        self.inner
            .eval_in_context(expression, context)
            .map_err(|e| ExpressionError::Eval {
                expression: expression.to_string(),
                reason: e.to_string(),
            })
    }

    /// Whether `expression` holds for the run.
    pub fn check(&self, expression: &str, context: &RunContext) -> Result<bool, ExpressionError> {
        self.eval(expression, context).map(|v| truthy(&v))
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(value: Value) -> RunContext {
        match value {
            Value::Object(map) => map,
            _ => panic!("test context must be an object"),
        }
    }

    fn check(expression: &str, context: Value) -> bool {
        ConditionEvaluator::new()
            .check(expression, &ctx(context))
            .unwrap()
    }

    #[test]
    fn nested_paths_and_comparisons() {
        let data = json!({ "candidate": { "years": 7.5, "profile": { "name": "Alice" } } });
        assert!(check("candidate.years > 5", data.clone()));
        assert!(check("candidate.profile.name == 'Alice' && candidate.years < 10", data));
    }

    #[test]
    fn missing_values_are_falsy() {
        let evaluator = ConditionEvaluator::new();
        let context = ctx(json!({ "invoice": {} }));
        assert_eq!(evaluator.eval("invoice.total", &context).unwrap(), Value::Null);
        assert!(!evaluator.check("invoice.total", &context).unwrap());
    }

    #[test]
    fn string_transforms() {
        let data = json!({ "file": " Report.PDF ", "status": "critical error" });
        assert!(check("file|trim|lower|endsWith('.pdf')", data.clone()));
        assert!(check("status|contains('error')", data.clone()));
        assert!(!check("status|startsWith('minor')", data));
    }

    #[test]
    fn number_parses_formatted_amounts() {
        let data = json!({ "invoice": { "total": "$1,200.50" } });
        assert!(check("(invoice.total|number) > 1000", data));

        let evaluator = ConditionEvaluator::new();
        let garbage = ctx(json!({ "total": "n/a" }));
        assert_eq!(evaluator.eval("total|number", &garbage).unwrap(), Value::Null);
    }

    #[test]
    fn empty_and_default() {
        let data = json!({ "notes": "", "tags": ["a"], "region": null });
        assert!(check("notes|empty", data.clone()));
        assert!(!check("tags|empty", data.clone()));
        assert!(check("(region|default('EU')) == 'EU'", data));
    }

    #[test]
    fn length_counts_items() {
        assert!(check("(items|length) == 3", json!({ "items": [1, 2, 3] })));
    }

    #[test]
    fn context_values_are_not_evaluated() {
        assert!(!check("payload == true", json!({ "payload": "1 == 1" })));
    }

    #[test]
    fn syntax_error_names_expression() {
        let err = ConditionEvaluator::new()
            .check("a ==", &RunContext::new())
            .unwrap_err();
        assert!(err.to_string().contains("'a =='"));
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!("no")));
    }
}
