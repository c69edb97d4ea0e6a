//! Condition trees for workflow gating.
//!
//! A condition is a closed expression tree over context field paths. The
//! evaluator is pure and total: it never errors, and a predicate over a
//! missing field is false (fail-closed), so an automation cannot fire
//! because its data was incomplete.

use crate::context::{ExecutionContext, value_text};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// The closed set of predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Case-insensitive textual equality.
    Equals,
    /// Negation of `Equals`.
    NotEquals,
    /// Substring test on strings, membership test on sequences.
    Contains,
    /// Numeric comparison when both sides parse as numbers, else lexical.
    GreaterThan,
    /// Numeric comparison when both sides parse as numbers, else lexical.
    LessThan,
    /// True when the field path resolves to any value.
    Exists,
}

/// A node in a condition expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// All children must hold. Short-circuits on the first false child.
    All { children: Vec<Condition> },
    /// At least one child must hold. Short-circuits on the first true child.
    Any { children: Vec<Condition> },
    /// A single comparison against a context field.
    Predicate {
        field: String,
        op: Operator,
        #[serde(default)]
        value: JsonValue,
    },
}

impl Condition {
    /// Evaluates this node against a context.
    ///
    /// Deterministic and side-effect free: repeated calls with the same tree
    /// and context always return the same boolean.
    #[must_use]
    pub fn matches(&self, context: &ExecutionContext) -> bool {
        match self {
            Self::All { children } => children.iter().all(|c| c.matches(context)),
            Self::Any { children } => children.iter().any(|c| c.matches(context)),
            Self::Predicate { field, op, value } => {
                evaluate_predicate(field, *op, value, context)
            }
        }
    }

    /// Validates the tree structure.
    ///
    /// # Errors
    ///
    /// Returns an error if an `all`/`any` branch has no children.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::All { children } => {
                if children.is_empty() {
                    return Err(ValidationError::EmptyConditionBranch { combinator: "all" });
                }
                children.iter().try_for_each(Condition::validate)
            }
            Self::Any { children } => {
                if children.is_empty() {
                    return Err(ValidationError::EmptyConditionBranch { combinator: "any" });
                }
                children.iter().try_for_each(Condition::validate)
            }
            Self::Predicate { .. } => Ok(()),
        }
    }
}

/// Evaluates an optional condition tree.
///
/// A workflow without a condition is unconditional: `None` evaluates to true.
#[must_use]
pub fn evaluate(condition: Option<&Condition>, context: &ExecutionContext) -> bool {
    condition.is_none_or(|c| c.matches(context))
}

fn evaluate_predicate(
    field: &str,
    op: Operator,
    expected: &JsonValue,
    context: &ExecutionContext,
) -> bool {
    let actual = context.lookup(field);

    if op == Operator::Exists {
        return actual.is_some();
    }

    // Fail-closed: any comparison against a missing field is false.
    let Some(actual) = actual else {
        return false;
    };

    match op {
        Operator::Equals => text_eq(actual, expected),
        Operator::NotEquals => !text_eq(actual, expected),
        Operator::Contains => contains(actual, expected),
        Operator::GreaterThan => compare(actual, expected) == Some(Ordering::Greater),
        Operator::LessThan => compare(actual, expected) == Some(Ordering::Less),
        Operator::Exists => true,
    }
}

fn text_eq(a: &JsonValue, b: &JsonValue) -> bool {
    value_text(a).to_lowercase() == value_text(b).to_lowercase()
}

fn contains(actual: &JsonValue, expected: &JsonValue) -> bool {
    match actual {
        JsonValue::String(s) => s
            .to_lowercase()
            .contains(&value_text(expected).to_lowercase()),
        JsonValue::Array(items) => items.iter().any(|item| text_eq(item, expected)),
        _ => false,
    }
}

fn as_number(value: &JsonValue) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn compare(actual: &JsonValue, expected: &JsonValue) -> Option<Ordering> {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(value_text(actual).cmp(&value_text(expected))),
    }
}
