//! Structured search filters
//!
//! Equality and range conditions on payload fields. Backends translate a
//! [`SearchFilter`] into their native syntax; [`SearchFilter::matches`] is the
//! reference evaluation used by the in-process backend.

use super::payload::{lookup, Payload, PayloadValue};
use serde::{Deserialize, Serialize};

/// Value compared by an equality condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    Bool(bool),
    Integer(i64),
    Keyword(String),
}

impl MatchValue {
    fn matches(&self, value: &PayloadValue) -> bool {
        match (self, value) {
            (MatchValue::Bool(a), PayloadValue::Bool(b)) => a == b,
            (MatchValue::Integer(a), PayloadValue::Integer(b)) => a == b,
            (MatchValue::Keyword(a), PayloadValue::String(b)) => a == b,
            // list fields match when any element matches
            (_, PayloadValue::List(items)) => items.iter().any(|item| self.matches(item)),
            _ => false,
        }
    }
}

impl From<&str> for MatchValue {
    fn from(s: &str) -> Self {
        MatchValue::Keyword(s.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(s: String) -> Self {
        MatchValue::Keyword(s)
    }
}

impl From<i64> for MatchValue {
    fn from(i: i64) -> Self {
        MatchValue::Integer(i)
    }
}

impl From<i32> for MatchValue {
    fn from(i: i32) -> Self {
        MatchValue::Integer(i64::from(i))
    }
}

impl From<bool> for MatchValue {
    fn from(b: bool) -> Self {
        MatchValue::Bool(b)
    }
}

/// Numeric bounds; unset bounds are open
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl RangeBounds {
    /// Inclusive range `[min, max]`
    pub fn between(min: f64, max: f64) -> Self {
        RangeBounds {
            gte: Some(min),
            lte: Some(max),
            ..Default::default()
        }
    }

    /// Inclusive lower bound
    pub fn at_least(min: f64) -> Self {
        RangeBounds {
            gte: Some(min),
            ..Default::default()
        }
    }

    /// Inclusive upper bound
    pub fn at_most(max: f64) -> Self {
        RangeBounds {
            lte: Some(max),
            ..Default::default()
        }
    }

    fn contains(&self, x: f64) -> bool {
        self.gt.map_or(true, |b| x > b)
            && self.gte.map_or(true, |b| x >= b)
            && self.lt.map_or(true, |b| x < b)
            && self.lte.map_or(true, |b| x <= b)
    }
}

/// A single field condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Field equals value
    Equals { field: String, value: MatchValue },
    /// Field equals any of the values
    AnyOf { field: String, values: Vec<MatchValue> },
    /// Numeric field within bounds
    Range { field: String, bounds: RangeBounds },
}

impl Condition {
    /// Field the condition applies to
    pub fn field(&self) -> &str {
        match self {
            Condition::Equals { field, .. }
            | Condition::AnyOf { field, .. }
            | Condition::Range { field, .. } => field,
        }
    }

    fn matches(&self, payload: &Payload) -> bool {
        let Some(value) = lookup(payload, self.field()) else {
            return false;
        };
        match self {
            Condition::Equals { value: expected, .. } => expected.matches(value),
            Condition::AnyOf { values, .. } => values.iter().any(|v| v.matches(value)),
            Condition::Range { bounds, .. } => value.as_f64().is_some_and(|x| bounds.contains(x)),
        }
    }
}

/// Conjunction of required conditions plus excluded conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// All must hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    /// None may hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Condition>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`
    pub fn equals(mut self, field: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        self.must.push(Condition::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Require `field` to be one of `values`
    pub fn any_of<V: Into<MatchValue>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.must.push(Condition::AnyOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Require `field` within `bounds`
    pub fn range(mut self, field: impl Into<String>, bounds: RangeBounds) -> Self {
        self.must.push(Condition::Range {
            field: field.into(),
            bounds,
        });
        self
    }

    /// Exclude `field == value`
    pub fn not_equals(mut self, field: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        self.must_not.push(Condition::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    /// Evaluate against a payload
    pub fn matches(&self, payload: &Payload) -> bool {
        self.must.iter().all(|c| c.matches(payload))
            && !self.must_not.iter().any(|c| c.matches(payload))
    }
}
