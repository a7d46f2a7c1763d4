//! Opaque predicate expressions.
//!
//! Predicate fields carry a nested expression tree produced by the external
//! expression language. This crate does not evaluate or interpret the tree;
//! it only checks that the stored value is an object and carries it through
//! flatten/assemble round trips unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed-but-uninterpreted expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression(Value);

impl Expression {
    /// Wraps a JSON expression tree, rejecting anything that is not an
    /// object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(_) => Some(Self(value)),
            _ => None,
        }
    }

    /// Returns the underlying tree for storage.
    #[must_use]
    pub fn to_value(&self) -> Value {
        self.0.clone()
    }

    /// Borrows the underlying tree.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}
