//! Stage trait and the builtin kind catalog.
//!
//! A stage is one typed processing unit in a pipeline. Kinds are open-ended:
//! the trait carries everything the assembler and serializer need, so new
//! kinds plug in through the registry without touching either algorithm.
//!
//! Chaining legality is capability-keyed: a chained kind may attach to a
//! producer only if the producer lists that kind's tag among its chain
//! capabilities. This replaces runtime-type downcasts on the parent.

use crate::expr::Expression;
use crate::record::AttributeRecord;
use serde_json::Value;
use std::any::Any;
use std::fmt::Debug;
use std::time::Duration;

/// Trait for constructed pipeline stages.
///
/// Stages are immutable once built and safe to share across threads.
pub trait Stage: Debug + Send + Sync {
    /// The discriminator tag identifying this kind.
    fn type_of(&self) -> &'static str;

    /// Whether a chained kind with the given tag may attach to this stage.
    fn supports_chain(&self, type_of: &str) -> bool;

    /// Writes this stage's own fields into a record. The serializer adds
    /// the reserved type and id keys; implementations must not.
    fn export_fields(&self, record: &mut AttributeRecord);

    /// Downcasting support for callers that need the concrete kind.
    fn as_any(&self) -> &dyn Any;
}

/// Every chained tag in the builtin catalog.
const CHAIN_ALL: &[&str] = &[
    "window",
    "where",
    "sample",
    "derivative",
    "shift",
    "groupBy",
    "httpOut",
];

/// Chained tags legal on batch-shaped producers, which cannot be
/// re-windowed.
const CHAIN_NO_WINDOW: &[&str] = &[
    "where",
    "sample",
    "derivative",
    "shift",
    "groupBy",
    "httpOut",
];

/// Entry point for streaming data; no upstream producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStage;

impl Stage for StreamStage {
    fn type_of(&self) -> &'static str {
        "stream"
    }

    fn supports_chain(&self, type_of: &str) -> bool {
        CHAIN_ALL.contains(&type_of)
    }

    fn export_fields(&self, _record: &mut AttributeRecord) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Entry point for batch queries; no upstream producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStage;

impl Stage for BatchStage {
    fn type_of(&self) -> &'static str {
        "batch"
    }

    fn supports_chain(&self, type_of: &str) -> bool {
        CHAIN_NO_WINDOW.contains(&type_of)
    }

    fn export_fields(&self, _record: &mut AttributeRecord) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Buffers streaming points into overlapping windows of `period`, emitting
/// every `every`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowStage {
    /// How much data the window holds.
    pub period: Duration,
    /// How often the window emits.
    pub every: Duration,
    /// Align window edges to the epoch instead of first arrival.
    pub align: bool,
    /// Wait for a full period before the first emit.
    pub fill_period: bool,
}

impl Stage for WindowStage {
    fn type_of(&self) -> &'static str {
        "window"
    }

    fn supports_chain(&self, type_of: &str) -> bool {
        // Windowed data is batch-shaped downstream.
        CHAIN_NO_WINDOW.contains(&type_of)
    }

    fn export_fields(&self, record: &mut AttributeRecord) {
        record
            .set_duration("period", self.period)
            .set_duration("every", self.every)
            .set("align", self.align)
            .set("fillPeriod", self.fill_period);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Filters points by an opaque predicate expression.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereStage {
    /// The filter predicate.
    pub predicate: Expression,
}

impl Stage for WhereStage {
    fn type_of(&self) -> &'static str {
        "where"
    }

    fn supports_chain(&self, type_of: &str) -> bool {
        CHAIN_ALL.contains(&type_of)
    }

    fn export_fields(&self, record: &mut AttributeRecord) {
        record.set("lambda", self.predicate.to_value());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Passes through one point out of every `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleStage {
    /// The sampling modulus.
    pub count: i64,
}

impl Stage for SampleStage {
    fn type_of(&self) -> &'static str {
        "sample"
    }

    fn supports_chain(&self, type_of: &str) -> bool {
        CHAIN_ALL.contains(&type_of)
    }

    fn export_fields(&self, record: &mut AttributeRecord) {
        record.set("count", self.count);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Computes the rate of change of a field per `unit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeStage {
    /// The field to differentiate.
    pub field: String,
    /// The time unit of the result.
    pub unit: Duration,
    /// Clamp negative derivatives to zero.
    pub non_negative: bool,
}

impl Stage for DerivativeStage {
    fn type_of(&self) -> &'static str {
        "derivative"
    }

    fn supports_chain(&self, type_of: &str) -> bool {
        CHAIN_ALL.contains(&type_of)
    }

    fn export_fields(&self, record: &mut AttributeRecord) {
        record
            .set("field", self.field.clone())
            .set_duration("unit", self.unit)
            .set("nonNegative", self.non_negative);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shifts point timestamps forward by a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftStage {
    /// The timestamp offset.
    pub offset: Duration,
}

impl Stage for ShiftStage {
    fn type_of(&self) -> &'static str {
        "shift"
    }

    fn supports_chain(&self, type_of: &str) -> bool {
        CHAIN_ALL.contains(&type_of)
    }

    fn export_fields(&self, record: &mut AttributeRecord) {
        record.set_duration("shift", self.offset);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Groups points by tag dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupByStage {
    /// Dimension names, in declaration order.
    pub dimensions: Vec<String>,
}

impl Stage for GroupByStage {
    fn type_of(&self) -> &'static str {
        "groupBy"
    }

    fn supports_chain(&self, type_of: &str) -> bool {
        CHAIN_ALL.contains(&type_of)
    }

    fn export_fields(&self, record: &mut AttributeRecord) {
        record.set(
            "dimensions",
            Value::Array(
                self.dimensions
                    .iter()
                    .map(|d| Value::String(d.clone()))
                    .collect(),
            ),
        );
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Exposes results on a named HTTP endpoint; a sink, nothing chains onto
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutStage {
    /// The endpoint name.
    pub endpoint: String,
}

impl Stage for HttpOutStage {
    fn type_of(&self) -> &'static str {
        "httpOut"
    }

    fn supports_chain(&self, _type_of: &str) -> bool {
        false
    }

    fn export_fields(&self, record: &mut AttributeRecord) {
        record.set("endpoint", self.endpoint.clone());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
