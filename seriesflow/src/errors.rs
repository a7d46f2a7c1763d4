//! Error types for pipeline assembly.
//!
//! Every error aborts the whole assembly: a malformed stage or a cycle
//! invalidates the ordering guarantees the rest of the graph depends on, so
//! no partial pipeline is ever returned. Each variant carries the offending
//! id, field, or tag so callers can produce an actionable diagnostic.

use crate::graph::NodeId;
use thiserror::Error;

/// The error type for document parsing, validation, and stage construction.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The input document is not valid JSON or does not match the
    /// `{nodes, edges}` envelope.
    #[error("malformed pipeline document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required field is absent from an attribute record.
    #[error("missing expected field {field:?}")]
    MissingField {
        /// The absent field name.
        field: String,
    },

    /// A field holds a value of the wrong runtime shape.
    #[error("field {field:?} is not a {expected} value but is {actual}")]
    FieldTypeMismatch {
        /// The field name.
        field: String,
        /// The shape the accessor expected.
        expected: &'static str,
        /// A description of the value actually stored.
        actual: String,
    },

    /// A record's id does not parse as a non-negative integer string.
    #[error("node id {value:?} is not a non-negative integer")]
    MalformedId {
        /// The raw id string.
        value: String,
    },

    /// Two records in one document carry the same id.
    #[error("duplicate node id {id}")]
    DuplicateId {
        /// The repeated id.
        id: NodeId,
    },

    /// An edge references an id with no record body.
    #[error("node {id} is referenced by an edge but has no record")]
    DanglingEdge {
        /// The id with no record.
        id: NodeId,
    },

    /// The producer/consumer graph is not acyclic.
    #[error("cycle detected in pipeline graph: {}", format_cycle(path))]
    CycleDetected {
        /// A representative path of node ids forming the cycle, ending with
        /// a repeat of the first id.
        path: Vec<NodeId>,
    },

    /// A record's type tag is not registered.
    #[error("unknown stage type {type_of:?}")]
    UnknownStageType {
        /// The unregistered discriminator tag.
        type_of: String,
    },

    /// A chained stage has no producer edge.
    #[error("node {id} requires exactly one parent but has none")]
    MissingParent {
        /// The parentless node.
        id: NodeId,
    },

    /// A source stage has one or more producer edges.
    #[error("node {id} is a source and cannot have a parent")]
    UnexpectedParent {
        /// The source node with a producer.
        id: NodeId,
    },

    /// A chained stage has more than one producer edge. Fan-in stages need
    /// an explicit multi-parent binding contract before this can be relaxed.
    #[error("node {id} has multiple parents; fan-in stages are not supported")]
    MultipleParentsUnsupported {
        /// The node with multiple producers.
        id: NodeId,
    },

    /// A record violates its kind's field schema.
    #[error("invalid {type_of:?} stage: field {field:?}: {reason}")]
    StageSchema {
        /// The kind's discriminator tag.
        type_of: String,
        /// The offending field.
        field: String,
        /// Why the field was rejected.
        reason: String,
    },
}

impl AssemblyError {
    /// Creates a missing-field error.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates a field-type-mismatch error.
    #[must_use]
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: &'static str,
        actual: impl Into<String>,
    ) -> Self {
        Self::FieldTypeMismatch {
            field: field.into(),
            expected,
            actual: actual.into(),
        }
    }

    /// Creates a stage-schema error.
    #[must_use]
    pub fn schema(
        type_of: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StageSchema {
            type_of: type_of.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

fn format_cycle(path: &[NodeId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
