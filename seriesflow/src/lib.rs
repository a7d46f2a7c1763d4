//! # Seriesflow
//!
//! Reconstructs executable, strongly-typed time-series pipelines from
//! compact, self-describing JSON documents.
//!
//! A pipeline is a DAG of processing stages (sources, transforms, sinks).
//! The serialized form stores stages as loosely-typed attribute records
//! plus an explicit edge list, because the stage set is open-ended and
//! evolves independently of the storage format. Assembly validates the
//! graph (ids, edges, acyclicity), resolves each record to a registered
//! kind via its discriminator tag, and replays stages in dependency order
//! into a fully linked [`assembler::Pipeline`] — failing fast on any
//! structural or schema error before a single stage would execute.
//!
//! ## Quick start
//!
//! ```rust
//! use seriesflow::prelude::*;
//!
//! let document = r#"{
//!     "nodes": [
//!         {"typeOf": "stream", "id": "1"},
//!         {"typeOf": "window", "id": "2", "period": "10s"}
//!     ],
//!     "edges": [{"parent": "1", "child": "2"}]
//! }"#;
//!
//! let pipeline = Assembler::new().assemble(document)?;
//! assert_eq!(pipeline.sources(), &[NodeId::new(1)]);
//! # Ok::<(), seriesflow::AssemblyError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

pub mod assembler;
pub mod duration;
pub mod errors;
pub mod expr;
pub mod graph;
pub mod record;
pub mod registry;
pub mod stages;

pub use errors::AssemblyError;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::assembler::{flatten, Assembler, JsonPipeline, Pipeline};
    pub use crate::duration::{format_duration, parse_duration};
    pub use crate::errors::AssemblyError;
    pub use crate::expr::Expression;
    pub use crate::graph::{AdjacencyIndex, Edge, NodeId, TopologicalSorter};
    pub use crate::record::{AttributeRecord, ID_KEY, TYPE_OF_KEY};
    pub use crate::registry::{
        default_registry, FieldShape, FieldSpec, StageKindDef, StageRegistry, StageRole,
    };
    pub use crate::stages::Stage;
}
