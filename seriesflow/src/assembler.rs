//! Pipeline assembly and the generic serializer.
//!
//! Assembly is a single synchronous pass per document: parse the
//! `{nodes, edges}` envelope, derive adjacency, topologically sort, then
//! replay the sorted order through the registry so every stage is
//! constructed after its producer. Any structural or schema error aborts
//! the whole document; no partial pipeline is ever returned.

use crate::errors::AssemblyError;
use crate::graph::{AdjacencyIndex, Edge, NodeId, TopologicalSorter};
use crate::record::AttributeRecord;
use crate::registry::{default_registry, StageRegistry, StageRole};
use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// The serialized form of a pipeline: one flat record per node plus an
/// explicit edge list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonPipeline {
    /// Node attribute records.
    pub nodes: Vec<AttributeRecord>,
    /// Producer-to-consumer edges.
    pub edges: Vec<Edge>,
}

/// A fully linked, type-checked pipeline.
///
/// Immutable once returned; safe to read from multiple threads.
#[derive(Debug)]
pub struct Pipeline {
    stages: BTreeMap<NodeId, Arc<dyn Stage>>,
    order: Vec<NodeId>,
    sources: Vec<NodeId>,
    edges: Vec<Edge>,
}

impl Pipeline {
    /// Looks up a stage by id.
    #[must_use]
    pub fn stage(&self, id: NodeId) -> Option<&Arc<dyn Stage>> {
        self.stages.get(&id)
    }

    /// The ids of source stages, in construction order.
    #[must_use]
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// The order stages were constructed in: a valid topological order of
    /// the document's graph.
    #[must_use]
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// The original edge topology, for introspection.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterates stages in construction order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Arc<dyn Stage>)> {
        self.order
            .iter()
            .filter_map(|id| self.stages.get(id).map(|stage| (*id, stage)))
    }
}

/// Reconstructs typed pipelines from serialized documents.
#[derive(Debug, Clone)]
pub struct Assembler {
    registry: Arc<StageRegistry>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Creates an assembler over the default kind registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: default_registry(),
        }
    }

    /// Creates an assembler over a custom registry.
    #[must_use]
    pub fn with_registry(registry: Arc<StageRegistry>) -> Self {
        Self { registry }
    }

    /// Parses a raw JSON document and assembles it.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Parse`] for malformed JSON, or any error
    /// from [`Self::assemble_document`].
    pub fn assemble(&self, document: &str) -> Result<Pipeline, AssemblyError> {
        let doc: JsonPipeline = serde_json::from_str(document)?;
        self.assemble_document(doc)
    }

    /// Assembles an already-parsed document.
    ///
    /// # Errors
    ///
    /// Fails with the first structural or schema error encountered:
    /// duplicate or malformed ids, dangling edges, cycles, unknown tags,
    /// producer-count mismatches, or field schema violations.
    pub fn assemble_document(&self, doc: JsonPipeline) -> Result<Pipeline, AssemblyError> {
        debug!(
            nodes = doc.nodes.len(),
            edges = doc.edges.len(),
            "assembling pipeline document"
        );

        let mut records: BTreeMap<NodeId, AttributeRecord> = BTreeMap::new();
        for record in doc.nodes {
            let id = record.id()?;
            if records.insert(id, record).is_some() {
                return Err(AssemblyError::DuplicateId { id });
            }
        }

        let index = AdjacencyIndex::from_edges(&doc.edges);
        // Every edge endpoint joins the sort roots alongside the record ids,
        // so an endpoint without a record body still reaches the replay
        // loop's DanglingEdge check instead of being silently skipped.
        let mut roots: BTreeSet<NodeId> = records.keys().copied().collect();
        for edge in &doc.edges {
            roots.insert(edge.parent);
            roots.insert(edge.child);
        }
        let sorted = TopologicalSorter::sort(&index, &roots)?;
        trace!(order = ?sorted, "topological sort complete");

        let mut stages: BTreeMap<NodeId, Arc<dyn Stage>> = BTreeMap::new();
        let mut order = Vec::with_capacity(sorted.len());
        let mut sources = Vec::new();

        for id in sorted {
            let record = records
                .get(&id)
                .ok_or(AssemblyError::DanglingEdge { id })?;
            let type_of = record.type_of()?.to_string();
            let def = self.registry.get(&type_of)?;
            def.validate(record)?;

            let producers = index.producers_of(id);
            let stage = match def.role() {
                StageRole::Source => {
                    if !producers.is_empty() {
                        return Err(AssemblyError::UnexpectedParent { id });
                    }
                    sources.push(id);
                    def.construct(None, record)?
                }
                StageRole::Chained => match producers {
                    [] => return Err(AssemblyError::MissingParent { id }),
                    [parent_id] => {
                        let parent = stages
                            .get(parent_id)
                            .ok_or(AssemblyError::DanglingEdge { id: *parent_id })?;
                        if !parent.supports_chain(&type_of) {
                            return Err(AssemblyError::schema(
                                &type_of,
                                "parent",
                                format!("cannot chain onto a {} stage", parent.type_of()),
                            ));
                        }
                        def.construct(Some(parent), record)?
                    }
                    _ => return Err(AssemblyError::MultipleParentsUnsupported { id }),
                },
            };

            trace!(%id, type_of = %type_of, "constructed stage");
            stages.insert(id, stage);
            order.push(id);
        }

        debug!(stages = order.len(), sources = sources.len(), "pipeline assembled");
        Ok(Pipeline {
            stages,
            order,
            sources,
            edges: doc.edges,
        })
    }

    /// Flattens every stage of a pipeline back into the serialized
    /// document form. The result reassembles to an equivalent pipeline.
    #[must_use]
    pub fn flatten_pipeline(&self, pipeline: &Pipeline) -> JsonPipeline {
        JsonPipeline {
            nodes: pipeline
                .iter()
                .map(|(id, stage)| flatten(stage.as_ref(), id))
                .collect(),
            edges: pipeline.edges().to_vec(),
        }
    }
}

/// Flattens one stage into a single record: the reserved type and id keys
/// followed by the stage's own fields.
///
/// Generic across every registered kind; no per-kind branches.
#[must_use]
pub fn flatten(stage: &dyn Stage, id: NodeId) -> AttributeRecord {
    let mut record = AttributeRecord::new();
    record.set_type(stage.type_of()).set_id(id);
    stage.export_fields(&mut record);
    record
}
