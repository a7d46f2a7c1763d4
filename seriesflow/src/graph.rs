//! Edge topology: adjacency derivation and topological ordering.
//!
//! The serialized document stores an explicit edge list; everything else
//! about the graph (who produces for whom, a replay order) is derived here.

use crate::errors::AssemblyError;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// A node's unique id within a document.
///
/// Serialized as a string on the wire so heterogeneous JSON decoders cannot
/// disagree about numeric representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Creates a node id from its integer value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the integer value of the id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| AssemblyError::MalformedId {
                value: s.to_string(),
            })
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = NodeId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string-encoded non-negative integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<NodeId, E> {
                v.parse().map_err(|_| {
                    E::invalid_value(de::Unexpected::Str(v), &"a non-negative integer string")
                })
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}

/// A directed connection between two nodes; data flows parent -> child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// The producing node.
    pub parent: NodeId,
    /// The consuming node.
    pub child: NodeId,
}

impl Edge {
    /// Creates an edge from producer to consumer.
    #[must_use]
    pub const fn new(parent: NodeId, child: NodeId) -> Self {
        Self { parent, child }
    }
}

/// Derived producer and consumer sets for every node named by an edge.
///
/// Building is a single linear pass and is pure: edges referencing ids with
/// no record are kept as-is, since resolving ids to records is the
/// assembler's concern.
#[derive(Debug, Default)]
pub struct AdjacencyIndex {
    producers: HashMap<NodeId, Vec<NodeId>>,
    consumers: HashMap<NodeId, Vec<NodeId>>,
}

impl AdjacencyIndex {
    /// Builds the index from the document's edge list.
    #[must_use]
    pub fn from_edges(edges: &[Edge]) -> Self {
        let mut index = Self::default();
        for edge in edges {
            index
                .consumers
                .entry(edge.parent)
                .or_default()
                .push(edge.child);
            index
                .producers
                .entry(edge.child)
                .or_default()
                .push(edge.parent);
        }
        index
    }

    /// Returns the upstream ids feeding `id`, in edge-list order.
    #[must_use]
    pub fn producers_of(&self, id: NodeId) -> &[NodeId] {
        self.producers.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Returns the downstream ids fed by `id`, in edge-list order.
    #[must_use]
    pub fn consumers_of(&self, id: NodeId) -> &[NodeId] {
        self.consumers.get(&id).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

/// Depth-first topological sorter over an adjacency index.
///
/// Produces an order where every producer appears strictly before its
/// consumers, or fails with [`AssemblyError::CycleDetected`] the first time
/// a walk revisits a node still in progress. The cycle error propagates out
/// of the nested recursion immediately; it is never deferred to a later
/// traversal.
#[derive(Debug)]
pub struct TopologicalSorter<'a> {
    index: &'a AdjacencyIndex,
    state: HashMap<NodeId, VisitState>,
    sorted: Vec<NodeId>,
}

impl<'a> TopologicalSorter<'a> {
    /// Sorts every node in `roots` (plus any node reachable through the
    /// index) into producer-first order.
    ///
    /// Roots are visited in ascending id order so equal documents always
    /// yield identical orders.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::CycleDetected`] if the graph has a cycle.
    pub fn sort(
        index: &'a AdjacencyIndex,
        roots: &BTreeSet<NodeId>,
    ) -> Result<Vec<NodeId>, AssemblyError> {
        let mut sorter = Self {
            index,
            state: HashMap::new(),
            sorted: Vec::new(),
        };
        let mut stack = Vec::new();
        for &id in roots {
            sorter.visit(id, &mut stack)?;
        }
        sorter.sorted.reverse();
        Ok(sorter.sorted)
    }

    fn visit(&mut self, id: NodeId, stack: &mut Vec<NodeId>) -> Result<(), AssemblyError> {
        match self.state.get(&id) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                let start = stack.iter().position(|&n| n == id).unwrap_or(0);
                let mut path = stack[start..].to_vec();
                path.push(id);
                return Err(AssemblyError::CycleDetected { path });
            }
            None => {}
        }

        self.state.insert(id, VisitState::InProgress);
        stack.push(id);
        // Consumers complete before this node is placed, so reversing the
        // completion order puts every producer ahead of its consumers.
        for &child in self.index.consumers_of(id) {
            self.visit(child, stack)?;
        }
        stack.pop();
        self.state.insert(id, VisitState::Done);
        self.sorted.push(id);
        Ok(())
    }
}
