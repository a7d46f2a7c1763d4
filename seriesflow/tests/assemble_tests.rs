//! End-to-end assembly tests over serialized documents.

use pretty_assertions::assert_eq;
use seriesflow::prelude::*;
use seriesflow::stages::{HttpOutStage, StreamStage, WindowStage};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn id(v: u64) -> NodeId {
    NodeId::new(v)
}

fn assemble(doc: serde_json::Value) -> Result<Pipeline, AssemblyError> {
    Assembler::new().assemble(&doc.to_string())
}

#[test]
fn test_stream_window_document() {
    init_tracing();
    let pipeline = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "window", "id": "2", "period": "10s"}
        ],
        "edges": [{"parent": "1", "child": "2"}]
    }))
    .unwrap();

    assert_eq!(pipeline.order(), &[id(1), id(2)]);
    assert_eq!(pipeline.sources(), &[id(1)]);

    let window = pipeline
        .stage(id(2))
        .unwrap()
        .as_any()
        .downcast_ref::<WindowStage>()
        .unwrap();
    assert_eq!(window.period, Duration::from_secs(10));
}

#[test]
fn test_reversed_edge_fails_on_parentless_chained_node() {
    // With the edge flipped, the window node has no producer; it sorts
    // ahead of the stream node and fails first.
    let err = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "window", "id": "2", "period": "10s"}
        ],
        "edges": [{"parent": "2", "child": "1"}]
    }))
    .unwrap_err();

    assert!(matches!(err, AssemblyError::MissingParent { id } if id == NodeId::new(2)));
}

#[test]
fn test_source_with_producer_fails() {
    let err = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "stream", "id": "2"}
        ],
        "edges": [{"parent": "1", "child": "2"}]
    }))
    .unwrap_err();

    assert!(matches!(err, AssemblyError::UnexpectedParent { id } if id == NodeId::new(2)));
}

#[test]
fn test_cycle_aborts_assembly() {
    let err = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "window", "id": "2", "period": "10s"},
            {"typeOf": "where", "id": "3", "lambda": {"op": "true"}}
        ],
        "edges": [
            {"parent": "1", "child": "2"},
            {"parent": "2", "child": "3"},
            {"parent": "3", "child": "1"}
        ]
    }))
    .unwrap_err();

    assert!(matches!(err, AssemblyError::CycleDetected { .. }));
}

#[test]
fn test_unknown_stage_type() {
    let err = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "union", "id": "2"}
        ],
        "edges": [{"parent": "1", "child": "2"}]
    }))
    .unwrap_err();

    assert!(matches!(
        err,
        AssemblyError::UnknownStageType { ref type_of } if type_of == "union"
    ));
}

#[test]
fn test_dangling_edge() {
    let err = assemble(json!({
        "nodes": [{"typeOf": "stream", "id": "1"}],
        "edges": [{"parent": "1", "child": "99"}]
    }))
    .unwrap_err();

    assert!(matches!(err, AssemblyError::DanglingEdge { id } if id == NodeId::new(99)));
}

#[test]
fn test_dangling_parent_endpoint() {
    // The phantom producer, not the well-formed source record it points
    // at, is the node the error must name.
    let err = assemble(json!({
        "nodes": [{"typeOf": "stream", "id": "1"}],
        "edges": [{"parent": "5", "child": "1"}]
    }))
    .unwrap_err();

    assert!(matches!(err, AssemblyError::DanglingEdge { id } if id == NodeId::new(5)));
}

#[test]
fn test_edge_with_no_records_rejected() {
    // An edge whose endpoints both lack record bodies must not assemble.
    let err = assemble(json!({
        "nodes": [{"typeOf": "stream", "id": "1"}],
        "edges": [{"parent": "5", "child": "6"}]
    }))
    .unwrap_err();

    assert!(matches!(err, AssemblyError::DanglingEdge { id } if id == NodeId::new(5)));
}

#[test]
fn test_multiple_parents_unsupported() {
    let err = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "stream", "id": "2"},
            {"typeOf": "window", "id": "3", "period": "10s"}
        ],
        "edges": [
            {"parent": "1", "child": "3"},
            {"parent": "2", "child": "3"}
        ]
    }))
    .unwrap_err();

    assert!(matches!(
        err,
        AssemblyError::MultipleParentsUnsupported { id } if id == NodeId::new(3)
    ));
}

#[test]
fn test_chain_capability_mismatch() {
    // Windowed data is batch-shaped; it cannot be re-windowed.
    let err = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "window", "id": "2", "period": "10s"},
            {"typeOf": "window", "id": "3", "period": "1m"}
        ],
        "edges": [
            {"parent": "1", "child": "2"},
            {"parent": "2", "child": "3"}
        ]
    }))
    .unwrap_err();

    match err {
        AssemblyError::StageSchema { type_of, field, .. } => {
            assert_eq!(type_of, "window");
            assert_eq!(field, "parent");
        }
        other => panic!("expected StageSchema, got {other:?}"),
    }
}

#[test]
fn test_schema_violation_aborts_whole_document() {
    let err = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "window", "id": "2", "period": "fast"}
        ],
        "edges": [{"parent": "1", "child": "2"}]
    }))
    .unwrap_err();

    assert!(matches!(
        err,
        AssemblyError::StageSchema { ref field, .. } if field == "period"
    ));
}

#[test]
fn test_malformed_node_id() {
    let err = assemble(json!({
        "nodes": [{"typeOf": "stream", "id": "first"}],
        "edges": []
    }))
    .unwrap_err();

    assert!(matches!(err, AssemblyError::MalformedId { ref value } if value == "first"));
}

#[test]
fn test_construction_order_is_topological() {
    let pipeline = assemble(json!({
        "nodes": [
            {"typeOf": "window", "id": "4", "period": "1m"},
            {"typeOf": "where", "id": "3", "lambda": {"op": "true"}},
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "httpOut", "id": "5", "endpoint": "cpu"},
            {"typeOf": "sample", "id": "2", "count": 10}
        ],
        "edges": [
            {"parent": "1", "child": "2"},
            {"parent": "2", "child": "3"},
            {"parent": "3", "child": "4"},
            {"parent": "4", "child": "5"}
        ]
    }))
    .unwrap();

    for edge in pipeline.edges() {
        let order = pipeline.order();
        let parent_pos = order.iter().position(|&n| n == edge.parent).unwrap();
        let child_pos = order.iter().position(|&n| n == edge.child).unwrap();
        assert!(parent_pos < child_pos, "edge {edge:?} out of order");
    }
}

#[test]
fn test_flatten_then_assemble_is_idempotent() {
    let assembler = Assembler::new();
    let pipeline = assembler
        .assemble(
            &json!({
                "nodes": [
                    {"typeOf": "stream", "id": "1"},
                    {"typeOf": "where", "id": "2",
                     "lambda": {"op": ">", "lhs": {"field": "usage"}, "rhs": {"float": 0.5}}},
                    {"typeOf": "window", "id": "3", "period": "10m", "every": "1m", "align": true},
                    {"typeOf": "derivative", "id": "4", "field": "usage"},
                    {"typeOf": "httpOut", "id": "5", "endpoint": "cpu"},
                    {"typeOf": "batch", "id": "6"},
                    {"typeOf": "groupBy", "id": "7", "dimensions": ["host", "region"]},
                    {"typeOf": "sample", "id": "8", "count": 10},
                    {"typeOf": "shift", "id": "9", "shift": "1m"}
                ],
                "edges": [
                    {"parent": "1", "child": "2"},
                    {"parent": "2", "child": "3"},
                    {"parent": "3", "child": "4"},
                    {"parent": "4", "child": "5"},
                    {"parent": "6", "child": "7"},
                    {"parent": "7", "child": "8"},
                    {"parent": "8", "child": "9"}
                ]
            })
            .to_string(),
        )
        .unwrap();

    let first = assembler.flatten_pipeline(&pipeline);
    let reassembled = assembler.assemble_document(first.clone()).unwrap();
    let second = assembler.flatten_pipeline(&reassembled);

    assert_eq!(first, second);
    assert_eq!(pipeline.order(), reassembled.order());
    assert_eq!(pipeline.sources(), reassembled.sources());
    for (id, stage) in pipeline.iter() {
        let other = reassembled.stage(id).unwrap();
        assert_eq!(stage.type_of(), other.type_of());
    }
}

#[test]
fn test_flattened_document_round_trips_through_json() {
    let assembler = Assembler::new();
    let pipeline = assembler
        .assemble(
            &json!({
                "nodes": [
                    {"typeOf": "stream", "id": "1"},
                    {"typeOf": "window", "id": "2", "period": "10s"}
                ],
                "edges": [{"parent": "1", "child": "2"}]
            })
            .to_string(),
        )
        .unwrap();

    let flat = assembler.flatten_pipeline(&pipeline);
    let text = serde_json::to_string(&flat).unwrap();
    let back = assembler.assemble(&text).unwrap();

    assert_eq!(back.order(), pipeline.order());
    assert!(back.stage(id(1)).unwrap().as_any().is::<StreamStage>());
    assert!(back
        .stage(id(2))
        .unwrap()
        .as_any()
        .downcast_ref::<WindowStage>()
        .is_some());
}

#[test]
fn test_sinks_terminate_chains() {
    let err = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "httpOut", "id": "2", "endpoint": "cpu"},
            {"typeOf": "sample", "id": "3", "count": 2}
        ],
        "edges": [
            {"parent": "1", "child": "2"},
            {"parent": "2", "child": "3"}
        ]
    }))
    .unwrap_err();

    assert!(matches!(err, AssemblyError::StageSchema { ref field, .. } if field == "parent"));
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TeeStage {
    label: String,
}

impl Stage for TeeStage {
    fn type_of(&self) -> &'static str {
        "tee"
    }

    fn supports_chain(&self, _type_of: &str) -> bool {
        true
    }

    fn export_fields(&self, record: &mut AttributeRecord) {
        record.set("label", self.label.clone());
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[test]
fn test_custom_kind_plugs_into_assembly() {
    let mut registry = StageRegistry::with_defaults();
    registry.register(StageKindDef::chained(
        "tee",
        vec![FieldSpec::required("label", FieldShape::String)],
        |_parent, record| {
            Ok(Arc::new(TeeStage {
                label: record.string("label")?.to_string(),
            }))
        },
    ));
    let assembler = Assembler::with_registry(Arc::new(registry));

    let pipeline = assembler
        .assemble(
            &json!({
                "nodes": [
                    {"typeOf": "stream", "id": "1"},
                    {"typeOf": "tee", "id": "2", "label": "debug"}
                ],
                "edges": [{"parent": "1", "child": "2"}]
            })
            .to_string(),
        )
        .unwrap();

    let tee = pipeline
        .stage(id(2))
        .unwrap()
        .as_any()
        .downcast_ref::<TeeStage>()
        .unwrap();
    assert_eq!(tee.label, "debug");

    // The custom kind flattens through the same generic path.
    let flat = assembler.flatten_pipeline(&pipeline);
    let node = &flat.nodes[1];
    assert_eq!(node.type_of().unwrap(), "tee");
    assert_eq!(node.string("label").unwrap(), "debug");
}

#[test]
fn test_http_out_requires_stream_parent_capability() {
    // httpOut is legal under any transform that lists it; under another
    // httpOut it is not.
    let ok = assemble(json!({
        "nodes": [
            {"typeOf": "stream", "id": "1"},
            {"typeOf": "httpOut", "id": "2", "endpoint": "a"}
        ],
        "edges": [{"parent": "1", "child": "2"}]
    }))
    .unwrap();
    assert!(ok.stage(id(2)).unwrap().as_any().is::<HttpOutStage>());
}
