//! Shared test utilities for editor, binding and tool tests

use crate::{
    config::CanvasConfig,
    editor::{Editor, PointerEvent},
    geometry::Vec2,
    schema::{DiscourseRelation, NodeType, RelationType, TypeSchema},
    toast::ToastBus,
    tools::{RelationTool, ToolOutcome},
};
use std::sync::Arc;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Claim, Evidence and Question node types with a single "supports" relation that lets evidence
/// support claims.
pub fn claim_evidence_schema() -> TypeSchema {
    TypeSchema {
        node_types: vec![
            NodeType {
                id: "claim".into(),
                name: "Claim".to_string(),
                format: "CLM - {content}".to_string(),
                color: Some("#7DA13E".to_string()),
                tag: Some("clm-candidate".to_string()),
                ..Default::default()
            },
            NodeType {
                id: "evidence".into(),
                name: "Evidence".to_string(),
                format: "EVD - {content}".to_string(),
                color: Some("#DB134A".to_string()),
                key_image: true,
                ..Default::default()
            },
            NodeType {
                id: "question".into(),
                name: "Question".to_string(),
                format: "QUE - {content}".to_string(),
                ..Default::default()
            },
        ],
        relation_types: vec![RelationType {
            id: "supports".into(),
            label: "supports".to_string(),
            complement: "is supported by".to_string(),
            color: "#009E73".to_string(),
        }],
        discourse_relations: vec![DiscourseRelation {
            source_id: "evidence".into(),
            destination_id: "claim".into(),
            relationship_type_id: "supports".into(),
        }],
    }
}

/// An empty editor over [claim_evidence_schema] with default configuration.
pub fn test_editor() -> Editor {
    init_logging();
    Editor::new(
        "Canvas.md",
        Arc::new(claim_evidence_schema()),
        CanvasConfig::default(),
        ToastBus::new(),
    )
}

/// Pretend the pointer is moving fast, so new bindings start imprecise.
pub fn fast_pointer(editor: &mut Editor) {
    editor.inputs.pointer_velocity = Vec2::new(10.0, 0.0);
}

/// A quick press-drag-release gesture with the relation tool. Returns the first outcome that is
/// not [ToolOutcome::Pending].
pub fn drag(
    tool: &mut RelationTool,
    editor: &mut Editor,
    from: (f64, f64),
    to: (f64, f64),
) -> ToolOutcome {
    let outcome = tool.on_pointer_down(editor, &PointerEvent::at(from.0, from.1, 0));
    if outcome != ToolOutcome::Pending {
        return outcome;
    }
    let mid = ((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0);
    for (point, time_ms) in [(mid, 8), (to, 16)] {
        let outcome = tool.on_pointer_move(editor, &PointerEvent::at(point.0, point.1, time_ms));
        if outcome != ToolOutcome::Pending {
            return outcome;
        }
    }
    tool.on_pointer_up(editor, &PointerEvent::at(to.0, to.1, 24))
}
