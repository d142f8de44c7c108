//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use discourse_graph::{
    canvas::CanvasFile,
    config::CanvasConfig,
    editor::{Editor, PointerEvent},
    schema::{DiscourseRelation, NodeType, RelationType, TypeSchema},
    shapes::ShapeId,
    toast::{Toast, ToastBus},
    tools::{RelationTool, ToolOutcome},
};
use std::{path::Path, sync::Arc};
use tokio::sync::mpsc::UnboundedReceiver;

pub const CANVAS: &str = "Canvas.md";

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Claim, Evidence and Question node types; evidence may support a claim.
#[allow(dead_code)]
pub fn schema() -> TypeSchema {
    TypeSchema {
        node_types: vec![
            NodeType {
                id: "claim".into(),
                name: "Claim".to_string(),
                format: "CLM - {content}".to_string(),
                ..Default::default()
            },
            NodeType {
                id: "evidence".into(),
                name: "Evidence".to_string(),
                format: "EVD - {content}".to_string(),
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

/// An editor for [CANVAS] with a toast subscription for it.
#[allow(dead_code)]
pub fn editor_with_toasts(config: CanvasConfig) -> (Editor, UnboundedReceiver<Toast>) {
    init_logging();
    let bus = ToastBus::new();
    let toasts = bus.subscribe(CANVAS);
    (Editor::new(CANVAS, Arc::new(schema()), config, bus), toasts)
}

/// An evidence node at (0, 0) and a claim node at (300, 0), both 100x100.
#[allow(dead_code)]
pub fn evidence_and_claim(editor: &mut Editor) -> (ShapeId, ShapeId) {
    let evidence = editor.create_node(0.0, 0.0, 100.0, 100.0, "evidence".into(), "EVD - Rain");
    let claim = editor.create_node(300.0, 0.0, 100.0, 100.0, "claim".into(), "CLM - Wet");
    (evidence, claim)
}

/// A quick press-drag-release with the relation tool, returning the first settled outcome.
#[allow(dead_code)]
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

/// Write a file under `root`, creating its directories.
#[allow(dead_code)]
pub fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

/// A vault with one evidence note, one claim note and an empty canvas.
#[allow(dead_code)]
pub fn create_test_vault(root: &Path) {
    write(
        root,
        "EVD - Rain.md",
        "---\nnodeTypeId: evidence\n---\nIt rained.\n",
    );
    write(
        root,
        "claims/CLM - Wet.md",
        "---\nnodeTypeId: claim\n---\nThe street is wet.\n",
    );
    let canvas = CanvasFile::new(&CanvasConfig::default()).format().unwrap();
    write(root, CANVAS, &canvas);
}
