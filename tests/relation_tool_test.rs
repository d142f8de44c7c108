//! End-to-end relation drawing: the relation tool, binding and validation working together
//! through the public API.

mod common;

use common::{drag, editor_with_toasts, evidence_and_claim, CANVAS};
use discourse_graph::{
    binding::{on_handle_drag, relation_geometry, DragOptions, DragOutcome, TranslateSession},
    config::CanvasConfig,
    editor::PointerEvent,
    geometry::Vec2,
    shapes::{Handle, Terminal},
    toast::{drain, ToastSeverity},
    tools::{RelationTool, RelationToolContext, ToolOutcome},
};
use test_log::test;

fn supports_tool() -> RelationTool {
    let mut tool = RelationTool::new();
    tool.set_context(Some(RelationToolContext {
        relation_type_id: "supports".into(),
        source_file: None,
    }));
    tool
}

#[test]
fn evidence_to_claim_reads_supports() {
    let (mut editor, mut toasts) = editor_with_toasts(CanvasConfig::default());
    let (evidence, claim) = evidence_and_claim(&mut editor);
    let mut tool = supports_tool();

    let outcome = drag(&mut tool, &mut editor, (50.0, 50.0), (350.0, 50.0));
    let ToolOutcome::RelationCompleted(id) = outcome else {
        panic!("expected a completed relation, got {outcome:?}");
    };
    assert_eq!(tool.state_name(), "idle");
    assert!(editor.is_selected(&id));
    assert!(editor.hinting().is_empty());

    let relation = editor.relation(&id).unwrap();
    assert_eq!(relation.props.text, "supports");
    let bindings = editor.bindings_from(&id);
    assert_eq!(bindings.start.unwrap().to_id, evidence);
    assert_eq!(bindings.end.unwrap().to_id, claim);

    // Quick drags bind imprecisely, so the body runs centre to centre, clipped and pulled back.
    let geometry = relation_geometry(&editor, &id).unwrap();
    assert!(geometry.start.approx_eq(Vec2::new(110.0, 50.0), 1e-6));
    assert!(geometry.end.approx_eq(Vec2::new(290.0, 50.0), 1e-6));
    assert!(drain(&mut toasts).is_empty());
}

#[test]
fn claim_to_evidence_reads_is_supported_by() {
    let (mut editor, _toasts) = editor_with_toasts(CanvasConfig::default());
    let (evidence, claim) = evidence_and_claim(&mut editor);
    let mut tool = supports_tool();

    let outcome = drag(&mut tool, &mut editor, (350.0, 50.0), (50.0, 50.0));
    let ToolOutcome::RelationCompleted(id) = outcome else {
        panic!("expected a completed relation, got {outcome:?}");
    };
    assert_eq!(editor.relation(&id).unwrap().props.text, "is supported by");
    let (start, end) = editor.relation_endpoints(&id).unwrap();
    assert_eq!(start.id, claim);
    assert_eq!(end.id, evidence);
}

#[test]
fn claim_to_claim_is_removed_with_a_warning() {
    let (mut editor, mut toasts) = editor_with_toasts(CanvasConfig::default());
    editor.create_node(0.0, 0.0, 100.0, 100.0, "claim".into(), "CLM - Wet");
    editor.create_node(300.0, 0.0, 100.0, 100.0, "claim".into(), "CLM - Cold");
    let mut tool = supports_tool();

    let outcome = drag(&mut tool, &mut editor, (50.0, 50.0), (350.0, 50.0));
    assert_eq!(outcome, ToolOutcome::Cancelled);
    assert_eq!(tool.state_name(), "idle");
    assert_eq!(editor.relations().count(), 0);
    assert_eq!(editor.bindings().count(), 0);
    assert_eq!(editor.shapes().count(), 2);

    let toasts = drain(&mut toasts);
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].severity, ToastSeverity::Warning);
    assert_eq!(toasts[0].title, "Invalid relation");
    assert_eq!(
        toasts[0].description,
        "A Claim cannot be connected to a Claim with \"supports\"."
    );
    assert_eq!(toasts[0].target_id, CANVAS);
}

#[test]
fn releasing_over_the_source_rolls_back() {
    let (mut editor, _toasts) = editor_with_toasts(CanvasConfig::default());
    evidence_and_claim(&mut editor);
    let mut tool = supports_tool();

    let outcome = drag(&mut tool, &mut editor, (20.0, 20.0), (80.0, 80.0));
    assert_eq!(outcome, ToolOutcome::Cancelled);
    assert_eq!(editor.relations().count(), 0);
}

#[test]
fn escape_abandons_the_drag() {
    let (mut editor, _toasts) = editor_with_toasts(CanvasConfig::default());
    evidence_and_claim(&mut editor);
    let mut tool = supports_tool();

    tool.on_pointer_down(&mut editor, &PointerEvent::at(50.0, 50.0, 0));
    tool.on_pointer_move(&mut editor, &PointerEvent::at(200.0, 50.0, 8));
    assert_eq!(tool.state_name(), "dragging_handle");
    assert_eq!(editor.relations().count(), 1);

    assert_eq!(
        tool.on_key_down(&mut editor, "Escape"),
        ToolOutcome::Cancelled
    );
    assert_eq!(editor.relations().count(), 0);
    assert_eq!(tool.state_name(), "idle");
}

#[test]
fn moved_node_drags_its_terminal_along() {
    let (mut editor, _toasts) = editor_with_toasts(CanvasConfig::default());
    let (evidence, _claim) = evidence_and_claim(&mut editor);
    let id = editor.create_relation(Vec2::new(50.0, 50.0), "supports".into());
    assert_eq!(
        on_handle_drag(
            &mut editor,
            &id,
            Handle::Start,
            Vec2::new(50.0, 50.0),
            DragOptions::default()
        ),
        DragOutcome::Bound(evidence.clone())
    );
    assert_eq!(
        on_handle_drag(
            &mut editor,
            &id,
            Handle::End,
            Vec2::new(200.0, 200.0),
            DragOptions::default()
        ),
        DragOutcome::Free
    );

    editor.update_node(&evidence, |node| node.x += 50.0);
    let relation = editor.relation(&id).unwrap();
    assert!(relation
        .handle_page(Terminal::Start)
        .approx_eq(Vec2::new(100.0, 50.0), 1e-9));
    assert!(relation
        .handle_page(Terminal::End)
        .approx_eq(Vec2::new(200.0, 200.0), 1e-9));

    // Same again through a translate gesture on the node alone.
    let session = TranslateSession::start(&mut editor, &[evidence.clone()]);
    session.update(&mut editor, Vec2::new(0.0, 50.0));
    let relation = editor.relation(&id).unwrap();
    assert!(relation
        .handle_page(Terminal::Start)
        .approx_eq(Vec2::new(100.0, 100.0), 1e-9));
    assert!(relation
        .handle_page(Terminal::End)
        .approx_eq(Vec2::new(200.0, 200.0), 1e-9));
    assert_eq!(
        editor.bindings_from(&id).start.map(|b| b.to_id),
        Some(evidence)
    );
}
