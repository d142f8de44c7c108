use serde::{Deserialize, Serialize};

use super::{ToolOutcome, ESCAPE_KEY};
use crate::{
    binding::{on_handle_drag, relation_geometry, DragOptions, DragOutcome},
    editor::{Editor, MarkId, PointerEvent},
    event::CanvasEvent,
    schema::RelationTypeId,
    shapes::{Handle, Shape, ShapeId},
    validator::compatible_target_types,
};

/// What the relation tool draws: chosen in the tool panel, optionally from a file's side panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationToolContext {
    pub relation_type_id: RelationTypeId,
    #[serde(default)]
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Pointing {
        source: ShapeId,
        down_ms: u64,
    },
    DraggingHandle {
        relation: ShapeId,
        mark: MarkId,
        down_ms: u64,
    },
}

/// Draws one relation per drag, from a discourse node to wherever the pointer is released.
#[derive(Debug, Clone)]
pub struct RelationTool {
    context: Option<RelationToolContext>,
    state: State,
}

impl Default for RelationTool {
    fn default() -> Self {
        RelationTool::new()
    }
}

impl RelationTool {
    pub fn new() -> Self {
        RelationTool {
            context: None,
            state: State::Idle,
        }
    }

    pub fn set_context(&mut self, context: Option<RelationToolContext>) {
        self.context = context;
    }

    pub fn context(&self) -> Option<&RelationToolContext> {
        self.context.as_ref()
    }

    pub fn state_name(&self) -> &'static str {
        match self.state {
            State::Idle => "idle",
            State::Pointing { .. } => "pointing",
            State::DraggingHandle { .. } => "dragging_handle",
        }
    }

    pub fn on_pointer_down(&mut self, editor: &mut Editor, event: &PointerEvent) -> ToolOutcome {
        if self.state != State::Idle {
            return self.cancel(editor);
        }
        editor.pointer_down(event);
        let Some(context) = self.context.clone() else {
            editor.warn(
                "No relation type selected",
                "Choose a relation type before drawing a relation.",
            );
            return ToolOutcome::Cancelled;
        };
        let source = editor
            .shape_at_point(event.point, 0.0, |shape| matches!(shape, Shape::Node(_)))
            .and_then(|id| editor.node(&id).cloned());
        let Some(source) = source else {
            editor.warn(
                "Must start on a discourse node",
                "Relations are drawn from one discourse node to another.",
            );
            return ToolOutcome::Cancelled;
        };

        let schema = editor.schema();
        let node_type_id = &source.props.node_type_id;
        if compatible_target_types(schema, &context.relation_type_id, node_type_id).is_empty() {
            let node_name = schema.node_type_name(node_type_id);
            let relation_label = schema
                .relation_type(&context.relation_type_id)
                .map(|rt| rt.label.clone())
                .unwrap_or_else(|| context.relation_type_id.to_string());
            editor.warn(
                "Invalid relation",
                &format!("A {node_name} cannot start a \"{relation_label}\" relation."),
            );
            return ToolOutcome::Cancelled;
        }

        tracing::debug!("[RelationTool] pointing at {}", source.id);
        editor.set_hinting(vec![source.id.clone()]);
        self.state = State::Pointing {
            source: source.id,
            down_ms: event.time_ms,
        };
        ToolOutcome::Pending
    }

    pub fn on_pointer_move(&mut self, editor: &mut Editor, event: &PointerEvent) -> ToolOutcome {
        editor.pointer_move(event);
        match self.state.clone() {
            State::Idle => ToolOutcome::Pending,
            State::Pointing { source, down_ms } => {
                if !editor.inputs.is_dragging {
                    return ToolOutcome::Pending;
                }
                self.start_dragging(editor, &source, down_ms, event)
            }
            State::DraggingHandle {
                relation,
                mark,
                down_ms,
            } => self.drag_end(editor, &relation, mark, down_ms, event),
        }
    }

    fn is_precise(&self, editor: &Editor, down_ms: u64, event: &PointerEvent) -> bool {
        event.alt_key
            || event.time_ms.saturating_sub(down_ms) >= editor.config().precise_timeout_ms
    }

    fn start_dragging(
        &mut self,
        editor: &mut Editor,
        source: &ShapeId,
        down_ms: u64,
        event: &PointerEvent,
    ) -> ToolOutcome {
        let Some(context) = self.context.clone() else {
            return self.cancel(editor);
        };
        let mark = editor.mark();
        let origin = editor.inputs.origin_page_point;
        let relation = editor.create_relation(origin, context.relation_type_id);
        let options = DragOptions {
            is_precise: self.is_precise(editor, down_ms, event),
            is_exact: false,
        };
        match on_handle_drag(editor, &relation, Handle::Start, origin, options) {
            DragOutcome::Bound(target) if &target == source => {}
            outcome => {
                tracing::debug!("[RelationTool] start did not bind to the source: {outcome:?}");
                editor.bail_to_mark(mark);
                return self.cancel(editor);
            }
        }
        editor.set_hinting(vec![relation.clone()]);
        self.state = State::DraggingHandle {
            relation: relation.clone(),
            mark,
            down_ms,
        };
        self.drag_end(editor, &relation, mark, down_ms, event)
    }

    fn drag_end(
        &mut self,
        editor: &mut Editor,
        relation: &ShapeId,
        mark: MarkId,
        down_ms: u64,
        event: &PointerEvent,
    ) -> ToolOutcome {
        let options = DragOptions {
            is_precise: self.is_precise(editor, down_ms, event),
            is_exact: false,
        };
        match on_handle_drag(editor, relation, Handle::End, event.point, options) {
            DragOutcome::Rejected | DragOutcome::Missing => {
                editor.bail_to_mark(mark);
                editor.set_hinting(Vec::new());
                self.state = State::Idle;
                ToolOutcome::Cancelled
            }
            _ => ToolOutcome::Pending,
        }
    }

    pub fn on_pointer_up(&mut self, editor: &mut Editor, event: &PointerEvent) -> ToolOutcome {
        editor.pointer_up(event);
        match self.state.clone() {
            State::Idle => ToolOutcome::Pending,
            State::Pointing { .. } => self.cancel(editor),
            State::DraggingHandle { relation, mark, .. } => {
                if !is_complete(editor, &relation) {
                    tracing::debug!("[RelationTool] {relation} incomplete, rolling back");
                    return self.cancel(editor);
                }
                editor.squash_mark(mark);
                editor.set_hinting(Vec::new());
                editor.select(&[relation.clone()]);
                editor.emit(CanvasEvent::RelationCompleted(relation.clone()));
                self.state = State::Idle;
                tracing::info!("[RelationTool] Completed relation {relation}");
                ToolOutcome::RelationCompleted(relation)
            }
        }
    }

    pub fn on_key_down(&mut self, editor: &mut Editor, key: &str) -> ToolOutcome {
        if key == ESCAPE_KEY && self.state != State::Idle {
            return self.cancel(editor);
        }
        ToolOutcome::Pending
    }

    pub fn on_cancel(&mut self, editor: &mut Editor) -> ToolOutcome {
        self.cancel(editor)
    }

    pub fn on_interrupt(&mut self, editor: &mut Editor) -> ToolOutcome {
        self.cancel(editor)
    }

    fn cancel(&mut self, editor: &mut Editor) -> ToolOutcome {
        editor.set_hinting(Vec::new());
        if let State::DraggingHandle { mark, .. } = self.state {
            editor.bail_to_mark(mark);
        }
        self.state = State::Idle;
        ToolOutcome::Cancelled
    }
}

/// Both ends bound, to two different nodes, with a drawable body.
fn is_complete(editor: &Editor, relation: &ShapeId) -> bool {
    let bindings = editor.bindings_from(relation);
    let (Some(start), Some(end)) = (bindings.start, bindings.end) else {
        return false;
    };
    start.to_id != end.to_id && relation_geometry(editor, relation).is_some()
}
