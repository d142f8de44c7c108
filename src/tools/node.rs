use serde::{Deserialize, Serialize};

use super::{ToolOutcome, ESCAPE_KEY};
use crate::{
    editor::{Editor, PointerEvent},
    geometry::Box2,
    schema::NodeTypeId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeToolContext {
    pub node_type_id: NodeTypeId,
}

/// Places a new, unlinked discourse node: click for a default-sized node, drag to size it.
#[derive(Debug, Clone, Default)]
pub struct NodeTool {
    context: Option<NodeToolContext>,
    pointing: bool,
}

impl NodeTool {
    pub fn new() -> Self {
        NodeTool::default()
    }

    pub fn set_context(&mut self, context: Option<NodeToolContext>) {
        self.context = context;
    }

    pub fn state_name(&self) -> &'static str {
        if self.pointing {
            "pointing"
        } else {
            "idle"
        }
    }

    pub fn on_pointer_down(&mut self, editor: &mut Editor, event: &PointerEvent) -> ToolOutcome {
        editor.pointer_down(event);
        if self.context.is_none() {
            editor.warn(
                "No node type selected",
                "Choose a node type before placing a node.",
            );
            self.pointing = false;
            return ToolOutcome::Cancelled;
        }
        self.pointing = true;
        ToolOutcome::Pending
    }

    pub fn on_pointer_move(&mut self, editor: &mut Editor, event: &PointerEvent) -> ToolOutcome {
        editor.pointer_move(event);
        ToolOutcome::Pending
    }

    pub fn on_pointer_up(&mut self, editor: &mut Editor, event: &PointerEvent) -> ToolOutcome {
        let was_dragging = editor.inputs.is_dragging
            || editor.inputs.origin_page_point.dist(event.point) * editor.zoom()
                > crate::editor::DRAG_DISTANCE;
        editor.pointer_up(event);
        if !std::mem::take(&mut self.pointing) {
            return ToolOutcome::Pending;
        }
        let Some(context) = self.context.clone() else {
            return ToolOutcome::Cancelled;
        };
        let config = editor.config();
        let bounds = if was_dragging {
            let rect = Box2::from_points(editor.inputs.origin_page_point, event.point);
            let min = config.min_node_size;
            Box2::new(rect.x, rect.y, rect.w.max(min), rect.h.max(min))
        } else {
            Box2::from_center(
                event.point,
                config.default_node_width,
                config.default_node_height,
            )
        };
        let title = editor
            .schema()
            .node_type(&context.node_type_id)
            .map(|nt| nt.format_title(""))
            .unwrap_or_default();
        let id = editor.create_node(
            bounds.x,
            bounds.y,
            bounds.w,
            bounds.h,
            context.node_type_id,
            title.trim(),
        );
        editor.select(&[id.clone()]);
        tracing::debug!("[NodeTool] Placed {id}");
        ToolOutcome::NodeCreated(id)
    }

    pub fn on_key_down(&mut self, _editor: &mut Editor, key: &str) -> ToolOutcome {
        if key == ESCAPE_KEY && self.pointing {
            self.pointing = false;
            return ToolOutcome::Cancelled;
        }
        ToolOutcome::Pending
    }

    pub fn on_cancel(&mut self, _editor: &mut Editor) -> ToolOutcome {
        self.pointing = false;
        ToolOutcome::Cancelled
    }
}
