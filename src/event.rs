use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::shapes::{BindingId, ShapeId};

/// Indicates the origin of a CanvasEvent so listeners can tell user edits from store loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EventOrigin {
    /// Produced by an interaction with this editor. Persisted by the canvas saver.
    #[default]
    Local,

    /// Produced while (re)loading records from the canvas file. Already on disk, never saved back.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanvasEvent {
    ShapeCreated(ShapeId, EventOrigin),
    ShapeUpdated(ShapeId, EventOrigin),
    ShapesRemoved(Vec<ShapeId>, EventOrigin),
    /// Binding id, relation shape id
    BindingUpdate(BindingId, ShapeId, EventOrigin),
    BindingRemoved(BindingId, ShapeId, EventOrigin),
    /// A relation shape has both terminals bound and the interaction that drew it has ended.
    RelationCompleted(ShapeId),
    /// The whole store was replaced, either from disk or by rolling back to a history mark.
    StoreReplaced(EventOrigin),
}

impl CanvasEvent {
    /// Returns the EventOrigin of this event, or None for interaction signals
    pub fn origin(&self) -> Option<EventOrigin> {
        match self {
            CanvasEvent::ShapeCreated(_, origin) => Some(*origin),
            CanvasEvent::ShapeUpdated(_, origin) => Some(*origin),
            CanvasEvent::ShapesRemoved(_, origin) => Some(*origin),
            CanvasEvent::BindingUpdate(_, _, origin) => Some(*origin),
            CanvasEvent::BindingRemoved(_, _, origin) => Some(*origin),
            CanvasEvent::RelationCompleted(_) => None,
            CanvasEvent::StoreReplaced(origin) => Some(*origin),
        }
    }

    /// Whether this event changed store content that the canvas file should eventually reflect.
    pub fn is_local_mutation(&self) -> bool {
        self.origin() == Some(EventOrigin::Local)
    }
}

impl Display for CanvasEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CanvasEvent::ShapeCreated(id, _) => write!(f, "ShapeCreated({id})"),
            CanvasEvent::ShapeUpdated(id, _) => write!(f, "ShapeUpdated({id})"),
            CanvasEvent::ShapesRemoved(ids, _) => write!(f, "ShapesRemoved({})", ids.len()),
            CanvasEvent::BindingUpdate(id, _, _) => write!(f, "BindingUpdate({id})"),
            CanvasEvent::BindingRemoved(id, _, _) => write!(f, "BindingRemoved({id})"),
            CanvasEvent::RelationCompleted(id) => write!(f, "RelationCompleted({id})"),
            CanvasEvent::StoreReplaced(_) => write!(f, "StoreReplaced"),
        }
    }
}
