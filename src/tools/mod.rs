//! Pointer-driven tools. A tool receives editor input events one at a time and reports what, if
//! anything, the gesture produced.

pub mod node;
pub mod relation;

pub use node::{NodeTool, NodeToolContext};
pub use relation::{RelationTool, RelationToolContext};

use serde::Serialize;

use crate::shapes::ShapeId;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "shapeId", rename_all = "camelCase")]
pub enum ToolOutcome {
    /// Nothing finished yet.
    #[default]
    Pending,
    /// The gesture was abandoned and every change it made rolled back.
    Cancelled,
    /// A node was created.
    NodeCreated(ShapeId),
    /// A relation with both ends bound to legal nodes, ready for reification.
    RelationCompleted(ShapeId),
}

pub const ESCAPE_KEY: &str = "Escape";
