pub mod arrow;
pub mod vec;

pub use arrow::{ArrowInput, ArrowheadPath, Body, RelationGeometry, TargetInput, TerminalInput};
pub use vec::{
    circle_center_from_points, dist_to_segment, intersect_circle_box, intersect_segment_box, Box2,
    Vec2, EPSILON,
};
