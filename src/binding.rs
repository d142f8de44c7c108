//! Keeps relation terminals attached to discourse nodes.
//!
//! A binding stores where on its node a terminal sits as a normalized anchor, so the stored handle
//! positions of a relation are only a cache: every function here re-derives them from the current
//! bindings and node bounds. Binding a terminal so that both ends land on nodes is the moment a
//! relation's legality is checked; an illegal relation is deleted on the spot.

use std::collections::BTreeSet;

use crate::{
    editor::Editor,
    geometry::{ArrowInput, Box2, RelationGeometry, TargetInput, TerminalInput, Vec2},
    shapes::{Binding, BindingProps, Handle, NodeShape, Shape, ShapeId, Terminal},
    validator::{is_valid_connection, resolve_direction_label},
};

/// Pointer speed (screen px/ms) under which entering a new node binds precisely.
pub const PRECISE_VELOCITY: f64 = 0.5;

const CENTER: Vec2 = Vec2::new(0.5, 0.5);

/// Distance from a node's centre, in page units, inside which anchors snap to the centre.
pub fn center_snap_radius(bounds: &Box2, zoom: f64) -> f64 {
    let radius = (0.15 * bounds.w.min(bounds.h)).min(16.0).max(4.0);
    radius / zoom.max(f64::EPSILON)
}

/// Where `point` sits within `bounds`, each axis clamped to `[0, 1]`, snapped to the centre when
/// close to it.
pub fn normalized_anchor(bounds: &Box2, point: Vec2, zoom: f64) -> Vec2 {
    let bounds = bounds.zero_fix();
    if point.dist(bounds.center()) <= center_snap_radius(&bounds, zoom) {
        return CENTER;
    }
    Vec2::new(
        ((point.x - bounds.x) / bounds.w).clamp(0.0, 1.0),
        ((point.y - bounds.y) / bounds.h).clamp(0.0, 1.0),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DragOptions {
    /// The caller already wants a precise binding (precise timer elapsed, modifier held).
    pub is_precise: bool,
    pub is_exact: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// The terminal is a free point.
    Free,
    Bound(ShapeId),
    /// The bend was updated from the middle handle.
    Bent(f64),
    /// Binding would have produced an illegal relation, which is gone now.
    Rejected,
    /// No such relation.
    Missing,
}

fn other_binding_on<'a>(
    start: Option<&'a Binding>,
    end: Option<&'a Binding>,
    terminal: Terminal,
) -> Option<&'a Binding> {
    match terminal {
        Terminal::Start => end,
        Terminal::End => start,
    }
}

/// Page point a bound terminal aims at, with the target it clips against.
///
/// Imprecise bindings aim at the node centre. Two bindings on the same node always use their
/// anchors, otherwise both would collapse onto the centre.
fn bound_terminal(
    editor: &Editor,
    start: Option<&Binding>,
    end: Option<&Binding>,
    terminal: Terminal,
) -> Option<(Vec2, TargetInput)> {
    let binding = match terminal {
        Terminal::Start => start?,
        Terminal::End => end?,
    };
    let node = editor.node(&binding.to_id)?;
    let bounds = node.bounds();
    let shares_target = other_binding_on(start, end, terminal)
        .map(|other| other.to_id == binding.to_id)
        .unwrap_or(false);
    let point = if binding.props.is_precise || shares_target {
        bounds.zero_fix().point_at(binding.props.normalized_anchor)
    } else {
        bounds.center()
    };
    Some((
        point,
        TargetInput {
            bounds,
            is_exact: binding.props.is_exact,
        },
    ))
}

/// Current body geometry of a relation, or None when it is missing or degenerate.
pub fn relation_geometry(editor: &Editor, relation_id: &ShapeId) -> Option<RelationGeometry> {
    let relation = editor.relation(relation_id)?;
    let bindings = editor.bindings_from(relation_id);
    let terminal_input = |terminal: Terminal| {
        match bound_terminal(
            editor,
            bindings.start.as_ref(),
            bindings.end.as_ref(),
            terminal,
        ) {
            Some((point, target)) => TerminalInput {
                point,
                target: Some(target),
            },
            None => TerminalInput::free(relation.handle_page(terminal)),
        }
    };
    RelationGeometry::compute(&ArrowInput {
        start: terminal_input(Terminal::Start),
        end: terminal_input(Terminal::End),
        bend: relation.props.bend,
        scale: relation.props.scale,
        label_position: relation.props.label_position,
        bound_offset: editor.config().bound_arrow_offset,
    })
}

/// Move the stored handles of bound terminals onto their anchors. Free terminals stay put.
pub fn sync_handles(editor: &mut Editor, relation_id: &ShapeId) {
    let bindings = editor.bindings_from(relation_id);
    let updates: Vec<(Terminal, Vec2)> = [Terminal::Start, Terminal::End]
        .into_iter()
        .filter_map(|terminal| {
            bound_terminal(
                editor,
                bindings.start.as_ref(),
                bindings.end.as_ref(),
                terminal,
            )
            .map(|(point, _)| (terminal, point))
        })
        .collect();
    if updates.is_empty() {
        return;
    }
    editor.update_relation(relation_id, |relation| {
        for (terminal, point) in updates {
            relation.set_handle_page(terminal, point);
        }
    });
}

/// Set the relation's text to the label or complement matching its current direction.
pub fn refresh_label(editor: &mut Editor, relation_id: &ShapeId) {
    let Some((start, end)) = editor.relation_endpoints(relation_id) else {
        return;
    };
    let Some(relation) = editor.relation(relation_id) else {
        return;
    };
    let text = resolve_direction_label(
        editor.schema(),
        &start.props.node_type_id,
        &end.props.node_type_id,
        &relation.props.relation_type_id,
    );
    if relation.props.text != text {
        editor.update_relation(relation_id, |relation| relation.props.text = text);
    }
}

fn is_bindable(shape: &Shape) -> bool {
    matches!(shape, Shape::Node(node) if !node.is_locked)
}

/// Drag one of a relation's handles to `point` (page space).
pub fn on_handle_drag(
    editor: &mut Editor,
    relation_id: &ShapeId,
    handle: Handle,
    point: Vec2,
    options: DragOptions,
) -> DragOutcome {
    if editor.relation(relation_id).is_none() {
        tracing::debug!("[binding] Drag on missing relation {relation_id}");
        return DragOutcome::Missing;
    }
    match handle.terminal() {
        None => bend_to(editor, relation_id, point),
        Some(terminal) => drag_terminal(editor, relation_id, terminal, point, options),
    }
}

fn bend_to(editor: &mut Editor, relation_id: &ShapeId, point: Vec2) -> DragOutcome {
    let Some(relation) = editor.relation(relation_id) else {
        return DragOutcome::Missing;
    };
    let a = relation.handle_page(Terminal::Start);
    let b = relation.handle_page(Terminal::End);
    let med = a.med(b);
    let delta = b - a;
    if delta.len() < f64::EPSILON {
        return DragOutcome::Bent(relation.props.bend);
    }
    let projected = Vec2::nearest_point_on_line(med - delta.per(), med + delta.per(), point);
    let mut bend = projected.dist(med);
    if Vec2::clockwise(projected, b, med) {
        bend = -bend;
    }
    editor.update_relation(relation_id, |relation| relation.props.bend = bend);
    DragOutcome::Bent(bend)
}

fn drag_terminal(
    editor: &mut Editor,
    relation_id: &ShapeId,
    terminal: Terminal,
    point: Vec2,
    options: DragOptions,
) -> DragOutcome {
    let target_id = editor.shape_at_point(point, 0.0, |shape| {
        shape.id() != relation_id && is_bindable(shape)
    });
    let Some(target_id) = target_id else {
        if editor.remove_binding(relation_id, terminal).is_some() {
            tracing::debug!("[binding] {relation_id} {terminal} unbound");
        }
        editor.update_relation(relation_id, |relation| {
            relation.set_handle_page(terminal, point)
        });
        return DragOutcome::Free;
    };
    let Some(target) = editor.node(&target_id).cloned() else {
        return DragOutcome::Free;
    };

    let bindings = editor.bindings_from(relation_id);
    let existing = bindings.get(terminal);
    let other = bindings.get(terminal.opposite()).cloned();
    let switching = existing.map(|b| b.to_id != target_id).unwrap_or(true);

    let slow = editor.inputs.pointer_velocity.len() < PRECISE_VELOCITY;
    let is_precise = options.is_precise
        || (switching && slow)
        || (!switching && existing.map(|b| b.props.is_precise).unwrap_or(false))
        || !target.is_closed()
        || other
            .as_ref()
            .map(|o| o.to_id == target_id && o.props.is_precise)
            .unwrap_or(false);

    // Both terminals on one node is a transient state of a drag; the tool never completes it.
    if switching {
        if let Some(other_target) = other
            .as_ref()
            .filter(|o| o.to_id != target_id)
            .and_then(|o| editor.node(&o.to_id))
        {
            let (start, end) = match terminal {
                Terminal::Start => (&target, other_target),
                Terminal::End => (other_target, &target),
            };
            if !check_connection(editor, relation_id, start, end) {
                editor.remove_binding(relation_id, terminal);
                editor.delete_shapes(&[relation_id.clone()]);
                return DragOutcome::Rejected;
            }
        }
    }

    let mut anchor = normalized_anchor(&target.bounds(), point, editor.zoom());
    let nudge = editor.config().anchor_nudge;
    if let Some(other) = other.as_ref().filter(|o| o.to_id == target_id) {
        if other.props.normalized_anchor.approx_eq(anchor, 1e-9) {
            match terminal {
                Terminal::End => anchor = nudged(anchor, nudge),
                Terminal::Start => {
                    let mut props = other.props.clone();
                    props.normalized_anchor = nudged(props.normalized_anchor, nudge);
                    editor.create_or_update_binding(relation_id, &target_id, props);
                }
            }
        }
    }

    editor.create_or_update_binding(
        relation_id,
        &target_id,
        BindingProps {
            terminal,
            normalized_anchor: anchor,
            is_precise,
            is_exact: options.is_exact,
        },
    );
    if switching {
        tracing::debug!(
            "[binding] {relation_id} {terminal} bound to {target_id} (precise: {is_precise})"
        );
    }
    sync_handles(editor, relation_id);
    refresh_label(editor, relation_id);
    DragOutcome::Bound(target_id)
}

fn nudged(anchor: Vec2, by: f64) -> Vec2 {
    let x = if anchor.x + by <= 1.0 {
        anchor.x + by
    } else {
        anchor.x - by
    };
    Vec2::new(x.clamp(0.0, 1.0), anchor.y)
}

/// Whether a relation between `start` and `end` may exist. Posts the warning toast when not.
fn check_connection(
    editor: &Editor,
    relation_id: &ShapeId,
    start: &NodeShape,
    end: &NodeShape,
) -> bool {
    let Some(relation) = editor.relation(relation_id) else {
        return false;
    };
    let schema = editor.schema();
    let relation_type_id = &relation.props.relation_type_id;
    if is_valid_connection(
        schema,
        &start.props.node_type_id,
        &end.props.node_type_id,
        relation_type_id,
    ) {
        return true;
    }
    let label = schema
        .relation_type(relation_type_id)
        .map(|rt| rt.label.clone())
        .unwrap_or_else(|| relation_type_id.to_string());
    let start_name = schema.node_type_name(&start.props.node_type_id);
    let end_name = schema.node_type_name(&end.props.node_type_id);
    editor.warn(
        "Invalid relation",
        &format!("A {start_name} cannot be connected to a {end_name} with \"{label}\"."),
    );
    false
}

/// Re-attach every relation bound to a node after the node moved or changed size.
pub fn on_node_changed(editor: &mut Editor, node_id: &ShapeId) {
    let relations: BTreeSet<ShapeId> = editor
        .bindings_to(node_id)
        .into_iter()
        .map(|b| b.from_id)
        .collect();
    for relation_id in relations.iter() {
        sync_handles(editor, relation_id);
    }
}

/// A bound terminal of a translated relation whose node is not being translated with it.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateAnchor {
    pub relation_id: ShapeId,
    pub terminal: Terminal,
    pub target_id: ShapeId,
    pub start_page: Vec2,
}

/// Record the bound terminals of a relation about to be dragged without its nodes, and mark
/// those bindings precise so the terminals slide from where they are.
pub fn on_translate_start(
    editor: &mut Editor,
    relation_id: &ShapeId,
    selection: &BTreeSet<ShapeId>,
) -> Vec<TranslateAnchor> {
    let bindings = editor.bindings_from(relation_id);
    let bound = [bindings.start.as_ref(), bindings.end.as_ref()];
    if bound.iter().flatten().any(|b| selection.contains(&b.to_id)) {
        return Vec::new();
    }
    let mut anchors = Vec::new();
    for binding in bound.into_iter().flatten() {
        let terminal = binding.props.terminal;
        let Some((point, _)) = bound_terminal(
            editor,
            bindings.start.as_ref(),
            bindings.end.as_ref(),
            terminal,
        ) else {
            continue;
        };
        anchors.push(TranslateAnchor {
            relation_id: relation_id.clone(),
            terminal,
            target_id: binding.to_id.clone(),
            start_page: point,
        });
    }
    for anchor in anchors.iter() {
        let Some(binding) = bindings.get(anchor.terminal) else {
            continue;
        };
        let Some(node) = editor.node(&anchor.target_id) else {
            continue;
        };
        let bounds = node.bounds().zero_fix();
        let mut props = binding.props.clone();
        props.normalized_anchor = Vec2::new(
            ((anchor.start_page.x - bounds.x) / bounds.w).clamp(0.0, 1.0),
            ((anchor.start_page.y - bounds.y) / bounds.h).clamp(0.0, 1.0),
        );
        props.is_precise = true;
        editor.create_or_update_binding(relation_id, &anchor.target_id, props);
    }
    anchors
}

/// Slide each recorded terminal to half the drag delta, unbinding it once its node is no longer
/// the topmost bindable shape under the new point.
pub fn on_translate(editor: &mut Editor, anchors: &[TranslateAnchor], delta: Vec2) {
    for anchor in anchors {
        let point = anchor.start_page + delta * 0.5;
        let Some(node) = editor.node(&anchor.target_id) else {
            continue;
        };
        let bounds = node.bounds().zero_fix();
        let hit = editor.shape_at_point(point, 0.0, |shape| {
            shape.id() != &anchor.relation_id && is_bindable(shape)
        });
        let existing = editor
            .bindings_from(&anchor.relation_id)
            .get(anchor.terminal)
            .filter(|b| b.to_id == anchor.target_id)
            .cloned();
        let (Some(existing), true) = (existing, hit.as_ref() == Some(&anchor.target_id)) else {
            if editor
                .remove_binding(&anchor.relation_id, anchor.terminal)
                .is_some()
            {
                tracing::debug!(
                    "[binding] {} {} slid off {}",
                    anchor.relation_id,
                    anchor.terminal,
                    anchor.target_id
                );
            }
            continue;
        };
        let props = BindingProps {
            normalized_anchor: Vec2::new(
                ((point.x - bounds.x) / bounds.w).clamp(0.0, 1.0),
                ((point.y - bounds.y) / bounds.h).clamp(0.0, 1.0),
            ),
            is_precise: true,
            ..existing.props
        };
        editor.create_or_update_binding(&anchor.relation_id, &anchor.target_id, props);
    }
    let relations: BTreeSet<&ShapeId> = anchors.iter().map(|a| &a.relation_id).collect();
    for relation_id in relations {
        sync_handles(editor, relation_id);
    }
}

/// Moves a set of shapes together, keeping relation bindings consistent on every step.
#[derive(Debug, Clone, Default)]
pub struct TranslateSession {
    initial: Vec<(ShapeId, Vec2)>,
    anchors: Vec<TranslateAnchor>,
}

impl TranslateSession {
    pub fn start(editor: &mut Editor, ids: &[ShapeId]) -> TranslateSession {
        let selection: BTreeSet<ShapeId> = ids.iter().cloned().collect();
        let mut session = TranslateSession::default();
        for id in ids {
            match editor.shape(id) {
                Some(Shape::Node(node)) if !node.is_locked => {
                    session.initial.push((id.clone(), Vec2::new(node.x, node.y)));
                }
                Some(Shape::Relation(relation)) if !relation.is_locked => {
                    session.initial.push((id.clone(), relation.origin()));
                    let anchors = on_translate_start(editor, id, &selection);
                    session.anchors.extend(anchors);
                }
                _ => {}
            }
        }
        session
    }

    /// Place every shape at its start position plus `delta`.
    pub fn update(&self, editor: &mut Editor, delta: Vec2) {
        for (id, origin) in self.initial.iter() {
            let target = *origin + delta;
            editor.update_relation(id, |relation| {
                relation.x = target.x;
                relation.y = target.y;
            });
        }
        on_translate(editor, &self.anchors, delta);
        for (id, origin) in self.initial.iter() {
            let target = *origin + delta;
            if editor.node(id).is_some() {
                editor.update_node(id, |node| {
                    node.x = target.x;
                    node.y = target.y;
                });
            }
        }
    }
}

/// Apply a resize of a relation by `scale_x`/`scale_y` about its origin.
pub fn on_resize(editor: &mut Editor, relation_id: &ShapeId, scale_x: f64, scale_y: f64) {
    let bindings = editor.bindings_from(relation_id);
    let flip_x = scale_x < 0.0;
    let flip_y = scale_y < 0.0;

    for binding in [bindings.start.as_ref(), bindings.end.as_ref()]
        .into_iter()
        .flatten()
    {
        if !flip_x && !flip_y {
            continue;
        }
        let mut props = binding.props.clone();
        if flip_x {
            props.normalized_anchor.x = 1.0 - props.normalized_anchor.x;
        }
        if flip_y {
            props.normalized_anchor.y = 1.0 - props.normalized_anchor.y;
        }
        editor.create_or_update_binding(relation_id, &binding.to_id, props);
    }

    let start_bound = bindings.start.is_some();
    let end_bound = bindings.end.is_some();
    editor.update_relation(relation_id, |relation| {
        let scale = |p: Vec2| Vec2::new(p.x * scale_x, p.y * scale_y);
        if !start_bound {
            relation.props.start = scale(relation.props.start);
        }
        if !end_bound {
            relation.props.end = scale(relation.props.end);
        }
        let mut bend = relation.props.bend * scale_x.abs().max(scale_y.abs());
        if flip_x != flip_y {
            bend = -bend;
        }
        relation.props.bend = bend;
    });
    sync_handles(editor, relation_id);
}
