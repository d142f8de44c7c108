//! The canvas editor store: shapes in paint order, relation bindings, camera zoom, pointer input,
//! selection/hinting, and history marks for rolling back an interaction.
//!
//! The editor is single-threaded. Hosts that need to reach it from async tasks share it as a
//! [SharedEditor] and hold the lock only between `.await` points.

use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    binding,
    config::CanvasConfig,
    error::DiscourseError,
    event::{CanvasEvent, EventOrigin},
    geometry::{dist_to_segment, Vec2},
    schema::{NodeTypeId, RelationTypeId, TypeSchema},
    shapes::{
        index_after, Arrowhead, Binding, BindingId, BindingProps, NodeProps, NodeShape, Record,
        RelationProps, RelationShape, Shape, ShapeId, Terminal,
    },
    toast::ToastBus,
};

pub type SharedEditor = Arc<Mutex<Editor>>;

/// Screen-space distance the pointer must travel before a press becomes a drag.
pub const DRAG_DISTANCE: f64 = 4.0;

/// Screen-space tolerance for hitting a relation's stroke.
const RELATION_HIT_MARGIN: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerEvent {
    /// Pointer position in page space.
    pub point: Vec2,
    /// Event timestamp in milliseconds.
    pub time_ms: u64,
    pub alt_key: bool,
    pub shift_key: bool,
}

impl PointerEvent {
    pub fn at(x: f64, y: f64, time_ms: u64) -> Self {
        PointerEvent {
            point: Vec2::new(x, y),
            time_ms,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub origin_page_point: Vec2,
    pub current_page_point: Vec2,
    /// Smoothed pointer velocity in screen pixels per millisecond.
    pub pointer_velocity: Vec2,
    pub last_time_ms: u64,
    pub alt_key: bool,
    pub shift_key: bool,
    pub is_pointer_down: bool,
    pub is_dragging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkId(u64);

#[derive(Debug, Clone, Default)]
struct StoreSnapshot {
    shapes: BTreeMap<ShapeId, Shape>,
    order: Vec<ShapeId>,
    bindings: BTreeMap<BindingId, Binding>,
}

/// Both bindings of one relation shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationBindings {
    pub start: Option<Binding>,
    pub end: Option<Binding>,
}

impl RelationBindings {
    pub fn get(&self, terminal: Terminal) -> Option<&Binding> {
        match terminal {
            Terminal::Start => self.start.as_ref(),
            Terminal::End => self.end.as_ref(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

pub struct Editor {
    canvas_id: String,
    schema: Arc<TypeSchema>,
    config: CanvasConfig,
    store: StoreSnapshot,
    /// Snapshot records of other shape and record types, written back untouched.
    foreign_records: Vec<Value>,
    zoom: f64,
    pub inputs: InputState,
    selected: BTreeSet<ShapeId>,
    hinting: Vec<ShapeId>,
    marks: Vec<(MarkId, StoreSnapshot)>,
    next_mark: u64,
    toasts: ToastBus,
    event_tx: Option<UnboundedSender<CanvasEvent>>,
}

impl Editor {
    pub fn new(
        canvas_id: &str,
        schema: Arc<TypeSchema>,
        config: CanvasConfig,
        toasts: ToastBus,
    ) -> Self {
        Editor {
            canvas_id: canvas_id.to_string(),
            schema,
            config,
            store: StoreSnapshot::default(),
            foreign_records: Vec::new(),
            zoom: 1.0,
            inputs: InputState::default(),
            selected: BTreeSet::new(),
            hinting: Vec::new(),
            marks: Vec::new(),
            next_mark: 0,
            toasts,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<CanvasEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn into_shared(self) -> SharedEditor {
        Arc::new(Mutex::new(self))
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    pub fn schema(&self) -> &TypeSchema {
        &self.schema
    }

    pub fn set_schema(&mut self, schema: Arc<TypeSchema>) {
        self.schema = schema;
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn toasts(&self) -> &ToastBus {
        &self.toasts
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        }
    }

    pub(crate) fn emit(&self, event: CanvasEvent) {
        if let Some(tx) = self.event_tx.as_ref() {
            if let Err(e) = tx.send(event) {
                tracing::debug!("[Editor] Event listener gone: {}", e.0);
            }
        }
    }

    /// Post a warning toast scoped to this canvas.
    pub fn warn(&self, title: &str, description: &str) {
        self.toasts.warn(&self.canvas_id, title, description);
    }

    pub fn error(&self, title: &str, description: &str) {
        self.toasts.error(&self.canvas_id, title, description);
    }

    // --- pointer input ---------------------------------------------------------------------

    pub fn pointer_down(&mut self, event: &PointerEvent) {
        self.inputs = InputState {
            origin_page_point: event.point,
            current_page_point: event.point,
            pointer_velocity: Vec2::ZERO,
            last_time_ms: event.time_ms,
            alt_key: event.alt_key,
            shift_key: event.shift_key,
            is_pointer_down: true,
            is_dragging: false,
        };
    }

    pub fn pointer_move(&mut self, event: &PointerEvent) {
        let elapsed = event.time_ms.saturating_sub(self.inputs.last_time_ms);
        if elapsed > 0 {
            let screen_delta = (event.point - self.inputs.current_page_point) * self.zoom;
            let instant = screen_delta * (1.0 / elapsed as f64);
            self.inputs.pointer_velocity = self.inputs.pointer_velocity.lerp(instant, 0.5);
        }
        self.inputs.current_page_point = event.point;
        self.inputs.last_time_ms = event.time_ms;
        self.inputs.alt_key = event.alt_key;
        self.inputs.shift_key = event.shift_key;
        if self.inputs.is_pointer_down
            && !self.inputs.is_dragging
            && self.inputs.origin_page_point.dist(event.point) * self.zoom > DRAG_DISTANCE
        {
            self.inputs.is_dragging = true;
        }
    }

    pub fn pointer_up(&mut self, event: &PointerEvent) {
        self.pointer_move(event);
        self.inputs.is_pointer_down = false;
        self.inputs.is_dragging = false;
    }

    // --- shapes ----------------------------------------------------------------------------

    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.store.shapes.get(id)
    }

    pub fn node(&self, id: &ShapeId) -> Option<&NodeShape> {
        self.shape(id).and_then(Shape::as_node)
    }

    pub fn relation(&self, id: &ShapeId) -> Option<&RelationShape> {
        self.shape(id).and_then(Shape::as_relation)
    }

    /// Shapes in paint order, back to front.
    pub fn shapes(&self) -> impl DoubleEndedIterator<Item = &Shape> {
        self.store
            .order
            .iter()
            .filter_map(|id| self.store.shapes.get(id))
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationShape> {
        self.shapes().filter_map(Shape::as_relation)
    }

    pub fn create_shape(&mut self, mut shape: Shape) -> ShapeId {
        let id = shape.id().clone();
        let next = index_after(
            self.store
                .order
                .last()
                .and_then(|id| self.store.shapes.get(id))
                .map(index_of),
        );
        shape
            .extra_mut()
            .entry("index")
            .or_insert_with(|| Value::String(next));
        if self.store.shapes.insert(id.clone(), shape).is_none() {
            self.store.order.push(id.clone());
        }
        tracing::debug!("[Editor] Created {id}");
        self.emit(CanvasEvent::ShapeCreated(id.clone(), EventOrigin::Local));
        id
    }

    pub fn create_node(
        &mut self,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        node_type_id: NodeTypeId,
        title: &str,
    ) -> ShapeId {
        self.create_shape(Shape::Node(NodeShape {
            id: ShapeId::new(),
            x,
            y,
            is_locked: false,
            props: NodeProps {
                w,
                h,
                src: None,
                title: title.to_string(),
                node_type_id,
                image_src: None,
            },
            extra: Default::default(),
        }))
    }

    /// A zero-length relation at `origin`, not yet bound to anything.
    pub fn create_relation(&mut self, origin: Vec2, relation_type_id: RelationTypeId) -> ShapeId {
        let color = self
            .schema
            .relation_type(&relation_type_id)
            .map(|rt| rt.color.clone())
            .unwrap_or_default();
        let label_position = self.config.label_position;
        self.create_shape(Shape::Relation(RelationShape {
            id: ShapeId::new(),
            x: origin.x,
            y: origin.y,
            is_locked: false,
            props: RelationProps {
                start: Vec2::ZERO,
                end: Vec2::ZERO,
                bend: 0.0,
                arrowhead_start: Arrowhead::None,
                arrowhead_end: Arrowhead::Arrow,
                text: String::new(),
                relation_type_id,
                scale: 1.0,
                label_position,
                color,
            },
            extra: Default::default(),
        }))
    }

    /// Mutate a node, then keep every relation bound to it attached.
    pub fn update_node<F: FnOnce(&mut NodeShape)>(&mut self, id: &ShapeId, f: F) -> bool {
        let Some(Shape::Node(node)) = self.store.shapes.get_mut(id) else {
            return false;
        };
        f(node);
        self.emit(CanvasEvent::ShapeUpdated(id.clone(), EventOrigin::Local));
        binding::on_node_changed(self, id);
        true
    }

    pub fn update_relation<F: FnOnce(&mut RelationShape)>(&mut self, id: &ShapeId, f: F) -> bool {
        let Some(Shape::Relation(relation)) = self.store.shapes.get_mut(id) else {
            return false;
        };
        f(relation);
        self.emit(CanvasEvent::ShapeUpdated(id.clone(), EventOrigin::Local));
        true
    }

    /// Delete shapes together with every binding from or to them. Never touches backing files.
    pub fn delete_shapes(&mut self, ids: &[ShapeId]) {
        let doomed: BTreeSet<&ShapeId> = ids.iter().collect();
        let removed_bindings: Vec<Binding> = self
            .store
            .bindings
            .values()
            .filter(|b| doomed.contains(&b.from_id) || doomed.contains(&b.to_id))
            .cloned()
            .collect();
        for b in removed_bindings.iter() {
            self.store.bindings.remove(&b.id);
            self.emit(CanvasEvent::BindingRemoved(
                b.id.clone(),
                b.from_id.clone(),
                EventOrigin::Local,
            ));
        }
        let mut removed = Vec::new();
        for id in ids {
            if self.store.shapes.remove(id).is_some() {
                removed.push(id.clone());
            }
        }
        self.store.order.retain(|id| !doomed.contains(id));
        self.selected.retain(|id| !doomed.contains(id));
        self.hinting.retain(|id| !doomed.contains(id));
        if !removed.is_empty() {
            tracing::debug!("[Editor] Deleted {} shape(s)", removed.len());
            self.emit(CanvasEvent::ShapesRemoved(removed, EventOrigin::Local));
        }
    }

    /// Topmost shape under `point` accepted by `filter`. Nodes hit inside their bounds expanded by
    /// `margin`; relations hit near the segment between their handles.
    pub fn shape_at_point<F: Fn(&Shape) -> bool>(
        &self,
        point: Vec2,
        margin: f64,
        filter: F,
    ) -> Option<ShapeId> {
        self.shapes()
            .rev()
            .filter(|shape| filter(shape))
            .find(|shape| match shape {
                Shape::Node(node) => node.bounds().expand_by(margin).contains(point),
                Shape::Relation(rel) => {
                    let tolerance = margin + RELATION_HIT_MARGIN / self.zoom;
                    dist_to_segment(
                        point,
                        rel.handle_page(Terminal::Start),
                        rel.handle_page(Terminal::End),
                    ) <= tolerance
                }
            })
            .map(|shape| shape.id().clone())
    }

    // --- bindings --------------------------------------------------------------------------

    pub fn bindings_from(&self, relation_id: &ShapeId) -> RelationBindings {
        let mut bindings = RelationBindings::default();
        for b in self
            .store
            .bindings
            .values()
            .filter(|b| &b.from_id == relation_id)
        {
            match b.props.terminal {
                Terminal::Start => bindings.start = Some(b.clone()),
                Terminal::End => bindings.end = Some(b.clone()),
            }
        }
        bindings
    }

    pub fn bindings_to(&self, node_id: &ShapeId) -> Vec<Binding> {
        self.store
            .bindings
            .values()
            .filter(|b| &b.to_id == node_id)
            .cloned()
            .collect()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.store.bindings.values()
    }

    pub fn create_or_update_binding(
        &mut self,
        relation_id: &ShapeId,
        target_id: &ShapeId,
        props: BindingProps,
    ) -> BindingId {
        let terminal = props.terminal;
        let existing = self
            .store
            .bindings
            .values_mut()
            .find(|b| &b.from_id == relation_id && b.props.terminal == terminal);
        let id = match existing {
            Some(b) => {
                b.to_id = target_id.clone();
                b.props = props;
                b.id.clone()
            }
            None => {
                let b = Binding {
                    id: BindingId::new(),
                    from_id: relation_id.clone(),
                    to_id: target_id.clone(),
                    props,
                    extra: Default::default(),
                };
                let id = b.id.clone();
                self.store.bindings.insert(id.clone(), b);
                id
            }
        };
        self.emit(CanvasEvent::BindingUpdate(
            id.clone(),
            relation_id.clone(),
            EventOrigin::Local,
        ));
        id
    }

    pub fn remove_binding(&mut self, relation_id: &ShapeId, terminal: Terminal) -> Option<Binding> {
        let id = self
            .store
            .bindings
            .values()
            .find(|b| &b.from_id == relation_id && b.props.terminal == terminal)
            .map(|b| b.id.clone())?;
        let removed = self.store.bindings.remove(&id);
        self.emit(CanvasEvent::BindingRemoved(
            id,
            relation_id.clone(),
            EventOrigin::Local,
        ));
        removed
    }

    /// The node shapes a relation's start and end are bound to, when both are.
    pub fn relation_endpoints(&self, relation_id: &ShapeId) -> Option<(&NodeShape, &NodeShape)> {
        let bindings = self.bindings_from(relation_id);
        let start = self.node(&bindings.start?.to_id)?;
        let end = self.node(&bindings.end?.to_id)?;
        Some((start, end))
    }

    // --- selection and hinting -------------------------------------------------------------

    pub fn select(&mut self, ids: &[ShapeId]) {
        self.selected = ids.iter().cloned().collect();
    }

    pub fn selected_ids(&self) -> &BTreeSet<ShapeId> {
        &self.selected
    }

    pub fn is_selected(&self, id: &ShapeId) -> bool {
        self.selected.contains(id)
    }

    pub fn set_hinting(&mut self, ids: Vec<ShapeId>) {
        self.hinting = ids;
    }

    pub fn hinting(&self) -> &[ShapeId] {
        &self.hinting
    }

    // --- history ---------------------------------------------------------------------------

    /// Record a point the store can be rolled back to.
    pub fn mark(&mut self) -> MarkId {
        self.next_mark += 1;
        let id = MarkId(self.next_mark);
        self.marks.push((id, self.store.clone()));
        id
    }

    /// Restore the store to `mark`, discarding it and every later mark.
    pub fn bail_to_mark(&mut self, mark: MarkId) -> bool {
        let Some(idx) = self.marks.iter().position(|(id, _)| *id == mark) else {
            tracing::warn!("[Editor] bail_to_mark: unknown mark {:?}", mark);
            return false;
        };
        let (_, snapshot) = self.marks.swap_remove(idx);
        self.marks.truncate(idx);
        self.store = snapshot;
        let store = &self.store;
        self.selected.retain(|id| store.shapes.contains_key(id));
        self.hinting.retain(|id| store.shapes.contains_key(id));
        tracing::debug!("[Editor] Rolled back to {:?}", mark);
        self.emit(CanvasEvent::StoreReplaced(EventOrigin::Local));
        true
    }

    /// Keep the changes made since `mark` and forget the mark.
    pub fn squash_mark(&mut self, mark: MarkId) {
        self.marks.retain(|(id, _)| *id != mark);
    }

    // --- snapshot records ------------------------------------------------------------------

    pub fn records(&self) -> Result<Vec<Value>, DiscourseError> {
        let mut records = self.foreign_records.clone();
        for shape in self.shapes() {
            records.push(Record::Shape(shape.clone()).to_value()?);
        }
        for binding in self.store.bindings.values() {
            records.push(Record::Binding(binding.clone()).to_value()?);
        }
        Ok(records)
    }

    /// Replace the store with snapshot records read from the canvas file.
    pub fn load_records(&mut self, records: &[Value]) -> Result<(), DiscourseError> {
        let mut store = StoreSnapshot::default();
        let mut foreign = Vec::new();
        let mut shapes = Vec::new();
        for value in records {
            match Record::from_value(value)? {
                Some(Record::Shape(shape)) => shapes.push(shape),
                Some(Record::Binding(binding)) => {
                    store.bindings.insert(binding.id.clone(), binding);
                }
                None => foreign.push(value.clone()),
            }
        }
        shapes.sort_by(|a, b| index_of(a).cmp(index_of(b)));
        for shape in shapes {
            store.order.push(shape.id().clone());
            store.shapes.insert(shape.id().clone(), shape);
        }
        let dangling: Vec<BindingId> = store
            .bindings
            .values()
            .filter(|b| !store.shapes.contains_key(&b.from_id) || !store.shapes.contains_key(&b.to_id))
            .map(|b| b.id.clone())
            .collect();
        for id in dangling {
            tracing::warn!("[Editor] Dropping binding {id} with a missing shape");
            store.bindings.remove(&id);
        }
        self.store = store;
        self.foreign_records = foreign;
        self.marks.clear();
        self.selected.clear();
        self.hinting.clear();
        self.emit(CanvasEvent::StoreReplaced(EventOrigin::Remote));
        Ok(())
    }
}

fn index_of(shape: &Shape) -> &str {
    let extra = match shape {
        Shape::Node(n) => &n.extra,
        Shape::Relation(r) => &r.extra,
    };
    extra.get("index").and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{claim_evidence_schema, test_editor};
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn bail_to_mark_restores_store() {
        let mut editor = test_editor();
        let keep = editor.create_node(0.0, 0.0, 100.0, 50.0, "claim".into(), "CLM - a");
        let mark = editor.mark();
        let temp = editor.create_node(200.0, 0.0, 100.0, 50.0, "claim".into(), "CLM - b");
        editor.select(&[temp.clone()]);
        assert!(editor.bail_to_mark(mark));
        assert!(editor.shape(&keep).is_some());
        assert!(editor.shape(&temp).is_none());
        assert!(editor.selected_ids().is_empty());
        assert!(!editor.bail_to_mark(mark));
    }

    #[test]
    fn topmost_shape_wins_hit_test() {
        let mut editor = test_editor();
        let below = editor.create_node(0.0, 0.0, 100.0, 100.0, "claim".into(), "CLM - a");
        let above = editor.create_node(50.0, 50.0, 100.0, 100.0, "claim".into(), "CLM - b");
        let hit = editor.shape_at_point(Vec2::new(75.0, 75.0), 0.0, |_| true);
        assert_eq!(hit, Some(above.clone()));
        let hit = editor.shape_at_point(Vec2::new(75.0, 75.0), 0.0, |s| s.id() != &above);
        assert_eq!(hit, Some(below));
        assert!(editor
            .shape_at_point(Vec2::new(500.0, 500.0), 0.0, |_| true)
            .is_none());
    }

    #[test]
    fn new_shapes_index_above_the_top_after_deletion() {
        let mut editor = test_editor();
        let a = editor.create_node(0.0, 0.0, 10.0, 10.0, "claim".into(), "CLM - a");
        let b = editor.create_node(20.0, 0.0, 10.0, 10.0, "claim".into(), "CLM - b");
        let c = editor.create_node(40.0, 0.0, 10.0, 10.0, "claim".into(), "CLM - c");
        editor.delete_shapes(&[a]);
        let d = editor.create_node(60.0, 0.0, 10.0, 10.0, "claim".into(), "CLM - d");

        let index = |id: &ShapeId| index_of(editor.shape(id).unwrap()).to_string();
        assert!(index(&b) < index(&c));
        assert!(index(&c) < index(&d));
    }

    #[test]
    fn deleting_a_node_drops_its_bindings() {
        let mut editor = test_editor();
        let node = editor.create_node(0.0, 0.0, 100.0, 100.0, "claim".into(), "CLM - a");
        let rel = editor.create_relation(Vec2::new(50.0, 50.0), "supports".into());
        editor.create_or_update_binding(
            &rel,
            &node,
            BindingProps {
                terminal: Terminal::Start,
                normalized_anchor: Vec2::new(0.5, 0.5),
                is_precise: false,
                is_exact: false,
            },
        );
        assert!(editor.bindings_from(&rel).start.is_some());
        editor.delete_shapes(&[node]);
        assert!(editor.bindings_from(&rel).start.is_none());
        assert!(editor.relation(&rel).is_some());
    }

    #[test]
    fn records_round_trip_and_keep_foreign_records() {
        let (tx, mut rx) = unbounded_channel();
        let mut editor = Editor::new(
            "canvas.md",
            Arc::new(claim_evidence_schema()),
            CanvasConfig::default(),
            ToastBus::new(),
        )
        .with_event_tx(tx);
        let a = editor.create_node(0.0, 0.0, 100.0, 100.0, "claim".into(), "CLM - a");
        let b = editor.create_node(300.0, 0.0, 100.0, 100.0, "evidence".into(), "EVD - b");
        assert!(matches!(rx.try_recv(), Ok(CanvasEvent::ShapeCreated(id, _)) if id == a));

        let mut records = editor.records().unwrap();
        records.push(serde_json::json!({"id": "page:page", "typeName": "page"}));

        let mut reloaded = Editor::new(
            "canvas.md",
            Arc::new(claim_evidence_schema()),
            CanvasConfig::default(),
            ToastBus::new(),
        );
        reloaded.load_records(&records).unwrap();
        let order: Vec<&ShapeId> = reloaded.shapes().map(Shape::id).collect();
        assert_eq!(order, vec![&a, &b]);
        assert_eq!(reloaded.records().unwrap().len(), 3);
    }

    #[test]
    fn drag_starts_after_threshold() {
        let mut editor = test_editor();
        editor.pointer_down(&PointerEvent::at(0.0, 0.0, 0));
        editor.pointer_move(&PointerEvent::at(2.0, 0.0, 10));
        assert!(!editor.inputs.is_dragging);
        editor.pointer_move(&PointerEvent::at(10.0, 0.0, 20));
        assert!(editor.inputs.is_dragging);
        assert!(editor.inputs.pointer_velocity.x > 0.0);
    }
}
