//! Canvas records: discourse node shapes, relation shapes and the bindings that glue a relation's
//! terminals to nodes.
//!
//! Records serialize in the editor's snapshot layout (`typeName`, `type`, `props`) so a canvas
//! file written by the plugin can be read back here and vice versa.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::{
    error::DiscourseError,
    geometry::{Box2, Vec2},
    schema::{NodeTypeId, RelationTypeId},
};

pub const NODE_SHAPE_TYPE: &str = "discourse-node";
pub const RELATION_SHAPE_TYPE: &str = "discourse-relation";
pub const RELATION_BINDING_TYPE: &str = "discourse-relation";

/// Prefix of the opaque token a node shape's `src` holds.
pub const BLOCK_REF_PREFIX: &str = "asset:obsidian.blockref.";

static ID_NODE_BYTES: Lazy<[u8; 6]> = Lazy::new(|| {
    let mut bytes = [0u8; 6];
    if let Err(e) = getrandom::getrandom(&mut bytes) {
        tracing::warn!("No entropy for record ids, falling back to a fixed node id: {e}");
    }
    bytes
});

fn fresh_id() -> String {
    Uuid::now_v6(&ID_NODE_BYTES).simple().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(pub String);

impl ShapeId {
    pub fn new() -> Self {
        ShapeId(format!("shape:{}", fresh_id()))
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        ShapeId::new()
    }
}

impl Display for ShapeId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(s: &str) -> Self {
        if s.starts_with("shape:") {
            ShapeId(s.to_string())
        } else {
            ShapeId(format!("shape:{s}"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(pub String);

impl BindingId {
    pub fn new() -> Self {
        BindingId(format!("binding:{}", fresh_id()))
    }
}

impl Default for BindingId {
    fn default() -> Self {
        BindingId::new()
    }
}

impl Display for BindingId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeProps {
    pub w: f64,
    pub h: f64,
    /// Block-reference token resolving to the backing file through the canvas file's link index.
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub title: String,
    pub node_type_id: NodeTypeId,
    #[serde(default)]
    pub image_src: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeShape {
    pub id: ShapeId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub is_locked: bool,
    pub props: NodeProps,
    /// Record fields owned by the editor (parent, index, opacity, meta), carried through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeShape {
    pub fn bounds(&self) -> Box2 {
        Box2::new(self.x, self.y, self.props.w, self.props.h)
    }

    /// Node outlines are closed rectangles, so an imprecise binding can aim at their centre.
    pub fn is_closed(&self) -> bool {
        true
    }

    pub fn is_linked(&self) -> bool {
        self.props.src.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arrowhead {
    None,
    #[default]
    Arrow,
    Triangle,
    Dot,
    Bar,
}

fn default_scale() -> f64 {
    1.0
}

fn default_label_position() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationProps {
    /// Start handle, relative to the shape origin.
    pub start: Vec2,
    /// End handle, relative to the shape origin.
    pub end: Vec2,
    #[serde(default)]
    pub bend: f64,
    #[serde(default = "Arrowhead::none")]
    pub arrowhead_start: Arrowhead,
    #[serde(default)]
    pub arrowhead_end: Arrowhead,
    /// Direction label currently displayed (the relation type's label or complement).
    #[serde(default)]
    pub text: String,
    pub relation_type_id: RelationTypeId,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_label_position")]
    pub label_position: f64,
    #[serde(default)]
    pub color: String,
}

impl Arrowhead {
    fn none() -> Arrowhead {
        Arrowhead::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationShape {
    pub id: ShapeId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub is_locked: bool,
    pub props: RelationProps,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelationShape {
    pub fn origin(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn handle(&self, terminal: Terminal) -> Vec2 {
        match terminal {
            Terminal::Start => self.props.start,
            Terminal::End => self.props.end,
        }
    }

    pub fn handle_page(&self, terminal: Terminal) -> Vec2 {
        self.origin() + self.handle(terminal)
    }

    pub fn set_handle_page(&mut self, terminal: Terminal, page_point: Vec2) {
        let local = page_point - self.origin();
        match terminal {
            Terminal::Start => self.props.start = local,
            Terminal::End => self.props.end = local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Shape {
    #[serde(rename = "discourse-node")]
    Node(NodeShape),
    #[serde(rename = "discourse-relation")]
    Relation(RelationShape),
}

impl Shape {
    pub fn id(&self) -> &ShapeId {
        match self {
            Shape::Node(n) => &n.id,
            Shape::Relation(r) => &r.id,
        }
    }

    pub fn is_locked(&self) -> bool {
        match self {
            Shape::Node(n) => n.is_locked,
            Shape::Relation(r) => r.is_locked,
        }
    }

    pub fn as_node(&self) -> Option<&NodeShape> {
        match self {
            Shape::Node(n) => Some(n),
            Shape::Relation(_) => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RelationShape> {
        match self {
            Shape::Relation(r) => Some(r),
            Shape::Node(_) => None,
        }
    }

    pub fn extra_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Shape::Node(n) => &mut n.extra,
            Shape::Relation(r) => &mut r.extra,
        }
    }

    pub fn translate(&mut self, delta: Vec2) {
        match self {
            Shape::Node(n) => {
                n.x += delta.x;
                n.y += delta.y;
            }
            Shape::Relation(r) => {
                r.x += delta.x;
                r.y += delta.y;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    Start,
    End,
}

impl Terminal {
    pub fn opposite(self) -> Terminal {
        match self {
            Terminal::Start => Terminal::End,
            Terminal::End => Terminal::Start,
        }
    }
}

impl Display for Terminal {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Terminal::Start => write!(f, "start"),
            Terminal::End => write!(f, "end"),
        }
    }
}

/// The draggable handles of a relation shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    Start,
    Middle,
    End,
}

impl Handle {
    pub fn terminal(self) -> Option<Terminal> {
        match self {
            Handle::Start => Some(Terminal::Start),
            Handle::End => Some(Terminal::End),
            Handle::Middle => None,
        }
    }
}

impl From<Terminal> for Handle {
    fn from(t: Terminal) -> Handle {
        match t {
            Terminal::Start => Handle::Start,
            Terminal::End => Handle::End,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingProps {
    pub terminal: Terminal,
    /// Anchor within the target's bounds, each axis in `[0, 1]`.
    pub normalized_anchor: Vec2,
    #[serde(default)]
    pub is_precise: bool,
    #[serde(default)]
    pub is_exact: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub id: BindingId,
    /// The relation shape.
    pub from_id: ShapeId,
    /// The node shape.
    pub to_id: ShapeId,
    pub props: BindingProps,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record from a canvas snapshot that this crate understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Shape(Shape),
    Binding(Binding),
}

impl Record {
    /// Parse a snapshot record. Records of other types yield `Ok(None)` so callers can carry
    /// them through untouched.
    pub fn from_value(value: &Value) -> Result<Option<Record>, DiscourseError> {
        let type_name = value.get("typeName").and_then(Value::as_str);
        let kind = value.get("type").and_then(Value::as_str);
        let record = match (type_name, kind) {
            (Some("shape"), Some(NODE_SHAPE_TYPE) | Some(RELATION_SHAPE_TYPE)) => {
                let mut shape: Shape = serde_json::from_value(value.clone())?;
                strip_tags(shape.extra_mut());
                Record::Shape(shape)
            }
            (Some("binding"), Some(RELATION_BINDING_TYPE)) => {
                let mut binding: Binding = serde_json::from_value(value.clone())?;
                strip_tags(&mut binding.extra);
                Record::Binding(binding)
            }
            _ => return Ok(None),
        };
        Ok(Some(record))
    }

    pub fn to_value(&self) -> Result<Value, DiscourseError> {
        let mut value = match self {
            Record::Shape(shape) => serde_json::to_value(shape)?,
            Record::Binding(binding) => serde_json::to_value(binding)?,
        };
        if let Some(obj) = value.as_object_mut() {
            match self {
                Record::Shape(_) => {
                    obj.insert("typeName".to_string(), json!("shape"));
                    for (key, default) in [
                        ("parentId", json!("page:page")),
                        ("rotation", json!(0)),
                        ("opacity", json!(1)),
                        ("meta", json!({})),
                    ] {
                        obj.entry(key).or_insert(default);
                    }
                }
                Record::Binding(_) => {
                    obj.insert("typeName".to_string(), json!("binding"));
                    obj.insert("type".to_string(), json!(RELATION_BINDING_TYPE));
                    obj.entry("meta").or_insert(json!({}));
                }
            }
        }
        Ok(value)
    }
}

fn strip_tags(extra: &mut Map<String, Value>) {
    extra.remove("typeName");
    extra.remove("type");
}

const INDEX_DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Fractional-index key for the `n`th shape in paint order (`a0`, `a1`, ..., `b10`, ...).
pub fn index_key(n: usize) -> String {
    let base = INDEX_DIGITS.len();
    if n < base {
        format!("a{}", INDEX_DIGITS[n] as char)
    } else {
        let n = n.min(base * base - 1);
        format!(
            "b{}{}",
            INDEX_DIGITS[n / base] as char,
            INDEX_DIGITS[n % base] as char
        )
    }
}

/// Key that sorts after `last`, the topmost shape's index. Keys this crate did not mint get a
/// midpoint digit appended.
pub fn index_after(last: Option<&str>) -> String {
    let Some(last) = last.filter(|key| !key.is_empty()) else {
        return index_key(0);
    };
    match index_position(last) {
        Some(n) if n + 1 < INDEX_DIGITS.len() * INDEX_DIGITS.len() => index_key(n + 1),
        _ => format!("{last}V"),
    }
}

fn index_position(key: &str) -> Option<usize> {
    let digit = |c: u8| INDEX_DIGITS.iter().position(|d| *d == c);
    match key.as_bytes() {
        [b'a', d] => digit(*d),
        [b'b', hi, lo] => Some(digit(*hi)? * INDEX_DIGITS.len() + digit(*lo)?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_record_reads_editor_layout() {
        let value = json!({
            "id": "shape:rel1",
            "typeName": "shape",
            "type": "discourse-relation",
            "x": 10.0,
            "y": 20.0,
            "rotation": 0,
            "parentId": "page:page",
            "props": {
                "start": {"x": 0.0, "y": 0.0},
                "end": {"x": 100.0, "y": 0.0},
                "bend": 12.5,
                "arrowheadEnd": "arrow",
                "text": "supports",
                "relationTypeId": "supports"
            }
        });
        let Some(Record::Shape(Shape::Relation(rel))) = Record::from_value(&value).unwrap() else {
            panic!("expected a relation shape");
        };
        assert_eq!(rel.props.bend, 12.5);
        assert_eq!(rel.props.arrowhead_start, Arrowhead::None);
        assert_eq!(rel.props.scale, 1.0);
        assert_eq!(rel.handle_page(Terminal::End), Vec2::new(110.0, 20.0));
        assert_eq!(rel.extra["parentId"], "page:page");
        assert!(!rel.extra.contains_key("typeName"));
    }

    #[test]
    fn index_keys_sort_in_paint_order() {
        let keys = (0..200).map(index_key).collect::<Vec<_>>();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn next_index_follows_the_last_key() {
        assert_eq!(index_after(None), "a0");
        assert_eq!(index_after(Some("a3")), "a4");
        assert_eq!(index_after(Some("az")), "b10");
        assert_eq!(index_after(Some("b1z")), "b20");
        assert_eq!(index_after(Some("a1V")), "a1VV");
        assert!(index_after(Some("bzz")).as_str() > "bzz");
    }

    #[test]
    fn foreign_records_are_skipped() {
        let page = json!({"id": "page:page", "typeName": "page", "name": "Page 1"});
        assert!(Record::from_value(&page).unwrap().is_none());
        let geo = json!({"id": "shape:x", "typeName": "shape", "type": "geo"});
        assert!(Record::from_value(&geo).unwrap().is_none());
    }

    #[test]
    fn binding_record_carries_type_tags() {
        let binding = Binding {
            id: BindingId("binding:b1".to_string()),
            from_id: "rel".into(),
            to_id: "node".into(),
            props: BindingProps {
                terminal: Terminal::End,
                normalized_anchor: Vec2::new(0.5, 0.5),
                is_precise: false,
                is_exact: false,
            },
            extra: Default::default(),
        };
        let value = Record::Binding(binding.clone()).to_value().unwrap();
        assert_eq!(value["typeName"], "binding");
        assert_eq!(value["type"], RELATION_BINDING_TYPE);
        assert_eq!(value["fromId"], "shape:rel");
        assert_eq!(value["props"]["normalizedAnchor"]["x"], 0.5);
        let Some(Record::Binding(parsed)) = Record::from_value(&value).unwrap() else {
            panic!("expected a binding");
        };
        assert_eq!(parsed.props, binding.props);
        assert_eq!(parsed.to_id, binding.to_id);
        assert_eq!(parsed.extra.get("meta"), Some(&json!({})));
        assert!(!parsed.extra.contains_key("type"));
    }
}
