//! WebAssembly bindings for the canvas editor core.
//!
//! The vault plugin owns rendering and file I/O. It forwards pointer and key events to a
//! [CanvasEditorWasm], reads relation geometry back as SVG path data, and persists the record
//! list it gets from `records()`.
//!
//! # Return values
//!
//! Everything handed back to JavaScript goes through [to_js], which serializes with
//! `Serializer::json_compatible()`. The default `serde_wasm_bindgen::to_value()` turns JSON
//! objects into JavaScript `Map`s, which breaks code that reads records as plain objects.
//!
//! ```javascript
//! import init, { CanvasEditorWasm } from './discourse_graph.js';
//! await init();
//! const editor = new CanvasEditorWasm('Canvas.md', schemaJson, null);
//! editor.setRelationTool({ relationTypeId: 'supports' });
//! editor.pointerDown(x, y, performance.now(), ev.altKey);
//! ```

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use wasm_bindgen::prelude::*;

use crate::{
    binding::relation_geometry,
    config::CanvasConfig,
    editor::{Editor, PointerEvent},
    schema::TypeSchema,
    shapes::{ShapeId, Terminal},
    toast::{drain, Toast, ToastBus},
    tools::{NodeTool, NodeToolContext, RelationTool, RelationToolContext, ToolOutcome},
};

#[wasm_bindgen(start)]
pub fn start() {
    tracing_wasm::set_as_global_default();
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| {
            let msg = format!("Failed to serialize result: {e}");
            tracing::error!("{msg}");
            JsValue::from_str(&msg)
        })
}

fn js_error<E: std::fmt::Display>(context: &str) -> impl Fn(E) -> JsValue + '_ {
    move |e| {
        let msg = format!("{context}: {e}");
        tracing::error!("{msg}");
        JsValue::from_str(&msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveTool {
    Select,
    Node,
    Relation,
}

/// SVG output for one relation, page coordinates.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelationPaths {
    body: String,
    arrowhead_start: Option<String>,
    arrowhead_end: Option<String>,
    label: String,
    label_x: f64,
    label_y: f64,
}

#[wasm_bindgen]
pub struct CanvasEditorWasm {
    editor: Editor,
    node_tool: NodeTool,
    relation_tool: RelationTool,
    active: ActiveTool,
    toasts: UnboundedReceiver<Toast>,
}

#[wasm_bindgen]
impl CanvasEditorWasm {
    /// Create an editor for `canvas_id` from the plugin's type schema JSON. `config` is an
    /// optional object with [CanvasConfig] fields; missing fields take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(
        canvas_id: String,
        schema_json: String,
        config: JsValue,
    ) -> Result<CanvasEditorWasm, JsValue> {
        let schema = TypeSchema::from_json_str(&schema_json)
            .map_err(js_error("Failed to parse type schema"))?;
        let config: CanvasConfig = if config.is_null() || config.is_undefined() {
            CanvasConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(js_error("Failed to parse config"))?
        };
        let bus = ToastBus::new();
        let toasts = bus.subscribe(&canvas_id);
        tracing::info!(
            "[CanvasEditorWasm] {canvas_id}: {} node types, {} relation types",
            schema.node_types.len(),
            schema.relation_types.len()
        );
        Ok(CanvasEditorWasm {
            editor: Editor::new(&canvas_id, Arc::new(schema), config, bus),
            node_tool: NodeTool::new(),
            relation_tool: RelationTool::new(),
            active: ActiveTool::Select,
            toasts,
        })
    }

    #[wasm_bindgen(js_name = setSchema)]
    pub fn set_schema(&mut self, schema_json: String) -> Result<(), JsValue> {
        let schema = TypeSchema::from_json_str(&schema_json)
            .map_err(js_error("Failed to parse type schema"))?;
        self.editor.set_schema(Arc::new(schema));
        Ok(())
    }

    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&mut self, zoom: f64) {
        self.editor.set_zoom(zoom);
    }

    /// Activate the relation tool with a `{ relationTypeId, sourceFile? }` context, or with no
    /// context when `null`.
    #[wasm_bindgen(js_name = setRelationTool)]
    pub fn set_relation_tool(&mut self, context: JsValue) -> Result<(), JsValue> {
        let context: Option<RelationToolContext> = if context.is_null() || context.is_undefined() {
            None
        } else {
            Some(
                serde_wasm_bindgen::from_value(context)
                    .map_err(js_error("Invalid relation tool context"))?,
            )
        };
        self.cancel();
        self.relation_tool.set_context(context);
        self.active = ActiveTool::Relation;
        Ok(())
    }

    #[wasm_bindgen(js_name = setNodeTool)]
    pub fn set_node_tool(&mut self, node_type_id: Option<String>) {
        self.cancel();
        self.node_tool.set_context(node_type_id.map(|id| NodeToolContext {
            node_type_id: id.into(),
        }));
        self.active = ActiveTool::Node;
    }

    #[wasm_bindgen(js_name = setSelectTool)]
    pub fn set_select_tool(&mut self) {
        self.cancel();
        self.active = ActiveTool::Select;
    }

    #[wasm_bindgen(js_name = toolState)]
    pub fn tool_state(&self) -> String {
        match self.active {
            ActiveTool::Select => "select.idle".to_string(),
            ActiveTool::Node => format!("node.{}", self.node_tool.state_name()),
            ActiveTool::Relation => format!("relation.{}", self.relation_tool.state_name()),
        }
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(
        &mut self,
        x: f64,
        y: f64,
        time_ms: f64,
        alt_key: bool,
    ) -> Result<JsValue, JsValue> {
        let event = pointer_event(x, y, time_ms, alt_key);
        let outcome = match self.active {
            ActiveTool::Select => {
                self.editor.pointer_down(&event);
                ToolOutcome::Pending
            }
            ActiveTool::Node => self.node_tool.on_pointer_down(&mut self.editor, &event),
            ActiveTool::Relation => self.relation_tool.on_pointer_down(&mut self.editor, &event),
        };
        to_js(&outcome)
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(
        &mut self,
        x: f64,
        y: f64,
        time_ms: f64,
        alt_key: bool,
    ) -> Result<JsValue, JsValue> {
        let event = pointer_event(x, y, time_ms, alt_key);
        let outcome = match self.active {
            ActiveTool::Select => {
                self.editor.pointer_move(&event);
                ToolOutcome::Pending
            }
            ActiveTool::Node => self.node_tool.on_pointer_move(&mut self.editor, &event),
            ActiveTool::Relation => self.relation_tool.on_pointer_move(&mut self.editor, &event),
        };
        to_js(&outcome)
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(
        &mut self,
        x: f64,
        y: f64,
        time_ms: f64,
        alt_key: bool,
    ) -> Result<JsValue, JsValue> {
        let event = pointer_event(x, y, time_ms, alt_key);
        let outcome = match self.active {
            ActiveTool::Select => {
                self.editor.pointer_up(&event);
                ToolOutcome::Pending
            }
            ActiveTool::Node => self.node_tool.on_pointer_up(&mut self.editor, &event),
            ActiveTool::Relation => self.relation_tool.on_pointer_up(&mut self.editor, &event),
        };
        to_js(&outcome)
    }

    #[wasm_bindgen(js_name = keyDown)]
    pub fn key_down(&mut self, key: String) -> Result<JsValue, JsValue> {
        let outcome = match self.active {
            ActiveTool::Select => ToolOutcome::Pending,
            ActiveTool::Node => self.node_tool.on_key_down(&mut self.editor, &key),
            ActiveTool::Relation => self.relation_tool.on_key_down(&mut self.editor, &key),
        };
        to_js(&outcome)
    }

    /// Abandon whatever gesture the active tool is in the middle of.
    pub fn cancel(&mut self) {
        match self.active {
            ActiveTool::Select => {}
            ActiveTool::Node => {
                self.node_tool.on_cancel(&mut self.editor);
            }
            ActiveTool::Relation => {
                self.relation_tool.on_interrupt(&mut self.editor);
            }
        }
    }

    #[wasm_bindgen(js_name = selectedIds)]
    pub fn selected_ids(&self) -> Result<JsValue, JsValue> {
        to_js(&self.editor.selected_ids())
    }

    #[wasm_bindgen(js_name = hintingIds)]
    pub fn hinting_ids(&self) -> Result<JsValue, JsValue> {
        to_js(&self.editor.hinting())
    }

    /// `{ body, arrowheadStart, arrowheadEnd, label, labelX, labelY }` for a relation, or
    /// `null` when it is missing or degenerate.
    #[wasm_bindgen(js_name = relationPaths)]
    pub fn relation_paths(&self, id: String) -> Result<JsValue, JsValue> {
        let id = ShapeId(id);
        let Some(relation) = self.editor.relation(&id) else {
            return Ok(JsValue::NULL);
        };
        let Some(geometry) = relation_geometry(&self.editor, &id) else {
            return Ok(JsValue::NULL);
        };
        let props = &relation.props;
        let label_point = geometry.label_point;
        to_js(&RelationPaths {
            body: geometry.to_svg_path(&props.text),
            arrowhead_start: geometry
                .arrowhead(Terminal::Start, props.arrowhead_start)
                .map(|path| path.to_svg_path()),
            arrowhead_end: geometry
                .arrowhead(Terminal::End, props.arrowhead_end)
                .map(|path| path.to_svg_path()),
            label: props.text.clone(),
            label_x: label_point.x,
            label_y: label_point.y,
        })
    }

    /// Every record in the store, ready for the canvas file's data block.
    pub fn records(&self) -> Result<JsValue, JsValue> {
        let records = self
            .editor
            .records()
            .map_err(js_error("Failed to snapshot records"))?;
        to_js(&records)
    }

    #[wasm_bindgen(js_name = loadRecords)]
    pub fn load_records(&mut self, records: JsValue) -> Result<(), JsValue> {
        let records: Vec<Value> =
            serde_wasm_bindgen::from_value(records).map_err(js_error("Invalid record list"))?;
        self.editor
            .load_records(&records)
            .map_err(js_error("Failed to load records"))?;
        tracing::debug!(
            "[CanvasEditorWasm] Loaded {} records into {}",
            records.len(),
            self.editor.canvas_id()
        );
        Ok(())
    }

    /// Toasts posted for this canvas since the last call.
    #[wasm_bindgen(js_name = drainToasts)]
    pub fn drain_toasts(&mut self) -> Result<JsValue, JsValue> {
        to_js(&drain(&mut self.toasts))
    }
}

/// Hosts without an event timestamp may pass `NaN` and get the current time.
fn pointer_event(x: f64, y: f64, time_ms: f64, alt_key: bool) -> PointerEvent {
    let time_ms = if time_ms.is_finite() {
        time_ms
    } else {
        js_sys::Date::now()
    };
    PointerEvent {
        alt_key,
        ..PointerEvent::at(x, y, time_ms.max(0.0) as u64)
    }
}
