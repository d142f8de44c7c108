//! # discourse-graph
//!
//! The relation and binding core of a discourse graph canvas: typed nodes backed by vault files,
//! typed relations drawn between them, and the frontmatter links that make those relations part
//! of the vault's knowledge graph.
//!
//! ## Overview
//!
//! A discourse graph is built from **nodes** (claims, evidence, questions, ...) and **relations**
//! between them ("supports", "opposes", ...). The allowed combinations live in a [`schema::TypeSchema`]
//! as discourse relation rows. On the canvas, a relation is an arrow whose terminals are bound to
//! node shapes. Once both ends are bound to nodes the schema allows, the relation is *reified*: a
//! wikilink to each file is written into the other's frontmatter under the relation type id.
//!
//! ### Key Features
//!
//! - **Schema-checked drawing**: the relation tool only starts on nodes that can take part in the
//!   selected relation type, and illegal connections are rolled back with a toast
//! - **Direction labels**: a relation reads as its label one way and its complement the other
//! - **Precise and imprecise bindings**: slow or modified drags pin an anchor, quick ones aim at
//!   the node centre
//! - **Arrow geometry**: straight and arced bodies, clipping to node outlines, label masking and
//!   SVG path output
//! - **Idempotent reification**: frontmatter links are deduplicated by the file they resolve to
//! - **Canvas persistence**: the editor snapshot lives in a fenced JSON block inside the canvas's
//!   own markdown file, saved with a debounce
//!
//! ## Architecture
//!
//! - **[`schema`]** / **[`validator`]**: node and relation types, legality and direction labels
//! - **[`shapes`]**: node and relation shapes, bindings and their record form
//! - **[`editor`]**: the in-memory store with z-order, selection, input state and history marks
//! - **[`binding`]**: how relation terminals bind, follow and unbind as shapes move
//! - **[`geometry`]**: vector math and relation body/arrowhead geometry
//! - **[`tools`]**: the pointer state machines for drawing nodes and relations
//! - **[`vault`]**: the host vault contract and a markdown-directory implementation
//! - **[`reify`]**: writing relations into frontmatter and reading them back
//! - **[`canvas`]**: the canvas file format and the debounced saver
//! - **[`toast`]** / **[`event`]**: user notifications and store change events
//!
//! ## Quick Start
//!
//! Load a canvas from a vault and reify everything drawn on it:
//!
//! ```rust,no_run
//! use discourse_graph::{
//!     canvas::CanvasFile, config::CanvasConfig, editor::Editor, reify::FrontmatterReifier,
//!     schema::TypeSchema, toast::ToastBus, vault::{MdVault, Vault, VaultPath},
//! };
//! use std::{path::Path, sync::Arc};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vault = Arc::new(MdVault::new(Path::new("./vault"))?);
//!     let canvas = VaultPath::new("Canvas.md");
//!     let schema = Arc::new(TypeSchema::default());
//!
//!     let text = vault.read_text(&canvas).await?;
//!     let mut editor = Editor::new(canvas.as_str(), schema, CanvasConfig::default(), ToastBus::new());
//!     CanvasFile::parse(&text)?.data.load_into(&mut editor)?;
//!
//!     let reifier = FrontmatterReifier::new(vault.clone());
//!     for (id, result) in reifier.reify_all(&editor.into_shared()).await {
//!         println!("{id}: {result:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Drawing a relation
//!
//! Tools take pointer events in page coordinates with millisecond timestamps:
//!
//! ```rust,no_run
//! # use discourse_graph::{editor::{Editor, PointerEvent}, tools::{RelationTool, RelationToolContext, ToolOutcome}};
//! # fn draw(editor: &mut Editor) {
//! let mut tool = RelationTool::new();
//! tool.set_context(Some(RelationToolContext {
//!     relation_type_id: "supports".into(),
//!     source_file: None,
//! }));
//! tool.on_pointer_down(editor, &PointerEvent::at(50.0, 50.0, 0));
//! tool.on_pointer_move(editor, &PointerEvent::at(250.0, 50.0, 16));
//! if let ToolOutcome::RelationCompleted(id) = tool.on_pointer_up(editor, &PointerEvent::at(250.0, 50.0, 32)) {
//!     println!("drew {id}");
//! }
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`bin`**: the `dgraph` command-line tool
//! - **`wasm`**: JavaScript bindings for the vault plugin (see [`wasm`] when enabled)

pub mod binding;
pub mod canvas;
pub mod config;
pub mod editor;
pub mod error;
pub mod event;
pub mod geometry;
pub mod reify;
pub mod schema;
pub mod shapes;
#[cfg(test)]
mod tests;
pub mod toast;
pub mod tools;
pub mod validator;
pub mod vault;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use error::*;
