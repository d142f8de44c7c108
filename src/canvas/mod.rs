//! Canvas files: a markdown file whose frontmatter marks it as a canvas, followed by block
//! reference paragraphs for the nodes on it, followed by the editor snapshot in a fenced JSON block
//! between two fixed sentinel lines.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{config::CanvasConfig, editor::Editor, error::DiscourseError};

#[cfg(not(target_arch = "wasm32"))]
pub mod saver;
#[cfg(not(target_arch = "wasm32"))]
pub use saver::CanvasSaver;

pub const DATA_START: &str = "!!!_START_OF_TLDRAW_DG_DATA__DO_NOT_CHANGE_THIS_PHRASE_!!!";
pub const DATA_END: &str = "!!!_END_OF_TLDRAW_DG_DATA__DO_NOT_CHANGE_THIS_PHRASE_!!!";

/// Frontmatter flag identifying a canvas file.
pub const CANVAS_FRONTMATTER_KEY: &str = "tldr-dg";

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

static UUID_NODE: Lazy<[u8; 6]> = Lazy::new(|| {
    let mut bytes = [0u8; 6];
    if let Err(e) = getrandom::getrandom(&mut bytes) {
        tracing::warn!("No entropy for canvas uuids: {e}");
    }
    bytes
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasMeta {
    pub uuid: String,
    pub plugin_version: String,
    pub editor_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSnapshot {
    pub schema_version: u32,
    /// The editor's own record schema, carried through untouched.
    #[serde(default)]
    pub schema: Value,
    #[serde(default)]
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasData {
    pub meta: CanvasMeta,
    pub raw: CanvasSnapshot,
}

impl CanvasData {
    pub fn new(config: &CanvasConfig) -> Self {
        CanvasData {
            meta: CanvasMeta {
                uuid: Uuid::now_v6(&UUID_NODE).to_string(),
                plugin_version: config.plugin_version.clone(),
                editor_version: config.editor_version.clone(),
            },
            raw: CanvasSnapshot {
                schema_version: SNAPSHOT_SCHEMA_VERSION,
                schema: Value::Object(Default::default()),
                records: Vec::new(),
            },
        }
    }

    pub fn load_into(&self, editor: &mut Editor) -> Result<(), DiscourseError> {
        editor.load_records(&self.raw.records)
    }

    /// Take the editor's current records, stamping the running plugin version.
    pub fn update_from(&mut self, editor: &Editor) -> Result<(), DiscourseError> {
        self.raw.records = editor.records()?;
        self.meta.plugin_version = editor.config().plugin_version.clone();
        Ok(())
    }
}

/// A parsed canvas file. `head` holds everything before the data block (frontmatter and block
/// references) and `tail` anything after it.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasFile {
    pub head: String,
    pub data: CanvasData,
    pub tail: String,
}

impl CanvasFile {
    pub fn new(config: &CanvasConfig) -> Self {
        CanvasFile {
            head: format!("---\n{CANVAS_FRONTMATTER_KEY}: true\n---\n"),
            data: CanvasData::new(config),
            tail: String::new(),
        }
    }

    pub fn parse(text: &str) -> Result<CanvasFile, DiscourseError> {
        let start = text
            .find(DATA_START)
            .ok_or_else(|| DiscourseError::Canvas("missing start of canvas data".to_string()))?;
        let after_start = start + DATA_START.len();
        let end = text[after_start..]
            .find(DATA_END)
            .map(|i| i + after_start)
            .ok_or_else(|| DiscourseError::Canvas("missing end of canvas data".to_string()))?;

        let block = text[after_start..end].trim();
        let json = block
            .strip_prefix("```json")
            .or_else(|| block.strip_prefix("```"))
            .and_then(|b| b.trim_end().strip_suffix("```"))
            .unwrap_or(block);
        let data: CanvasData = serde_json::from_str(json.trim())
            .map_err(|e| DiscourseError::Canvas(format!("canvas data is not valid JSON: {e}")))?;

        let tail = text[end + DATA_END.len()..]
            .strip_prefix('\n')
            .unwrap_or(&text[end + DATA_END.len()..]);
        Ok(CanvasFile {
            head: text[..start].to_string(),
            data,
            tail: tail.to_string(),
        })
    }

    pub fn format(&self) -> Result<String, DiscourseError> {
        let json = serde_json::to_string_pretty(&self.data)?;
        let head = self.head.trim_end();
        let separator = if head.is_empty() { "" } else { "\n\n" };
        Ok(format!(
            "{head}{separator}{DATA_START}\n```json\n{json}\n```\n{DATA_END}\n{}",
            self.tail
        ))
    }

    /// Swap the data block of `text` for `data`, keeping everything around it as it is on disk.
    pub fn replace_data(text: &str, data: &CanvasData) -> Result<String, DiscourseError> {
        let mut file = CanvasFile::parse(text)?;
        file.data = data.clone();
        file.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::test_editor;

    #[test]
    fn canvas_files_round_trip() {
        let mut file = CanvasFile::new(&CanvasConfig::default());
        file.head.push_str("\n[[CLM - Cats]]\n^a1b2c3d4\n");
        let text = file.format().unwrap();
        assert!(text.starts_with("---\ntldr-dg: true\n---\n"));
        assert!(text.contains("```json\n{"));
        let parsed = CanvasFile::parse(&text).unwrap();
        assert_eq!(parsed.data, file.data);
        assert_eq!(parsed.format().unwrap(), text);
    }

    #[test]
    fn missing_sentinels_are_a_canvas_error() {
        assert!(matches!(
            CanvasFile::parse("---\ntldr-dg: true\n---\n"),
            Err(DiscourseError::Canvas(_))
        ));
        let half = format!("{DATA_START}\n```json\n{{}}\n```\n");
        assert!(matches!(
            CanvasFile::parse(&half),
            Err(DiscourseError::Canvas(_))
        ));
    }

    #[test]
    fn editor_state_flows_through_the_data_block() {
        let mut editor = test_editor();
        editor.create_node(0.0, 0.0, 100.0, 100.0, "claim".into(), "CLM - a");
        let mut data = CanvasData::new(editor.config());
        data.update_from(&editor).unwrap();
        assert_eq!(data.raw.records.len(), 1);
        assert_eq!(data.raw.records[0]["typeName"], "shape");

        let mut reloaded = test_editor();
        data.load_into(&mut reloaded).unwrap();
        assert_eq!(reloaded.shapes().count(), 1);
    }
}
