use crate::{error::DiscourseError, schema::TypeSchema};
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
    time::Duration,
};

/// Settings file name looked up at the vault root by [TomlSettingsProvider::in_vault].
pub const SETTINGS_FILE: &str = "discourse-graph.toml";

/// Version of the canvas editor whose snapshot layout we read and write.
pub const EDITOR_VERSION: &str = "3.14.2";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Quiet period after the last store mutation before the canvas file is written.
    pub save_debounce_ms: u64,
    /// Time after pointer-down before the relation tool starts binding precisely.
    pub precise_timeout_ms: u64,
    /// Fractional position of a relation label along its body.
    pub label_position: f64,
    /// Gap between a bound, non-exact terminal and the outline of its node.
    pub bound_arrow_offset: f64,
    pub default_node_width: f64,
    pub default_node_height: f64,
    pub min_node_size: f64,
    /// Normalized offset applied when both terminals would share one anchor on one node.
    pub anchor_nudge: f64,
    pub plugin_version: String,
    pub editor_version: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        CanvasConfig {
            save_debounce_ms: 500,
            precise_timeout_ms: 310,
            label_position: 0.5,
            bound_arrow_offset: 10.0,
            default_node_width: 200.0,
            default_node_height: 100.0,
            min_node_size: 40.0,
            anchor_nudge: 0.05,
            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
            editor_version: EDITOR_VERSION.to_string(),
        }
    }
}

impl CanvasConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub config: CanvasConfig,
    #[serde(default)]
    pub schema: TypeSchema,
}

pub trait SettingsProvider: Send + Sync {
    fn get_schema(&self) -> Result<TypeSchema, DiscourseError>;
    fn set_schema(&self, schema: TypeSchema) -> Result<(), DiscourseError>;
    fn get_config(&self) -> Result<CanvasConfig, DiscourseError>;
    fn set_config(&self, config: CanvasConfig) -> Result<(), DiscourseError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlSettingsProvider {
    path: PathBuf,
}

impl TomlSettingsProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlSettingsProvider { path }
    }

    pub fn in_vault(vault_root: &std::path::Path) -> Self {
        TomlSettingsProvider::new(vault_root.join(SETTINGS_FILE))
    }

    fn read(&self) -> Result<Settings, DiscourseError> {
        tracing::debug!("Attempting to read settings from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Settings file not found, using defaults.");
            return Ok(Settings::default());
        }
        let content = read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    fn write(&self, settings: &Settings) -> Result<(), DiscourseError> {
        tracing::debug!("Attempting to write settings to: {:?}", &self.path);
        let toml_string = toml::to_string(settings)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

impl SettingsProvider for TomlSettingsProvider {
    fn get_schema(&self) -> Result<TypeSchema, DiscourseError> {
        let schema = self.read()?.schema;
        schema.validate()?;
        Ok(schema)
    }

    fn set_schema(&self, schema: TypeSchema) -> Result<(), DiscourseError> {
        schema.validate()?;
        let mut settings = self.read()?;
        settings.schema = schema;
        self.write(&settings)
    }

    fn get_config(&self) -> Result<CanvasConfig, DiscourseError> {
        Ok(self.read()?.config)
    }

    fn set_config(&self, config: CanvasConfig) -> Result<(), DiscourseError> {
        let mut settings = self.read()?;
        settings.config = config;
        self.write(&settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::claim_evidence_schema;
    use tempfile::tempdir;

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let provider = TomlSettingsProvider::in_vault(dir.path());
        assert_eq!(provider.get_config().unwrap(), CanvasConfig::default());
        assert!(provider.get_schema().unwrap().node_types.is_empty());
    }

    #[test]
    fn schema_and_config_persist_independently() {
        let dir = tempdir().unwrap();
        let provider = TomlSettingsProvider::in_vault(dir.path());
        provider.set_schema(claim_evidence_schema()).unwrap();
        let config = CanvasConfig {
            save_debounce_ms: 50,
            ..Default::default()
        };
        provider.set_config(config.clone()).unwrap();

        assert_eq!(provider.get_schema().unwrap(), claim_evidence_schema());
        assert_eq!(provider.get_config().unwrap(), config);
    }

    #[test]
    fn partial_config_tables_keep_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            "[config]\nprecise_timeout_ms = 400\n",
        )
        .unwrap();
        let config = TomlSettingsProvider::in_vault(dir.path())
            .get_config()
            .unwrap();
        assert_eq!(config.precise_timeout_ms, 400);
        assert_eq!(config.save_debounce_ms, 500);
    }
}
