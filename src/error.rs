use std::{fmt, io};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;

#[cfg(feature = "wasm")]
use serde_wasm_bindgen::Error as WasmError;

use crate::{event::CanvasEvent, toast::ToastSeverity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum DiscourseError {
    #[error("Canvas file format error: {0}")]
    Canvas(String),
    #[error("Invalid relation: {0}")]
    InvalidRelation(String),
    #[error("Invalid type schema: {0}")]
    Schema(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Operation cancelled")]
    OperationCancelled,
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("Could not resolve file reference: {0}")]
    Resolution(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Relation {0} is no longer bound to the same nodes")]
    StaleBinding(String),
}

impl DiscourseError {
    /// Title and one-sentence description for surfacing this error as a toast.
    pub fn toast(&self) -> (String, String) {
        let title = match self {
            DiscourseError::InvalidRelation(_) | DiscourseError::Schema(_) => "Invalid relation",
            DiscourseError::NotFound(_) | DiscourseError::Resolution(_) => "Missing file",
            DiscourseError::StaleBinding(_) => "Relation changed",
            DiscourseError::OperationCancelled => "Cancelled",
            DiscourseError::Canvas(_)
            | DiscourseError::Io(_)
            | DiscourseError::PermissionDenied
            | DiscourseError::Serialization(_) => "Failed to save",
            DiscourseError::Custom(_) => "Error",
        };
        (title.to_string(), self.to_string())
    }

    /// Schema and resolution problems are recoverable by the user and warn. Failed writes are
    /// errors.
    pub fn severity(&self) -> ToastSeverity {
        match self {
            DiscourseError::InvalidRelation(_)
            | DiscourseError::Schema(_)
            | DiscourseError::NotFound(_)
            | DiscourseError::Resolution(_)
            | DiscourseError::StaleBinding(_)
            | DiscourseError::OperationCancelled => ToastSeverity::Warning,
            DiscourseError::Canvas(_)
            | DiscourseError::Io(_)
            | DiscourseError::PermissionDenied
            | DiscourseError::Serialization(_)
            | DiscourseError::Custom(_) => ToastSeverity::Error,
        }
    }
}

impl From<toml::de::Error> for DiscourseError {
    fn from(src: toml::de::Error) -> DiscourseError {
        DiscourseError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for DiscourseError {
    fn from(src: toml::ser::Error) -> DiscourseError {
        DiscourseError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for DiscourseError {
    fn from(src: JsonError) -> DiscourseError {
        DiscourseError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for DiscourseError {
    fn from(src: YamlError) -> DiscourseError {
        DiscourseError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<io::Error> for DiscourseError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => DiscourseError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => DiscourseError::PermissionDenied,
            _ => DiscourseError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for DiscourseError {
    fn from(x: fmt::Error) -> Self {
        DiscourseError::Canvas(format!("{x}"))
    }
}

impl From<RegexError> for DiscourseError {
    fn from(x: RegexError) -> Self {
        DiscourseError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<TokioSendError<CanvasEvent>> for DiscourseError {
    fn from(x: TokioSendError<CanvasEvent>) -> Self {
        DiscourseError::Io(format!(
            "Channel update send Error, could not transmit canvas event {:?}",
            x.0
        ))
    }
}

#[cfg(feature = "wasm")]
impl From<WasmError> for DiscourseError {
    fn from(wasm_error: WasmError) -> Self {
        DiscourseError::Serialization(format!("Serde-wasm-bindgen error: {wasm_error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err: DiscourseError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, DiscourseError::NotFound(_)));
        assert_eq!(err.toast().0, "Missing file");
    }

    #[test]
    fn persistence_errors_share_a_toast_title() {
        let err = DiscourseError::Io("disk full".to_string());
        let (title, description) = err.toast();
        assert_eq!(title, "Failed to save");
        assert!(description.contains("disk full"));
        assert_eq!(err.severity(), ToastSeverity::Error);
    }

    #[test]
    fn unresolved_files_only_warn() {
        let err = DiscourseError::Resolution("[[Gone]] from Canvas.md".to_string());
        assert_eq!(err.severity(), ToastSeverity::Warning);
        assert_eq!(
            DiscourseError::NotFound("Gone.md".to_string()).severity(),
            ToastSeverity::Warning
        );
    }
}
