//! Payloads sent from the UI back to the script.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer to a command, tagged by `type`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Payload {
    Boolean { value: bool },
    String { value: String },
    File {
        name: String,
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    Json { value: Value },
    /// Acknowledgement with no content (system commands)
    Void {},
    /// The UI could not produce an answer
    Error { message: String },
}

impl Payload {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Boolean { .. } => "boolean",
            Self::String { .. } => "string",
            Self::File { .. } => "file",
            Self::Json { .. } => "json",
            Self::Void {} => "void",
            Self::Error { .. } => "error",
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::Boolean { value }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String {
            value: value.into(),
        }
    }

    pub fn void() -> Self {
        Self::Void {}
    }

    /// Build a file payload from a path, using its final component as the name
    pub fn file(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = std::path::Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let size = std::fs::metadata(&path).ok().map(|m| m.len());
        Self::File { name, path, size }
    }
}
