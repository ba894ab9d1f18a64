//! Commands emitted by the background script.
//!
//! A command always carries its discriminant in the `type` field. Known prompt
//! and system tags deserialize strictly; any other tag becomes an
//! [`ExtensionCommand`] so custom prompt factories can claim it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Command sent by the script, routed either to the UI or to the host
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Rendered by a prompt factory, answered by the operator
    Prompt(PromptCommand),
    /// Forwarded to the embedding host, answered with `Payload::Void`
    System(SystemCommand),
    /// Unknown to the core; only a registered custom factory can render it
    Extension(ExtensionCommand),
}

/// Prompt vocabulary understood by the built-in factories
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PromptCommand {
    /// Ask for consent to share the extracted data
    Consent {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tables: Vec<ConsentTable>,
    },
    /// Two-button question
    Confirm {
        text: String,
        ok: String,
        cancel: String,
    },
    /// Tell the operator something went wrong and offer to try again
    Retry { text: String, ok: String },
    /// Ask the operator to pick a file
    FileInput {
        description: String,
        /// Comma separated mime types or extensions, e.g. "application/zip, text/plain"
        #[serde(default)]
        extensions: String,
    },
    /// Single choice from a list
    Radio {
        title: String,
        #[serde(default)]
        description: String,
        items: Vec<RadioItem>,
    },
    /// Terminal error page (script crashed or gave up)
    ErrorPage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stacktrace: Option<String>,
    },
    /// Terminal page shown when the flow is done
    EndPage {},
    /// Plain text block, usually one item of a page body
    Text { text: String },
    /// Extraction progress; acknowledged as soon as it is shown
    Progress {
        #[serde(default)]
        description: String,
        #[serde(default)]
        message: String,
        /// 0..=100, values outside are clamped when rendered
        percentage: f64,
    },
    /// One page composed of several prompts under a shared header
    Page {
        #[serde(default)]
        header: String,
        body: Vec<Command>,
    },
}

/// Messages meant for the embedding host rather than the operator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SystemCommand {
    /// Hand a JSON document to the host for storage
    Donate { key: String, json: String },
    /// The script declares it is done
    Exit {
        code: i32,
        #[serde(default)]
        info: String,
    },
    /// Free-form analytics/progress event
    Event {
        name: String,
        #[serde(default)]
        data: Value,
    },
}

/// A command whose tag the core does not know
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionCommand {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsentTable {
    pub id: String,
    pub title: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadioItem {
    pub id: u32,
    pub value: String,
}

impl PromptCommand {
    pub const TAGS: &'static [&'static str] = &[
        "consent",
        "confirm",
        "retry",
        "fileInput",
        "radio",
        "errorPage",
        "endPage",
        "text",
        "progress",
        "page",
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Consent { .. } => "consent",
            Self::Confirm { .. } => "confirm",
            Self::Retry { .. } => "retry",
            Self::FileInput { .. } => "fileInput",
            Self::Radio { .. } => "radio",
            Self::ErrorPage { .. } => "errorPage",
            Self::EndPage {} => "endPage",
            Self::Text { .. } => "text",
            Self::Progress { .. } => "progress",
            Self::Page { .. } => "page",
        }
    }
}

impl SystemCommand {
    pub const TAGS: &'static [&'static str] = &["donate", "exit", "event"];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Donate { .. } => "donate",
            Self::Exit { .. } => "exit",
            Self::Event { .. } => "event",
        }
    }
}

impl ExtensionCommand {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl Command {
    /// The discriminant used for dispatch
    pub fn tag(&self) -> &str {
        match self {
            Self::Prompt(prompt) => prompt.tag(),
            Self::System(system) => system.tag(),
            Self::Extension(ext) => &ext.tag,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    // Constructors for the common cases

    pub fn consent(text: impl Into<String>) -> Self {
        Self::Prompt(PromptCommand::Consent {
            text: text.into(),
            tables: Vec::new(),
        })
    }

    pub fn confirm(
        text: impl Into<String>,
        ok: impl Into<String>,
        cancel: impl Into<String>,
    ) -> Self {
        Self::Prompt(PromptCommand::Confirm {
            text: text.into(),
            ok: ok.into(),
            cancel: cancel.into(),
        })
    }

    pub fn retry(text: impl Into<String>, ok: impl Into<String>) -> Self {
        Self::Prompt(PromptCommand::Retry {
            text: text.into(),
            ok: ok.into(),
        })
    }

    pub fn file_input(description: impl Into<String>, extensions: impl Into<String>) -> Self {
        Self::Prompt(PromptCommand::FileInput {
            description: description.into(),
            extensions: extensions.into(),
        })
    }

    pub fn error_page(message: impl Into<String>) -> Self {
        Self::Prompt(PromptCommand::ErrorPage {
            message: message.into(),
            stacktrace: None,
        })
    }

    pub fn end_page() -> Self {
        Self::Prompt(PromptCommand::EndPage {})
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Prompt(PromptCommand::Text { text: text.into() })
    }

    pub fn progress(
        description: impl Into<String>,
        message: impl Into<String>,
        percentage: f64,
    ) -> Self {
        Self::Prompt(PromptCommand::Progress {
            description: description.into(),
            message: message.into(),
            percentage,
        })
    }

    pub fn page(header: impl Into<String>, body: Vec<Command>) -> Self {
        Self::Prompt(PromptCommand::Page {
            header: header.into(),
            body,
        })
    }

    pub fn donate(key: impl Into<String>, json: impl Into<String>) -> Self {
        Self::System(SystemCommand::Donate {
            key: key.into(),
            json: json.into(),
        })
    }

    pub fn exit(code: i32, info: impl Into<String>) -> Self {
        Self::System(SystemCommand::Exit {
            code,
            info: info.into(),
        })
    }

    pub fn extension(tag: impl Into<String>) -> Self {
        Self::Extension(ExtensionCommand::new(tag))
    }
}

impl From<PromptCommand> for Command {
    fn from(prompt: PromptCommand) -> Self {
        Self::Prompt(prompt)
    }
}

impl From<SystemCommand> for Command {
    fn from(system: SystemCommand) -> Self {
        Self::System(system)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let value = Value::deserialize(deserializer)?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("type"))?;

        // Known tags must match their schema exactly; a malformed consent is an
        // error, not an extension.
        if PromptCommand::TAGS.contains(&tag) {
            PromptCommand::deserialize(value)
                .map(Command::Prompt)
                .map_err(D::Error::custom)
        } else if SystemCommand::TAGS.contains(&tag) {
            SystemCommand::deserialize(value)
                .map(Command::System)
                .map_err(D::Error::custom)
        } else {
            ExtensionCommand::deserialize(value)
                .map(Command::Extension)
                .map_err(D::Error::custom)
        }
    }
}
