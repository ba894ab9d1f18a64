//! Render state handed to rendering surfaces.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::protocol::Payload;

/// Column width assumed when estimating wrapped text height
const WRAP_WIDTH: usize = 80;

/// One renderable piece of a prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "element", rename_all = "camelCase")]
pub enum Element {
    Header {
        text: String,
    },
    Text {
        text: String,
    },
    Table {
        id: String,
        title: String,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Pressing the button resolves the prompt with `payload`
    Button {
        label: String,
        payload: Payload,
    },
    /// Free-form operator input; see [`InputKind::payload_for`]
    Input {
        label: String,
        kind: InputKind,
    },
    Progress {
        percentage: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InputKind {
    Text,
    File { extensions: String },
    Choice { options: Vec<String> },
}

impl InputKind {
    /// Whether `payload` is something this input could have produced
    pub fn accepts(&self, payload: &Payload) -> bool {
        match (self, payload) {
            (Self::Text, Payload::String { .. }) => true,
            (Self::File { .. }, Payload::File { .. } | Payload::String { .. }) => true,
            (Self::Choice { options }, Payload::String { value }) => options.contains(value),
            _ => false,
        }
    }

    /// Turn raw operator input into the payload this input promises.
    ///
    /// Choices accept either the option text or its 1-based position.
    pub fn payload_for(&self, raw: &str) -> Option<Payload> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            Self::Text => Some(Payload::string(raw)),
            Self::File { .. } => Some(Payload::file(raw)),
            Self::Choice { options } => {
                let by_position = raw
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| options.get(i));
                by_position
                    .or_else(|| options.iter().find(|o| o.as_str() == raw))
                    .map(|o| Payload::string(o.clone()))
            }
        }
    }
}

impl Element {
    pub fn header(text: impl Into<String>) -> Self {
        Self::Header { text: text.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn button(label: impl Into<String>, payload: Payload) -> Self {
        Self::Button {
            label: label.into(),
            payload,
        }
    }

    pub fn input(label: impl Into<String>, kind: InputKind) -> Self {
        Self::Input {
            label: label.into(),
            kind,
        }
    }

    /// Progress bar, `percentage` clamped to 0..=100
    pub fn progress(percentage: f64) -> Self {
        let clamped = if percentage.is_nan() {
            0.0
        } else {
            percentage.clamp(0.0, 100.0)
        };
        Self::Progress {
            percentage: clamped.round() as u8,
        }
    }

    /// Approximate height in terminal rows
    pub fn height(&self) -> u32 {
        match self {
            Self::Header { .. } => 2,
            Self::Text { text } => text
                .lines()
                .map(|line| (line.chars().count().max(1)).div_ceil(WRAP_WIDTH) as u32)
                .sum::<u32>()
                .max(1),
            // title + column header + separator + rows
            Self::Table { rows, .. } => 3 + rows.len() as u32,
            Self::Button { .. } | Self::Progress { .. } => 1,
            Self::Input { kind, .. } => match kind {
                InputKind::Choice { options } => 1 + options.len() as u32,
                _ => 2,
            },
        }
    }
}

/// One-shot resolution token for the prompt currently on screen.
///
/// Clones share the consumed flag: across all of them, only the first
/// `resolve` forwards a payload.
#[derive(Clone)]
pub struct PromptHandle {
    ticket: u64,
    tag: Arc<str>,
    consumed: Arc<AtomicBool>,
    resolver: Arc<dyn Fn(u64, Payload) + Send + Sync>,
}

impl PromptHandle {
    pub fn new(
        ticket: u64,
        tag: &str,
        resolver: Arc<dyn Fn(u64, Payload) + Send + Sync>,
    ) -> Self {
        Self {
            ticket,
            tag: Arc::from(tag),
            consumed: Arc::new(AtomicBool::new(false)),
            resolver,
        }
    }

    /// Forward `payload` for this prompt. Returns false if already used.
    pub fn resolve(&self, payload: Payload) -> bool {
        if self.consumed.swap(true, Ordering::SeqCst) {
            debug!(
                ticket = self.ticket,
                tag = %self.tag,
                "Ignoring repeated resolution"
            );
            return false;
        }
        (self.resolver)(self.ticket, payload);
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Tag of the command this prompt answers
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Debug for PromptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptHandle")
            .field("ticket", &self.ticket)
            .field("tag", &self.tag)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl PartialEq for PromptHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ticket == other.ticket && Arc::ptr_eq(&self.consumed, &other.consumed)
    }
}

/// Everything currently on screen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    pub elements: Vec<Element>,
    /// Present while a prompt awaits the operator
    pub prompt: Option<PromptHandle>,
}

impl RenderState {
    pub fn content_height(&self) -> u32 {
        self.elements.iter().map(Element::height).sum()
    }

    pub fn is_awaiting(&self) -> bool {
        self.prompt.as_ref().is_some_and(|p| !p.is_resolved())
    }

    /// Buttons in display order
    pub fn buttons(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.elements.iter().filter_map(|e| match e {
            Element::Button { label, payload } => Some((label.as_str(), payload)),
            _ => None,
        })
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, &InputKind)> {
        self.elements.iter().filter_map(|e| match e {
            Element::Input { label, kind } => Some((label.as_str(), kind)),
            _ => None,
        })
    }

    /// Nothing to press or fill in; such a page is acknowledged with `void`
    pub fn is_passive(&self) -> bool {
        self.buttons().next().is_none() && self.inputs().next().is_none()
    }

    /// Whether `payload` has the shape one of the rendered buttons or inputs
    /// promises. Buttons match on the payload type, inputs on their kind.
    pub fn accepts(&self, payload: &Payload) -> bool {
        if self.is_passive() {
            return matches!(payload, Payload::Void {});
        }
        self.buttons().any(|(_, promised)| promised.tag() == payload.tag())
            || self.inputs().any(|(_, kind)| kind.accepts(payload))
    }
}
