//! Prompt factories
//!
//! A factory inspects a command's tag and either produces the elements to
//! render or declines so the next factory is tried. Factories are scanned in
//! registration order and the first claim wins.
//!
//! `page` commands are composed by the registry itself: a header followed by
//! the elements of every body command, each dispatched like a top-level one.
//!
//! # Module Structure
//! - `render`: elements, render state and the one-shot [`PromptHandle`]
//! - `consent`, `confirm`, `retry`, `file_input`, `radio`: operator questions
//! - `error_page`, `end_page`: terminal pages acknowledged with `void`
//! - `text`, `progress`: passive blocks, mostly used inside a page

mod confirm;
mod consent;
mod end_page;
mod error_page;
mod file_input;
mod progress;
mod radio;
mod render;
mod retry;
mod text;

use tracing::{trace, warn};

use crate::protocol::{Command, PromptCommand};

pub use confirm::ConfirmFactory;
pub use consent::ConsentFactory;
pub use end_page::EndPageFactory;
pub use error_page::ErrorPageFactory;
pub use file_input::FileInputFactory;
pub use progress::ProgressFactory;
pub use radio::RadioFactory;
pub use render::{Element, InputKind, PromptHandle, RenderState};
pub use retry::RetryFactory;
pub use text::TextFactory;

/// Name reported for pages composed by the registry
pub const PAGE_FACTORY: &str = "page";

/// Context handed to every factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryContext {
    pub locale: String,
}

impl Default for FactoryContext {
    fn default() -> Self {
        Self {
            locale: crate::config::defaults::DEFAULT_LOCALE.to_string(),
        }
    }
}

impl FactoryContext {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }

    /// Fallback label used when a command leaves a button label empty
    pub fn label(&self, key: Label) -> &'static str {
        let dutch = self.locale.starts_with("nl");
        match (key, dutch) {
            (Label::Yes, false) => "Yes, share",
            (Label::Yes, true) => "Ja, delen",
            (Label::No, false) => "No",
            (Label::No, true) => "Nee",
            (Label::Ok, false) => "OK",
            (Label::Ok, true) => "OK",
            (Label::Close, false) => "Close",
            (Label::Close, true) => "Sluiten",
            (Label::Error, false) => "Something went wrong",
            (Label::Error, true) => "Er ging iets mis",
            (Label::Done, false) => "Thank you",
            (Label::Done, true) => "Bedankt",
        }
    }

    pub(crate) fn or_label(&self, text: &str, key: Label) -> String {
        if text.trim().is_empty() {
            self.label(key).to_string()
        } else {
            text.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Yes,
    No,
    Ok,
    Close,
    Error,
    Done,
}

/// Claims commands of a given shape and renders them
pub trait PromptFactory: Send {
    /// Name for logs
    fn name(&self) -> &'static str;

    /// Elements to render, or `None` to decline the command
    fn create(&self, command: &Command, ctx: &FactoryContext) -> Option<Vec<Element>>;
}

/// Ordered factory sequence with first-match dispatch
#[derive(Default)]
pub struct PromptRegistry {
    factories: Vec<Box<dyn PromptFactory>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding [`standard_factories`]
    pub fn standard() -> Self {
        Self {
            factories: standard_factories(),
        }
    }

    pub fn register(&mut self, factory: impl PromptFactory + 'static) -> &mut Self {
        self.factories.push(Box::new(factory));
        self
    }

    pub fn with(mut self, factory: impl PromptFactory + 'static) -> Self {
        self.register(factory);
        self
    }

    /// First factory that claims `command`, with its elements
    pub fn dispatch(
        &self,
        command: &Command,
        ctx: &FactoryContext,
    ) -> Option<(&'static str, Vec<Element>)> {
        if let Command::Prompt(PromptCommand::Page { header, body }) = command {
            return self
                .compose_page(header, body, ctx)
                .map(|elements| (PAGE_FACTORY, elements));
        }
        self.factories.iter().find_map(|factory| {
            let claimed = factory.create(command, ctx);
            trace!(
                factory = factory.name(),
                tag = command.tag(),
                claimed = claimed.is_some(),
                "Factory consulted"
            );
            claimed.map(|elements| (factory.name(), elements))
        })
    }

    /// A page is unmatched as soon as one of its body commands is
    fn compose_page(
        &self,
        header: &str,
        body: &[Command],
        ctx: &FactoryContext,
    ) -> Option<Vec<Element>> {
        let mut elements = Vec::new();
        if !header.trim().is_empty() {
            elements.push(Element::header(header));
        }
        for item in body {
            let Some((factory, rendered)) = self.dispatch(item, ctx) else {
                warn!(tag = item.tag(), "No factory claims page item");
                return None;
            };
            trace!(factory, tag = item.tag(), "Page item rendered");
            elements.extend(rendered);
        }
        Some(elements)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl FromIterator<Box<dyn PromptFactory>> for PromptRegistry {
    fn from_iter<I: IntoIterator<Item = Box<dyn PromptFactory>>>(iter: I) -> Self {
        Self {
            factories: iter.into_iter().collect(),
        }
    }
}

/// Factories for every built-in prompt command
pub fn standard_factories() -> Vec<Box<dyn PromptFactory>> {
    vec![
        Box::new(ConsentFactory),
        Box::new(ConfirmFactory),
        Box::new(RetryFactory),
        Box::new(FileInputFactory),
        Box::new(RadioFactory),
        Box::new(ErrorPageFactory),
        Box::new(EndPageFactory),
        Box::new(TextFactory),
        Box::new(ProgressFactory),
    ]
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;
