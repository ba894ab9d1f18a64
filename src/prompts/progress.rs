//! ProgressFactory - status while the script works through its input
//!
//! Renders no buttons, so the page is acknowledged with `void` as soon as it
//! is on screen and the script carries on.

use super::{Element, FactoryContext, PromptFactory};
use crate::protocol::{Command, PromptCommand};

pub struct ProgressFactory;

impl PromptFactory for ProgressFactory {
    fn name(&self) -> &'static str {
        "progress"
    }

    fn create(&self, command: &Command, _ctx: &FactoryContext) -> Option<Vec<Element>> {
        let Command::Prompt(PromptCommand::Progress {
            description,
            message,
            percentage,
        }) = command
        else {
            return None;
        };

        let mut elements = Vec::with_capacity(3);
        if !description.trim().is_empty() {
            elements.push(Element::header(description.clone()));
        }
        if !message.trim().is_empty() {
            elements.push(Element::text(message.clone()));
        }
        elements.push(Element::progress(*percentage));
        Some(elements)
    }
}
