use super::{Element, FactoryContext, PromptFactory};
use crate::protocol::{Command, PromptCommand};

/// Plain text; on its own it is a passive page
pub struct TextFactory;

impl PromptFactory for TextFactory {
    fn name(&self) -> &'static str {
        "text"
    }

    fn create(&self, command: &Command, _ctx: &FactoryContext) -> Option<Vec<Element>> {
        match command {
            Command::Prompt(PromptCommand::Text { text }) => Some(vec![Element::text(text.clone())]),
            _ => None,
        }
    }
}
