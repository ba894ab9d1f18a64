use super::{Element, FactoryContext, Label, PromptFactory};
use crate::protocol::{Command, Payload, PromptCommand};

/// Two-button question answered with a boolean
pub struct ConfirmFactory;

impl PromptFactory for ConfirmFactory {
    fn name(&self) -> &'static str {
        "confirm"
    }

    fn create(&self, command: &Command, ctx: &FactoryContext) -> Option<Vec<Element>> {
        match command {
            Command::Prompt(PromptCommand::Confirm { text, ok, cancel }) => Some(vec![
                Element::text(text.clone()),
                Element::button(ctx.or_label(ok, Label::Ok), Payload::boolean(true)),
                Element::button(ctx.or_label(cancel, Label::No), Payload::boolean(false)),
            ]),
            _ => None,
        }
    }
}
