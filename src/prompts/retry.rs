use super::{Element, FactoryContext, Label, PromptFactory};
use crate::protocol::{Command, Payload, PromptCommand};

/// Something failed; the only way forward is to try again
pub struct RetryFactory;

impl PromptFactory for RetryFactory {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn create(&self, command: &Command, ctx: &FactoryContext) -> Option<Vec<Element>> {
        match command {
            Command::Prompt(PromptCommand::Retry { text, ok }) => Some(vec![
                Element::text(text.clone()),
                Element::button(ctx.or_label(ok, Label::Ok), Payload::boolean(true)),
            ]),
            _ => None,
        }
    }
}
