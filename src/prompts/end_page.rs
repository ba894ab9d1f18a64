use super::{Element, FactoryContext, Label, PromptFactory};
use crate::protocol::{Command, Payload, PromptCommand};

pub struct EndPageFactory;

impl PromptFactory for EndPageFactory {
    fn name(&self) -> &'static str {
        "endPage"
    }

    fn create(&self, command: &Command, ctx: &FactoryContext) -> Option<Vec<Element>> {
        matches!(command, Command::Prompt(PromptCommand::EndPage {})).then(|| {
            vec![
                Element::header(ctx.label(Label::Done)),
                Element::button(ctx.label(Label::Close), Payload::void()),
            ]
        })
    }
}
