use super::{Element, FactoryContext, Label, PromptFactory};
use crate::protocol::{Command, Payload, PromptCommand};

/// Terminal page for a script that gave up
pub struct ErrorPageFactory;

impl PromptFactory for ErrorPageFactory {
    fn name(&self) -> &'static str {
        "errorPage"
    }

    fn create(&self, command: &Command, ctx: &FactoryContext) -> Option<Vec<Element>> {
        let Command::Prompt(PromptCommand::ErrorPage {
            message,
            stacktrace,
        }) = command
        else {
            return None;
        };

        let mut elements = vec![
            Element::header(ctx.label(Label::Error)),
            Element::text(message.clone()),
        ];
        if let Some(trace) = stacktrace.as_deref().filter(|t| !t.is_empty()) {
            elements.push(Element::text(trace));
        }
        elements.push(Element::button(ctx.label(Label::Close), Payload::void()));
        Some(elements)
    }
}
