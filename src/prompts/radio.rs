use super::{Element, FactoryContext, InputKind, PromptFactory};
use crate::protocol::{Command, PromptCommand};

/// Single choice; resolved with the chosen item's value as `string`
pub struct RadioFactory;

impl PromptFactory for RadioFactory {
    fn name(&self) -> &'static str {
        "radio"
    }

    fn create(&self, command: &Command, _ctx: &FactoryContext) -> Option<Vec<Element>> {
        let Command::Prompt(PromptCommand::Radio {
            title,
            description,
            items,
        }) = command
        else {
            return None;
        };

        let mut elements = vec![Element::header(title.clone())];
        if !description.is_empty() {
            elements.push(Element::text(description.clone()));
        }
        elements.push(Element::input(
            title.clone(),
            InputKind::Choice {
                options: items.iter().map(|item| item.value.clone()).collect(),
            },
        ));
        Some(elements)
    }
}
