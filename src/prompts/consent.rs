//! ConsentFactory - show the extracted data and ask to share it

use super::{Element, FactoryContext, Label, PromptFactory};
use crate::protocol::{Command, Payload, PromptCommand};

pub struct ConsentFactory;

impl PromptFactory for ConsentFactory {
    fn name(&self) -> &'static str {
        "consent"
    }

    fn create(&self, command: &Command, ctx: &FactoryContext) -> Option<Vec<Element>> {
        let Command::Prompt(PromptCommand::Consent { text, tables }) = command else {
            return None;
        };

        let mut elements = Vec::with_capacity(tables.len() + 3);
        elements.push(Element::text(text.clone()));
        elements.extend(tables.iter().map(|table| Element::Table {
            id: table.id.clone(),
            title: table.title.clone(),
            columns: table.columns.clone(),
            rows: table.rows.clone(),
        }));
        elements.push(Element::button(ctx.label(Label::Yes), Payload::boolean(true)));
        elements.push(Element::button(ctx.label(Label::No), Payload::boolean(false)));
        Some(elements)
    }
}
