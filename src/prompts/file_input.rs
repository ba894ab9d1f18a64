//! FileInputFactory - ask for a data package on disk
//!
//! Resolved with `file` for a picked path, or `string` with an empty value
//! when the operator skips.

use super::{Element, FactoryContext, InputKind, PromptFactory};
use crate::protocol::{Command, Payload, PromptCommand};

pub struct FileInputFactory;

impl PromptFactory for FileInputFactory {
    fn name(&self) -> &'static str {
        "fileInput"
    }

    fn create(&self, command: &Command, ctx: &FactoryContext) -> Option<Vec<Element>> {
        let Command::Prompt(PromptCommand::FileInput {
            description,
            extensions,
        }) = command
        else {
            return None;
        };

        let skip = if ctx.locale.starts_with("nl") {
            "Overslaan"
        } else {
            "Skip"
        };
        Some(vec![
            Element::text(description.clone()),
            Element::input(
                description.clone(),
                InputKind::File {
                    extensions: extensions.clone(),
                },
            ),
            Element::button(skip, Payload::string("")),
        ])
    }
}
