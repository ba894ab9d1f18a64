use super::*;
use crate::protocol::{ConsentTable, Payload, PromptCommand, RadioItem};

struct Claims(&'static str, &'static str);

impl PromptFactory for Claims {
    fn name(&self) -> &'static str {
        self.0
    }

    fn create(&self, command: &Command, _ctx: &FactoryContext) -> Option<Vec<Element>> {
        (command.tag() == self.1).then(|| vec![Element::text(self.0)])
    }
}

#[test]
fn test_first_matching_factory_wins() {
    let registry = PromptRegistry::new()
        .with(Claims("declines", "other"))
        .with(Claims("first", "consent"))
        .with(Claims("second", "consent"));

    let (name, elements) = registry
        .dispatch(&Command::consent("ok?"), &FactoryContext::default())
        .unwrap();
    assert_eq!(name, "first");
    assert_eq!(elements, vec![Element::text("first")]);
}

#[test]
fn test_unclaimed_command_yields_none() {
    let registry = PromptRegistry::standard();
    assert!(registry
        .dispatch(&Command::extension("unknown"), &FactoryContext::default())
        .is_none());
    assert!(PromptRegistry::new()
        .dispatch(&Command::consent("x"), &FactoryContext::default())
        .is_none());
}

#[test]
fn test_custom_factory_claims_extension_tag() {
    let registry = PromptRegistry::standard().with(Claims("questionnaire", "questionnaire"));
    let (name, _) = registry
        .dispatch(
            &Command::extension("questionnaire"),
            &FactoryContext::default(),
        )
        .unwrap();
    assert_eq!(name, "questionnaire");
}

#[test]
fn test_standard_factories_cover_every_prompt_tag() {
    let registry = PromptRegistry::standard();
    let mut claimed = registry.names();
    claimed.push(PAGE_FACTORY);
    assert_eq!(claimed, PromptCommand::TAGS.to_vec());
    assert_eq!(registry.len(), 9);
    assert!(!registry.is_empty());
}

#[test]
fn test_page_composes_header_and_body_items() {
    let page = Command::page(
        "Instagram",
        vec![
            Command::text("Your export stays on this device."),
            Command::file_input("Select your export", "application/zip"),
        ],
    );
    let (name, elements) = PromptRegistry::standard()
        .dispatch(&page, &FactoryContext::default())
        .unwrap();

    assert_eq!(name, "page");
    assert_eq!(elements[0], Element::header("Instagram"));
    assert_eq!(elements[1], Element::text("Your export stays on this device."));
    let state = RenderState {
        elements,
        prompt: None,
    };
    assert_eq!(state.inputs().count(), 1);
    assert!(state.accepts(&Payload::file("/tmp/export.zip")));
    assert!(!state.accepts(&Payload::boolean(true)));
}

#[test]
fn test_page_body_uses_custom_factories() {
    let registry = PromptRegistry::standard().with(Claims("helloWorld", "helloWorld"));
    let page = Command::page("", vec![Command::extension("helloWorld"), Command::consent("ok?")]);
    let (_, elements) = registry.dispatch(&page, &FactoryContext::default()).unwrap();
    assert_eq!(elements[0], Element::text("helloWorld"));
    assert_eq!(elements[1], Element::text("ok?"));
}

#[test]
fn test_page_with_unclaimed_item_is_unmatched() {
    let page = Command::page("Title", vec![Command::text("fine"), Command::extension("nope")]);
    assert!(PromptRegistry::standard()
        .dispatch(&page, &FactoryContext::default())
        .is_none());

    // system commands never render, not even inside a page
    let page = Command::page("Title", vec![Command::donate("k", "{}")]);
    assert!(PromptRegistry::standard()
        .dispatch(&page, &FactoryContext::default())
        .is_none());
}

#[test]
fn test_progress_is_a_passive_page() {
    let (_, elements) = PromptRegistry::standard()
        .dispatch(
            &Command::progress("Extracting", "Reading posts.json", 62.5),
            &FactoryContext::default(),
        )
        .unwrap();
    assert_eq!(
        elements,
        vec![
            Element::header("Extracting"),
            Element::text("Reading posts.json"),
            Element::Progress { percentage: 63 },
        ]
    );
    let state = RenderState {
        elements,
        prompt: None,
    };
    assert!(state.is_passive());
}

#[test]
fn test_consent_renders_tables_and_boolean_buttons() {
    let command = Command::Prompt(PromptCommand::Consent {
        text: "Do you agree?".into(),
        tables: vec![ConsentTable {
            id: "likes".into(),
            title: "Likes".into(),
            columns: vec!["date".into(), "count".into()],
            rows: vec![vec!["2024-01-01".into(), "3".into()]],
        }],
    });
    let (_, elements) = PromptRegistry::standard()
        .dispatch(&command, &FactoryContext::default())
        .unwrap();

    assert_eq!(elements[0], Element::text("Do you agree?"));
    assert!(matches!(&elements[1], Element::Table { id, rows, .. } if id == "likes" && rows.len() == 1));
    let state = RenderState {
        elements,
        prompt: None,
    };
    let buttons: Vec<_> = state.buttons().map(|(_, p)| p.clone()).collect();
    assert_eq!(buttons, vec![Payload::boolean(true), Payload::boolean(false)]);
}

#[test]
fn test_confirm_falls_back_to_locale_labels() {
    let command = Command::confirm("Doorgaan?", "", "");
    let (_, elements) = PromptRegistry::standard()
        .dispatch(&command, &FactoryContext::new("nl"))
        .unwrap();
    assert_eq!(
        elements[1..],
        [
            Element::button("OK", Payload::boolean(true)),
            Element::button("Nee", Payload::boolean(false)),
        ]
    );
}

#[test]
fn test_radio_offers_item_values() {
    let command = Command::Prompt(PromptCommand::Radio {
        title: "Platform".into(),
        description: String::new(),
        items: vec![
            RadioItem {
                id: 1,
                value: "Instagram".into(),
            },
            RadioItem {
                id: 2,
                value: "TikTok".into(),
            },
        ],
    });
    let (_, elements) = PromptRegistry::standard()
        .dispatch(&command, &FactoryContext::default())
        .unwrap();
    assert_eq!(elements.len(), 2);
    let state = RenderState {
        elements,
        prompt: None,
    };
    let (_, kind) = state.inputs().next().unwrap();
    assert_eq!(kind.payload_for("2"), Some(Payload::string("TikTok")));
}

#[test]
fn test_terminal_pages_are_acknowledged_with_void() {
    let ctx = FactoryContext::default();
    let registry = PromptRegistry::standard();
    for command in [Command::error_page("parse failed"), Command::end_page()] {
        let (_, elements) = registry.dispatch(&command, &ctx).unwrap();
        assert_eq!(
            elements.last(),
            Some(&Element::button("Close", Payload::void()))
        );
    }
}

#[test]
fn test_file_input_can_be_skipped() {
    let (_, elements) = PromptRegistry::standard()
        .dispatch(
            &Command::file_input("Select your takeout", "application/zip"),
            &FactoryContext::default(),
        )
        .unwrap();
    assert!(elements.contains(&Element::input(
        "Select your takeout",
        InputKind::File {
            extensions: "application/zip".into()
        }
    )));
    assert_eq!(
        elements.last(),
        Some(&Element::button("Skip", Payload::string("")))
    );
}
