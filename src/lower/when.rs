//! `when { … }` blocks → guard trees, translated on the spot.

use crate::ir::types::*;
use crate::parse::args::ArgValue;
use crate::parse::types::{Block, Item};
use crate::translate::condition::{translate_guard, ConditionContext};

use super::Lowerer;

pub(super) fn lower_when(cx: &mut Lowerer, block: &Block, stage: &str) -> Option<Condition> {
    let mut before_agent = false;
    let mut before_input = false;
    let mut guards = Vec::new();

    for item in &block.items {
        match item.name() {
            "beforeAgent" | "beforeInput" | "beforeOptions" => {
                let on = match item {
                    Item::Statement(s) => s.parsed_args().first().and_then(ArgValue::as_bool).unwrap_or(true),
                    Item::Block(_) => true,
                };
                match item.name() {
                    "beforeAgent" => before_agent = on,
                    "beforeInput" => before_input = on,
                    _ => {}
                }
            }
            _ => guards.push(guard_from_item(item)),
        }
    }

    let guard = match guards.len() {
        0 => return None,
        1 => guards.remove(0),
        _ => Guard::AllOf { guards },
    };

    let raw = block.compact_body();
    let translated = translate_guard(&guard, &ConditionContext::new(&cx.parameters));
    if translated.is_none() {
        cx.manual(
            Some(stage),
            WarningKind::ConditionTranslation,
            "when condition is outside the translatable set; the job is disabled until it is rewritten",
            Some(raw.clone()),
        );
    }

    Some(Condition {
        raw,
        guard,
        translated,
        before_agent,
        before_input,
    })
}

fn guard_from_item(item: &Item) -> Guard {
    let unknown = || Guard::Unknown {
        source: item.snippet(),
    };
    match item {
        Item::Statement(s) => {
            let args = s.parsed_args();
            match s.name.as_str() {
                "branch" => {
                    if args.str("comparator").is_some_and(|c| c != "GLOB") {
                        return unknown();
                    }
                    match args.str_or_first("pattern") {
                        Some(p) => Guard::Branch { pattern: p.to_string() },
                        None => unknown(),
                    }
                }
                "tag" => {
                    if args.str("comparator").is_some_and(|c| c != "GLOB") {
                        return unknown();
                    }
                    Guard::Tag {
                        pattern: args.str_or_first("pattern").unwrap_or_default().to_string(),
                    }
                }
                "buildingTag" => Guard::BuildingTag,
                "changeRequest" if args.is_empty() => Guard::ChangeRequest,
                "environment" => match (args.str("name"), args.get("value")) {
                    (Some(name), Some(value)) => Guard::Environment {
                        name: name.to_string(),
                        value: value.to_text(),
                    },
                    _ => unknown(),
                },
                "triggeredBy" => match args.str_or_first("cause") {
                    Some(cause) => Guard::TriggeredBy { cause: cause.to_string() },
                    None => unknown(),
                },
                _ => unknown(),
            }
        }
        Item::Block(b) => match b.name.as_str() {
            "expression" => Guard::Expression {
                source: b.body.trim().to_string(),
            },
            "allOf" => Guard::AllOf {
                guards: b.items.iter().map(guard_from_item).collect(),
            },
            "anyOf" => Guard::AnyOf {
                guards: b.items.iter().map(guard_from_item).collect(),
            },
            "not" => match b.items.as_slice() {
                [single] => Guard::Not {
                    guard: Box::new(guard_from_item(single)),
                },
                _ => unknown(),
            },
            _ => unknown(),
        },
    }
}
