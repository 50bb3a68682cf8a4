//! `post { … }` blocks → ordered condition buckets.

use crate::ir::types::*;
use crate::parse::types::{Block, Item};
use crate::translate::post::approximation;

use super::{steps, Lowerer};

pub(super) fn lower_post(cx: &mut Lowerer, block: &Block, stage: Option<&str>) -> Post {
    let mut buckets: Vec<PostBucket> = Vec::new();
    for item in &block.items {
        let Item::Block(b) = item else {
            cx.unrecognized(stage, item);
            continue;
        };
        let Some(condition) = PostCondition::from_name(&b.name) else {
            cx.unrecognized(stage, item);
            continue;
        };
        if let Some(reason) = approximation(condition) {
            cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                reason,
                Some(format!("post {{ {} {{ … }} }}", condition.name())),
            );
        }
        let lowered = steps::lower_steps(cx, b, stage);
        match buckets.iter_mut().find(|existing| existing.condition == condition) {
            Some(existing) => existing.steps.extend(lowered),
            None => buckets.push(PostBucket {
                condition,
                steps: lowered,
            }),
        }
    }
    buckets.sort_by_key(|b| b.condition);
    Post { buckets }
}
