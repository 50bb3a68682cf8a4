//! Complexity and feasibility scoring.
//!
//! Pure and deterministic: the same pipeline always gets the same score, and
//! adding a construct never lowers it.

use serde::{Deserialize, Serialize};

use crate::config::ScoreConfig;
use crate::graph::JobGraph;
use crate::ir::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    Low,
    Medium,
    High,
}

/// How much of the conversion is automatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feasibility {
    High,
    Medium,
    Low,
}

/// Construct counts behind a score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub stages: u32,
    pub parallel_branches: u32,
    pub matrix_axes: u32,
    pub credentials: u32,
    pub approval_gates: u32,
    pub opaque_scripts: u32,
    pub post_buckets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityScore {
    pub total: u32,
    pub band: Band,
    pub feasibility: Feasibility,
    pub manual_item_count: usize,
    pub approval_gate_count: usize,
    pub job_count: usize,
    pub tally: Tally,
}

pub fn score(pipeline: &Pipeline, graph: &JobGraph, config: &ScoreConfig) -> ComplexityScore {
    let tally = tally(pipeline);
    let w = &config.weights;
    // Weights come from user config; the total pins at u32::MAX.
    let total = [
        (tally.stages, w.stage),
        (tally.parallel_branches, w.parallel_branch),
        (tally.matrix_axes, w.matrix_axis),
        (tally.credentials, w.credential),
        (tally.approval_gates, w.approval_gate),
        (tally.opaque_scripts, w.opaque_script),
        (tally.post_buckets, w.post_bucket),
    ]
    .into_iter()
    .fold(0u32, |sum, (n, weight)| sum.saturating_add(n.saturating_mul(weight)));

    let band = if total < config.low_threshold {
        Band::Low
    } else if total < config.high_threshold {
        Band::Medium
    } else {
        Band::High
    };

    let manual_item_count = pipeline.manual_items.len();
    ComplexityScore {
        total,
        band,
        feasibility: feasibility(manual_item_count, tally.stages as usize),
        manual_item_count,
        approval_gate_count: tally.approval_gates as usize,
        job_count: graph.len(),
        tally,
    }
}

/// Manual items per stage: below 0.25 is High, below 0.5 Medium.
pub fn feasibility(manual_items: usize, stages: usize) -> Feasibility {
    if stages == 0 {
        return if manual_items == 0 {
            Feasibility::High
        } else {
            Feasibility::Low
        };
    }
    let ratio = manual_items as f64 / stages as f64;
    if ratio < 0.25 {
        Feasibility::High
    } else if ratio < 0.5 {
        Feasibility::Medium
    } else {
        Feasibility::Low
    }
}

fn tally(pipeline: &Pipeline) -> Tally {
    let stages = pipeline.all_stages();
    let mut t = Tally {
        stages: count(stages.len()),
        credentials: count(pipeline.credentials.len()),
        approval_gates: count(pipeline.approval_gate_count()),
        post_buckets: count(pipeline.post.buckets.len()),
        ..Tally::default()
    };
    let post_scripts = |post: &Post| -> usize {
        post.buckets
            .iter()
            .flat_map(|b| &b.steps)
            .map(Step::opaque_script_count)
            .sum()
    };
    t.opaque_scripts += count(post_scripts(&pipeline.post));

    for stage in stages {
        t.post_buckets += count(stage.post.buckets.len());
        t.opaque_scripts += count(
            stage
                .own_steps()
                .iter()
                .map(Step::opaque_script_count)
                .sum::<usize>()
                + post_scripts(&stage.post),
        );
        match &stage.body {
            StageBody::Parallel(children) => t.parallel_branches += count(children.len()),
            StageBody::Matrix(m) => t.matrix_axes += count(m.axes.len()),
            StageBody::Steps(_) | StageBody::Sequential(_) => {}
        }
    }
    t
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
