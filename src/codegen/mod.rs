//! Codegen pass: Pipeline IR + job graph → GitHub Actions documents.
//!
//! Public API: `codegen(pipeline, graph, options) -> CodegenOutput`

mod actions;
pub mod steps;
mod summary;
mod workflow;
mod writer;
pub mod yaml;

use serde::Serialize;

use crate::config::ConvertOptions;
use crate::graph::JobGraph;
use crate::ir::types::Pipeline;

pub use summary::{summarize, ConversionSummary, ManualItemSummary, PIPELINE_SCOPE};
pub use workflow::JobPlan;

/// A generated file with its repository-relative path and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// The complete output of the codegen pass.
#[derive(Debug, Clone)]
pub struct CodegenOutput {
    pub workflow: GeneratedFile,
    /// Composite actions, in order of the first job using each.
    pub actions: Vec<GeneratedFile>,
}

/// Emit the workflow and composite actions for a resolved pipeline.
pub fn codegen(pipeline: &Pipeline, graph: &JobGraph, options: &ConvertOptions) -> CodegenOutput {
    let mut plans = workflow::plan_jobs(pipeline, graph, options);
    let actions = actions::factor(&mut plans, &pipeline.parameters, options.composite_threshold);
    let content = workflow::render_workflow(pipeline, &plans, options);
    log::debug!(
        "emitted {} jobs and {} composite actions",
        plans.len(),
        actions.len()
    );

    CodegenOutput {
        workflow: GeneratedFile {
            path: format!(".github/workflows/{}", options.workflow_file),
            content,
        },
        actions,
    }
}
