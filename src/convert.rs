//! End-to-end conversion: parse → lower → validate → resolve → score → emit.

use serde::Serialize;

use crate::codegen::{codegen, summarize, ConversionSummary, GeneratedFile};
use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::graph::{resolve, JobGraph};
use crate::ir::{validate_pipeline, Pipeline};
use crate::score::{score, ComplexityScore};

/// Everything one conversion produces.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub workflow: GeneratedFile,
    pub actions: Vec<GeneratedFile>,
    pub summary: ConversionSummary,
}

impl ConversionOutput {
    /// Workflow first, then composite actions.
    pub fn files(&self) -> impl Iterator<Item = &GeneratedFile> {
        std::iter::once(&self.workflow).chain(&self.actions)
    }
}

/// Convert one Jenkinsfile. Returns every validation error found, or the
/// first fatal error of any other phase.
pub fn convert(source: &str, options: &ConvertOptions) -> Result<ConversionOutput, Vec<ConvertError>> {
    let (pipeline, graph, complexity) = analyze_pipeline(source, options)?;
    let output = codegen(&pipeline, &graph, options);
    let summary = summarize(&pipeline, &complexity, &output.workflow, &output.actions);
    log::info!(
        "converted {} stages into {} jobs and {} actions: complexity {} ({:?}), feasibility {:?}",
        summary.stage_count,
        summary.job_count,
        summary.action_count,
        summary.complexity_score,
        summary.band,
        summary.feasibility
    );
    Ok(ConversionOutput {
        workflow: output.workflow,
        actions: output.actions,
        summary,
    })
}

/// Score a Jenkinsfile without keeping the emitted files.
pub fn analyze(source: &str, options: &ConvertOptions) -> Result<ConversionSummary, Vec<ConvertError>> {
    convert(source, options).map(|output| output.summary)
}

/// The front half of [`convert`]: a validated pipeline, its job graph and
/// its score.
pub fn analyze_pipeline(
    source: &str,
    options: &ConvertOptions,
) -> Result<(Pipeline, JobGraph, ComplexityScore), Vec<ConvertError>> {
    let tree = crate::parse::parse(source).map_err(|e| vec![e])?;
    let pipeline = crate::lower::lower(&tree).map_err(|e| vec![e])?;

    let errors = validate_pipeline(&pipeline);
    if !errors.is_empty() {
        return Err(errors.into_iter().map(ConvertError::from).collect());
    }

    let graph = resolve(&pipeline).map_err(|e| vec![e])?;
    let complexity = score(&pipeline, &graph, &options.score);
    Ok((pipeline, graph, complexity))
}
