//! IR invariant validation.
//!
//! Checks the structural invariants of a [`Pipeline`] before graph
//! resolution. All errors are collected; conversion stops if any are found.

use std::collections::HashSet;

use crate::ir::types::*;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    /// The stage where the error was found, if applicable.
    pub stage: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.stage {
            Some(name) => write!(f, "[{}] {} (at stage '{}')", self.code, self.message, name),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Validate a pipeline against all invariants. Returns all errors found.
pub fn validate_pipeline(pipeline: &Pipeline) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_has_stages(pipeline, &mut errors);
    validate_sibling_names(&pipeline.stages, None, &mut errors);
    validate_stage_names_non_empty(pipeline, &mut errors);
    validate_groups_non_empty(pipeline, &mut errors);
    validate_matrices(pipeline, &mut errors);

    errors
}

// ---------------------------------------------------------------------------
// Invariant: at least one stage
// ---------------------------------------------------------------------------

fn validate_has_stages(pipeline: &Pipeline, errors: &mut Vec<ValidationError>) {
    if pipeline.stages.is_empty() {
        errors.push(ValidationError {
            code: "V001",
            message: "Pipeline must contain at least one stage".into(),
            stage: None,
        });
    }
}

// ---------------------------------------------------------------------------
// Invariant: stage names are unique among siblings
// ---------------------------------------------------------------------------

fn validate_sibling_names(
    stages: &[Stage],
    parent: Option<&str>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for stage in stages {
        if !seen.insert(stage.name.as_str()) {
            let scope = match parent {
                Some(p) => format!("under '{}'", p),
                None => "at the top level".to_string(),
            };
            errors.push(ValidationError {
                code: "V002",
                message: format!("Duplicate stage name '{}' {}", stage.name, scope),
                stage: Some(stage.name.clone()),
            });
        }
        validate_sibling_names(stage.nested(), Some(&stage.name), errors);
    }
}

fn validate_stage_names_non_empty(pipeline: &Pipeline, errors: &mut Vec<ValidationError>) {
    for stage in pipeline.all_stages() {
        if stage.name.trim().is_empty() {
            errors.push(ValidationError {
                code: "V003",
                message: format!("Stage at line {} has an empty name", stage.line),
                stage: None,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant: sequential and parallel groups have children
// ---------------------------------------------------------------------------

fn validate_groups_non_empty(pipeline: &Pipeline, errors: &mut Vec<ValidationError>) {
    for stage in pipeline.all_stages() {
        let kind = match &stage.body {
            StageBody::Sequential(c) if c.is_empty() => "stages",
            StageBody::Parallel(c) if c.is_empty() => "parallel",
            _ => continue,
        };
        errors.push(ValidationError {
            code: "V004",
            message: format!("Stage '{}' has an empty `{}` block", stage.name, kind),
            stage: Some(stage.name.clone()),
        });
    }
}

// ---------------------------------------------------------------------------
// Invariant: matrices declare axes and inner stages
// ---------------------------------------------------------------------------

fn validate_matrices(pipeline: &Pipeline, errors: &mut Vec<ValidationError>) {
    for stage in pipeline.all_stages() {
        let StageBody::Matrix(m) = &stage.body else {
            continue;
        };
        if m.axes.is_empty() {
            errors.push(ValidationError {
                code: "V005",
                message: format!("Matrix stage '{}' declares no axes", stage.name),
                stage: Some(stage.name.clone()),
            });
        }
        for axis in &m.axes {
            if axis.values.is_empty() {
                errors.push(ValidationError {
                    code: "V005",
                    message: format!(
                        "Matrix axis '{}' in stage '{}' has no values",
                        axis.name, stage.name
                    ),
                    stage: Some(stage.name.clone()),
                });
            }
        }
        if m.stages.is_empty() {
            errors.push(ValidationError {
                code: "V006",
                message: format!("Matrix stage '{}' has no inner stages", stage.name),
                stage: Some(stage.name.clone()),
            });
        }
    }
}
