//! Conversion options.
//!
//! Every field has a default, so an empty TOML document (or
//! `ConvertOptions::default()`) gives the standard behavior.

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConvertOptions {
    /// Top-level `name:` of the emitted workflow.
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,

    /// File name under `.github/workflows/`.
    #[serde(default = "default_workflow_file")]
    pub workflow_file: String,

    /// `runs-on` for `agent any` and for labels with no known mapping.
    #[serde(default = "default_runner")]
    pub default_runner: String,

    /// Branches for the `push` and `pull_request` triggers.
    #[serde(default = "default_branches")]
    pub default_branches: Vec<String>,

    /// A job's step list longer than this is factored into a composite
    /// action even when it is not repeated.
    #[serde(default = "default_composite_threshold")]
    pub composite_threshold: usize,

    /// `timeout-minutes` for jobs without a Jenkins `timeout` option.
    #[serde(default)]
    pub job_timeout_minutes: Option<u64>,

    #[serde(default)]
    pub score: ScoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScoreConfig {
    #[serde(default)]
    pub weights: ScoreWeights,

    /// Totals below this are `Low`.
    #[serde(default = "default_low_threshold")]
    pub low_threshold: u32,

    /// Totals below this (and at least `low-threshold`) are `Medium`.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u32,
}

/// Points per construct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScoreWeights {
    #[serde(default = "weight_stage")]
    pub stage: u32,
    #[serde(default = "weight_parallel_branch")]
    pub parallel_branch: u32,
    #[serde(default = "weight_matrix_axis")]
    pub matrix_axis: u32,
    #[serde(default = "weight_credential")]
    pub credential: u32,
    #[serde(default = "weight_approval_gate")]
    pub approval_gate: u32,
    #[serde(default = "weight_opaque_script")]
    pub opaque_script: u32,
    #[serde(default = "weight_post_bucket")]
    pub post_bucket: u32,
}

impl ConvertOptions {
    /// Load options from a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConvertError> {
        toml::from_str(text)
            .map_err(|e| ConvertError::config("C001", format!("Invalid converter options: {}", e)))
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            workflow_name: default_workflow_name(),
            workflow_file: default_workflow_file(),
            default_runner: default_runner(),
            default_branches: default_branches(),
            composite_threshold: default_composite_threshold(),
            job_timeout_minutes: None,
            score: ScoreConfig::default(),
        }
    }
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
        }
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            stage: weight_stage(),
            parallel_branch: weight_parallel_branch(),
            matrix_axis: weight_matrix_axis(),
            credential: weight_credential(),
            approval_gate: weight_approval_gate(),
            opaque_script: weight_opaque_script(),
            post_bucket: weight_post_bucket(),
        }
    }
}

fn default_workflow_name() -> String {
    "CI Pipeline".to_string()
}

fn default_workflow_file() -> String {
    "ci.yml".to_string()
}

fn default_runner() -> String {
    "ubuntu-latest".to_string()
}

fn default_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

fn default_composite_threshold() -> usize {
    8
}

fn default_low_threshold() -> u32 {
    10
}

fn default_high_threshold() -> u32 {
    25
}

fn weight_stage() -> u32 {
    1
}

fn weight_parallel_branch() -> u32 {
    2
}

fn weight_matrix_axis() -> u32 {
    3
}

fn weight_credential() -> u32 {
    2
}

fn weight_approval_gate() -> u32 {
    3
}

fn weight_opaque_script() -> u32 {
    4
}

fn weight_post_bucket() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let opts = ConvertOptions::from_toml_str("").unwrap();
        assert_eq!(opts, ConvertOptions::default());
        assert_eq!(opts.default_runner, "ubuntu-latest");
        assert_eq!(opts.default_branches, vec!["main", "master"]);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let opts = ConvertOptions::from_toml_str(
            r#"
workflow-name = "Build"
job-timeout-minutes = 45

[score]
high-threshold = 40

[score.weights]
opaque-script = 10
"#,
        )
        .unwrap();
        assert_eq!(opts.workflow_name, "Build");
        assert_eq!(opts.workflow_file, "ci.yml");
        assert_eq!(opts.job_timeout_minutes, Some(45));
        assert_eq!(opts.score.high_threshold, 40);
        assert_eq!(opts.score.low_threshold, 10);
        assert_eq!(opts.score.weights.opaque_script, 10);
        assert_eq!(opts.score.weights.stage, 1);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ConvertOptions::from_toml_str("workflow-name = [").unwrap_err();
        assert_eq!(err.code, "C001");
        assert_eq!(err.phase, crate::error::Phase::Config);
    }
}
