//! Structured conversion summary for hosts and reviewers.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::ir::types::{ManualItem, Pipeline};
use crate::score::{Band, ComplexityScore, Feasibility};

use super::GeneratedFile;

static SECRET_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsecrets\.([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Label used for manual items recorded outside any stage.
pub const PIPELINE_SCOPE: &str = "(pipeline)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSummary {
    pub complexity_score: u32,
    pub band: Band,
    pub feasibility: Feasibility,
    pub stage_count: usize,
    pub job_count: usize,
    pub action_count: usize,
    pub manual_items: Vec<ManualItemSummary>,
    pub approval_gate_count: usize,
    /// Repository secrets the generated files read, sorted.
    pub required_secrets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualItemSummary {
    pub stage_name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_expression: Option<String>,
}

impl From<&ManualItem> for ManualItemSummary {
    fn from(item: &ManualItem) -> Self {
        ManualItemSummary {
            stage_name: item.stage.clone().unwrap_or_else(|| PIPELINE_SCOPE.to_string()),
            reason: item.reason.clone(),
            raw_expression: item.raw.clone(),
        }
    }
}

impl ConversionSummary {
    pub fn to_json(&self) -> Result<String, ConvertError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConvertError::config("C002", format!("Failed to serialize summary: {}", e)))
    }
}

pub fn summarize(
    pipeline: &Pipeline,
    score: &ComplexityScore,
    workflow: &GeneratedFile,
    actions: &[GeneratedFile],
) -> ConversionSummary {
    let required_secrets: BTreeSet<String> = std::iter::once(workflow)
        .chain(actions)
        .flat_map(|f| SECRET_REF.captures_iter(&f.content).map(|c| c[1].to_string()))
        .filter(|name| name != "GITHUB_TOKEN")
        .collect();

    ConversionSummary {
        complexity_score: score.total,
        band: score.band,
        feasibility: score.feasibility,
        stage_count: pipeline.all_stages().len(),
        job_count: score.job_count,
        action_count: actions.len(),
        manual_items: pipeline.manual_items.iter().map(ManualItemSummary::from).collect(),
        approval_gate_count: score.approval_gate_count,
        required_secrets: required_secrets.into_iter().collect(),
    }
}
