//! Composite actions factored out of job bodies.
//!
//! A body is moved into `.github/actions/<id>/action.yml` when several jobs
//! share it verbatim, or when it is longer than the configured threshold.
//! Composite actions cannot see `secrets`, `inputs` or `matrix`, so every
//! such reference becomes an action input that the calling step passes in.

use std::collections::HashSet;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};

use crate::ir::types::{ParamKind, Parameter};

use super::steps::{render_step, GhStep};
use super::workflow::JobPlan;
use super::writer::YamlWriter;
use super::GeneratedFile;

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{\{(.*?)\}\}").unwrap());
static CONTEXT_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(secrets|inputs|matrix)\.([A-Za-z_][A-Za-z0-9_-]*)").unwrap());

/// Factor eligible job bodies into composite actions, replacing each body
/// with a single `uses:` step. Returns the action files in job order.
pub fn factor(plans: &mut [JobPlan], parameters: &[Parameter], threshold: usize) -> Vec<GeneratedFile> {
    let booleans: HashSet<&str> = parameters
        .iter()
        .filter(|p| p.kind == ParamKind::Boolean)
        .map(|p| p.name.as_str())
        .collect();

    let mut groups: Vec<(Vec<GhStep>, Vec<usize>)> = Vec::new();
    for (i, plan) in plans.iter().enumerate() {
        if plan.body.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(body, _)| *body == plan.body) {
            Some((_, members)) => members.push(i),
            None => groups.push((plan.body.clone(), vec![i])),
        }
    }

    let mut files = Vec::new();
    for (body, members) in groups {
        if members.len() < 2 && body.len() <= threshold {
            continue;
        }
        // `uses: ./…` resolves against the checked-out workspace.
        if !members.iter().all(|&i| plans[i].checks_out()) {
            log::debug!("not factoring '{}': a job skips checkout", plans[members[0]].id);
            continue;
        }

        let first = &plans[members[0]];
        let action = CompositeAction::build(&first.id, &first.name, members.len(), body, &booleans);
        let call = action.call_step();
        for &i in &members {
            plans[i].body = vec![call.clone()];
        }
        log::debug!("factored {} job(s) into action '{}'", members.len(), action.id);
        files.push(GeneratedFile {
            path: format!(".github/actions/{}/action.yml", action.id),
            content: action.render(),
        });
    }
    files
}

struct CompositeAction {
    id: String,
    name: String,
    shared_by: usize,
    /// Input name → expression the caller passes.
    inputs: IndexMap<String, String>,
    /// Output name → expression inside the action.
    outputs: IndexMap<String, String>,
    steps: Vec<GhStep>,
}

impl CompositeAction {
    fn build(id: &str, name: &str, shared_by: usize, mut steps: Vec<GhStep>, booleans: &HashSet<&str>) -> Self {
        let mut inputs = IndexMap::new();
        for step in &mut steps {
            if let Some(condition) = step.condition.as_mut() {
                *condition = rewrite_refs(condition, &mut inputs, booleans);
            }
            for text in step.strings_mut() {
                *text = rewrite_text(text, &mut inputs, booleans);
            }
        }

        let mut outputs = IndexMap::new();
        for step in &steps {
            let Some(step_id) = &step.id else { continue };
            for output in &step.outputs {
                outputs
                    .entry(output.clone())
                    .or_insert_with(|| format!("${{{{ steps.{}.outputs.{} }}}}", step_id, output));
            }
        }

        CompositeAction {
            id: id.to_string(),
            name: name.to_string(),
            shared_by,
            inputs,
            outputs,
            steps,
        }
    }

    fn path(&self) -> String {
        format!("./.github/actions/{}", self.id)
    }

    fn call_step(&self) -> GhStep {
        let mut step = GhStep::uses(&self.path(), &self.name);
        for (input, expr) in &self.inputs {
            step = step.with(input, expr.clone());
        }
        if !self.outputs.is_empty() {
            step.id = Some(self.id.replace('-', "_"));
        }
        step
    }

    fn render(&self) -> String {
        let mut w = YamlWriter::new();
        w.comment("Generated from a Jenkins declarative pipeline.");
        w.field("name", &self.name);
        let description = if self.shared_by > 1 {
            format!("Steps of '{}', shared by {} jobs", self.name, self.shared_by)
        } else {
            format!("Steps of '{}'", self.name)
        };
        w.field("description", &description);

        if !self.inputs.is_empty() {
            w.key("inputs");
            for (input, expr) in &self.inputs {
                w.key(input);
                w.field("description", &format!("Value of {}", strip_expression(expr)));
                w.field("required", &false);
                w.close();
            }
            w.close();
        }

        if !self.outputs.is_empty() {
            w.key("outputs");
            for (output, value) in &self.outputs {
                w.key(output);
                w.field("description", output);
                w.field("value", value);
                w.close();
            }
            w.close();
        }

        w.key("runs");
        w.field("using", "composite");
        w.key("steps");
        for step in &self.steps {
            render_step(&mut w, step, true);
        }
        w.close();
        w.close();
        w.finish()
    }
}

/// Rewrite context references inside every `${{ }}` span of `text`.
fn rewrite_text(text: &str, inputs: &mut IndexMap<String, String>, booleans: &HashSet<&str>) -> String {
    EXPRESSION
        .replace_all(text, |caps: &Captures| {
            format!("${{{{{}}}}}", rewrite_refs(&caps[1], inputs, booleans))
        })
        .into_owned()
}

/// Rewrite context references in a bare expression.
fn rewrite_refs(expr: &str, inputs: &mut IndexMap<String, String>, booleans: &HashSet<&str>) -> String {
    CONTEXT_REF
        .replace_all(expr, |caps: &Captures| {
            let (context, name) = (&caps[1], &caps[2]);
            let prefix = match context {
                "secrets" => "secret",
                "inputs" => "input",
                _ => "matrix",
            };
            let input = format!("{}_{}", prefix, name);
            inputs
                .entry(input.clone())
                .or_insert_with(|| format!("${{{{ {}.{} }}}}", context, name));
            // Action inputs are strings; restore booleans for comparisons.
            if context == "inputs" && booleans.contains(name) {
                format!("(inputs.{} == 'true')", input)
            } else {
                format!("inputs.{}", input)
            }
        })
        .into_owned()
}

fn strip_expression(expr: &str) -> &str {
    expr.trim_start_matches("${{").trim_end_matches("}}").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertOptions;
    use crate::graph::resolve;
    use crate::lower::lower;
    use crate::parse::parse;

    use super::super::workflow::plan_jobs;

    fn factored(src: &str, threshold: usize) -> (Vec<JobPlan>, Vec<GeneratedFile>) {
        let p = lower(&parse(src).unwrap()).unwrap();
        let g = resolve(&p).unwrap();
        let mut plans = plan_jobs(&p, &g, &ConvertOptions::default());
        let files = factor(&mut plans, &p.parameters, threshold);
        (plans, files)
    }

    #[test]
    fn repeated_bodies_share_one_action() {
        let (plans, files) = factored(
            "pipeline { stages {
               stage('Linux') { stages { stage('Build') { steps { sh 'make'; sh 'make test' } } } }
               stage('Windows') { stages { stage('Build') { steps { sh 'make'; sh 'make test' } } } }
             } }",
            8,
        );
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, ".github/actions/build/action.yml");
        for plan in &plans {
            assert_eq!(plan.body.len(), 1);
            assert_eq!(plan.body[0].uses.as_deref(), Some("./.github/actions/build"));
        }
        assert!(files[0].content.contains("using: composite"));
        assert!(files[0].content.contains("shell: bash"));
    }

    #[test]
    fn short_unique_bodies_stay_inline() {
        let (plans, files) = factored("pipeline { stages { stage('A') { steps { sh 'a' } } } }", 8);
        assert!(files.is_empty());
        assert_eq!(plans[0].body[0].run.as_deref(), Some("a"));
    }

    #[test]
    fn secrets_and_inputs_become_action_inputs() {
        let (plans, files) = factored(
            "pipeline {
               parameters { booleanParam(name: 'DRY_RUN', defaultValue: false) }
               stages { stage('Deploy') { steps {
                 withCredentials([string(credentialsId: 'deploy-token', variable: 'TOKEN')]) {
                   sh './deploy.sh'
                 }
               } } }
             }",
            0,
        );
        assert_eq!(files.len(), 1);
        let call = &plans[0].body[0];
        assert!(call
            .with
            .contains(&("secret_DEPLOY_TOKEN".to_string(), "${{ secrets.DEPLOY_TOKEN }}".to_string())));
        assert!(files[0].content.contains("${{ inputs.secret_DEPLOY_TOKEN }}"));
        assert!(!files[0].content.contains("secrets."));
    }

    #[test]
    fn boolean_inputs_compare_as_strings() {
        let mut inputs = IndexMap::new();
        let booleans: HashSet<&str> = ["DRY_RUN"].into_iter().collect();
        assert_eq!(
            rewrite_refs("inputs.DRY_RUN && matrix.OS == 'linux'", &mut inputs, &booleans),
            "(inputs.input_DRY_RUN == 'true') && inputs.matrix_OS == 'linux'"
        );
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs["matrix_OS"], "${{ matrix.OS }}");
    }

    #[test]
    fn jobs_without_checkout_are_not_factored() {
        let (_, files) = factored(
            "pipeline { options { skipDefaultCheckout() } stages { stage('A') { steps { sh 'a'; sh 'b' } } } }",
            0,
        );
        assert!(files.is_empty());
    }
}
