//! Workflow document: triggers, permissions, and one job per graph node.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::ConvertOptions;
use crate::graph::{Job, JobGraph, JobSource};
use crate::ir::types::*;
use crate::translate::condition::wrap;
use crate::translate::credentials::secret_expr;
use crate::translate::post::{needs_status, step_status};
use crate::translate::runner::{translate_agent, Runner, RunsOn};
use crate::translate::schedule::cron_schedules;
use crate::translate::variables::translate_vars;

use super::steps::{render_step, GhStep, StepBuilder};
use super::writer::YamlWriter;

static VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)*").unwrap());

const CHECKOUT: &str = "actions/checkout@v4";

/// Everything needed to render one job.
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub id: String,
    pub name: String,
    pub needs: Vec<String>,
    pub runner: Runner,
    pub comments: Vec<String>,
    /// Expression without `${{ }}`.
    pub condition: Option<String>,
    /// Deployment environment guarding the job.
    pub environment: Option<String>,
    pub timeout_minutes: Option<u64>,
    pub strategy: Option<Strategy>,
    pub env: Vec<(String, String)>,
    /// Checkout and tool setup.
    pub setup: Vec<GhStep>,
    /// The stage's own steps; the unit composite actions are factored from.
    pub body: Vec<GhStep>,
    /// Stage post buckets.
    pub post: Vec<GhStep>,
}

impl JobPlan {
    /// The job checks out the repository before its body runs.
    pub fn checks_out(&self) -> bool {
        self.setup.iter().any(|s| s.uses.as_deref() == Some(CHECKOUT))
    }

    pub fn steps(&self) -> impl Iterator<Item = &GhStep> {
        self.setup.iter().chain(&self.body).chain(&self.post)
    }
}

#[derive(Debug, Clone)]
pub struct Strategy {
    pub fail_fast: bool,
    pub axes: Vec<(String, Vec<String>)>,
    /// One map per excluded combination.
    pub exclude: Vec<Vec<(String, String)>>,
}

// =============================================================================
// PLANNING
// =============================================================================

pub fn plan_jobs(pipeline: &Pipeline, graph: &JobGraph, options: &ConvertOptions) -> Vec<JobPlan> {
    graph
        .jobs
        .iter()
        .filter_map(|job| {
            let plan = plan_job(pipeline, graph, job, options);
            if plan.is_none() {
                log::warn!("job '{}' refers to no stage in the pipeline; not emitted", job.id);
            }
            plan
        })
        .collect()
}

fn plan_job(pipeline: &Pipeline, graph: &JobGraph, job: &Job, options: &ConvertOptions) -> Option<JobPlan> {
    let (path, stage) = match &job.source {
        JobSource::Stage(path) | JobSource::StagePost(path) => (path.as_slice(), Some(pipeline.stage_at(path)?)),
        JobSource::PipelinePost => (&[][..], None),
    };
    let chain = pipeline.stage_chain(path);

    let mut plan = JobPlan {
        id: job.id.clone(),
        name: job.name.clone(),
        needs: graph.need_ids(job).into_iter().map(String::from).collect(),
        runner: runner_for(pipeline, &chain, options),
        comments: Vec::new(),
        condition: None,
        environment: None,
        timeout_minutes: chain
            .iter()
            .rev()
            .find_map(|s| s.options.timeout_minutes)
            .or(pipeline.options.timeout_minutes)
            .or(options.job_timeout_minutes),
        strategy: None,
        env: stage.map(|s| job_env(pipeline, s)).unwrap_or_default(),
        setup: Vec::new(),
        body: Vec::new(),
        post: Vec::new(),
    };

    match (&job.source, stage) {
        (JobSource::Stage(_), Some(stage)) => {
            let (condition, comments) = job_condition(&chain, job.guarded_upstream, None);
            plan.condition = condition;
            plan.comments = comments;

            let gates = stage.approval_gates();
            if !gates.is_empty() {
                plan.environment = Some(job.id.clone());
                for gate in &gates {
                    let mut line = format!("Approval gate: {}", gate.message);
                    if let Some(submitter) = &gate.submitter {
                        line.push_str(&format!(" (submitter: {})", submitter));
                    }
                    plan.comments.push(line);
                }
            }

            let mut body = StepBuilder::new();
            match &stage.body {
                StageBody::Matrix(m) => {
                    plan.strategy = Some(strategy(m, stage.fail_fast));
                    let axes: Vec<(String, String)> = m
                        .axes
                        .iter()
                        .map(|a| (a.name.clone(), format!("${{{{ matrix.{} }}}}", a.name)))
                        .collect();
                    plan.env.splice(0..0, axes);
                    for inner in &m.stages {
                        matrix_stage(&mut body, stage, &[], inner);
                    }
                }
                _ => body.add(stage.leaf_steps(), &[], None),
            }
            plan.body = body.finish();

            let mut post = StepBuilder::new();
            for bucket in &stage.post.buckets {
                post.add(&bucket.steps, &[], Some(step_status(bucket.condition)));
            }
            plan.post = post.finish();
        }
        (JobSource::StagePost(_), Some(stage)) => {
            let (condition, comments) = job_condition(&chain, false, Some("always()"));
            plan.condition = condition;
            plan.comments = comments;
            plan.post = post_job_steps(&stage.post);
        }
        _ => {
            plan.condition = Some("always()".to_string());
            plan.post = post_job_steps(&pipeline.post);
        }
    }

    let explicit_checkout = plan.body.iter().any(|s| s.uses.as_deref() == Some(CHECKOUT));
    let skip_checkout =
        pipeline.options.skip_default_checkout || chain.iter().any(|s| s.options.skip_default_checkout);
    if !skip_checkout && !explicit_checkout {
        plan.setup.push(GhStep::uses(CHECKOUT, "Checkout"));
    }
    if matches!(job.source, JobSource::Stage(_)) {
        plan.setup.extend(tool_steps(pipeline, &chain));
    }
    Some(plan)
}

fn post_job_steps(post: &Post) -> Vec<GhStep> {
    let mut b = StepBuilder::new();
    for bucket in &post.buckets {
        b.add(&bucket.steps, &[], Some(needs_status(bucket.condition)));
    }
    b.finish()
}

/// Inner stage of a matrix: its steps, guarded by its own `when` and those
/// of the inner stages around it. Nested inner stages run in order, and an
/// untranslated `when` disables the steps under a comment with its source.
fn matrix_stage<'a>(body: &mut StepBuilder, matrix: &Stage, outer: &[&'a Stage], inner: &'a Stage) {
    let mut chain = outer.to_vec();
    chain.push(inner);
    let (parts, comments) = when_parts(&chain);
    let condition = if comments.is_empty() {
        conjoin(parts)
    } else {
        Some("false".to_string())
    };
    let env: Vec<(String, String)> = inner
        .effective_env
        .iter()
        .filter(|(k, v)| matrix.effective_env.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), env_value(v)))
        .collect();

    let start = body.len();
    body.add(inner.own_steps(), &env, condition.as_deref());
    for nested in inner.nested() {
        matrix_stage(body, matrix, &chain, nested);
    }
    // Only this stage's own `when`; callers place the outer ones.
    let outer_comments = when_parts(outer).1.len();
    body.comment(start, &comments[outer_comments..]);
    if body.len() == start {
        return;
    }
    for bucket in &inner.post.buckets {
        let status = step_status(bucket.condition);
        let condition = match &condition {
            Some(c) => format!("{} && {}", status, wrap(c)),
            None => status.to_string(),
        };
        body.add(&bucket.steps, &env, Some(condition.as_str()));
    }
}

fn strategy(m: &Matrix, fail_fast: bool) -> Strategy {
    let mut exclude = Vec::new();
    for ex in &m.excludes {
        if ex.entries.is_empty() || ex.entries.iter().any(|e| e.negated) {
            continue;
        }
        // Cross product of the listed values.
        let mut combos: Vec<Vec<(String, String)>> = vec![Vec::new()];
        for entry in &ex.entries {
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    entry.values.iter().map(move |v| {
                        let mut next = combo.clone();
                        next.push((entry.axis.clone(), v.clone()));
                        next
                    })
                })
                .collect();
        }
        exclude.extend(combos);
    }
    Strategy {
        fail_fast,
        axes: m.axes.iter().map(|a| (a.name.clone(), a.values.clone())).collect(),
        exclude,
    }
}

fn runner_for(pipeline: &Pipeline, chain: &[&Stage], options: &ConvertOptions) -> Runner {
    let agent = chain
        .iter()
        .rev()
        .find_map(|s| s.agent.as_ref())
        .unwrap_or(&pipeline.agent);
    translate_agent(agent, &options.default_runner).0
}

/// `if:` for a job plus comments for conditions that did not translate.
/// Every `when` on the way down applies; an untranslated one disables the job.
fn job_condition(chain: &[&Stage], guarded_upstream: bool, status: Option<&str>) -> (Option<String>, Vec<String>) {
    let (parts, comments) = when_parts(chain);
    if !comments.is_empty() {
        return (Some("false".to_string()), comments);
    }

    let mut all: Vec<String> = match status {
        Some(status) => vec![status.to_string()],
        None if guarded_upstream => vec!["!failure()".to_string(), "!cancelled()".to_string()],
        None => Vec::new(),
    };
    all.extend(parts);
    (conjoin(all), comments)
}

/// Translated `when` expressions along `chain`, and a comment carrying the
/// source of each one that did not translate.
fn when_parts(chain: &[&Stage]) -> (Vec<String>, Vec<String>) {
    let mut parts = Vec::new();
    let mut comments = Vec::new();
    for stage in chain {
        let Some(when) = &stage.when else { continue };
        match &when.translated {
            Some(expr) => parts.push(expr.clone()),
            None => comments.push(format!(
                "when on stage '{}' needs manual translation: {}",
                stage.name, when.raw
            )),
        }
    }
    (parts, comments)
}

fn conjoin(mut parts: Vec<String>) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(parts.iter().map(|p| wrap(p)).collect::<Vec<_>>().join(" && ")),
    }
}

/// Variables the job sees beyond the workflow-level `env:`.
fn job_env(pipeline: &Pipeline, stage: &Stage) -> Vec<(String, String)> {
    stage
        .effective_env
        .iter()
        .filter(|(k, v)| pipeline.environment.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), env_value(v)))
        .collect()
}

fn env_value(value: &EnvValue) -> String {
    match value {
        EnvValue::Value(text) => translate_vars(text),
        EnvValue::Credential(id) => secret_expr(id),
    }
}

fn tool_steps(pipeline: &Pipeline, chain: &[&Stage]) -> Vec<GhStep> {
    let mut tools: Vec<&Tool> = Vec::new();
    for tool in pipeline.tools.iter().chain(chain.iter().flat_map(|s| &s.tools)) {
        match tools.iter_mut().find(|t| t.kind == tool.kind) {
            Some(existing) => *existing = tool,
            None => tools.push(tool),
        }
    }
    tools.into_iter().filter_map(tool_step).collect()
}

fn tool_step(tool: &Tool) -> Option<GhStep> {
    let version = VERSION.find(&tool.installation).map(|m| m.as_str().to_string());
    let step = match tool.kind {
        ToolKind::Maven => return None,
        ToolKind::Jdk => GhStep::uses("actions/setup-java@v4", "Set up JDK")
            .with("distribution", "temurin")
            .with("java-version", version.unwrap_or_else(|| "17".to_string())),
        ToolKind::NodeJs => GhStep::uses("actions/setup-node@v4", "Set up Node.js")
            .with("node-version", version.unwrap_or_else(|| "lts/*".to_string())),
        ToolKind::Go => GhStep::uses("actions/setup-go@v5", "Set up Go")
            .with("go-version", version.unwrap_or_else(|| "stable".to_string())),
        ToolKind::Gradle => GhStep::uses("gradle/actions/setup-gradle@v4", "Set up Gradle"),
    };
    Some(step)
}

// =============================================================================
// RENDERING
// =============================================================================

pub fn render_workflow(pipeline: &Pipeline, plans: &[JobPlan], options: &ConvertOptions) -> String {
    let mut w = YamlWriter::new();
    w.comment("Converted from a Jenkins declarative pipeline.");
    if !pipeline.manual_items.is_empty() {
        w.comment(&format!(
            "{} item(s) need manual review; see the conversion summary.",
            pipeline.manual_items.len()
        ));
    }
    w.field("name", &options.workflow_name);
    w.blank();

    render_triggers(&mut w, pipeline, options);
    w.blank();

    w.key("permissions");
    w.field("contents", "read");
    let publishes_checks = plans
        .iter()
        .flat_map(JobPlan::steps)
        .any(|s| s.uses.as_deref().is_some_and(|u| u.starts_with("mikepenz/action-junit-report")));
    if publishes_checks {
        w.field("checks", "write");
    }
    w.close();
    w.blank();

    if pipeline.options.disable_concurrent_builds {
        w.key("concurrency");
        w.field("group", "${{ github.workflow }}-${{ github.ref }}");
        w.field("cancel-in-progress", &false);
        w.close();
        w.blank();
    }

    if !pipeline.environment.is_empty() {
        w.key("env");
        for (k, v) in &pipeline.environment {
            w.field(k, &env_value(v));
        }
        w.close();
        w.blank();
    }

    w.key("jobs");
    for (i, plan) in plans.iter().enumerate() {
        if i > 0 {
            w.blank();
        }
        render_job(&mut w, plan);
    }
    w.close();
    w.finish()
}

fn render_triggers(w: &mut YamlWriter, pipeline: &Pipeline, options: &ConvertOptions) {
    w.key("on");
    for event in ["push", "pull_request"] {
        w.key(event);
        w.field("branches", &options.default_branches);
        w.close();
    }

    let crons: Vec<String> = pipeline
        .triggers
        .iter()
        .filter_map(|t| match t {
            Trigger::Cron { spec } => Some(cron_schedules(spec)),
            _ => None,
        })
        .flatten()
        .collect();
    if !crons.is_empty() {
        w.key("schedule");
        for cron in &crons {
            w.item("cron", cron);
            w.close();
        }
        w.close();
    }

    if pipeline.parameters.is_empty() {
        w.empty_key("workflow_dispatch");
    } else {
        w.key("workflow_dispatch");
        w.key("inputs");
        for param in &pipeline.parameters {
            render_input(w, param);
        }
        w.close();
        w.close();
    }
    w.close();
}

fn render_input(w: &mut YamlWriter, param: &Parameter) {
    w.key(&param.name);
    w.field("description", param.description.as_deref().unwrap_or(&param.name));
    w.field("required", &false);
    match param.kind {
        ParamKind::Boolean => {
            w.field("type", "boolean");
            let on = param.default.as_deref().is_some_and(|d| d.eq_ignore_ascii_case("true"));
            w.field("default", &on);
        }
        ParamKind::Choice => {
            w.field("type", "choice");
            w.key("options");
            for choice in &param.choices {
                w.item_value(choice);
            }
            w.close();
            if let Some(first) = param.choices.first() {
                w.field("default", first);
            }
        }
        ParamKind::String | ParamKind::Text => {
            w.field("type", "string");
            if let Some(default) = &param.default {
                w.field("default", default);
            }
        }
    }
    w.close();
}

fn render_job(w: &mut YamlWriter, plan: &JobPlan) {
    w.key(&plan.id);
    for comment in &plan.comments {
        w.comment(comment);
    }
    w.field("name", &plan.name);
    match &plan.runner.runs_on {
        RunsOn::Label(label) => w.field("runs-on", label),
        RunsOn::Labels(labels) => w.field("runs-on", labels),
    }
    if let Some(container) = &plan.runner.container {
        w.key("container");
        w.field("image", &container.image);
        if let Some(opts) = &container.options {
            w.field("options", opts);
        }
        w.close();
    }
    if !plan.needs.is_empty() {
        w.field("needs", &plan.needs);
    }
    if let Some(condition) = &plan.condition {
        w.field("if", &format!("${{{{ {} }}}}", condition));
    }
    if let Some(environment) = &plan.environment {
        w.field("environment", environment);
    }
    if let Some(minutes) = plan.timeout_minutes {
        w.field("timeout-minutes", &minutes);
    }
    if let Some(strategy) = &plan.strategy {
        w.key("strategy");
        w.field("fail-fast", &strategy.fail_fast);
        w.key("matrix");
        for (axis, values) in &strategy.axes {
            w.field(axis, values);
        }
        if !strategy.exclude.is_empty() {
            w.key("exclude");
            for combo in &strategy.exclude {
                let Some(((axis, value), rest)) = combo.split_first() else {
                    continue;
                };
                w.item(axis, value);
                for (axis, value) in rest {
                    w.field(axis, value);
                }
                w.close();
            }
            w.close();
        }
        w.close();
        w.close();
    }
    if !plan.env.is_empty() {
        w.key("env");
        for (k, v) in &plan.env {
            w.field(k, v);
        }
        w.close();
    }
    w.key("steps");
    let mut any = false;
    for step in plan.steps() {
        render_step(w, step, false);
        any = true;
    }
    if !any {
        render_step(w, &GhStep::run("echo \"No steps to run\""), false);
    }
    w.close();
    w.close();
}
