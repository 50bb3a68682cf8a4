//! IR type definitions for the Jenkins converter.
//!
//! The IR bridges the untyped block tree (input) and the GitHub Actions
//! documents (output). It is built once by the lowering pass and is read-only
//! afterwards; the job graph, score and emitted files are all derived views.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::parse::Args;

// =============================================================================
// TOP-LEVEL IR
// =============================================================================

/// Complete intermediate representation of one declarative pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    pub agent: Agent,
    pub parameters: Vec<Parameter>,
    /// Global `environment { … }` bindings in declaration order.
    pub environment: IndexMap<String, EnvValue>,
    pub stages: Vec<Stage>,
    pub post: Post,
    pub options: Options,
    pub triggers: Vec<Trigger>,
    pub tools: Vec<Tool>,
    /// Distinct credential ids, first-use order.
    pub credentials: Vec<CredentialRef>,
    /// `@Library` declarations from the preamble.
    pub libraries: Vec<String>,
    /// Fidelity losses recorded while building, in discovery order.
    pub manual_items: Vec<ManualItem>,
}

impl Pipeline {
    /// Resolve a stage by its index path (top-level index first).
    pub fn stage_at(&self, path: &[usize]) -> Option<&Stage> {
        let (first, rest) = path.split_first()?;
        let mut stage = self.stages.get(*first)?;
        for &i in rest {
            stage = stage.children().get(i)?;
        }
        Some(stage)
    }

    /// The stage at `path` and all of its ancestors, outermost first.
    pub fn stage_chain(&self, path: &[usize]) -> Vec<&Stage> {
        let mut chain = Vec::with_capacity(path.len());
        for end in 1..=path.len() {
            if let Some(stage) = self.stage_at(&path[..end]) {
                chain.push(stage);
            }
        }
        chain
    }

    /// Every stage in the tree, depth-first, parents before children.
    /// Matrix inner stages are included.
    pub fn all_stages(&self) -> Vec<&Stage> {
        self.stages.iter().flat_map(Stage::subtree).collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Approval gates across all stages: stage `input` directives plus
    /// `input` steps.
    pub fn approval_gate_count(&self) -> usize {
        self.all_stages().iter().map(|s| s.own_approval_gates().len()).sum()
    }
}

// =============================================================================
// AGENT / PARAMETERS / ENVIRONMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Agent {
    Any,
    None,
    Label { label: String },
    Docker { image: String, args: Option<String> },
    Dockerfile { filename: Option<String>, dir: Option<String> },
    Kubernetes { raw: String },
    Unrecognized { raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Boolean,
    Choice,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    /// Absence is legal.
    pub default: Option<String>,
    /// Only populated for `choice`; the first entry is Jenkins' default.
    pub choices: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EnvValue {
    /// Literal text, Jenkins variable references still in Jenkins syntax.
    Value(String),
    /// `credentials('id')`
    Credential(String),
}

pub type Environment = IndexMap<String, EnvValue>;

// =============================================================================
// STAGES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    pub name: String,
    /// Names from the top-level stage down to this one.
    pub path: Vec<String>,
    pub agent: Option<Agent>,
    pub when: Option<Condition>,
    /// The stage's own `environment { … }` block.
    pub environment: Environment,
    /// Global env overlaid by each ancestor's block and then this stage's.
    pub effective_env: Environment,
    pub post: Post,
    pub options: Options,
    pub tools: Vec<Tool>,
    /// Stage-level `input { … }` directive.
    pub input: Option<ApprovalGate>,
    pub fail_fast: bool,
    pub body: StageBody,
    pub line: usize,
}

/// Exactly one body per stage.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StageBody {
    Steps(Vec<Step>),
    Sequential(Vec<Stage>),
    Parallel(Vec<Stage>),
    Matrix(Matrix),
}

impl Stage {
    /// Child stages that become jobs of their own.
    pub fn children(&self) -> &[Stage] {
        match &self.body {
            StageBody::Sequential(c) | StageBody::Parallel(c) => c,
            StageBody::Steps(_) | StageBody::Matrix(_) => &[],
        }
    }

    /// Stages directly inside this one, matrix inner stages included.
    pub fn nested(&self) -> &[Stage] {
        match &self.body {
            StageBody::Sequential(c) | StageBody::Parallel(c) => c,
            StageBody::Matrix(m) => &m.stages,
            StageBody::Steps(_) => &[],
        }
    }

    /// This stage and everything nested in it, parents first.
    pub fn subtree(&self) -> Vec<&Stage> {
        let mut out = vec![self];
        for stage in self.nested() {
            out.extend(stage.subtree());
        }
        out
    }

    /// True when this stage becomes exactly one job.
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, StageBody::Steps(_) | StageBody::Matrix(_))
    }

    /// The stage's own `steps` block.
    pub fn own_steps(&self) -> &[Step] {
        match &self.body {
            StageBody::Steps(steps) => steps,
            _ => &[],
        }
    }

    /// Steps executed by the stage's job. A matrix runs its inner stages,
    /// nested ones included, one after another.
    pub fn leaf_steps(&self) -> Vec<&Step> {
        match &self.body {
            StageBody::Steps(steps) => steps.iter().collect(),
            StageBody::Matrix(m) => m
                .stages
                .iter()
                .flat_map(Stage::subtree)
                .flat_map(|s| s.own_steps())
                .collect(),
            StageBody::Sequential(_) | StageBody::Parallel(_) => vec![],
        }
    }

    /// Gates the stage's job waits on: its `input` directive, those of
    /// matrix inner stages, and `input` steps it runs.
    pub fn approval_gates(&self) -> Vec<ApprovalGate> {
        let mut gates: Vec<ApprovalGate> = self.input.iter().cloned().collect();
        if let StageBody::Matrix(m) = &self.body {
            for inner in m.stages.iter().flat_map(Stage::subtree) {
                gates.extend(inner.input.iter().cloned());
            }
        }
        for step in self.leaf_steps() {
            step.collect_gates(&mut gates);
        }
        gates
    }

    /// Gates declared by this stage alone.
    pub fn own_approval_gates(&self) -> Vec<ApprovalGate> {
        let mut gates: Vec<ApprovalGate> = self.input.iter().cloned().collect();
        for step in self.own_steps() {
            step.collect_gates(&mut gates);
        }
        gates
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Matrix {
    pub axes: Vec<Axis>,
    pub excludes: Vec<Exclude>,
    /// Inner stages run for every cell.
    pub stages: Vec<Stage>,
}

impl Matrix {
    pub fn cell_count(&self) -> usize {
        self.axes.iter().map(|a| a.values.len().max(1)).product()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<String>,
}

/// One `exclude { … }` block: every entry must match to drop a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclude {
    pub entries: Vec<ExcludeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludeEntry {
    pub axis: String,
    pub values: Vec<String>,
    /// `notValues` instead of `values`.
    pub negated: bool,
}

// =============================================================================
// CONDITIONS
// =============================================================================

/// A `when { … }` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    /// Source text of the block body, whitespace-compacted.
    pub raw: String,
    pub guard: Guard,
    /// GitHub Actions expression (without `${{ }}`), `None` when the guard
    /// falls outside the translatable whitelist.
    pub translated: Option<String>,
    pub before_agent: bool,
    pub before_input: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Guard {
    Branch { pattern: String },
    Tag { pattern: String },
    BuildingTag,
    ChangeRequest,
    Environment { name: String, value: String },
    TriggeredBy { cause: String },
    Expression { source: String },
    AllOf { guards: Vec<Guard> },
    AnyOf { guards: Vec<Guard> },
    Not { guard: Box<Guard> },
    /// Directive outside the whitelist, kept verbatim.
    Unknown { source: String },
}

// =============================================================================
// STEPS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Shell(ShellStep),
    Plugin(PluginStep),
    Script(ScriptStep),
    Nested(NestedStep),
}

impl Step {
    fn collect_gates(&self, gates: &mut Vec<ApprovalGate>) {
        match self {
            Step::Plugin(p) if p.kind == PluginKind::Input => {
                gates.push(ApprovalGate::from_args(&p.args));
            }
            Step::Script(s) => {
                for fact in &s.facts {
                    if let ScriptFact::InputGate { message } = fact {
                        gates.push(ApprovalGate {
                            message: message.clone(),
                            ok: None,
                            submitter: None,
                            has_parameters: false,
                        });
                    }
                }
            }
            Step::Nested(n) => n.steps.iter().for_each(|s| s.collect_gates(gates)),
            _ => {}
        }
    }

    /// Opaque script blocks, counting nested ones.
    pub fn opaque_script_count(&self) -> usize {
        match self {
            Step::Script(s) if !s.straight_line => 1,
            Step::Nested(n) => n.steps.iter().map(Step::opaque_script_count).sum(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpreter {
    Sh,
    Bat,
    Powershell,
    Pwsh,
}

impl Interpreter {
    pub fn from_name(name: &str) -> Option<Interpreter> {
        match name {
            "sh" => Some(Interpreter::Sh),
            "bat" => Some(Interpreter::Bat),
            "powershell" => Some(Interpreter::Powershell),
            "pwsh" => Some(Interpreter::Pwsh),
            _ => None,
        }
    }

    /// Value for a step's `shell:` key; `None` means the runner default.
    pub fn gha_shell(self) -> Option<&'static str> {
        match self {
            Interpreter::Sh => None,
            Interpreter::Bat => Some("cmd"),
            Interpreter::Powershell => Some("powershell"),
            Interpreter::Pwsh => Some("pwsh"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellStep {
    pub interpreter: Interpreter,
    /// Script text, common indentation removed.
    pub script: String,
    pub label: Option<String>,
    /// `returnStdout: true`
    pub return_stdout: bool,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum PluginKind {
    Checkout,
    Git,
    Junit,
    ArchiveArtifacts,
    PublishHtml,
    Input,
    SlackSend,
    Mail,
    Emailext,
    Echo,
    CleanWorkspace,
    Stash,
    Unstash,
    Error,
    Sleep,
    DockerBuild,
    BuildJob,
    Unmapped(String),
}

impl PluginKind {
    pub fn from_name(name: &str) -> PluginKind {
        match name {
            "checkout" => PluginKind::Checkout,
            "git" => PluginKind::Git,
            "junit" => PluginKind::Junit,
            "archiveArtifacts" => PluginKind::ArchiveArtifacts,
            "publishHTML" => PluginKind::PublishHtml,
            "input" => PluginKind::Input,
            "slackSend" => PluginKind::SlackSend,
            "mail" => PluginKind::Mail,
            "emailext" => PluginKind::Emailext,
            "echo" => PluginKind::Echo,
            "deleteDir" | "cleanWs" => PluginKind::CleanWorkspace,
            "stash" => PluginKind::Stash,
            "unstash" => PluginKind::Unstash,
            "error" => PluginKind::Error,
            "sleep" => PluginKind::Sleep,
            "dockerBuild" | "docker.build" => PluginKind::DockerBuild,
            "build" => PluginKind::BuildJob,
            other => PluginKind::Unmapped(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginStep {
    pub kind: PluginKind,
    pub args: Args,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptStep {
    pub body: String,
    pub facts: Vec<ScriptFact>,
    /// Every non-blank line matched a known fact pattern.
    pub straight_line: bool,
}

/// A pattern recognized inside a `script { … }` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptFact {
    EnvAssign { name: String, value: String },
    Shell { interpreter: Interpreter, command: String },
    ShellCapture { variable: String, command: String },
    ParamTest { param: String },
    InputGate { message: String },
    DockerBuild { image: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedStep {
    pub kind: NestedKind,
    pub steps: Vec<Step>,
    pub raw_header: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NestedKind {
    WithCredentials { bindings: Vec<CredentialBinding> },
    WithEnv { vars: Vec<(String, String)> },
    Dir { path: String },
    Timeout { minutes: u64 },
    Retry { count: u32 },
    SshAgent { credentials: Vec<String> },
    WithSonarQubeEnv { installation: String },
    WithDockerRegistry { url: Option<String>, credentials_id: Option<String> },
    Other { name: String },
}

// =============================================================================
// CREDENTIALS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub id: String,
    /// How the credential was first used.
    pub usage: CredentialUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialUsage {
    /// `FOO = credentials('id')` in an environment block.
    Environment { variable: String },
    /// A `withCredentials([...])` binding.
    Scoped { binding: BindingShape },
    Git,
    SshAgent,
    DockerRegistry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialBinding {
    pub credentials_id: String,
    pub shape: BindingShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindingShape {
    String { variable: String },
    UsernamePassword { username_variable: String, password_variable: String },
    File { variable: String },
    SshUserPrivateKey { key_file_variable: String, username_variable: Option<String> },
    UsernameColonPassword { variable: String },
}

// =============================================================================
// POST / OPTIONS / TRIGGERS / TOOLS / GATES
// =============================================================================

/// Post conditions in Jenkins evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostCondition {
    Always,
    Changed,
    Fixed,
    Regression,
    Aborted,
    Failure,
    Success,
    Unstable,
    Unsuccessful,
    Cleanup,
}

impl PostCondition {
    pub fn from_name(name: &str) -> Option<PostCondition> {
        Some(match name {
            "always" => PostCondition::Always,
            "changed" => PostCondition::Changed,
            "fixed" => PostCondition::Fixed,
            "regression" => PostCondition::Regression,
            "aborted" => PostCondition::Aborted,
            "failure" => PostCondition::Failure,
            "success" => PostCondition::Success,
            "unstable" => PostCondition::Unstable,
            "unsuccessful" => PostCondition::Unsuccessful,
            "cleanup" => PostCondition::Cleanup,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            PostCondition::Always => "always",
            PostCondition::Changed => "changed",
            PostCondition::Fixed => "fixed",
            PostCondition::Regression => "regression",
            PostCondition::Aborted => "aborted",
            PostCondition::Failure => "failure",
            PostCondition::Success => "success",
            PostCondition::Unstable => "unstable",
            PostCondition::Unsuccessful => "unsuccessful",
            PostCondition::Cleanup => "cleanup",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Post {
    /// Sorted by [`PostCondition`], at most one bucket per condition.
    pub buckets: Vec<PostBucket>,
}

impl Post {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostBucket {
    pub condition: PostCondition,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    pub timeout_minutes: Option<u64>,
    pub retry: Option<u32>,
    /// `buildDiscarder(logRotator(numToKeepStr: …))`
    pub builds_to_keep: Option<u32>,
    pub disable_concurrent_builds: bool,
    pub skip_default_checkout: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Cron { spec: String },
    PollScm { spec: String },
    Upstream { projects: String },
    GithubPush,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Maven,
    Jdk,
    NodeJs,
    Gradle,
    Go,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Option<ToolKind> {
        match name {
            "maven" => Some(ToolKind::Maven),
            "jdk" => Some(ToolKind::Jdk),
            "nodejs" => Some(ToolKind::NodeJs),
            "gradle" => Some(ToolKind::Gradle),
            "go" => Some(ToolKind::Go),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub kind: ToolKind,
    /// Installation name as configured in Jenkins, e.g. `jdk17`.
    pub installation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalGate {
    pub message: String,
    pub ok: Option<String>,
    pub submitter: Option<String>,
    /// The gate collects `parameters { … }` from the approver.
    pub has_parameters: bool,
}

impl ApprovalGate {
    pub fn from_args(args: &Args) -> ApprovalGate {
        ApprovalGate {
            message: args
                .str_or_first("message")
                .unwrap_or("Approval required")
                .to_string(),
            ok: args.str("ok").map(String::from),
            submitter: args.str("submitter").map(String::from),
            has_parameters: args.get("parameters").is_some(),
        }
    }
}

// =============================================================================
// MANUAL ITEMS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    UnrecognizedDirective,
    ConditionTranslation,
    UnsupportedConstruct,
}

/// A recorded degradation: the original is preserved for a human to finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualItem {
    /// Owning stage, `None` at pipeline scope.
    pub stage: Option<String>,
    pub kind: WarningKind,
    pub reason: String,
    pub raw: Option<String>,
}
