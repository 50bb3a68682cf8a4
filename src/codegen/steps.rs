//! IR steps → GitHub Actions steps.
//!
//! Nested wrappers (`withCredentials`, `withEnv`, `dir`, `timeout`, …) are
//! flattened: their effect is pushed down onto every step they enclose.

use std::collections::HashSet;

use crate::graph::job_id;
use crate::ir::types::*;
use crate::parse::args::{ArgValue, Args};
use crate::translate::condition::wrap;
use crate::translate::credentials::{binding_env, credential_file_path, needs_file, secret_expr, secret_name};
use crate::translate::variables::translate_vars;

use super::writer::YamlWriter;

/// One step of a job or composite action, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhStep {
    /// Comment lines written above the step.
    pub comments: Vec<String>,
    pub name: String,
    pub id: Option<String>,
    /// Expression without `${{ }}`.
    pub condition: Option<String>,
    pub uses: Option<String>,
    pub with: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
    pub working_directory: Option<String>,
    pub shell: Option<String>,
    pub timeout_minutes: Option<u64>,
    pub run: Option<String>,
    /// Names this step writes to `$GITHUB_OUTPUT`.
    pub outputs: Vec<String>,
}

impl GhStep {
    pub fn run(script: impl Into<String>) -> GhStep {
        let script = script.into();
        let first = script.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
        let name = if first.chars().count() > 60 {
            format!("Run {}…", first.chars().take(60).collect::<String>())
        } else {
            format!("Run {}", first)
        };
        GhStep {
            name,
            run: Some(script),
            ..GhStep::blank()
        }
    }

    pub fn uses(action: &str, name: &str) -> GhStep {
        GhStep {
            name: name.to_string(),
            uses: Some(action.to_string()),
            ..GhStep::blank()
        }
    }

    fn blank() -> GhStep {
        GhStep {
            comments: Vec::new(),
            name: String::new(),
            id: None,
            condition: None,
            uses: None,
            with: Vec::new(),
            env: Vec::new(),
            working_directory: None,
            shell: None,
            timeout_minutes: None,
            run: None,
            outputs: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> GhStep {
        self.name = name.into();
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> GhStep {
        self.with.push((key.to_string(), value.into()));
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> GhStep {
        self.env.push((key.to_string(), value.into()));
        self
    }

    /// Every string a GitHub expression may appear in, for rewriting.
    pub fn strings_mut(&mut self) -> Vec<&mut String> {
        let mut out: Vec<&mut String> = Vec::new();
        out.extend(self.with.iter_mut().map(|(_, v)| v));
        out.extend(self.env.iter_mut().map(|(_, v)| v));
        out.extend(self.working_directory.as_mut());
        out.extend(self.run.as_mut());
        out
    }
}

/// Wrapper state inherited by enclosed steps.
#[derive(Debug, Clone, Default)]
struct Scope {
    env: Vec<(String, String)>,
    dir: Option<String>,
    timeout: Option<u64>,
}

/// Accumulates the steps of one job.
#[derive(Debug, Default)]
pub struct StepBuilder {
    steps: Vec<GhStep>,
    used_ids: HashSet<String>,
}

impl StepBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: GhStep) {
        self.steps.push(step);
    }

    /// Translate `steps`, with `env` on every step and `condition` as each
    /// step's `if:`.
    pub fn add<'s>(
        &mut self,
        steps: impl IntoIterator<Item = &'s Step>,
        env: &[(String, String)],
        condition: Option<&str>,
    ) {
        let start = self.steps.len();
        let scope = Scope {
            env: env.to_vec(),
            ..Scope::default()
        };
        for step in steps {
            self.step(step, &scope);
        }
        if let Some(condition) = condition {
            for s in &mut self.steps[start..] {
                s.condition = Some(match s.condition.take() {
                    Some(own) => format!("{} && {}", wrap(condition), wrap(&own)),
                    None => condition.to_string(),
                });
            }
        }
    }

    /// Put comment lines above the step at `index`, if there is one.
    pub fn comment(&mut self, index: usize, lines: &[String]) {
        if let Some(step) = self.steps.get_mut(index) {
            step.comments.splice(0..0, lines.iter().cloned());
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn finish(self) -> Vec<GhStep> {
        self.steps
    }

    fn emit(&mut self, mut step: GhStep, scope: &Scope) {
        step.env = merge_env(&scope.env, &step.env);
        if step.run.is_some() && step.working_directory.is_none() {
            step.working_directory = scope.dir.clone();
        }
        if step.timeout_minutes.is_none() {
            step.timeout_minutes = scope.timeout;
        }
        self.steps.push(step);
    }

    fn unique_id(&mut self, base: &str) -> String {
        let base = job_id(base).replace('-', "_");
        let mut id = base.clone();
        let mut n = 2;
        while !self.used_ids.insert(id.clone()) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        id
    }

    fn step(&mut self, step: &Step, scope: &Scope) {
        match step {
            Step::Shell(s) => {
                let mut gh = GhStep::run(translate_vars(&s.script));
                if let Some(label) = &s.label {
                    gh.name = label.clone();
                }
                gh.shell = s.interpreter.gha_shell().map(String::from);
                self.emit(gh, scope);
            }
            Step::Plugin(p) => {
                if let Some(gh) = plugin_step(p) {
                    self.emit(gh, scope);
                }
            }
            Step::Script(s) => self.script(s, scope),
            Step::Nested(n) => self.nested(n, scope),
        }
    }

    fn script(&mut self, script: &ScriptStep, scope: &Scope) {
        if !script.straight_line {
            self.emit(
                manual_placeholder("script block", &script.body),
                scope,
            );
            return;
        }
        for fact in &script.facts {
            match fact {
                ScriptFact::EnvAssign { name, value } => {
                    let gh = GhStep::run(format!(
                        "echo \"{}={}\" >> \"$GITHUB_ENV\"",
                        name,
                        shell_escape(&translate_vars(value))
                    ))
                    .named(format!("Set {}", name));
                    self.emit(gh, scope);
                }
                ScriptFact::Shell {
                    interpreter,
                    command,
                } => {
                    let mut gh = GhStep::run(translate_vars(command));
                    gh.shell = interpreter.gha_shell().map(String::from);
                    self.emit(gh, scope);
                }
                ScriptFact::ShellCapture { variable, command } => {
                    let mut gh = GhStep::run(format!(
                        "{v}=$({cmd})\necho \"{v}=${v}\" >> \"$GITHUB_OUTPUT\"\necho \"{v}=${v}\" >> \"$GITHUB_ENV\"",
                        v = variable,
                        cmd = translate_vars(command).trim()
                    ))
                    .named(format!("Capture {}", variable));
                    gh.id = Some(self.unique_id(variable));
                    gh.outputs.push(variable.clone());
                    self.emit(gh, scope);
                }
                ScriptFact::DockerBuild { image } => {
                    let gh = GhStep::run(format!("docker build -t \"{}\" .", translate_vars(image)))
                        .named("Build Docker image");
                    self.emit(gh, scope);
                }
                ScriptFact::ParamTest { .. } | ScriptFact::InputGate { .. } => {}
            }
        }
    }

    fn nested(&mut self, nested: &NestedStep, scope: &Scope) {
        let mut inner = scope.clone();
        match &nested.kind {
            NestedKind::WithCredentials { bindings } => {
                for binding in bindings.iter().filter(|b| needs_file(b)) {
                    let path = credential_file_path(&binding.credentials_id);
                    let mut script = format!("printf '%s\\n' \"$CREDENTIAL\" > \"{}\"", path);
                    if matches!(binding.shape, BindingShape::SshUserPrivateKey { .. }) {
                        script.push_str(&format!("\nchmod 600 \"{}\"", path));
                    }
                    let gh = GhStep::run(script)
                        .named(format!("Write {} credential file", binding.credentials_id))
                        .env("CREDENTIAL", secret_expr(&binding.credentials_id));
                    self.emit(gh, scope);
                }
                let env: Vec<(String, String)> = bindings.iter().flat_map(binding_env).collect();
                inner.env = merge_env(&inner.env, &env);
            }
            NestedKind::WithEnv { vars } => {
                let env: Vec<(String, String)> = vars
                    .iter()
                    .map(|(k, v)| (k.clone(), translate_vars(v)))
                    .collect();
                inner.env = merge_env(&inner.env, &env);
            }
            NestedKind::Dir { path } => {
                let path = translate_vars(path);
                inner.dir = Some(match &scope.dir {
                    Some(parent) if !path.starts_with('/') => {
                        format!("{}/{}", parent.trim_end_matches('/'), path)
                    }
                    _ => path,
                });
            }
            NestedKind::Timeout { minutes } => {
                inner.timeout = Some(scope.timeout.map_or(*minutes, |t| t.min(*minutes)));
            }
            NestedKind::SshAgent { credentials } => {
                let keys: Vec<String> = credentials.iter().map(|id| secret_expr(id)).collect();
                let gh = GhStep::uses("webfactory/ssh-agent@v0.9.0", "Start ssh-agent")
                    .with("ssh-private-key", keys.join("\n"));
                self.emit(gh, scope);
            }
            NestedKind::WithSonarQubeEnv { .. } => {
                inner.env = merge_env(
                    &inner.env,
                    &[
                        ("SONAR_HOST_URL".to_string(), "${{ secrets.SONAR_HOST_URL }}".to_string()),
                        ("SONAR_TOKEN".to_string(), "${{ secrets.SONAR_TOKEN }}".to_string()),
                    ],
                );
            }
            NestedKind::WithDockerRegistry {
                url,
                credentials_id,
            } => {
                let mut gh = GhStep::uses("docker/login-action@v3", "Log in to container registry");
                if let Some(url) = url {
                    gh = gh.with("registry", registry_host(url));
                }
                if let Some(id) = credentials_id {
                    let secret = secret_name(id);
                    gh = gh
                        .with("username", format!("${{{{ secrets.{}_USERNAME }}}}", secret))
                        .with("password", format!("${{{{ secrets.{}_PASSWORD }}}}", secret));
                }
                self.emit(gh, scope);
            }
            NestedKind::Retry { .. } | NestedKind::Other { .. } => {}
        }
        for step in &nested.steps {
            self.step(step, &inner);
        }
    }
}

/// `base` overridden and extended by `own`, keys unique, base order first.
fn merge_env(base: &[(String, String)], own: &[(String, String)]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = base
        .iter()
        .map(|(k, v)| {
            let v = own.iter().rev().find(|(ok, _)| ok == k).map_or(v, |(_, ov)| ov);
            (k.clone(), v.clone())
        })
        .collect();
    for (k, v) in own {
        match out.iter_mut().find(|(ok, _)| ok == k) {
            Some(existing) => existing.1 = v.clone(),
            None => out.push((k.clone(), v.clone())),
        }
    }
    out
}

fn plugin_step(p: &PluginStep) -> Option<GhStep> {
    let a = &p.args;
    let text = |key: &str| a.str_or_first(key).map(translate_vars);
    let step = match &p.kind {
        PluginKind::Checkout => GhStep::uses("actions/checkout@v4", "Checkout"),
        PluginKind::Git => {
            let mut gh = GhStep::uses("actions/checkout@v4", "Checkout");
            if let Some(repo) = a.str_or_first("url").and_then(github_repository) {
                gh = gh.with("repository", repo);
            }
            if let Some(branch) = a.str("branch") {
                gh = gh.with("ref", translate_vars(branch));
            }
            if let Some(id) = a.str("credentialsId") {
                gh = gh.with("token", secret_expr(id));
            }
            gh
        }
        PluginKind::Junit => GhStep::uses("mikepenz/action-junit-report@v4", "Publish test results")
            .with("report_paths", text("testResults").unwrap_or_default()),
        PluginKind::ArchiveArtifacts => {
            let path = text("artifacts").unwrap_or_default();
            GhStep::uses("actions/upload-artifact@v4", "Archive artifacts")
                .with("name", artifact_name(&path))
                .with("path", path)
        }
        PluginKind::PublishHtml => {
            let target = map_arg(a, "target");
            let dir = target.str("reportDir").map(translate_vars).unwrap_or_else(|| ".".to_string());
            let name = target.str("reportName").unwrap_or("html-report");
            GhStep::uses("actions/upload-artifact@v4", &format!("Publish {}", name))
                .with("name", job_id(name))
                .with("path", dir)
        }
        PluginKind::Input => return None,
        PluginKind::SlackSend => {
            let mut gh = GhStep::uses("slackapi/slack-github-action@v1.27.0", "Notify Slack");
            if let Some(channel) = a.str("channel") {
                gh = gh.with("channel-id", channel);
            }
            gh.with("slack-message", text("message").unwrap_or_default())
                .env("SLACK_BOT_TOKEN", "${{ secrets.SLACK_BOT_TOKEN }}")
        }
        PluginKind::Mail | PluginKind::Emailext => {
            GhStep::uses("dawidd6/action-send-mail@v3", "Send email")
                .with("server_address", "${{ secrets.MAIL_SERVER }}")
                .with("server_port", "465")
                .with("username", "${{ secrets.MAIL_USERNAME }}")
                .with("password", "${{ secrets.MAIL_PASSWORD }}")
                .with(
                    "from",
                    a.str("from").map_or_else(|| "${{ secrets.MAIL_USERNAME }}".to_string(), translate_vars),
                )
                .with("to", text("to").unwrap_or_default())
                .with("subject", text("subject").unwrap_or_default())
                .with("body", text("body").unwrap_or_default())
        }
        PluginKind::Echo => {
            let message = a.first().map(ArgValue::to_text).unwrap_or_default();
            GhStep::run(format!("echo \"{}\"", shell_escape(&translate_vars(&message))))
        }
        PluginKind::CleanWorkspace => GhStep::run("find . -mindepth 1 -delete").named("Clean workspace"),
        PluginKind::Stash => {
            let name = text("name").unwrap_or_else(|| "stash".to_string());
            GhStep::uses("actions/upload-artifact@v4", &format!("Stash {}", name))
                .with("name", name)
                .with("path", a.str("includes").map_or_else(|| ".".to_string(), translate_vars))
        }
        PluginKind::Unstash => {
            let name = text("name").unwrap_or_else(|| "stash".to_string());
            GhStep::uses("actions/download-artifact@v4", &format!("Unstash {}", name)).with("name", name)
        }
        PluginKind::Error => {
            let message = text("message").unwrap_or_else(|| "Build failed".to_string());
            GhStep::run(format!("echo \"::error::{}\"\nexit 1", shell_escape(&message))).named("Fail build")
        }
        PluginKind::Sleep => {
            let time = a.int("time").or_else(|| a.first().and_then(ArgValue::as_int)).unwrap_or(0);
            let seconds = match a.str("unit").unwrap_or("SECONDS") {
                "MINUTES" => time.saturating_mul(60),
                "HOURS" => time.saturating_mul(3600),
                "MILLISECONDS" => time.saturating_add(999) / 1000,
                _ => time,
            };
            GhStep::run(format!("sleep {}", seconds))
        }
        PluginKind::DockerBuild => {
            let image = text("image").unwrap_or_default();
            GhStep::run(format!("docker build -t \"{}\" .", image)).named("Build Docker image")
        }
        PluginKind::BuildJob | PluginKind::Unmapped(_) => manual_placeholder(&step_label(&p.kind), &p.raw),
    };
    Some(step)
}

fn step_label(kind: &PluginKind) -> String {
    match kind {
        PluginKind::BuildJob => "build".to_string(),
        PluginKind::Unmapped(name) => name.clone(),
        other => format!("{:?}", other),
    }
}

/// A visible stand-in for something that was not translated.
fn manual_placeholder(what: &str, raw: &str) -> GhStep {
    let mut gh = GhStep::run(format!(
        "echo \"::warning::{} was not converted automatically; see the comment above this step\"",
        shell_escape(what)
    ))
    .named(format!("Manual step: {}", what));
    gh.comments.push("Needs manual migration. Jenkins source:".to_string());
    gh.comments.push(raw.to_string());
    gh
}

/// Named map argument written as a Groovy map literal, e.g.
/// `publishHTML(target: [reportDir: 'x'])` or `publishHTML([reportDir: 'x'])`.
fn map_arg(args: &Args, key: &str) -> Args {
    let value = args.get(key).or_else(|| args.first());
    match value {
        Some(ArgValue::Raw(raw)) if raw.starts_with('[') && raw.ends_with(']') => {
            Args::parse(&raw[1..raw.len() - 1])
        }
        _ => args.clone(),
    }
}

/// `https://github.com/org/repo.git` / `git@github.com:org/repo.git` → `org/repo`.
fn github_repository(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("git@github.com:"))?;
    let repo = rest.trim_end_matches('/').trim_end_matches(".git");
    (repo.split('/').count() == 2).then(|| repo.to_string())
}

fn registry_host(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn artifact_name(path: &str) -> String {
    let stem: String = path
        .split(['*', ','])
        .next()
        .unwrap_or_default()
        .to_string();
    let base = job_id(&stem);
    let base = if base == "stage" { "artifacts".to_string() } else { base };
    format!("{}-${{{{ github.job }}}}", base)
}

/// Escape for the inside of a double-quoted shell word; `$` stays live.
fn shell_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('`', "\\`")
}

// ---------------------------------------------------------------------------
// rendering
// ---------------------------------------------------------------------------

/// Write one step as a sequence item. Composite-action steps need an
/// explicit shell and cannot carry `timeout-minutes`.
pub fn render_step(w: &mut YamlWriter, step: &GhStep, composite: bool) {
    for comment in &step.comments {
        w.comment(comment);
    }
    w.item("name", &step.name);
    if let Some(id) = &step.id {
        w.field("id", id);
    }
    if let Some(condition) = &step.condition {
        w.field("if", &format!("${{{{ {} }}}}", condition));
    }
    if let Some(uses) = &step.uses {
        w.field("uses", uses);
    }
    if !step.with.is_empty() {
        w.key("with");
        for (k, v) in &step.with {
            w.field(k, v);
        }
        w.close();
    }
    if !step.env.is_empty() {
        w.key("env");
        for (k, v) in &step.env {
            w.field(k, v);
        }
        w.close();
    }
    if let Some(dir) = &step.working_directory {
        w.field("working-directory", dir);
    }
    if step.run.is_some() {
        let shell = match &step.shell {
            Some(shell) => Some(shell.as_str()),
            None if composite => Some("bash"),
            None => None,
        };
        if let Some(shell) = shell {
            w.field("shell", shell);
        }
    }
    if !composite {
        if let Some(minutes) = step.timeout_minutes {
            w.field("timeout-minutes", &minutes);
        }
    }
    if let Some(run) = &step.run {
        w.field("run", run);
    }
    w.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower;
    use crate::parse::parse;

    fn steps_of(body: &str) -> Vec<GhStep> {
        let p = lower(
            &parse(&format!(
                "pipeline {{ stages {{ stage('S') {{ steps {{\n{}\n}} }} }} }}",
                body
            ))
            .unwrap(),
        )
        .unwrap();
        let StageBody::Steps(steps) = &p.stages[0].body else {
            panic!("expected steps");
        };
        let mut b = StepBuilder::new();
        b.add(steps, &[], None);
        b.finish()
    }

    #[test]
    fn sleep_units_convert_to_seconds() {
        let steps = steps_of("sleep time: 2, unit: 'MINUTES'\nsleep 1500, unit: 'MILLISECONDS'");
        assert_eq!(steps[0].run.as_deref(), Some("sleep 120"));
        assert_eq!(steps[1].run.as_deref(), Some("sleep 2"));
    }

    #[test]
    fn huge_sleep_pins_instead_of_overflowing() {
        let steps = steps_of("sleep time: 9223372036854775807, unit: 'HOURS'");
        assert_eq!(steps[0].run.as_deref(), Some("sleep 9223372036854775807"));
    }

    #[test]
    fn shell_step_translates_variables() {
        let steps = steps_of("sh \"docker build -t app:${BUILD_NUMBER} .\"");
        assert_eq!(steps.len(), 1);
        assert_eq!(
            steps[0].run.as_deref(),
            Some("docker build -t app:${{ github.run_number }} .")
        );
    }

    #[test]
    fn credentials_flatten_into_env() {
        let steps = steps_of(
            "withCredentials([usernamePassword(credentialsId: 'nexus', usernameVariable: 'NX_USER', passwordVariable: 'NX_PASS')]) {\n  dir('deploy') {\n    sh './push.sh'\n  }\n}",
        );
        assert_eq!(steps.len(), 1);
        assert_eq!(
            steps[0].env,
            vec![
                ("NX_USER".to_string(), "${{ secrets.NEXUS_USERNAME }}".to_string()),
                ("NX_PASS".to_string(), "${{ secrets.NEXUS_PASSWORD }}".to_string()),
            ]
        );
        assert_eq!(steps[0].working_directory.as_deref(), Some("deploy"));
    }

    #[test]
    fn file_credentials_are_written_first() {
        let steps = steps_of(
            "withCredentials([file(credentialsId: 'kubeconfig', variable: 'KUBECONFIG')]) {\n  sh 'kubectl get pods'\n}",
        );
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].env[0].1, "${{ secrets.KUBECONFIG }}");
        assert_eq!(steps[1].env[0], ("KUBECONFIG".to_string(), "${{ runner.temp }}/kubeconfig".to_string()));
    }

    #[test]
    fn script_capture_gets_an_id_and_output() {
        let steps = steps_of(
            "script {\n  def sha = sh(script: 'git rev-parse HEAD', returnStdout: true).trim()\n  env.IMAGE = \"app:${BUILD_NUMBER}\"\n}",
        );
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].id.as_deref(), Some("sha"));
        assert_eq!(steps[0].outputs, vec!["sha"]);
        assert_eq!(
            steps[1].run.as_deref(),
            Some("echo \"IMAGE=app:${{ github.run_number }}\" >> \"$GITHUB_ENV\"")
        );
    }

    #[test]
    fn opaque_script_keeps_source_as_comment() {
        let steps = steps_of("script {\n  def cfg = readYaml file: 'c.yml'\n  sh \"deploy ${cfg.target}\"\n}");
        assert_eq!(steps.len(), 1);
        assert!(steps[0].name.starts_with("Manual step"));
        assert!(steps[0].comments[1].contains("readYaml"));
    }

    #[test]
    fn timeout_wrapper_sets_step_timeout() {
        let steps = steps_of("timeout(time: 10, unit: 'MINUTES') {\n  sh 'make test'\n}");
        assert_eq!(steps[0].timeout_minutes, Some(10));
    }

    #[test]
    fn merge_env_overrides_in_place() {
        let base = vec![("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())];
        let own = vec![("B".to_string(), "3".to_string()), ("C".to_string(), "4".to_string())];
        let merged = merge_env(&base, &own);
        assert_eq!(
            merged,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "3".to_string()),
                ("C".to_string(), "4".to_string()),
            ]
        );
    }

    #[test]
    fn render_run_step() {
        let mut w = YamlWriter::new();
        let mut step = GhStep::run("make\nmake test");
        step.condition = Some("failure()".into());
        render_step(&mut w, &step, true);
        assert_eq!(
            w.finish(),
            "- name: Run make\n  if: ${{ failure() }}\n  shell: bash\n  run: |-\n    make\n    make test\n"
        );
    }
}
