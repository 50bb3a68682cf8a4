//! agent / parameters / environment / options / triggers / tools.

use crate::ir::types::*;
use crate::parse::args::{parse_string_literal, ArgValue, Args};
use crate::parse::types::{Block, Item};
use crate::translate::runner::map_label;
use crate::translate::schedule::cron_schedules;

use super::Lowerer;

// ---------------------------------------------------------------------------
// agent
// ---------------------------------------------------------------------------

pub(super) fn lower_agent(cx: &mut Lowerer, item: &Item, stage: Option<&str>) -> Agent {
    let agent = match item {
        Item::Statement(s) => agent_from_statement(cx, s.args.trim()),
        Item::Block(b) => agent_from_block(cx, b),
    };
    match &agent {
        Agent::Dockerfile { .. } | Agent::Kubernetes { .. } | Agent::Unrecognized { .. } => {
            cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                "agent cannot be mapped to a GitHub-hosted runner; jobs use the default runner",
                Some(item.snippet()),
            );
        }
        Agent::Label { label } => {
            if let (_, Some(reason)) = map_label(label, "") {
                cx.manual(stage, WarningKind::UnsupportedConstruct, reason, Some(item.snippet()));
            }
        }
        _ => {}
    }
    agent
}

fn agent_from_statement(cx: &mut Lowerer, args: &str) -> Agent {
    match args {
        "any" => Agent::Any,
        "none" => Agent::None,
        _ => match args.split_once(char::is_whitespace) {
            Some(("label", rest)) => Agent::Label {
                label: Args::parse(rest).first().map(ArgValue::to_text).unwrap_or_default(),
            },
            Some(("docker", rest)) => docker_agent(cx, &Args::parse(rest)),
            _ => Agent::Unrecognized {
                raw: args.to_string(),
            },
        },
    }
}

fn agent_from_block(cx: &mut Lowerer, block: &Block) -> Agent {
    let Some(first) = block.items.first() else {
        return Agent::Any;
    };
    match (first.name(), first) {
        ("label", Item::Statement(s)) => Agent::Label {
            label: s.parsed_args().first().map(ArgValue::to_text).unwrap_or_default(),
        },
        ("node", Item::Block(b)) => match b.find_statement("label") {
            Some(s) => Agent::Label {
                label: s.parsed_args().first().map(ArgValue::to_text).unwrap_or_default(),
            },
            None => Agent::Any,
        },
        ("docker", Item::Statement(s)) => docker_agent(cx, &s.parsed_args()),
        ("docker", Item::Block(b)) => {
            let image = block_str(b, "image").unwrap_or_default();
            if let Some(id) = block_str(b, "registryCredentialsId") {
                cx.credential(&id, CredentialUsage::DockerRegistry);
            }
            Agent::Docker {
                image,
                args: block_str(b, "args"),
            }
        }
        ("dockerfile", Item::Statement(_)) => Agent::Dockerfile {
            filename: None,
            dir: None,
        },
        ("dockerfile", Item::Block(b)) => Agent::Dockerfile {
            filename: block_str(b, "filename"),
            dir: block_str(b, "dir"),
        },
        ("kubernetes", _) => Agent::Kubernetes {
            raw: first.snippet(),
        },
        _ => Agent::Unrecognized {
            raw: first.snippet(),
        },
    }
}

fn docker_agent(cx: &mut Lowerer, args: &Args) -> Agent {
    if let Some(id) = args.str("registryCredentialsId") {
        cx.credential(id, CredentialUsage::DockerRegistry);
    }
    Agent::Docker {
        image: args.str_or_first("image").unwrap_or_default().to_string(),
        args: args.str("args").map(String::from),
    }
}

/// Value of a `key 'value'` statement inside a block.
fn block_str(block: &Block, key: &str) -> Option<String> {
    block
        .find_statement(key)
        .and_then(|s| s.parsed_args().first().map(ArgValue::to_text))
}

// ---------------------------------------------------------------------------
// parameters
// ---------------------------------------------------------------------------

pub(super) fn lower_parameters(cx: &mut Lowerer, block: &Block) -> Vec<Parameter> {
    let mut params = Vec::new();
    for item in &block.items {
        let Item::Statement(s) = item else {
            cx.unrecognized(None, item);
            continue;
        };
        let args = s.parsed_args();
        let kind = match s.name.as_str() {
            "string" => ParamKind::String,
            "text" => ParamKind::Text,
            "booleanParam" => ParamKind::Boolean,
            "choice" => ParamKind::Choice,
            "password" => {
                cx.manual(
                    None,
                    WarningKind::UnsupportedConstruct,
                    format!(
                        "password parameter `{}` becomes a string input; store the value as a secret instead",
                        args.str("name").unwrap_or("?")
                    ),
                    Some(item.snippet()),
                );
                ParamKind::String
            }
            _ => {
                cx.manual(
                    None,
                    WarningKind::UnsupportedConstruct,
                    format!("parameter type `{}` has no workflow_dispatch input type", s.name),
                    Some(item.snippet()),
                );
                continue;
            }
        };
        let Some(name) = args.str("name") else {
            cx.manual(
                None,
                WarningKind::UnsupportedConstruct,
                "parameter without a `name`",
                Some(item.snippet()),
            );
            continue;
        };
        let choices = match kind {
            ParamKind::Choice => args.get("choices").map(ArgValue::string_items).unwrap_or_default(),
            _ => Vec::new(),
        };
        let default = match kind {
            ParamKind::Choice => choices.first().cloned(),
            _ => args.get("defaultValue").map(ArgValue::to_text),
        };
        params.push(Parameter {
            name: name.to_string(),
            kind,
            default,
            choices,
            description: args.str("description").map(String::from),
        });
    }
    params
}

// ---------------------------------------------------------------------------
// environment
// ---------------------------------------------------------------------------

pub(super) fn lower_environment(cx: &mut Lowerer, block: &Block, stage: Option<&str>) -> Environment {
    let mut env = Environment::new();
    for item in &block.items {
        let Item::Statement(s) = item else {
            cx.unrecognized(stage, item);
            continue;
        };
        let Some(value) = s.args.trim().strip_prefix('=') else {
            cx.unrecognized(stage, item);
            continue;
        };
        let value = value.trim();
        let parsed = Args::parse(value);
        let lowered = match parsed.first() {
            Some(ArgValue::Call { name, args }) if name == "credentials" && parsed.positional.len() == 1 => {
                match args.first_str() {
                    Some(id) => {
                        cx.credential(
                            id,
                            CredentialUsage::Environment {
                                variable: s.name.clone(),
                            },
                        );
                        EnvValue::Credential(id.to_string())
                    }
                    None => computed(cx, stage, &s.name, value),
                }
            }
            _ => match parse_string_literal(value) {
                Some(text) => EnvValue::Value(text),
                None if is_plain_literal(value) => EnvValue::Value(value.to_string()),
                None => computed(cx, stage, &s.name, value),
            },
        };
        env.insert(s.name.clone(), lowered);
    }
    env
}

fn is_plain_literal(value: &str) -> bool {
    value == "true" || value == "false" || value.parse::<f64>().is_ok()
}

fn computed(cx: &mut Lowerer, stage: Option<&str>, name: &str, value: &str) -> EnvValue {
    cx.manual(
        stage,
        WarningKind::UnsupportedConstruct,
        format!("environment variable `{}` is computed by a Groovy expression", name),
        Some(format!("{} = {}", name, value)),
    );
    EnvValue::Value(value.to_string())
}

// ---------------------------------------------------------------------------
// options
// ---------------------------------------------------------------------------

/// Options with no runtime effect on a hosted runner.
const IMPLICIT_OPTIONS: &[&str] = &[
    "timestamps",
    "ansiColor",
    "preserveStashes",
    "parallelsAlwaysFailFast",
    "quietPeriod",
    "durabilityHint",
];

pub(super) fn lower_options(cx: &mut Lowerer, block: &Block, stage: Option<&str>) -> Options {
    let mut options = Options::default();
    for item in &block.items {
        let Item::Statement(s) = item else {
            cx.unrecognized(stage, item);
            continue;
        };
        let args = s.parsed_args();
        match s.name.as_str() {
            "timeout" => options.timeout_minutes = timeout_minutes(&args),
            "retry" => {
                let count = args.first().and_then(ArgValue::as_int).unwrap_or(1);
                options.retry = u32::try_from(count).ok();
                cx.manual(
                    stage,
                    WarningKind::UnsupportedConstruct,
                    format!("retry({}) has no job-level equivalent; failed jobs must be re-run", count),
                    Some(item.snippet()),
                );
            }
            "buildDiscarder" => {
                options.builds_to_keep = match args.first() {
                    Some(ArgValue::Call { args, .. }) => args
                        .int("numToKeepStr")
                        .or_else(|| args.int("numToKeep"))
                        .and_then(|n| u32::try_from(n).ok()),
                    _ => None,
                };
            }
            "disableConcurrentBuilds" => options.disable_concurrent_builds = true,
            "skipDefaultCheckout" => {
                options.skip_default_checkout = args.first().and_then(ArgValue::as_bool).unwrap_or(true);
            }
            name if IMPLICIT_OPTIONS.contains(&name) => {}
            _ => cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                format!("option `{}` is not translated", s.name),
                Some(item.snippet()),
            ),
        }
    }
    options
}

/// `timeout(time: 2, unit: 'HOURS')`, `timeout(30)`; minutes, rounded up.
pub(super) fn timeout_minutes(args: &Args) -> Option<u64> {
    let time = args
        .int("time")
        .or_else(|| args.first().and_then(ArgValue::as_int))?;
    let time = u64::try_from(time).ok()?;
    let minutes = match args.str("unit").unwrap_or("MINUTES") {
        "SECONDS" => time.div_ceil(60),
        "MILLISECONDS" => time.div_ceil(60_000),
        "HOURS" => time.saturating_mul(60),
        "DAYS" => time.saturating_mul(60 * 24),
        _ => time,
    };
    Some(minutes.max(1))
}

// ---------------------------------------------------------------------------
// triggers / tools
// ---------------------------------------------------------------------------

pub(super) fn lower_triggers(cx: &mut Lowerer, block: &Block) -> Vec<Trigger> {
    let mut triggers = Vec::new();
    for item in &block.items {
        let Item::Statement(s) = item else {
            cx.unrecognized(None, item);
            continue;
        };
        let args = s.parsed_args();
        match s.name.as_str() {
            "cron" => {
                let spec = args.str_or_first("spec").unwrap_or_default().to_string();
                if cron_schedules(&spec).is_empty() {
                    cx.manual(
                        None,
                        WarningKind::UnsupportedConstruct,
                        "cron spec has no schedule equivalent",
                        Some(item.snippet()),
                    );
                }
                triggers.push(Trigger::Cron { spec });
            }
            "pollSCM" => triggers.push(Trigger::PollScm {
                spec: args.str_or_first("scmpoll_spec").unwrap_or_default().to_string(),
            }),
            "upstream" => {
                let projects = args
                    .str("upstreamProjects")
                    .or_else(|| args.first_str())
                    .unwrap_or_default()
                    .to_string();
                cx.manual(
                    None,
                    WarningKind::UnsupportedConstruct,
                    format!(
                        "upstream trigger on `{}`: use a workflow_run trigger on the converted upstream workflow",
                        projects
                    ),
                    Some(item.snippet()),
                );
                triggers.push(Trigger::Upstream { projects });
            }
            "githubPush" => triggers.push(Trigger::GithubPush),
            _ => cx.manual(
                None,
                WarningKind::UnsupportedConstruct,
                format!("trigger `{}` is not translated", s.name),
                Some(item.snippet()),
            ),
        }
    }
    triggers
}

pub(super) fn lower_tools(cx: &mut Lowerer, block: &Block, stage: Option<&str>) -> Vec<Tool> {
    let mut tools = Vec::new();
    for item in &block.items {
        let Item::Statement(s) = item else {
            cx.unrecognized(stage, item);
            continue;
        };
        match ToolKind::from_name(&s.name) {
            Some(kind) => tools.push(Tool {
                kind,
                installation: s.parsed_args().first().map(ArgValue::to_text).unwrap_or_default(),
            }),
            None => cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                format!("tool `{}` has no setup action mapping", s.name),
                Some(item.snippet()),
            ),
        }
    }
    tools
}
