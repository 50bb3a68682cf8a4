//! `script { … }` bodies: kept opaque, plus pattern-extracted facts.
//!
//! A body is straight-line when every statement is one of the recognized
//! shapes below; only then can it be emitted as plain steps.

use std::sync::LazyLock;

use regex::Regex;

use crate::ir::types::*;
use crate::parse::args::{parse_string_literal, ArgValue, Args};
use crate::parse::types::{Block, Item, Statement};

use super::steps::dedent;

static PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"params\.([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// `def X = <rhs>`, `X = <rhs>`
static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:def|var|String)\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").unwrap()
});

/// `docker.build('image')` / `docker.build("image:${TAG}", '.')`
static DOCKER_BUILD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^docker\.build\s*\(\s*(?:'([^']*)'|"([^"]*)")"#).unwrap()
});

/// `sh(…).trim()` and friends around a capture.
static TRIM_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\.trim\(\)|\.toString\(\))+$").unwrap());

pub(super) fn lower_script(block: &Block) -> ScriptStep {
    let mut facts = Vec::new();
    let straight_line = collect_facts(&block.items, &mut facts);
    ScriptStep {
        body: dedent(&block.body),
        facts,
        straight_line,
    }
}

/// Returns true when every item was recognized as a straight-line fact.
fn collect_facts(items: &[Item], facts: &mut Vec<ScriptFact>) -> bool {
    let mut straight = true;
    for item in items {
        match item {
            Item::Statement(s) => straight &= statement_fact(s, facts),
            Item::Block(b) => {
                straight = false;
                if b.name == "if" || b.name == "else" {
                    for caps in PARAM_NAME.captures_iter(&b.args) {
                        let param = caps[1].to_string();
                        let fact = ScriptFact::ParamTest { param };
                        if !facts.contains(&fact) {
                            facts.push(fact);
                        }
                    }
                }
                collect_facts(&b.items, facts);
            }
        }
    }
    straight
}

fn statement_fact(s: &Statement, facts: &mut Vec<ScriptFact>) -> bool {
    if let Some(interpreter) = Interpreter::from_name(&s.name) {
        let args = s.parsed_args();
        let Some(command) = shell_command(&args) else {
            return false;
        };
        if args.bool("returnStdout").unwrap_or(false) || args.bool("returnStatus").unwrap_or(false) {
            return false;
        }
        facts.push(ScriptFact::Shell { interpreter, command });
        return true;
    }

    if let Some(name) = s.name.strip_prefix("env.") {
        let value = s.args.trim().strip_prefix('=').map(str::trim);
        return match value.and_then(parse_string_literal) {
            Some(value) => {
                facts.push(ScriptFact::EnvAssign {
                    name: name.to_string(),
                    value,
                });
                true
            }
            None => false,
        };
    }

    match s.name.as_str() {
        "echo" => {
            let args = s.parsed_args();
            match args.first() {
                Some(ArgValue::Str(_)) => {
                    facts.push(ScriptFact::Shell {
                        interpreter: Interpreter::Sh,
                        command: format!("echo {}", s.args.trim()),
                    });
                    true
                }
                _ => false,
            }
        }
        "input" => {
            let args = s.parsed_args();
            facts.push(ScriptFact::InputGate {
                message: args
                    .str_or_first("message")
                    .unwrap_or("Approval required")
                    .to_string(),
            });
            args.get("parameters").is_none()
        }
        _ => assignment_fact(&s.text, facts),
    }
}

/// `def X = sh(script: '…', returnStdout: true).trim()` and
/// `def img = docker.build('…')`.
fn assignment_fact(text: &str, facts: &mut Vec<ScriptFact>) -> bool {
    if let Some(caps) = DOCKER_BUILD.captures(text) {
        facts.push(docker_build(&caps));
        return true;
    }
    let Some(caps) = ASSIGNMENT.captures(text) else {
        return false;
    };
    let variable = caps[1].to_string();
    let rhs = caps[2].trim();
    if let Some(build) = DOCKER_BUILD.captures(rhs) {
        facts.push(docker_build(&build));
        return true;
    }
    let rhs = TRIM_SUFFIX.replace(rhs, "");
    let Some(call) = rhs.strip_prefix("sh") else {
        return false;
    };
    let args = Args::parse(call.trim());
    if !args.bool("returnStdout").unwrap_or(false) {
        return false;
    }
    match shell_command(&args) {
        Some(command) => {
            facts.push(ScriptFact::ShellCapture { variable, command });
            true
        }
        None => false,
    }
}

fn docker_build(caps: &regex::Captures) -> ScriptFact {
    let image = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    ScriptFact::DockerBuild { image }
}

fn shell_command(args: &Args) -> Option<String> {
    match args.get("script").or_else(|| args.first())? {
        ArgValue::Str(text) => Some(dedent(text)),
        _ => None,
    }
}
