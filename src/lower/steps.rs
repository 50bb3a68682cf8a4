//! Step lists → closed [`Step`] union.

use crate::ir::types::*;
use crate::parse::args::{ArgValue, Args};
use crate::parse::types::{Block, Item, Statement};

use super::{directives, script, Lowerer};

/// Wrapper blocks that only affect console output.
const TRANSPARENT_WRAPPERS: &[&str] = &["timestamps", "ansiColor", "wrap"];

pub(super) fn lower_steps(cx: &mut Lowerer, block: &Block, stage: Option<&str>) -> Vec<Step> {
    block
        .items
        .iter()
        .filter_map(|item| lower_step(cx, item, stage))
        .collect()
}

fn lower_step(cx: &mut Lowerer, item: &Item, stage: Option<&str>) -> Option<Step> {
    match item {
        Item::Statement(s) => Some(lower_statement(cx, s, stage)),
        Item::Block(b) if b.name == "script" => {
            let script = script::lower_script(b);
            if !script.straight_line {
                cx.manual(
                    stage,
                    WarningKind::UnsupportedConstruct,
                    "script block uses Groovy beyond plain shell steps and env assignments; rewrite it as shell steps",
                    Some(b.compact_body()),
                );
            }
            Some(Step::Script(script))
        }
        Item::Block(b) => Some(lower_nested(cx, b, stage)),
    }
}

fn lower_statement(cx: &mut Lowerer, s: &Statement, stage: Option<&str>) -> Step {
    let args = s.parsed_args();
    if let Some(interpreter) = Interpreter::from_name(&s.name) {
        return Step::Shell(lower_shell(cx, interpreter, &args, s, stage));
    }

    let kind = PluginKind::from_name(&s.name);
    match &kind {
        PluginKind::Git => {
            if let Some(id) = args.str("credentialsId") {
                cx.credential(id, CredentialUsage::Git);
            }
        }
        PluginKind::Checkout => {
            if args.first().is_some_and(|v| !matches!(v, ArgValue::Raw(r) if r == "scm")) {
                cx.manual(
                    stage,
                    WarningKind::UnsupportedConstruct,
                    "custom checkout configuration; review the actions/checkout inputs",
                    Some(s.text.clone()),
                );
            }
        }
        PluginKind::Input if args.get("parameters").is_some() => {
            cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                "input step collects parameters; deployment environment approvals cannot",
                Some(s.text.clone()),
            );
        }
        PluginKind::BuildJob => {
            cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                format!(
                    "downstream job `{}` must be triggered with workflow_dispatch or repository_dispatch",
                    args.str_or_first("job").unwrap_or("?")
                ),
                Some(s.text.clone()),
            );
        }
        PluginKind::Unmapped(name) => {
            cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                format!("step `{}` has no GitHub Actions mapping", name),
                Some(s.text.clone()),
            );
        }
        _ => {}
    }
    Step::Plugin(PluginStep {
        kind,
        args,
        raw: s.text.clone(),
    })
}

fn lower_shell(
    cx: &mut Lowerer,
    interpreter: Interpreter,
    args: &Args,
    s: &Statement,
    stage: Option<&str>,
) -> ShellStep {
    let value = args.get("script").or_else(|| args.first());
    let script = match value {
        Some(ArgValue::Str(text)) => dedent(text),
        Some(other) => {
            cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                "shell command is built from a Groovy expression",
                Some(s.text.clone()),
            );
            other.to_text()
        }
        None => String::new(),
    };
    ShellStep {
        interpreter,
        script,
        label: args.str("label").map(String::from),
        return_stdout: args.bool("returnStdout").unwrap_or(false),
        raw: s.text.clone(),
    }
}

fn lower_nested(cx: &mut Lowerer, b: &Block, stage: Option<&str>) -> Step {
    let args = b.parsed_args();
    let kind = match b.name.as_str() {
        "withCredentials" => NestedKind::WithCredentials {
            bindings: credential_bindings(cx, &args, stage, b),
        },
        "withEnv" => NestedKind::WithEnv {
            vars: args
                .first()
                .map(ArgValue::string_items)
                .unwrap_or_default()
                .iter()
                .filter_map(|kv| kv.split_once('='))
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .collect(),
        },
        "dir" => NestedKind::Dir {
            path: args.str_or_first("path").unwrap_or(".").to_string(),
        },
        "timeout" => NestedKind::Timeout {
            minutes: directives::timeout_minutes(&args).unwrap_or(1),
        },
        "retry" => {
            let count = args
                .first()
                .and_then(ArgValue::as_int)
                .or_else(|| args.int("count"))
                .unwrap_or(1);
            cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                format!("retry({}) has no step-level equivalent; the steps run once", count),
                Some(b.header()),
            );
            NestedKind::Retry {
                count: u32::try_from(count).unwrap_or(1),
            }
        }
        "sshagent" => {
            let credentials = args
                .get("credentials")
                .or_else(|| args.first())
                .map(ArgValue::string_items)
                .unwrap_or_default();
            for id in &credentials {
                cx.credential(id, CredentialUsage::SshAgent);
            }
            NestedKind::SshAgent { credentials }
        }
        "withSonarQubeEnv" => NestedKind::WithSonarQubeEnv {
            installation: args.str_or_first("installationName").unwrap_or_default().to_string(),
        },
        "withDockerRegistry" | "docker.withRegistry" => docker_registry(cx, &args),
        name => {
            if !TRANSPARENT_WRAPPERS.contains(&name) {
                cx.manual(
                    stage,
                    WarningKind::UnsupportedConstruct,
                    format!("block step `{}` is not translated; its inner steps run unwrapped", name),
                    Some(b.header()),
                );
            }
            NestedKind::Other {
                name: name.to_string(),
            }
        }
    };
    Step::Nested(NestedStep {
        kind,
        steps: lower_steps(cx, b, stage),
        raw_header: b.header(),
    })
}

fn credential_bindings(
    cx: &mut Lowerer,
    args: &Args,
    stage: Option<&str>,
    block: &Block,
) -> Vec<CredentialBinding> {
    let items: Vec<&ArgValue> = match args.first() {
        Some(ArgValue::List(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => vec![],
    };
    let mut bindings = Vec::new();
    for item in items {
        let ArgValue::Call { name, args } = item else {
            cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                "credential binding is not a recognized call",
                Some(block.header()),
            );
            continue;
        };
        let var = |key: &str| args.str(key).map(String::from);
        let shape = match name.as_str() {
            "string" => var("variable").map(|variable| BindingShape::String { variable }),
            "usernamePassword" => match (var("usernameVariable"), var("passwordVariable")) {
                (Some(u), Some(p)) => Some(BindingShape::UsernamePassword {
                    username_variable: u,
                    password_variable: p,
                }),
                _ => None,
            },
            "file" => var("variable").map(|variable| BindingShape::File { variable }),
            "sshUserPrivateKey" => var("keyFileVariable").map(|key_file_variable| {
                BindingShape::SshUserPrivateKey {
                    key_file_variable,
                    username_variable: var("usernameVariable"),
                }
            }),
            "usernameColonPassword" => {
                var("variable").map(|variable| BindingShape::UsernameColonPassword { variable })
            }
            _ => None,
        };
        match (args.str("credentialsId"), shape) {
            (Some(id), Some(shape)) => {
                cx.credential(
                    id,
                    CredentialUsage::Scoped {
                        binding: shape.clone(),
                    },
                );
                bindings.push(CredentialBinding {
                    credentials_id: id.to_string(),
                    shape,
                });
            }
            _ => cx.manual(
                stage,
                WarningKind::UnsupportedConstruct,
                format!("credential binding `{}` is not supported", name),
                Some(block.header()),
            ),
        }
    }
    bindings
}

/// `withDockerRegistry([credentialsId: 'x', url: 'u'])`,
/// `withDockerRegistry(credentialsId: 'x', url: 'u')`,
/// `docker.withRegistry('u', 'x')`.
fn docker_registry(cx: &mut Lowerer, args: &Args) -> NestedKind {
    let map_args = match args.first() {
        Some(ArgValue::Raw(raw)) if raw.starts_with('[') && raw.ends_with(']') => {
            Some(Args::parse(&raw[1..raw.len() - 1]))
        }
        _ => None,
    };
    let named = map_args.as_ref().unwrap_or(args);
    let (url, credentials_id) = if named.named.is_empty() {
        (
            args.positional.first().and_then(ArgValue::as_str).map(String::from),
            args.positional.get(1).and_then(ArgValue::as_str).map(String::from),
        )
    } else {
        (
            named.str("url").map(String::from),
            named.str("credentialsId").map(String::from),
        )
    };
    if let Some(id) = &credentials_id {
        cx.credential(id, CredentialUsage::DockerRegistry);
    }
    NestedKind::WithDockerRegistry {
        url: url.filter(|u| !u.is_empty()),
        credentials_id,
    }
}

/// Strip a leading blank line and the common indentation.
pub(super) fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    let body = &lines[start..end];
    let indent = body
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    body.iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}
