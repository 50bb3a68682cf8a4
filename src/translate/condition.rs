//! `when` guards → GitHub Actions `if:` expressions.
//!
//! Only a fixed whitelist translates. Matching is structural: a top-level
//! `&&` / `||` splitter plus regex shapes for the atoms. Anything outside the
//! whitelist yields `None` so the caller can record a manual item.

use std::sync::LazyLock;

use regex::Regex;

use super::expr_string;
use crate::ir::types::{Guard, ParamKind, Parameter};
use crate::parse::types::compact;

/// `params.X`, `params.X.toBoolean()`, `params.X as boolean`
static BOOL_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^params\.([A-Za-z_][A-Za-z0-9_]*)(?:\.toBoolean\(\)|\s+as\s+boolean)?$").unwrap()
});

/// `<var> ==|!= <literal>` with the variable on either side.
static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:(?P<lvar>(?:params\.|env\.)?[A-Za-z_][A-Za-z0-9_]*)\s*(?P<lop>==|!=)\s*(?P<lit>'[^']*'|"[^"$]*"|true|false)|(?P<rlit>'[^']*'|"[^"$]*"|true|false)\s*(?P<rop>==|!=)\s*(?P<rvar>(?:params\.|env\.)?[A-Za-z_][A-Za-z0-9_]*))$"#,
    )
    .unwrap()
});

/// `<var>.equals('v')`
static EQUALS_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?P<var>(?:params\.|env\.)?[A-Za-z_][A-Za-z0-9_]*)\.equals\(\s*(?P<lit>'[^']*'|"[^"$]*")\s*\)$"#)
        .unwrap()
});

/// What a guard may refer to.
pub struct ConditionContext<'a> {
    pub parameters: &'a [Parameter],
}

impl<'a> ConditionContext<'a> {
    pub fn new(parameters: &'a [Parameter]) -> Self {
        Self { parameters }
    }

    fn parameter(&self, name: &str) -> Option<&'a Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Translate a guard tree. `None` means the guard is outside the whitelist.
pub fn translate_guard(guard: &Guard, ctx: &ConditionContext) -> Option<String> {
    match guard {
        Guard::Branch { pattern } => ref_match("refs/heads/", pattern),
        Guard::Tag { pattern } => {
            if pattern.is_empty() || pattern == "*" {
                Some("startsWith(github.ref, 'refs/tags/')".to_string())
            } else {
                ref_match("refs/tags/", pattern)
            }
        }
        Guard::BuildingTag => Some("startsWith(github.ref, 'refs/tags/')".to_string()),
        Guard::ChangeRequest => Some("github.event_name == 'pull_request'".to_string()),
        Guard::Environment { name, value } => compare_variable(name, "==", &Literal::Str(value.clone()), ctx),
        Guard::TriggeredBy { cause } => triggered_by(cause),
        Guard::Expression { source } => translate_expression(source, ctx),
        Guard::AllOf { guards } => join(guards, " && ", ctx),
        Guard::AnyOf { guards } => join(guards, " || ", ctx),
        Guard::Not { guard } => translate_guard(guard, ctx).map(|e| format!("!({})", e)),
        Guard::Unknown { .. } => None,
    }
}

fn join(guards: &[Guard], op: &str, ctx: &ConditionContext) -> Option<String> {
    if guards.is_empty() {
        return None;
    }
    let parts = guards
        .iter()
        .map(|g| translate_guard(g, ctx))
        .collect::<Option<Vec<_>>>()?;
    if parts.len() == 1 {
        return parts.into_iter().next();
    }
    Some(
        parts
            .iter()
            .map(|p| format!("({})", p))
            .collect::<Vec<_>>()
            .join(op),
    )
}

/// Exact ref or trailing-`*` prefix glob. Other glob shapes don't translate.
fn ref_match(prefix: &str, pattern: &str) -> Option<String> {
    match pattern.strip_suffix('*') {
        Some(stem) if !stem.contains(['*', '?', '[']) => Some(format!(
            "startsWith(github.ref, {})",
            expr_string(&format!("{}{}", prefix, stem))
        )),
        Some(_) => None,
        None if pattern.contains(['*', '?', '[']) => None,
        None => Some(format!(
            "github.ref == {}",
            expr_string(&format!("{}{}", prefix, pattern))
        )),
    }
}

fn triggered_by(cause: &str) -> Option<String> {
    let event = match cause {
        "TimerTrigger" | "TimerTriggerCause" | "hudson.triggers.TimerTrigger$TimerTriggerCause" => {
            "schedule"
        }
        "UserIdCause" | "UserCause" | "hudson.model.Cause$UserIdCause" => "workflow_dispatch",
        "SCMTrigger" | "SCMTriggerCause" | "BranchIndexingCause" | "BranchEventCause" => "push",
        _ => return None,
    };
    Some(format!("github.event_name == '{}'", event))
}

// ---------------------------------------------------------------------------
// expression { … }
// ---------------------------------------------------------------------------

/// Translate the Groovy body of `expression { … }`.
pub fn translate_expression(source: &str, ctx: &ConditionContext) -> Option<String> {
    let compacted = compact(source);
    let mut text = compacted.trim_end_matches(';').trim();
    if let Some(rest) = text.strip_prefix("return") {
        if rest.starts_with(' ') || rest.starts_with('(') {
            text = rest.trim();
        }
    }
    if text.is_empty() {
        return None;
    }
    translate_or(text, ctx)
}

fn translate_or(text: &str, ctx: &ConditionContext) -> Option<String> {
    let parts = split_logical(text, "||");
    if parts.len() > 1 {
        let translated = parts
            .iter()
            .map(|p| translate_and(p, ctx).map(|e| wrap(&e)))
            .collect::<Option<Vec<_>>>()?;
        return Some(translated.join(" || "));
    }
    translate_and(text, ctx)
}

fn translate_and(text: &str, ctx: &ConditionContext) -> Option<String> {
    let parts = split_logical(text, "&&");
    if parts.len() > 1 {
        let translated = parts
            .iter()
            .map(|p| translate_unary(p, ctx).map(|e| wrap(&e)))
            .collect::<Option<Vec<_>>>()?;
        return Some(translated.join(" && "));
    }
    translate_unary(text, ctx)
}

fn translate_unary(text: &str, ctx: &ConditionContext) -> Option<String> {
    let text = text.trim();
    if let Some(inner) = strip_parens(text) {
        return translate_or(inner, ctx);
    }
    if let Some(rest) = text.strip_prefix('!') {
        if !rest.starts_with('=') {
            return translate_unary(rest, ctx).map(|e| format!("!{}", wrap(&e)));
        }
    }
    translate_atom(text, ctx)
}

fn translate_atom(text: &str, ctx: &ConditionContext) -> Option<String> {
    match text {
        "true" => return Some("true".to_string()),
        "false" => return Some("false".to_string()),
        _ => {}
    }
    if let Some(caps) = BOOL_TEST.captures(text) {
        let param = ctx.parameter(&caps[1])?;
        return bool_test(param);
    }
    if let Some(caps) = COMPARISON.captures(text) {
        let (var, op, lit) = match caps.name("lvar") {
            Some(var) => (var.as_str(), &caps["lop"], &caps["lit"]),
            None => (&caps["rvar"], &caps["rop"], &caps["rlit"]),
        };
        return compare_variable(var, op, &Literal::parse(lit), ctx);
    }
    if let Some(caps) = EQUALS_CALL.captures(text) {
        return compare_variable(&caps["var"], "==", &Literal::parse(&caps["lit"]), ctx);
    }
    None
}

enum Literal {
    Str(String),
    Bool(bool),
}

impl Literal {
    fn parse(text: &str) -> Literal {
        match text {
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            quoted => Literal::Str(quoted[1..quoted.len() - 1].to_string()),
        }
    }
}

/// Compare a Jenkins variable (`params.X`, `env.X`, bare `X`) to a literal.
fn compare_variable(var: &str, op: &str, lit: &Literal, ctx: &ConditionContext) -> Option<String> {
    let (explicit_param, name) = match var.strip_prefix("params.") {
        Some(name) => (true, name),
        None => (false, var.strip_prefix("env.").unwrap_or(var)),
    };

    if !explicit_param {
        if let Some(expr) = compare_builtin(name, op, lit) {
            return Some(expr);
        }
    }

    let param = ctx.parameter(name)?;
    match (param.kind, lit) {
        (ParamKind::Boolean, Literal::Bool(b)) => {
            let test = bool_test(param)?;
            let positive = (op == "==") == *b;
            Some(if positive { test } else { format!("!{}", wrap(&test)) })
        }
        (ParamKind::Boolean, Literal::Str(s)) if s == "true" || s == "false" => {
            compare_variable(var, op, &Literal::Bool(s == "true"), ctx)
        }
        (ParamKind::Boolean, Literal::Str(_)) => None,
        (_, Literal::Str(s)) => Some(format!("{} {} {}", param_value(param), op, expr_string(s))),
        (_, Literal::Bool(_)) => None,
    }
}

/// Built-in branch and tag variables.
fn compare_builtin(name: &str, op: &str, lit: &Literal) -> Option<String> {
    let Literal::Str(value) = lit else {
        return None;
    };
    let full_ref = match name {
        "BRANCH_NAME" => format!("refs/heads/{}", value),
        "GIT_BRANCH" => format!(
            "refs/heads/{}",
            value.strip_prefix("origin/").unwrap_or(value)
        ),
        "TAG_NAME" => format!("refs/tags/{}", value),
        _ => return None,
    };
    Some(format!("github.ref {} {}", op, expr_string(&full_ref)))
}

/// Expression for a parameter's value, falling back to the Jenkins default
/// on events that carry no inputs.
fn param_value(param: &Parameter) -> String {
    let default = match param.kind {
        ParamKind::Choice => param.choices.first().cloned().or_else(|| param.default.clone()),
        _ => param.default.clone(),
    };
    match default {
        Some(d) if !d.is_empty() => format!("(inputs.{} || {})", param.name, expr_string(&d)),
        _ => format!("inputs.{}", param.name),
    }
}

/// Truthiness test for a boolean parameter.
fn bool_test(param: &Parameter) -> Option<String> {
    if param.kind != ParamKind::Boolean {
        return None;
    }
    if param.default.as_deref() == Some("true") {
        Some(format!(
            "(github.event_name != 'workflow_dispatch' || inputs.{})",
            param.name
        ))
    } else {
        Some(format!("inputs.{} == true", param.name))
    }
}

/// Parenthesize an operand unless it is atomic or already wrapped.
pub fn wrap(expr: &str) -> String {
    if !expr.contains(' ') || strip_parens(expr).is_some() {
        expr.to_string()
    } else {
        format!("({})", expr)
    }
}

/// Split on a logical operator outside strings and brackets.
pub fn split_logical<'a>(text: &'a str, op: &str) -> Vec<&'a str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ if depth == 0 && bytes[i..].starts_with(op.as_bytes()) => {
                parts.push(text[start..i].trim());
                i += op.len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(text[start..].trim());
    parts
}

/// Inner text when `text` is wrapped in one matching pair of parentheses.
fn strip_parens(text: &str) -> Option<&str> {
    if !text.starts_with('(') || !text.ends_with(')') {
        return None;
    }
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 && i != bytes.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(&text[1..text.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<Parameter> {
        vec![
            Parameter {
                name: "ENVIRONMENT".into(),
                kind: ParamKind::Choice,
                default: None,
                choices: vec!["dev".into(), "staging".into(), "production".into()],
                description: None,
            },
            Parameter {
                name: "RUN_TESTS".into(),
                kind: ParamKind::Boolean,
                default: Some("true".into()),
                choices: vec![],
                description: None,
            },
            Parameter {
                name: "DRY_RUN".into(),
                kind: ParamKind::Boolean,
                default: Some("false".into()),
                choices: vec![],
                description: None,
            },
        ]
    }

    fn expr(src: &str) -> Option<String> {
        let p = params();
        translate_expression(src, &ConditionContext::new(&p))
    }

    fn guard(g: Guard) -> Option<String> {
        let p = params();
        translate_guard(&g, &ConditionContext::new(&p))
    }

    #[test]
    fn branch_exact_and_glob() {
        assert_eq!(
            guard(Guard::Branch { pattern: "main".into() }).as_deref(),
            Some("github.ref == 'refs/heads/main'")
        );
        assert_eq!(
            guard(Guard::Branch { pattern: "release/*".into() }).as_deref(),
            Some("startsWith(github.ref, 'refs/heads/release/')")
        );
        assert_eq!(guard(Guard::Branch { pattern: "feat-*-x".into() }), None);
    }

    #[test]
    fn tags_and_change_requests() {
        assert_eq!(
            guard(Guard::BuildingTag).as_deref(),
            Some("startsWith(github.ref, 'refs/tags/')")
        );
        assert_eq!(
            guard(Guard::Tag { pattern: "v1.0".into() }).as_deref(),
            Some("github.ref == 'refs/tags/v1.0'")
        );
        assert_eq!(
            guard(Guard::ChangeRequest).as_deref(),
            Some("github.event_name == 'pull_request'")
        );
    }

    #[test]
    fn choice_parameter_equality_uses_first_choice_as_default() {
        assert_eq!(
            expr("params.ENVIRONMENT == 'production'").as_deref(),
            Some("(inputs.ENVIRONMENT || 'dev') == 'production'")
        );
        assert_eq!(
            expr("return 'production' != params.ENVIRONMENT").as_deref(),
            Some("(inputs.ENVIRONMENT || 'dev') != 'production'")
        );
    }

    #[test]
    fn boolean_parameter_tests() {
        assert_eq!(
            expr("params.DRY_RUN").as_deref(),
            Some("inputs.DRY_RUN == true")
        );
        assert_eq!(
            expr("params.RUN_TESTS").as_deref(),
            Some("(github.event_name != 'workflow_dispatch' || inputs.RUN_TESTS)")
        );
        assert_eq!(
            expr("!params.DRY_RUN").as_deref(),
            Some("!(inputs.DRY_RUN == true)")
        );
        assert_eq!(
            expr("params.DRY_RUN == false").as_deref(),
            Some("!(inputs.DRY_RUN == true)")
        );
    }

    #[test]
    fn conjunction_of_branch_and_parameter() {
        assert_eq!(
            expr("env.BRANCH_NAME == 'main' && params.ENVIRONMENT == 'production'").as_deref(),
            Some("(github.ref == 'refs/heads/main') && ((inputs.ENVIRONMENT || 'dev') == 'production')")
        );
    }

    #[test]
    fn environment_directive_on_parameter_and_builtin() {
        assert!(guard(Guard::Environment {
            name: "ENVIRONMENT".into(),
            value: "staging".into()
        })
        .is_some());
        assert_eq!(
            guard(Guard::Environment {
                name: "GIT_BRANCH".into(),
                value: "origin/develop".into()
            })
            .as_deref(),
            Some("github.ref == 'refs/heads/develop'")
        );
        assert_eq!(
            guard(Guard::Environment {
                name: "SOME_ENV".into(),
                value: "x".into()
            }),
            None
        );
    }

    #[test]
    fn compositions() {
        let g = Guard::AllOf {
            guards: vec![
                Guard::Branch { pattern: "main".into() },
                Guard::Not {
                    guard: Box::new(Guard::ChangeRequest),
                },
            ],
        };
        assert_eq!(
            guard(g).as_deref(),
            Some("(github.ref == 'refs/heads/main') && (!(github.event_name == 'pull_request'))")
        );

        let untranslatable = Guard::AnyOf {
            guards: vec![
                Guard::Branch { pattern: "main".into() },
                Guard::Unknown { source: "changeset '**/*.js'".into() },
            ],
        };
        assert_eq!(guard(untranslatable), None);
    }

    #[test]
    fn arbitrary_groovy_is_not_translated() {
        assert_eq!(expr("currentBuild.result == null"), None);
        assert_eq!(expr("sh(script: 'git diff', returnStatus: true) == 0"), None);
        assert_eq!(expr("params.UNDECLARED == 'x'"), None);
        assert_eq!(expr("env.CUSTOM == 'x'"), None);
    }

    #[test]
    fn literals_translate() {
        assert_eq!(expr("true").as_deref(), Some("true"));
        assert_eq!(expr("return false").as_deref(), Some("false"));
    }

    #[test]
    fn triggered_by_known_causes() {
        assert_eq!(
            guard(Guard::TriggeredBy { cause: "TimerTrigger".into() }).as_deref(),
            Some("github.event_name == 'schedule'")
        );
        assert_eq!(guard(Guard::TriggeredBy { cause: "UpstreamCause".into() }), None);
    }

    #[test]
    fn split_logical_respects_strings_and_parens() {
        assert_eq!(
            split_logical("a == 'x && y' && (b || c)", "&&"),
            vec!["a == 'x && y'", "(b || c)"]
        );
    }
}
