//! Jenkins variable references → GitHub Actions expressions.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::credentials::secret_name;

/// Jenkins built-ins with a GitHub Actions counterpart.
const BUILTINS: &[(&str, &str)] = &[
    ("BUILD_NUMBER", "${{ github.run_number }}"),
    ("BUILD_ID", "${{ github.run_id }}"),
    ("BUILD_TAG", "${{ github.sha }}"),
    (
        "BUILD_URL",
        "${{ github.server_url }}/${{ github.repository }}/actions/runs/${{ github.run_id }}",
    ),
    ("JOB_NAME", "${{ github.workflow }}"),
    ("WORKSPACE", "${{ github.workspace }}"),
    ("NODE_NAME", "${{ runner.name }}"),
    ("BRANCH_NAME", "${{ github.ref_name }}"),
    ("GIT_COMMIT", "${{ github.sha }}"),
    ("GIT_BRANCH", "${{ github.ref }}"),
    ("CHANGE_ID", "${{ github.event.pull_request.number }}"),
    ("CHANGE_URL", "${{ github.event.pull_request.html_url }}"),
    ("CHANGE_TITLE", "${{ github.event.pull_request.title }}"),
    ("CHANGE_AUTHOR", "${{ github.event.pull_request.user.login }}"),
];

static PARAM_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{params\.([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// `${env.X}`, `${X}` and bare `$X` for the built-ins; `${env.X}` for the rest.
static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(env\.)?([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Z_][A-Z0-9_]*)\b").unwrap()
});

static CREDENTIALS_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"credentials\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap()
});

fn builtin(name: &str) -> Option<&'static str> {
    BUILTINS.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
}

/// Rewrite Jenkins variable syntax inside a value or script.
///
/// `${params.X}` → `${{ inputs.X }}`, `${env.X}` → `${{ env.X }}`, built-ins
/// (`${BUILD_NUMBER}`, `$BUILD_NUMBER`, `${env.BUILD_NUMBER}`) → their
/// `github`/`runner` context, `credentials('id')` → `${{ secrets.ID }}`.
/// Plain shell references to other variables are left alone.
pub fn translate_vars(text: &str) -> String {
    let text = PARAM_REF.replace_all(text, "$${{ inputs.$1 }}");
    let text = ENV_REF.replace_all(&text, |caps: &Captures| {
        if let Some(bare) = caps.get(3) {
            return builtin(bare.as_str())
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string());
        }
        let name = &caps[2];
        if let Some(mapped) = builtin(name) {
            return mapped.to_string();
        }
        if caps.get(1).is_some() {
            format!("${{{{ env.{} }}}}", name)
        } else {
            caps[0].to_string()
        }
    });
    let text = CREDENTIALS_CALL.replace_all(&text, |caps: &Captures| {
        format!("${{{{ secrets.{} }}}}", secret_name(&caps[1]))
    });
    text.into_owned()
}

/// Parameter names referenced as `${params.X}`, first-occurrence order.
pub fn referenced_params(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in PARAM_REF.captures_iter(text) {
        let name = caps[1].to_string();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}
