//! Jenkins credential ids → GitHub secret references.
//!
//! Mapping is by identifier only; secret values never pass through here.

use crate::ir::types::{BindingShape, CredentialBinding};

/// `docker-hub.creds` → `DOCKER_HUB_CREDS`.
///
/// GitHub rejects secret names with a leading digit or the `GITHUB_` prefix,
/// so those get a `JENKINS_` prefix.
pub fn secret_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len());
    let mut last_underscore = false;
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
            last_underscore = false;
        } else if !last_underscore {
            name.push('_');
            last_underscore = true;
        }
    }
    let name = name.trim_matches('_').to_string();
    if name.is_empty() {
        return "JENKINS_CREDENTIAL".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) || name.starts_with("GITHUB_") {
        format!("JENKINS_{}", name)
    } else {
        name
    }
}

pub fn secret_expr(id: &str) -> String {
    format!("${{{{ secrets.{} }}}}", secret_name(id))
}

fn secret_part_expr(id: &str, part: &str) -> String {
    format!("${{{{ secrets.{}_{} }}}}", secret_name(id), part)
}

/// Where a file-shaped credential is written on the runner.
pub fn credential_file_path(id: &str) -> String {
    format!("${{{{ runner.temp }}}}/{}", secret_name(id).to_ascii_lowercase())
}

/// Environment entries exposing one `withCredentials` binding.
pub fn binding_env(binding: &CredentialBinding) -> Vec<(String, String)> {
    let id = &binding.credentials_id;
    match &binding.shape {
        BindingShape::String { variable } => vec![(variable.clone(), secret_expr(id))],
        BindingShape::UsernamePassword {
            username_variable,
            password_variable,
        } => vec![
            (username_variable.clone(), secret_part_expr(id, "USERNAME")),
            (password_variable.clone(), secret_part_expr(id, "PASSWORD")),
        ],
        BindingShape::UsernameColonPassword { variable } => vec![(
            variable.clone(),
            format!(
                "{}:{}",
                secret_part_expr(id, "USERNAME"),
                secret_part_expr(id, "PASSWORD")
            ),
        )],
        BindingShape::File { variable } => vec![(variable.clone(), credential_file_path(id))],
        BindingShape::SshUserPrivateKey {
            key_file_variable,
            username_variable,
        } => {
            let mut env = vec![(key_file_variable.clone(), credential_file_path(id))];
            if let Some(user) = username_variable {
                env.push((user.clone(), secret_part_expr(id, "USERNAME")));
            }
            env
        }
    }
}

/// True when the binding needs its secret materialized as a file first.
pub fn needs_file(binding: &CredentialBinding) -> bool {
    matches!(
        binding.shape,
        BindingShape::File { .. } | BindingShape::SshUserPrivateKey { .. }
    )
}

/// Secret names a binding reads, for the summary and action inputs.
pub fn binding_secrets(binding: &CredentialBinding) -> Vec<String> {
    let base = secret_name(&binding.credentials_id);
    match &binding.shape {
        BindingShape::UsernamePassword { .. } | BindingShape::UsernameColonPassword { .. } => {
            vec![format!("{}_USERNAME", base), format!("{}_PASSWORD", base)]
        }
        BindingShape::SshUserPrivateKey {
            username_variable: Some(_),
            ..
        } => vec![base.clone(), format!("{}_USERNAME", base)],
        _ => vec![base],
    }
}
