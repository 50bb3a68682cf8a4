//! Jenkins agents → `runs-on` and `container`.

use serde::Serialize;

use crate::ir::types::Agent;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RunsOn {
    Label(String),
    /// `[self-hosted, <label>…]`
    Labels(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    pub image: String,
    pub options: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Runner {
    pub runs_on: RunsOn,
    pub container: Option<Container>,
}

/// Map an agent to a runner. The second element is set when the mapping
/// loses information and a human should review it.
pub fn translate_agent(agent: &Agent, default_runner: &str) -> (Runner, Option<String>) {
    let hosted = |container| Runner {
        runs_on: RunsOn::Label(default_runner.to_string()),
        container,
    };
    match agent {
        Agent::Any | Agent::None => (hosted(None), None),
        Agent::Label { label } => map_label(label, default_runner),
        Agent::Docker { image, args } => (
            hosted(Some(Container {
                image: image.clone(),
                options: args.clone(),
            })),
            None,
        ),
        Agent::Dockerfile { filename, .. } => (
            hosted(None),
            Some(format!(
                "agent dockerfile ({}) needs an image build and push before it can be used as a job container",
                filename.as_deref().unwrap_or("Dockerfile")
            )),
        ),
        Agent::Kubernetes { .. } => (
            hosted(None),
            Some("agent kubernetes pod templates have no GitHub-hosted equivalent; jobs run on the default runner".to_string()),
        ),
        Agent::Unrecognized { raw } => (
            hosted(None),
            Some(format!("unrecognized agent `{}`; jobs run on the default runner", raw)),
        ),
    }
}

/// Map a Jenkins label expression to a runner.
pub fn map_label(label: &str, default_runner: &str) -> (Runner, Option<String>) {
    let runner = |runs_on| Runner {
        runs_on,
        container: None,
    };
    let trimmed = label.trim();
    if trimmed.contains("||") || trimmed.contains('!') {
        return (
            runner(RunsOn::Label(default_runner.to_string())),
            Some(format!(
                "label expression `{}` has no runs-on equivalent; pick a runner manually",
                trimmed
            )),
        );
    }
    let parts: Vec<&str> = trimmed
        .split("&&")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() == 1 {
        if let Some(hosted) = hosted_runner(parts[0]) {
            return (runner(RunsOn::Label(hosted.to_string())), None);
        }
    }
    if parts.is_empty() {
        return (runner(RunsOn::Label(default_runner.to_string())), None);
    }
    let mut labels = vec!["self-hosted".to_string()];
    labels.extend(parts.iter().map(|p| p.to_string()));
    (runner(RunsOn::Labels(labels)), None)
}

fn hosted_runner(label: &str) -> Option<&'static str> {
    let normalized = label.to_ascii_lowercase();
    Some(match normalized.as_str() {
        "ubuntu" | "ubuntu-latest" | "linux" => "ubuntu-latest",
        "ubuntu-22.04" | "ubuntu-2204" => "ubuntu-22.04",
        "ubuntu-24.04" | "ubuntu-2404" => "ubuntu-24.04",
        "windows" | "windows-latest" | "win" => "windows-latest",
        "windows-2019" | "win2019" => "windows-2019",
        "windows-2022" | "win2022" => "windows-2022",
        "mac" | "macos" | "macos-latest" | "darwin" => "macos-latest",
        "macos-13" | "macos13" => "macos-13",
        "macos-14" | "macos14" => "macos-14",
        other if other.contains("docker") => "ubuntu-latest",
        _ => return None,
    })
}
