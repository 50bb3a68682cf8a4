//! End-to-end scenarios: Jenkinsfile text → workflow, actions and summary.

#[allow(dead_code)]
mod helpers;

use converter::config::ConvertOptions;
use converter::convert::convert;
use converter::score::{Band, Feasibility};
use helpers::*;

// =============================================================================
// Parameterized six-stage chain
// =============================================================================

#[test]
fn six_sequential_stages_form_one_chain() {
    let graph = graph_of(ENVIRONMENT_SIX_STAGES);
    assert_eq!(
        job_ids(&graph),
        vec!["checkout", "build", "test", "package", "publish", "deploy"]
    );
    assert!(graph.jobs[0].needs.is_empty());
    for (i, job) in graph.jobs.iter().enumerate().skip(1) {
        assert_eq!(job.needs, vec![i - 1], "job {}", job.id);
    }
}

#[test]
fn deploy_condition_tests_the_choice_input() {
    let output = convert_ok(ENVIRONMENT_SIX_STAGES);
    let doc = yaml(&output.workflow.content);
    let deploy = &doc["jobs"]["deploy"];
    assert_eq!(
        deploy["if"].as_str(),
        Some("${{ (inputs.ENVIRONMENT || 'dev') == 'production' }}")
    );
    assert_eq!(deploy["needs"][0].as_str(), Some("publish"));
    assert!(doc["jobs"]["publish"]["if"].is_null());

    let summary = &output.summary;
    assert_eq!(summary.job_count, 6);
    assert_eq!(summary.stage_count, 6);
    assert!(summary.manual_items.is_empty());
    assert_eq!(summary.approval_gate_count, 0);
    assert_eq!(summary.feasibility, Feasibility::High);
}

#[test]
fn choice_parameter_becomes_a_dispatch_input() {
    let output = convert_ok(ENVIRONMENT_SIX_STAGES);
    let doc = yaml(&output.workflow.content);
    let input = &doc["on"]["workflow_dispatch"]["inputs"]["ENVIRONMENT"];
    assert_eq!(input["type"].as_str(), Some("choice"));
    assert_eq!(input["default"].as_str(), Some("dev"));
    assert_eq!(input["options"].as_sequence().map(Vec::len), Some(3));
    assert_eq!(input["description"].as_str(), Some("Target environment"));
}

#[test]
fn explicit_checkout_replaces_the_default_one() {
    let output = convert_ok(ENVIRONMENT_SIX_STAGES);
    let doc = yaml(&output.workflow.content);
    let steps = doc["jobs"]["checkout"]["steps"].as_sequence().unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["uses"].as_str(), Some("actions/checkout@v4"));

    let publish = doc["jobs"]["publish"]["steps"].as_sequence().unwrap();
    assert_eq!(publish[0]["uses"].as_str(), Some("actions/checkout@v4"));
    assert_eq!(
        publish[1]["run"].as_str(),
        Some("make publish ENV=${{ inputs.ENVIRONMENT }}")
    );
}

// =============================================================================
// Matrix
// =============================================================================

#[test]
fn matrix_is_one_job_with_a_flattening_item() {
    let output = convert_ok(MATRIX_3X3);
    assert_eq!(output.summary.job_count, 1);
    assert_eq!(output.summary.manual_items.len(), 1);
    assert!(output.summary.manual_items[0].reason.contains("9 cells"));
    assert_eq!(output.summary.manual_items[0].stage_name, "Test");

    let doc = yaml(&output.workflow.content);
    let matrix = &doc["jobs"]["test"]["strategy"]["matrix"];
    assert_eq!(matrix["OS"].as_sequence().map(Vec::len), Some(3));
    assert_eq!(matrix["JDK"][0].as_str(), Some("11"));
    assert_eq!(doc["jobs"]["test"]["strategy"]["fail-fast"].as_bool(), Some(false));
    assert_eq!(doc["jobs"]["test"]["env"]["OS"].as_str(), Some("${{ matrix.OS }}"));
}

fn matrix_of(inner: &str) -> String {
    format!(
        "pipeline {{ agent any\n stages {{ stage('M') {{ matrix {{\n axes {{ axis {{ name 'OS'\n values 'linux', 'mac' }} }}\n stages {{ {} }} }} }} }} }}",
        inner
    )
}

fn run_lines(doc: &serde_yaml::Value, job: &str) -> Vec<String> {
    doc["jobs"][job]["steps"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|s| s["run"].as_str().map(String::from))
        .collect()
}

#[test]
fn matrix_inner_stages_count_as_stages() {
    let output = convert_ok(&matrix_of(
        "stage('Build') { steps { sh 'make' } } stage('Test') { steps { sh 'make test' } }",
    ));
    assert_eq!(output.summary.stage_count, 3);
    assert_eq!(output.summary.job_count, 1);
    assert_eq!(convert_ok(MATRIX_3X3).summary.stage_count, 2);
}

#[test]
fn nested_inner_stages_keep_their_steps() {
    let output = convert_ok(&matrix_of(
        "stage('Outer') { stages { stage('Inner') { steps { sh 'make nested-build' } } } }",
    ));
    let doc = yaml(&output.workflow.content);
    assert_eq!(run_lines(&doc, "m"), vec!["make nested-build"]);
    assert_eq!(output.summary.stage_count, 3);
}

#[test]
fn nested_inner_stage_conditions_are_conjoined() {
    let output = convert_ok(&matrix_of(
        "stage('Outer') { when { branch 'main' }\n stages { stage('Inner') { when { buildingTag() }\n steps { sh 'make' } } } }",
    ));
    let doc = yaml(&output.workflow.content);
    let step = doc["jobs"]["m"]["steps"].as_sequence().unwrap().last().unwrap().clone();
    let condition = step["if"].as_str().unwrap();
    assert!(condition.contains("refs/heads/main"), "{}", condition);
    assert!(condition.contains("refs/tags/"), "{}", condition);
}

#[test]
fn untranslated_inner_condition_disables_steps_with_its_source() {
    let output = convert_ok(&matrix_of(
        "stage('Odd') { when { expression { return weirdHelper(env.OS) } }\n steps { sh 'make odd' } }",
    ));
    assert!(output.workflow.content.contains("# when on stage 'Odd' needs manual translation"));
    assert!(output.workflow.content.contains("weirdHelper(env.OS)"));
    let doc = yaml(&output.workflow.content);
    let step = doc["jobs"]["m"]["steps"].as_sequence().unwrap().last().unwrap().clone();
    assert_eq!(step["run"].as_str(), Some("make odd"));
    assert_eq!(step["if"].as_str(), Some("${{ false }}"));
}

// =============================================================================
// Full-featured pipeline
// =============================================================================

#[test]
fn full_pipeline_graph_shape() {
    let graph = graph_of(FULL_FEATURED);
    assert_eq!(
        job_ids(&graph),
        vec!["install", "unit", "lint", "e2e", "publish", "production", "post-actions"]
    );
    assert_eq!(graph.jobs[4].needs, vec![1, 2, 3]);
    assert_eq!(graph.jobs[6].needs, vec![5]);
}

#[test]
fn full_pipeline_workflow_header() {
    let output = convert_ok(FULL_FEATURED);
    let doc = yaml(&output.workflow.content);

    assert_eq!(doc["name"].as_str(), Some("CI Pipeline"));
    assert_eq!(doc["on"]["schedule"][0]["cron"].as_str(), Some("0 2 * * 1-5"));
    assert_eq!(doc["on"]["push"]["branches"][0].as_str(), Some("main"));
    assert_eq!(
        doc["on"]["workflow_dispatch"]["inputs"]["RUN_E2E"]["default"].as_bool(),
        Some(false)
    );
    assert_eq!(doc["permissions"]["checks"].as_str(), Some("write"));
    assert_eq!(doc["concurrency"]["cancel-in-progress"].as_bool(), Some(false));
    assert_eq!(doc["env"]["APP_NAME"].as_str(), Some("storefront"));
    assert_eq!(doc["env"]["NPM_TOKEN"].as_str(), Some("${{ secrets.NPM_TOKEN }}"));
}

#[test]
fn full_pipeline_jobs() {
    let output = convert_ok(FULL_FEATURED);
    let doc = yaml(&output.workflow.content);
    let jobs = &doc["jobs"];

    assert_eq!(jobs["install"]["runs-on"].as_str(), Some("ubuntu-latest"));
    assert_eq!(jobs["install"]["timeout-minutes"].as_u64(), Some(60));
    assert_eq!(
        jobs["install"]["steps"][1]["uses"].as_str(),
        Some("actions/setup-node@v4")
    );
    assert_eq!(jobs["e2e"]["if"].as_str(), Some("${{ inputs.RUN_E2E == true }}"));
    assert_eq!(
        jobs["publish"]["if"].as_str(),
        Some("${{ !failure() && !cancelled() && (github.ref == 'refs/heads/main') }}")
    );
    assert_eq!(jobs["production"]["environment"].as_str(), Some("production"));
    assert_eq!(jobs["post-actions"]["if"].as_str(), Some("${{ always() }}"));

    let unit_steps = jobs["unit"]["steps"].as_sequence().unwrap();
    let report = unit_steps.last().unwrap();
    assert_eq!(report["uses"].as_str(), Some("mikepenz/action-junit-report@v4"));
    assert_eq!(report["if"].as_str(), Some("${{ always() }}"));
}

#[test]
fn credentials_become_step_env_from_secrets() {
    let output = convert_ok(FULL_FEATURED);
    let doc = yaml(&output.workflow.content);
    let login = doc["jobs"]["publish"]["steps"]
        .as_sequence()
        .unwrap()
        .iter()
        .find(|s| s["run"].as_str().is_some_and(|r| r.starts_with("docker login")))
        .unwrap()
        .clone();
    assert_eq!(
        login["env"]["REG_USER"].as_str(),
        Some("${{ secrets.REGISTRY_USERNAME }}")
    );
    assert_eq!(
        login["env"]["REG_PASS"].as_str(),
        Some("${{ secrets.REGISTRY_PASSWORD }}")
    );
}

#[test]
fn full_pipeline_summary() {
    let output = convert_ok(FULL_FEATURED);
    let summary = &output.summary;
    assert_eq!(summary.job_count, 7);
    assert_eq!(summary.approval_gate_count, 1);
    assert!(summary
        .manual_items
        .iter()
        .any(|m| m.stage_name == "(pipeline)" && m.reason.contains("shared-steps")));
    assert!(summary.required_secrets.contains(&"NPM_TOKEN".to_string()));
    assert!(summary.required_secrets.contains(&"REGISTRY_PASSWORD".to_string()));
    assert!(summary.band >= Band::Medium);

    let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
    assert_eq!(json["approvalGateCount"], 1);
    assert!(json["manualItems"][0]["stageName"].is_string());
}

// =============================================================================
// Composite actions
// =============================================================================

#[test]
fn identical_bodies_are_factored_into_one_action() {
    let output = convert_ok(REPEATED_BUILDS);
    assert_eq!(output.actions.len(), 1);
    assert_eq!(output.summary.action_count, 1);

    let action = yaml(&output.actions[0].content);
    assert_eq!(action["runs"]["using"].as_str(), Some("composite"));
    let steps = action["runs"]["steps"].as_sequence().unwrap();
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|s| s["shell"].as_str() == Some("bash")));

    let doc = yaml(&output.workflow.content);
    for job in ["build", "build-2"] {
        let steps = doc["jobs"][job]["steps"].as_sequence().unwrap();
        assert_eq!(steps.len(), 2, "{}", job);
        assert_eq!(steps[1]["uses"].as_str(), Some("./.github/actions/build"));
    }
}

#[test]
fn threshold_zero_factors_every_checked_out_job() {
    let options = ConvertOptions {
        composite_threshold: 0,
        ..ConvertOptions::default()
    };
    let output = convert(ENVIRONMENT_SIX_STAGES, &options).unwrap();
    // The checkout job has no default checkout, so it stays inline.
    assert_eq!(output.actions.len(), 5);
    let publish = output
        .actions
        .iter()
        .find(|a| a.path == ".github/actions/publish/action.yml")
        .unwrap();
    assert!(publish.content.contains("inputs.input_ENVIRONMENT"));
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn output_is_byte_identical_across_runs() {
    for src in [ENVIRONMENT_SIX_STAGES, MATRIX_3X3, FULL_FEATURED, REPEATED_BUILDS] {
        let a = convert_ok(src);
        let b = convert_ok(src);
        assert_eq!(a.workflow, b.workflow);
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.summary, b.summary);
    }
}

#[test]
fn small_workflow_snapshot() {
    let output = convert_ok("pipeline { agent any\n stages { stage('Build') { steps { sh 'make' } } } }");
    insta::assert_snapshot!(output.workflow.content, @r"
    # Converted from a Jenkins declarative pipeline.
    name: CI Pipeline

    on:
      push:
        branches:
        - main
        - master
      pull_request:
        branches:
        - main
        - master
      workflow_dispatch:

    permissions:
      contents: read

    jobs:
      build:
        name: Build
        runs-on: ubuntu-latest
        steps:
          - name: Checkout
            uses: actions/checkout@v4
          - name: Run make
            run: make
    ");
}
