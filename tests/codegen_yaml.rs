//! Emitted documents are well-formed YAML carrying the intended values.

#[allow(dead_code)]
mod helpers;

use converter::codegen::yaml::{entry, seq_item};
use helpers::*;
use proptest::prelude::*;

fn steps_of<'a>(doc: &'a serde_yaml::Value, job: &str) -> &'a Vec<serde_yaml::Value> {
    doc["jobs"][job]["steps"].as_sequence().unwrap()
}

fn one_stage(steps: &str) -> String {
    format!(
        "pipeline {{ agent any\n stages {{ stage('Work') {{ steps {{\n{}\n}} }} }} }}",
        steps
    )
}

proptest! {
    #[test]
    fn entries_read_back_unchanged(value in "[ -~\n]{0,40}") {
        let doc = yaml(&(entry("k", value.as_str()).join("\n") + "\n"));
        prop_assert_eq!(doc["k"].as_str(), Some(value.as_str()));
    }

    #[test]
    fn list_entries_read_back_unchanged(values in prop::collection::vec("[ -~]{1,12}", 1..5)) {
        let doc = yaml(&(entry("k", &values).join("\n") + "\n"));
        let read: Vec<&str> = doc["k"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap_or("<non-string>"))
            .collect();
        let expected: Vec<&str> = values.iter().map(String::as_str).collect();
        prop_assert_eq!(read, expected);
    }

    #[test]
    fn sequence_items_read_back_unchanged(value in "[ -~]{0,20}") {
        let doc = yaml(&(seq_item(value.as_str()).join("\n") + "\n"));
        prop_assert_eq!(doc[0].as_str(), Some(value.as_str()));
    }
}

#[test]
fn env_value_with_leading_blank_line_stays_valid() {
    let output = convert_ok(
        "pipeline { agent any\n environment { MSG = '''\n    Build\nok''' }\n stages { stage('A') { steps { sh 'echo $MSG' } } } }",
    );
    let doc = yaml(&output.workflow.content);
    let msg = doc["env"]["MSG"].as_str().unwrap();
    assert!(msg.contains("Build"));
    assert!(msg.ends_with("ok"));
}

#[test]
fn multi_line_scripts_are_literal_blocks() {
    let output = convert_ok(&one_stage("sh '''\n    set -e\n    make\n    make test\n'''"));
    assert!(output.workflow.content.contains("run: |"));
    let doc = yaml(&output.workflow.content);
    let run = steps_of(&doc, "work")[1]["run"].as_str().unwrap();
    let lines: Vec<&str> = run.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines, vec!["set -e", "make", "make test"]);
}

#[test]
fn awkward_characters_survive() {
    let output = convert_ok(&one_stage(r#"echo 'Deploying: #1 of "web"'"#));
    let doc = yaml(&output.workflow.content);
    assert_eq!(
        steps_of(&doc, "work")[1]["run"].as_str(),
        Some(r#"echo "Deploying: #1 of \"web\"""#)
    );
}

#[test]
fn wrappers_push_down_onto_steps() {
    let output = convert_ok(&one_stage(
        "dir('web') {\n withEnv(['MODE=ci']) {\n timeout(time: 5, unit: 'MINUTES') {\n sh 'npm test'\n }\n }\n }",
    ));
    let doc = yaml(&output.workflow.content);
    let step = &steps_of(&doc, "work")[1];
    assert_eq!(step["working-directory"].as_str(), Some("web"));
    assert_eq!(step["env"]["MODE"].as_str(), Some("ci"));
    assert_eq!(step["timeout-minutes"].as_u64(), Some(5));
}

#[test]
fn file_credentials_are_written_before_use() {
    let output = convert_ok(&one_stage(
        "withCredentials([file(credentialsId: 'kubeconfig', variable: 'KUBECONFIG')]) {\n sh 'kubectl apply -f k8s/'\n }",
    ));
    let doc = yaml(&output.workflow.content);
    let steps = steps_of(&doc, "work");
    assert_eq!(steps[1]["name"].as_str(), Some("Write kubeconfig credential file"));
    assert_eq!(steps[1]["env"]["CREDENTIAL"].as_str(), Some("${{ secrets.KUBECONFIG }}"));
    assert_eq!(
        steps[2]["env"]["KUBECONFIG"].as_str(),
        Some("${{ runner.temp }}/kubeconfig")
    );
}

#[test]
fn unmapped_steps_become_visible_placeholders() {
    let output = convert_ok(&one_stage("customDeploy target: 'prod'"));
    assert!(output.workflow.content.contains("# Needs manual migration. Jenkins source:"));
    let doc = yaml(&output.workflow.content);
    assert_eq!(
        steps_of(&doc, "work")[1]["name"].as_str(),
        Some("Manual step: customDeploy")
    );
    assert_eq!(output.summary.manual_items.len(), 1);
}

#[test]
fn docker_agent_runs_in_a_container() {
    let output = convert_ok(
        "pipeline { agent { docker { image 'node:20-alpine'\n args '-v /tmp:/tmp' } }\n stages { stage('Build') { steps { sh 'npm ci' } } } }",
    );
    let doc = yaml(&output.workflow.content);
    let job = &doc["jobs"]["build"];
    assert_eq!(job["runs-on"].as_str(), Some("ubuntu-latest"));
    assert_eq!(job["container"]["image"].as_str(), Some("node:20-alpine"));
    assert_eq!(job["container"]["options"].as_str(), Some("-v /tmp:/tmp"));
}

#[test]
fn group_post_runs_as_its_own_job() {
    let src = pipeline(&[
        "stage('Checks') { parallel { stage('Unit') { steps { sh 'u' } } stage('Lint') { steps { sh 'l' } } } post { failure { echo 'checks failed' } } }".to_string(),
    ]);
    let output = convert_ok(&src);
    let doc = yaml(&output.workflow.content);
    let post = &doc["jobs"]["checks-post"];
    assert_eq!(post["name"].as_str(), Some("Checks (post)"));
    assert_eq!(post["if"].as_str(), Some("${{ always() }}"));
    assert_eq!(post["needs"].as_sequence().map(Vec::len), Some(2));
    let last = steps_of(&doc, "checks-post").last().unwrap();
    assert_eq!(last["if"].as_str(), Some("${{ contains(needs.*.result, 'failure') }}"));
}

#[test]
fn every_fixture_emits_valid_documents() {
    for src in [ENVIRONMENT_SIX_STAGES, MATRIX_3X3, FULL_FEATURED, REPEATED_BUILDS] {
        let output = convert_ok(src);
        for file in output.files() {
            let doc = yaml(&file.content);
            assert!(doc.is_mapping(), "{}", file.path);
        }
    }
}
