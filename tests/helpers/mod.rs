use converter::config::ConvertOptions;
use converter::convert::{convert, ConversionOutput};
use converter::graph::{resolve, JobGraph};
use converter::ir::Pipeline;
use converter::lower::lower;
use converter::parse::parse;

// =============================================================================
// Fixtures
// =============================================================================

pub const ENVIRONMENT_SIX_STAGES: &str = include_str!("../fixtures/environment_six_stages.groovy");
pub const MATRIX_3X3: &str = include_str!("../fixtures/matrix_3x3.groovy");
pub const FULL_FEATURED: &str = include_str!("../fixtures/full_featured.groovy");
pub const REPEATED_BUILDS: &str = include_str!("../fixtures/repeated_builds.groovy");
pub const SCRIPTED: &str = include_str!("../fixtures/scripted.groovy");

// =============================================================================
// Phase shortcuts
// =============================================================================

pub fn pipeline_of(src: &str) -> Pipeline {
    lower(&parse(src).expect("parse")).expect("lower")
}

pub fn graph_of(src: &str) -> JobGraph {
    resolve(&pipeline_of(src)).expect("resolve")
}

pub fn convert_ok(src: &str) -> ConversionOutput {
    match convert(src, &ConvertOptions::default()) {
        Ok(output) => output,
        Err(errors) => panic!("conversion failed: {:?}", errors),
    }
}

pub fn job_ids(graph: &JobGraph) -> Vec<&str> {
    graph.jobs.iter().map(|j| j.id.as_str()).collect()
}

/// Parse an emitted document, failing the test if it is not valid YAML.
pub fn yaml(content: &str) -> serde_yaml::Value {
    match serde_yaml::from_str(content) {
        Ok(v) => v,
        Err(e) => panic!("invalid YAML ({}):\n{}", e, content),
    }
}

// =============================================================================
// Source builders
// =============================================================================

/// `stage('<name>') { steps { sh '<name>' } }`
pub fn leaf(name: &str) -> String {
    format!("stage('{0}') {{ steps {{ sh 'echo {0}' }} }}", name)
}

pub fn parallel(name: &str, branches: &[String]) -> String {
    format!("stage('{}') {{ parallel {{ {} }} }}", name, branches.join(" "))
}

pub fn pipeline(stages: &[String]) -> String {
    format!("pipeline {{ agent any\n stages {{ {} }} }}", stages.join("\n"))
}
