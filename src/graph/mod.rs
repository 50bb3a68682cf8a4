//! Stage tree → job dependency graph.
//!
//! Jobs live in an arena (`Vec<Job>`) and refer to each other by index.
//! A job is only ever pushed after everything it needs, so arena order is
//! already a topological order; petgraph double-checks acyclicity.

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::Serialize;

use crate::error::ConvertError;
use crate::ir::types::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Stage,
    Matrix,
    Post,
}

/// What a job was derived from. Paths are stage index paths into
/// [`Pipeline::stages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "path", rename_all = "snake_case")]
pub enum JobSource {
    Stage(Vec<usize>),
    /// Post actions of a stage with child stages.
    StagePost(Vec<usize>),
    PipelinePost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    /// Unique, sanitized job key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Arena indices of the jobs this one waits for, ascending.
    pub needs: Vec<usize>,
    pub stage_path: Vec<String>,
    pub kind: JobKind,
    pub source: JobSource,
    /// The job or one of its enclosing stages has a `when`.
    pub conditional: bool,
    /// Some job upstream is conditional; a skip there must not cascade.
    pub guarded_upstream: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobGraph {
    pub jobs: Vec<Job>,
}

impl JobGraph {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs no other job needs, ascending.
    pub fn sinks(&self) -> Vec<usize> {
        let needed: HashSet<usize> = self.jobs.iter().flat_map(|j| j.needs.iter().copied()).collect();
        (0..self.jobs.len()).filter(|i| !needed.contains(i)).collect()
    }

    pub fn job_for_stage(&self, path: &[usize]) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|j| matches!(&j.source, JobSource::Stage(p) if p == path))
    }

    /// `needs:` ids of a job, in arena order.
    pub fn need_ids(&self, job: &Job) -> Vec<&str> {
        job.needs.iter().map(|&i| self.jobs[i].id.as_str()).collect()
    }
}

/// Build the job graph for a validated pipeline.
pub fn resolve(pipeline: &Pipeline) -> Result<JobGraph, ConvertError> {
    let mut resolver = Resolver::default();
    let exits = resolver.sequence(&pipeline.stages, &[], &[], false);

    if !pipeline.post.is_empty() {
        let mut needs = exits;
        needs.extend(resolver.graph.sinks());
        resolver.push(
            "post-actions",
            "Post Actions".to_string(),
            needs,
            Vec::new(),
            JobKind::Post,
            JobSource::PipelinePost,
            false,
        );
    }

    let graph = resolver.graph;
    verify_acyclic(&graph)?;
    log::debug!(
        "resolved {} stages into {} jobs",
        pipeline.all_stages().len(),
        graph.len()
    );
    Ok(graph)
}

#[derive(Default)]
struct Resolver {
    graph: JobGraph,
    used_ids: HashSet<String>,
}

impl Resolver {
    /// Chain `stages` one after another starting from `entry`. Returns the
    /// exits of the last stage, or `entry` when there are no stages.
    fn sequence(
        &mut self,
        stages: &[Stage],
        parent: &[usize],
        entry: &[usize],
        conditional: bool,
    ) -> Vec<usize> {
        let mut prev = entry.to_vec();
        for (i, stage) in stages.iter().enumerate() {
            prev = self.stage(stage, child_path(parent, i), &prev, conditional);
        }
        prev
    }

    /// Fan `stages` out from `entry`; the exits are all branch exits.
    fn fan_out(
        &mut self,
        stages: &[Stage],
        parent: &[usize],
        entry: &[usize],
        conditional: bool,
    ) -> Vec<usize> {
        let mut exits = Vec::new();
        for (i, stage) in stages.iter().enumerate() {
            exits.extend(self.stage(stage, child_path(parent, i), entry, conditional));
        }
        exits
    }

    fn stage(&mut self, stage: &Stage, path: Vec<usize>, entry: &[usize], conditional: bool) -> Vec<usize> {
        let conditional = conditional || stage.when.is_some();
        match &stage.body {
            StageBody::Steps(_) | StageBody::Matrix(_) => {
                let kind = match stage.body {
                    StageBody::Matrix(_) => JobKind::Matrix,
                    _ => JobKind::Stage,
                };
                let job = self.push(
                    &stage.name,
                    stage.path.join(" / "),
                    entry.to_vec(),
                    stage.path.clone(),
                    kind,
                    JobSource::Stage(path),
                    conditional,
                );
                vec![job]
            }
            StageBody::Sequential(children) | StageBody::Parallel(children) => {
                let mut exits = if matches!(stage.body, StageBody::Parallel(_)) {
                    self.fan_out(children, &path, entry, conditional)
                } else {
                    self.sequence(children, &path, entry, conditional)
                };
                if !stage.post.is_empty() {
                    let post = self.push(
                        &format!("{}-post", stage.name),
                        format!("{} (post)", stage.path.join(" / ")),
                        exits.clone(),
                        stage.path.clone(),
                        JobKind::Post,
                        JobSource::StagePost(path),
                        false,
                    );
                    exits.push(post);
                }
                exits
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        base: &str,
        name: String,
        mut needs: Vec<usize>,
        stage_path: Vec<String>,
        kind: JobKind,
        source: JobSource,
        conditional: bool,
    ) -> usize {
        needs.sort_unstable();
        needs.dedup();
        let guarded_upstream = needs.iter().any(|&i| {
            let upstream = &self.graph.jobs[i];
            upstream.conditional || upstream.guarded_upstream
        });
        let id = self.unique_id(&job_id(base));
        self.graph.jobs.push(Job {
            id,
            name,
            needs,
            stage_path,
            kind,
            source,
            conditional,
            guarded_upstream,
        });
        self.graph.jobs.len() - 1
    }

    fn unique_id(&mut self, base: &str) -> String {
        let mut id = base.to_string();
        let mut n = 2;
        while self.used_ids.contains(&id) {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        self.used_ids.insert(id.clone());
        id
    }
}

fn child_path(parent: &[usize], index: usize) -> Vec<usize> {
    let mut path = parent.to_vec();
    path.push(index);
    path
}

/// Lowercase, non-alphanumerics collapsed to single `-`, never empty and
/// never starting with a digit.
pub fn job_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    while id.ends_with('-') {
        id.pop();
    }
    if id.is_empty() {
        return "stage".to_string();
    }
    if id.starts_with(|c: char| c.is_ascii_digit()) {
        id.insert_str(0, "stage-");
    }
    id
}

fn verify_acyclic(graph: &JobGraph) -> Result<(), ConvertError> {
    let mut g = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..graph.jobs.len()).map(|i| g.add_node(i)).collect();
    for (i, job) in graph.jobs.iter().enumerate() {
        for &need in &job.needs {
            g.add_edge(nodes[need], nodes[i], ());
        }
    }
    match toposort(&g, None) {
        Ok(_) => Ok(()),
        Err(cycle) => {
            let job = &graph.jobs[g[cycle.node_id()]];
            Err(ConvertError::resolve(
                "R001",
                format!("Cycle detected at job '{}'", job.id),
                job.stage_path.last().cloned(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower;
    use crate::parse::parse;

    fn graph_of(src: &str) -> JobGraph {
        resolve(&lower(&parse(src).unwrap()).unwrap()).unwrap()
    }

    #[test]
    fn job_ids_are_sanitized() {
        assert_eq!(job_id("Build & Test"), "build-test");
        assert_eq!(job_id("  Deploy (prod) "), "deploy-prod");
        assert_eq!(job_id("2nd pass"), "stage-2nd-pass");
        assert_eq!(job_id("!!!"), "stage");
    }

    #[test]
    fn parallel_fans_out_and_back_in() {
        let g = graph_of(
            "pipeline { stages {
               stage('A') { steps { sh 'a' } }
               stage('Tests') { parallel {
                 stage('Unit') { steps { sh 'u' } }
                 stage('Lint') { steps { sh 'l' } }
                 stage('E2E') { steps { sh 'e' } }
               } }
               stage('B') { steps { sh 'b' } }
             } }",
        );
        let ids: Vec<&str> = g.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "unit", "lint", "e2e", "b"]);
        for branch in &g.jobs[1..4] {
            assert_eq!(branch.needs, vec![0]);
        }
        assert_eq!(g.jobs[4].needs, vec![1, 2, 3]);
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let g = graph_of(
            "pipeline { stages {
               stage('Linux') { stages { stage('Build') { steps { sh 'a' } } } }
               stage('Windows') { stages { stage('Build') { steps { sh 'b' } } } }
             } }",
        );
        let ids: Vec<&str> = g.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["build", "build-2"]);
        assert_eq!(g.jobs[1].needs, vec![0]);
        assert_eq!(g.jobs[1].name, "Windows / Build");
    }

    #[test]
    fn post_jobs_for_groups_and_pipeline() {
        let g = graph_of(
            "pipeline { stages {
               stage('Checks') {
                 parallel {
                   stage('Unit') { steps { sh 'u' } }
                   stage('Lint') { steps { sh 'l' } }
                 }
                 post { always { junit 'r.xml' } }
               }
               stage('Ship') { steps { sh 's' } }
             }
             post { failure { echo 'bad' } } }",
        );
        let ids: Vec<&str> = g.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["unit", "lint", "checks-post", "ship", "post-actions"]);
        assert_eq!(g.jobs[2].needs, vec![0, 1]);
        assert_eq!(g.jobs[3].needs, vec![0, 1, 2]);
        assert_eq!(g.jobs[4].needs, vec![3]);
        assert_eq!(g.jobs[4].kind, JobKind::Post);
    }

    #[test]
    fn conditions_mark_downstream_jobs() {
        let g = graph_of(
            "pipeline { stages {
               stage('A') { when { branch 'main' } steps { sh 'a' } }
               stage('B') { steps { sh 'b' } }
               stage('C') { steps { sh 'c' } }
             } }",
        );
        assert!(g.jobs[0].conditional);
        assert!(!g.jobs[0].guarded_upstream);
        assert!(g.jobs[1].guarded_upstream);
        assert!(g.jobs[2].guarded_upstream);
    }
}
