//! Job graph shape properties over generated stage trees.

#[allow(dead_code)]
mod helpers;

use converter::graph::resolve;
use helpers::*;
use proptest::prelude::*;

/// A random top-level stage list: each entry is a leaf (0) or a parallel
/// group of that many branches. Names are unique across the tree.
fn stage_tree() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(prop_oneof![Just(0usize), 1usize..5], 1..8)
}

fn render(tree: &[usize]) -> String {
    let mut stages = Vec::new();
    for (i, &branches) in tree.iter().enumerate() {
        if branches == 0 {
            stages.push(leaf(&format!("s{}", i)));
        } else {
            let children: Vec<String> = (0..branches).map(|b| leaf(&format!("s{}b{}", i, b))).collect();
            stages.push(parallel(&format!("s{}", i), &children));
        }
    }
    pipeline(&stages)
}

proptest! {
    #[test]
    fn needs_point_backwards(tree in stage_tree()) {
        let graph = resolve(&pipeline_of(&render(&tree))).unwrap();
        for (i, job) in graph.jobs.iter().enumerate() {
            for &need in &job.needs {
                prop_assert!(need < i, "job {} needs later job {}", i, need);
            }
        }
    }

    #[test]
    fn one_job_per_leaf(tree in stage_tree()) {
        let graph = resolve(&pipeline_of(&render(&tree))).unwrap();
        let leaves: usize = tree.iter().map(|&b| b.max(1)).sum();
        prop_assert_eq!(graph.len(), leaves);
    }

    #[test]
    fn job_ids_are_unique(tree in stage_tree()) {
        let graph = resolve(&pipeline_of(&render(&tree))).unwrap();
        let mut ids = job_ids(&graph);
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), graph.len());
    }

    #[test]
    fn sequential_stages_form_a_chain(n in 1usize..12) {
        let stages: Vec<String> = (0..n).map(|i| leaf(&format!("step{}", i))).collect();
        let graph = resolve(&pipeline_of(&pipeline(&stages))).unwrap();
        prop_assert_eq!(graph.len(), n);
        prop_assert!(graph.jobs[0].needs.is_empty());
        for i in 1..n {
            prop_assert_eq!(&graph.jobs[i].needs, &vec![i - 1]);
        }
    }

    #[test]
    fn parallel_group_fans_out_and_in(k in 1usize..8) {
        let branches: Vec<String> = (0..k).map(|i| leaf(&format!("branch{}", i))).collect();
        let src = pipeline(&[leaf("A"), parallel("Group", &branches), leaf("B")]);
        let graph = resolve(&pipeline_of(&src)).unwrap();
        prop_assert_eq!(graph.len(), k + 2);
        for branch in &graph.jobs[1..=k] {
            prop_assert_eq!(&branch.needs, &vec![0]);
        }
        let all_branches: Vec<usize> = (1..=k).collect();
        prop_assert_eq!(&graph.jobs[k + 1].needs, &all_branches);
    }
}
