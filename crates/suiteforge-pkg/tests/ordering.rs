//! Property tests for build ordering.

mod common;

use std::sync::Arc;

use common::{header, resolver, MemoryTransport, Sandbox, SnapshotFetcher};
use proptest::prelude::*;
use suiteforge_pkg::{BuildPlanner, EntityId, PhaseNode};

/// A random DAG: project `i` may depend on any project `j < i`.
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(3)))
            .collect::<Vec<_>>()
            .prop_map(|deps| {
                deps.into_iter()
                    .enumerate()
                    .map(|(i, mut d)| {
                        d.retain(|&j| j < i);
                        d.sort_unstable();
                        d.dedup();
                        d
                    })
                    .collect()
            })
    })
}

fn manifest(deps: &[Vec<usize>]) -> String {
    let mut toml = header("s");
    // Declare in reverse so declaration order disagrees with dependency order.
    for (i, d) in deps.iter().enumerate().rev() {
        let list = d
            .iter()
            .map(|j| format!("\"p{j}\""))
            .collect::<Vec<_>>()
            .join(", ");
        toml.push_str(&format!(
            "\n[[project]]\nname = \"p{i}\"\ndependencies = [{list}]\n"
        ));
    }
    toml
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_dependencies_precede_dependents(deps in dag()) {
        let sandbox = Sandbox::new();
        let root = sandbox.root(&manifest(&deps));
        let resolution = resolver(
            &sandbox,
            SnapshotFetcher::new(sandbox.snapshots()),
            Arc::new(MemoryTransport::new()),
        )
        .resolve(&root)
        .unwrap();

        let projects: Vec<EntityId> =
            (0..deps.len()).map(|i| EntityId::new("s", format!("p{i}"))).collect();
        let planner = BuildPlanner::new(&resolution.graph, &resolution.registry);
        let order = planner.order_projects(&projects).unwrap();
        prop_assert_eq!(order.len(), deps.len());

        for (i, d) in deps.iter().enumerate() {
            let dependent = order.layer_of(&PhaseNode::compile(&projects[i])).unwrap();
            for &j in d {
                let dependency = order.layer_of(&PhaseNode::compile(&projects[j])).unwrap();
                prop_assert!(dependency < dependent, "p{} must precede p{}", j, i);
            }
        }

        let again = planner.order_projects(&projects).unwrap();
        prop_assert_eq!(again, order);
    }
}
