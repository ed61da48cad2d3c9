//! Property-based tests for the traversal's ordering laws.
//!
//! Random acyclic projects are generated by only allowing a service to
//! depend on later-indexed services. For every generated project we check:
//! - each service is visited exactly once per traversal,
//! - up-traversal: a dependency's visitor finishes before its dependent's
//!   visitor begins,
//! - down-traversal: the reverse,
//! - running an up-traversal over the edge-reversed project produces a legal
//!   down order of the original (same visit set, mirrored constraints).

use convoy::{
    in_dependency_order, in_reverse_dependency_order, Error, Project, ServiceConfig,
    TraverseOptions,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mark {
    Begin(String),
    End(String),
}

/// Edges as (dependent, dependency) index pairs over `n` services.
#[derive(Debug, Clone)]
struct RandomDag {
    n: usize,
    edges: Vec<(usize, usize)>,
}

fn dag_strategy() -> impl Strategy<Value = RandomDag> {
    (1usize..8).prop_flat_map(|n| {
        let all_edges: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();
        if all_edges.is_empty() {
            Just(RandomDag {
                n,
                edges: Vec::new(),
            })
            .boxed()
        } else {
            let count = all_edges.len();
            proptest::sample::subsequence(all_edges, 0..=count)
                .prop_map(move |edges| RandomDag { n, edges })
                .boxed()
        }
    })
}

fn service_name(index: usize) -> String {
    format!("s{index}")
}

fn project_from(dag: &RandomDag, reversed: bool) -> Project {
    let mut services: Vec<ServiceConfig> =
        (0..dag.n).map(|i| ServiceConfig::new(service_name(i))).collect();
    for &(dependent, dependency) in &dag.edges {
        let (from, to) = if reversed {
            (dependency, dependent)
        } else {
            (dependent, dependency)
        };
        let config = std::mem::take(&mut services[from]);
        services[from] = config.depends_on(service_name(to));
    }
    Project::new("prop", services)
}

/// Run one traversal and return the begin/end log.
fn run_traversal(project: &Project, up: bool) -> Vec<Mark> {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let log: Arc<Mutex<Vec<Mark>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let visitor = move |_token: CancellationToken, service: String| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(Mark::Begin(service.clone()));
            tokio::task::yield_now().await;
            sink.lock().push(Mark::End(service));
            Ok(())
        }
    };

    let cancel = CancellationToken::new();
    runtime
        .block_on(async {
            if up {
                in_dependency_order(&cancel, project, TraverseOptions::default(), visitor).await
            } else {
                in_reverse_dependency_order(&cancel, project, visitor).await
            }
        })
        .expect("traversal failed");

    Arc::try_unwrap(log).expect("log still shared").into_inner()
}

fn position(log: &[Mark], mark: &Mark) -> usize {
    log.iter()
        .position(|m| m == mark)
        .unwrap_or_else(|| panic!("{mark:?} missing from {log:?}"))
}

/// Every service begins and ends exactly once.
fn assert_visited_once(log: &[Mark], n: usize) {
    let begins: HashSet<&String> = log
        .iter()
        .filter_map(|m| match m {
            Mark::Begin(s) => Some(s),
            Mark::End(_) => None,
        })
        .collect();
    assert_eq!(log.len(), 2 * n, "unexpected log: {log:?}");
    assert_eq!(begins.len(), n, "duplicate or missing visits: {log:?}");
}

/// `first` must have finished before `second` began.
fn assert_ordered(log: &[Mark], first: usize, second: usize) {
    let end = position(log, &Mark::End(service_name(first)));
    let begin = position(log, &Mark::Begin(service_name(second)));
    assert!(
        end < begin,
        "{} should finish before {} begins: {log:?}",
        service_name(first),
        service_name(second)
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn up_traversal_respects_every_edge(dag in dag_strategy()) {
        let project = project_from(&dag, false);
        let log = run_traversal(&project, true);
        assert_visited_once(&log, dag.n);
        for &(dependent, dependency) in &dag.edges {
            assert_ordered(&log, dependency, dependent);
        }
    }

    #[test]
    fn down_traversal_respects_every_edge_reversed(dag in dag_strategy()) {
        let project = project_from(&dag, false);
        let log = run_traversal(&project, false);
        assert_visited_once(&log, dag.n);
        for &(dependent, dependency) in &dag.edges {
            assert_ordered(&log, dependent, dependency);
        }
    }

    #[test]
    fn reversed_edges_up_is_isomorphic_to_down(dag in dag_strategy()) {
        let reversed = project_from(&dag, true);
        let log = run_traversal(&reversed, true);
        assert_visited_once(&log, dag.n);
        // Same legal orderings as a down-traversal of the original.
        for &(dependent, dependency) in &dag.edges {
            assert_ordered(&log, dependent, dependency);
        }
    }

    #[test]
    fn any_back_edge_is_rejected(chain_len in 2usize..6) {
        // A chain with a closing back edge is always cyclic.
        let mut services: Vec<ServiceConfig> = (0..chain_len)
            .map(|i| {
                let config = ServiceConfig::new(service_name(i));
                if i + 1 < chain_len {
                    config.depends_on(service_name(i + 1))
                } else {
                    config.depends_on(service_name(0))
                }
            })
            .collect();
        // Shuffle-independent: declaration order must not matter.
        services.reverse();
        let project = Project::new("cyclic", services);

        let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
        let err = runtime
            .block_on(in_dependency_order(
                &CancellationToken::new(),
                &project,
                TraverseOptions::default(),
                |_token, _service| async { Ok(()) },
            ))
            .unwrap_err();
        prop_assert!(matches!(err, Error::CircularDependency(_)));
    }
}
