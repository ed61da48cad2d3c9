//! Concurrent dependency-ordered traversal.
//!
//! A traversal drives a caller-supplied visitor across the project graph in
//! one of two directions:
//!
//! - **up** ([`in_dependency_order`]): leaves first, toward the roots. A
//!   vertex is ready once all of its children are `Started`.
//! - **down** ([`in_reverse_dependency_order`]): roots first, toward the
//!   leaves. A vertex is ready once all of its parents are `Stopped`.
//!
//! Readiness is re-derived from vertex statuses on every attempt instead of
//! counting indegrees. The visitor decides whether success promotes the
//! status, so "already running, nothing to do" still counts as `Started`.
//!
//! Independent branches run concurrently on worker tasks; a single
//! coordinator loop owns the countdown of unvisited vertices and schedules
//! newly-unblocked neighbors. The first visitor error cancels the shared
//! token and wins; in-flight siblings observe the cancellation through the
//! token handed to them.

use crate::error::{Error, Result};
use crate::graph::{Graph, ServiceStatus};
use crate::model::Project;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Options for an up-traversal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraverseOptions {
    /// Maximum number of visitors in flight at once. Zero means unlimited.
    pub max_concurrency: usize,
}

/// Apply `visitor` to every service of `project` in dependency order:
/// dependencies first, dependents once all of their dependencies succeeded.
///
/// The visitor is invoked exactly once per service. Its token is a child of
/// `cancel`; the first error cancels it and aborts the traversal.
pub async fn in_dependency_order<F, Fut>(
    cancel: &CancellationToken,
    project: &Project,
    options: TraverseOptions,
    visitor: F,
) -> Result<()>
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let graph = Graph::from_services(&project.services, ServiceStatus::Stopped)?;
    traverse(cancel, Arc::new(graph), Direction::Up, options, visitor).await
}

/// Apply `visitor` to every service of `project` in reverse dependency
/// order: dependents first, dependencies once nothing depending on them is
/// still up.
pub async fn in_reverse_dependency_order<F, Fut>(
    cancel: &CancellationToken,
    project: &Project,
    visitor: F,
) -> Result<()>
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let graph = Graph::from_services(&project.services, ServiceStatus::Started)?;
    traverse(
        cancel,
        Arc::new(graph),
        Direction::Down,
        TraverseOptions::default(),
        visitor,
    )
    .await
}

/// Traversal direction, bundling the extremity, neighbor, gating and target
/// selections that differ between start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Seed vertices: leaves for up, roots for down.
    fn extremities(self, graph: &Graph) -> Vec<String> {
        match self {
            Direction::Up => graph.leaves(),
            Direction::Down => graph.roots(),
        }
    }

    /// Neighbors unlocked by a completed vertex.
    fn adjacent(self, graph: &Graph, key: &str) -> Vec<String> {
        match self {
            Direction::Up => graph.parents_of(key),
            Direction::Down => graph.children_of(key),
        }
    }

    /// Gating neighbors still in the skip status. Non-empty means not ready.
    fn blocking(self, graph: &Graph, key: &str) -> Vec<String> {
        match self {
            Direction::Up => graph.filter_children(key, ServiceStatus::Stopped),
            Direction::Down => graph.filter_parents(key, ServiceStatus::Started),
        }
    }

    /// Status a vertex reaches when its visitor succeeds.
    fn target(self) -> ServiceStatus {
        match self {
            Direction::Up => ServiceStatus::Started,
            Direction::Down => ServiceStatus::Stopped,
        }
    }
}

/// Shared traversal state handed to the scheduler and workers.
struct Traversal<F> {
    graph: Arc<Graph>,
    direction: Direction,
    visitor: Arc<F>,
    /// Keys already claimed by a worker. At-most-once visitation when the
    /// same vertex becomes reachable from several neighbors at once.
    seen: Mutex<HashSet<String>>,
    limiter: Option<Arc<Semaphore>>,
    done_tx: mpsc::UnboundedSender<String>,
    /// Token handed to visitors; cancelled on the first error.
    token: CancellationToken,
}

impl<F, Fut> Traversal<F>
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    /// Claim a vertex. Returns false if another worker already has it.
    fn consume(&self, key: &str) -> bool {
        self.seen.lock().insert(key.to_string())
    }

    /// Offer a batch of vertices: skip the not-yet-ready and the already
    /// claimed, spawn a worker for the rest. Waits for a concurrency slot
    /// when a limit is configured.
    async fn schedule(&self, workers: &mut JoinSet<Result<()>>, keys: Vec<String>) {
        for key in keys {
            let blocking = self.direction.blocking(&self.graph, &key);
            if !blocking.is_empty() {
                // Re-offered when one of those neighbors completes.
                tracing::debug!(key = %key, waiting_on = ?blocking, "vertex not ready yet");
                continue;
            }
            if !self.consume(&key) {
                continue;
            }

            let permit = match &self.limiter {
                Some(semaphore) => Some(
                    Arc::clone(semaphore)
                        .acquire_owned()
                        .await
                        .expect("traversal semaphore is never closed"),
                ),
                None => None,
            };

            let graph = Arc::clone(&self.graph);
            let visitor = Arc::clone(&self.visitor);
            let done_tx = self.done_tx.clone();
            let token = self.token.clone();
            let target = self.direction.target();
            let service = self
                .graph
                .vertex(&key)
                .map(|v| v.service().to_string())
                .unwrap_or_else(|| key.clone());

            workers.spawn(async move {
                let _permit = permit;
                tracing::debug!(key = %key, "visiting");
                (*visitor)(token, service).await?;
                // The status write must land before the coordinator learns of
                // the completion, or a neighbor's readiness check could still
                // see the old status.
                graph.update_status(&key, target);
                let _ = done_tx.send(key);
                Ok(())
            });
        }
    }
}

async fn traverse<F, Fut>(
    cancel: &CancellationToken,
    graph: Arc<Graph>,
    direction: Direction,
    options: TraverseOptions,
    visitor: F,
) -> Result<()>
where
    F: Fn(CancellationToken, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut remaining = graph.len();
    if remaining == 0 {
        return Ok(());
    }

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let traversal = Traversal {
        graph: Arc::clone(&graph),
        direction,
        visitor: Arc::new(visitor),
        seen: Mutex::new(HashSet::new()),
        limiter: (options.max_concurrency > 0)
            .then(|| Arc::new(Semaphore::new(options.max_concurrency))),
        done_tx,
        token: cancel.child_token(),
    };

    let mut workers: JoinSet<Result<()>> = JoinSet::new();
    let seeds = direction.extremities(&graph);
    traversal.schedule(&mut workers, seeds).await;

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break Err(Error::Cancelled);
            }
            Some(joined) = workers.join_next() => {
                match joined {
                    Ok(Ok(())) => {}
                    // First visitor error wins; siblings are cancelled below.
                    Ok(Err(err)) => break Err(err),
                    Err(join_err) => {
                        if join_err.is_panic() {
                            std::panic::resume_unwind(join_err.into_panic());
                        }
                        break Err(Error::Cancelled);
                    }
                }
            }
            Some(key) = done_rx.recv() => {
                remaining -= 1;
                if remaining == 0 {
                    break Ok(());
                }
                let unlocked = direction.adjacent(&graph, &key);
                traversal.schedule(&mut workers, unlocked).await;
            }
        }
    };

    // Let in-flight visitors observe the outcome, then wait for them so no
    // worker touches the graph after we return.
    traversal.token.cancel();
    while workers.join_next().await.is_some() {}

    result
}
