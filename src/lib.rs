//! # Convoy
//!
//! Dependency-ordered service activation for container projects.
//!
//! Given a project describing named services and their dependencies, convoy
//! decides *when* each service may be acted upon: it drives a caller-supplied
//! visitor across the dependency graph in start or stop order, runs
//! independent branches concurrently, and, while a project comes up, turns
//! the runtime's raw event stream into typed per-container lifecycle
//! notifications.
//!
//! ## Features
//!
//! - **Dependency-aware ordering**: services start only after all of their
//!   dependencies started, stop only after everything depending on them
//!   stopped
//! - **Safe parallelism**: independent branches run concurrently, with an
//!   optional cap on in-flight work
//! - **Exactly-once visitation**: each service's action runs once per
//!   traversal, even when several branches unblock it simultaneously
//! - **Cycle rejection**: dependency cycles are detected up front and
//!   reported with the offending path
//! - **Container watching**: restarts, recreations and exits are reconciled
//!   against the set of expected containers and surfaced to a listener
//! - **Cancellation support**: the first failure (or an external cancel)
//!   propagates to every in-flight action via `CancellationToken`
//!
//! ## Quick Start
//!
//! ```no_run
//! use convoy::{in_dependency_order, Project, ServiceConfig, TraverseOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), convoy::Error> {
//! let project = Project::new(
//!     "demo",
//!     vec![
//!         ServiceConfig::new("db"),
//!         ServiceConfig::new("web").depends_on("db"),
//!     ],
//! );
//!
//! let cancel = CancellationToken::new();
//! in_dependency_order(
//!     &cancel,
//!     &project,
//!     TraverseOptions::default(),
//!     |_token, service| async move {
//!         println!("starting {service}");
//!         Ok(())
//!     },
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! A traversal runs worker tasks for visitors and a single coordinator that
//! owns completion bookkeeping: a vertex's status update happens-before its
//! completion is observed, which happens-before any neighbor's readiness
//! re-check. The watcher consumes events on a single task, so listener
//! deliveries arrive serialized in engine order.

pub mod error;
pub mod graph;
pub mod model;
pub mod runtime;
pub mod traverse;
pub mod up;
pub mod watch;

// Re-export commonly used types
pub use error::{Error, Result};
pub use graph::{Graph, ServiceStatus, Vertex};
pub use model::{
    dependency_wait_condition, DependencyConfig, Project, ServiceConfig, WaitCondition,
    CONTAINER_REPLACE_LABEL, SERVICE_LABEL,
};
pub use runtime::{
    ContainerDetails, ContainerState, ContainerSummary, EngineEvent, EngineEventKind, EventStream,
    RuntimeClient,
};
pub use traverse::{in_dependency_order, in_reverse_dependency_order, TraverseOptions};
pub use up::{start_project, ServiceStarter, StartOptions};
pub use watch::{ContainerEvent, ContainerEventListener, ContainerRef, ContainerWatcher, WatchHooks};
