//! Bringing a project up: traversal, watcher and wait phase composed.
//!
//! [`start_project`] is the caller-facing entry point that ties the pieces
//! together: snapshot the project's containers, optionally watch the event
//! stream for a listener, start every service in dependency order through
//! the caller's [`ServiceStarter`], then (optionally) wait for the project
//! to report healthy under a deadline.

use crate::error::{Error, Result};
use crate::model::{dependency_wait_condition, DependencyConfig, Project, ServiceConfig};
use crate::runtime::{ContainerSummary, RuntimeClient};
use crate::traverse::{in_dependency_order, TraverseOptions};
use crate::watch::{
    ContainerEvent, ContainerEventListener, ContainerRef, ContainerWatcher, WatchHooks,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Options for [`start_project`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Services whose containers the watcher observes. Empty means all
    /// project services.
    pub attach_to: Vec<String>,
    /// Services that must all reach a terminal state before an attached
    /// watch returns. Empty means `attach_to`.
    pub services: Vec<String>,
    /// Run the wait-for-healthy phase after starting.
    pub wait: bool,
    /// Deadline for the wait phase. `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
    /// Cap on concurrently starting services. Zero means unlimited.
    pub max_concurrency: usize,
}

/// The per-service actions the activator drives but does not implement.
#[async_trait]
pub trait ServiceStarter: Send + Sync {
    /// Start one service. Invoked exactly once per service, only after all
    /// of its dependencies started successfully. `containers` is the project
    /// snapshot taken before the traversal began.
    async fn start_service(
        &self,
        cancel: CancellationToken,
        project: &Project,
        service: &ServiceConfig,
        containers: &[ContainerSummary],
    ) -> Result<()>;

    /// Block until every service satisfies its wait condition in
    /// `dependencies`. Only called when [`StartOptions::wait`] is set; the
    /// deadline is enforced by the caller.
    async fn wait_for_dependencies(
        &self,
        cancel: &CancellationToken,
        project: &Project,
        dependencies: &BTreeMap<String, DependencyConfig>,
        containers: &[ContainerSummary],
    ) -> Result<()>;
}

/// Start every service of `project` in dependency order.
///
/// With a `listener`, existing containers of the attached services get an
/// [`ContainerEvent::Attach`] notification and a [`ContainerWatcher`] runs on
/// a background task until all of them settle; its outcome is joined into
/// the returned result. A wait-phase timeout maps to [`Error::NotHealthy`].
pub async fn start_project(
    client: Arc<dyn RuntimeClient>,
    starter: Arc<dyn ServiceStarter>,
    project: &Project,
    options: StartOptions,
    listener: Option<ContainerEventListener>,
    hooks: Arc<dyn WatchHooks>,
    cancel: &CancellationToken,
) -> Result<()> {
    let containers = client.list_containers(&project.name).await?;

    let watch_cancel = cancel.child_token();
    let watcher_task = listener.map(|listener| {
        spawn_watcher(
            Arc::clone(&client),
            listener,
            Arc::clone(&hooks),
            project,
            &options,
            &containers,
            watch_cancel.clone(),
        )
    });

    let result = run_starters(
        Arc::clone(&starter),
        project,
        &options,
        &containers,
        cancel,
    )
    .await;
    if let Err(err) = result {
        return abandon_watch(watch_cancel, watcher_task, err).await;
    }

    if options.wait {
        let dependencies: BTreeMap<String, DependencyConfig> = project
            .services
            .iter()
            .map(|service| {
                (
                    service.name.clone(),
                    DependencyConfig {
                        condition: dependency_wait_condition(service, project),
                    },
                )
            })
            .collect();

        let wait = starter.wait_for_dependencies(cancel, project, &dependencies, &containers);
        let waited = match options.wait_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, wait).await {
                Ok(result) => result,
                Err(_) => Err(Error::NotHealthy(timeout)),
            },
            None => wait.await,
        };
        if let Err(err) = waited {
            return abandon_watch(watch_cancel, watcher_task, err).await;
        }
    }

    match watcher_task {
        Some(task) => join_watcher(task).await,
        None => Ok(()),
    }
}

/// Seed the listener with `Attach` events for the already-existing
/// containers of the attached services and start watching them.
fn spawn_watcher(
    client: Arc<dyn RuntimeClient>,
    listener: ContainerEventListener,
    hooks: Arc<dyn WatchHooks>,
    project: &Project,
    options: &StartOptions,
    containers: &[ContainerSummary],
    cancel: CancellationToken,
) -> JoinHandle<Result<()>> {
    let attach_to = if options.attach_to.is_empty() {
        project.service_names()
    } else {
        options.attach_to.clone()
    };
    let attached: Vec<ContainerSummary> = containers
        .iter()
        .filter(|c| attach_to.iter().any(|s| s == c.service()))
        .cloned()
        .collect();

    for container in &attached {
        let _ = listener.send(ContainerEvent::Attach(ContainerRef {
            id: container.id.clone(),
            name: container.display_name(&project.name),
            service: container.service().to_string(),
        }));
    }

    let watcher = ContainerWatcher::new(
        client,
        listener,
        hooks,
        project.name.clone(),
        attach_to,
        options.services.clone(),
        &attached,
    );
    tokio::spawn(watcher.run(cancel))
}

async fn run_starters(
    starter: Arc<dyn ServiceStarter>,
    project: &Project,
    options: &StartOptions,
    containers: &[ContainerSummary],
    cancel: &CancellationToken,
) -> Result<()> {
    let project = Arc::new(project.clone());
    let containers: Arc<[ContainerSummary]> = containers.to_vec().into();
    in_dependency_order(
        cancel,
        &project.clone(),
        TraverseOptions {
            max_concurrency: options.max_concurrency,
        },
        move |token, name| {
            let starter = Arc::clone(&starter);
            let project = Arc::clone(&project);
            let containers = Arc::clone(&containers);
            async move {
                let service = project
                    .service(&name)
                    .ok_or_else(|| Error::ServiceNotFound(name.clone()))?;
                starter
                    .start_service(token, &project, service, &containers)
                    .await
            }
        },
    )
    .await
}

/// Stop the background watch and surface `err` instead of its outcome.
async fn abandon_watch(
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
    err: Error,
) -> Result<()> {
    cancel.cancel();
    if let Some(task) = task {
        let _ = task.await;
    }
    Err(err)
}

async fn join_watcher(task: JoinHandle<Result<()>>) -> Result<()> {
    match task.await {
        Ok(result) => result,
        Err(join_err) => {
            if join_err.is_panic() {
                std::panic::resume_unwind(join_err.into_panic());
            }
            Err(Error::Cancelled)
        }
    }
}
