//! Container watching over the engine event stream.
//!
//! While the traversal starts services through the control API, containers
//! come up asynchronously in the runtime. [`ContainerWatcher`] turns the raw
//! event stream into ordered, de-duplicated [`ContainerEvent`]s for a
//! listener, and knows when enough has happened to return: it tracks the set
//! of container IDs still *expected* to reach a terminal state and drains it
//! as containers stop, exit for good, or get replaced.
//!
//! The event consumer is a single task, so listener deliveries are
//! serialized in engine-event arrival order and the watcher state needs no
//! locking.

use crate::error::Result;
use crate::model::CONTAINER_REPLACE_LABEL;
use crate::runtime::{ContainerSummary, EngineEvent, EngineEventKind, RuntimeClient};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identity of the container an event is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerRef {
    pub id: String,
    /// Display name: no leading slash, no project prefix.
    pub name: String,
    pub service: String,
}

/// Typed lifecycle notification delivered to the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContainerEvent {
    /// Output attachment to a container began (initial attach or re-attach).
    Attach(ContainerRef),
    /// A watched container stopped.
    Stopped(ContainerRef),
    /// A container was superseded by a replacement.
    Recreated(ContainerRef),
    /// A container terminated on its own.
    Exit {
        container: ContainerRef,
        exit_code: i64,
        /// True when the engine's restart policy will bring it back.
        restarting: bool,
    },
}

/// Receives [`ContainerEvent`]s. Deliveries are serialized; a dropped
/// receiver is tolerated (remaining events are discarded).
pub type ContainerEventListener = mpsc::UnboundedSender<ContainerEvent>;

/// Side-effect callbacks invoked from the event consumer.
#[async_trait::async_trait]
pub trait WatchHooks: Send + Sync {
    /// A watched container (re)started and needs attention, e.g. output
    /// re-attachment. Also invoked for containers scaled in mid-watch.
    async fn on_start(&self, container: &ContainerSummary, timestamp: DateTime<Utc>)
        -> Result<()>;

    /// A replacement container was created for an existing one.
    async fn on_recreate(
        &self,
        container: &ContainerSummary,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;
}

/// Reconciles the engine event stream against the set of containers we are
/// waiting on.
pub struct ContainerWatcher {
    client: Arc<dyn RuntimeClient>,
    listener: ContainerEventListener,
    hooks: Arc<dyn WatchHooks>,
    project_name: String,
    services: Vec<String>,
    /// Container IDs still expected to reach a terminal state.
    expected: HashSet<String>,
    /// Restart counter per watched container ID. Zero means never restarted.
    watched: HashMap<String, u32>,
    /// Old container IDs scheduled to be replaced; consumed by the terminal
    /// event of the old container.
    replaced: HashSet<String>,
}

impl ContainerWatcher {
    /// Build a watcher over `containers`, the project containers existing at
    /// subscription time.
    ///
    /// Only containers whose service is in `required` seed the expected set;
    /// an empty `required` means all of `services`. Every initial container
    /// is watched regardless, so restarts of non-required services still
    /// reach the listener.
    pub fn new(
        client: Arc<dyn RuntimeClient>,
        listener: ContainerEventListener,
        hooks: Arc<dyn WatchHooks>,
        project_name: impl Into<String>,
        services: Vec<String>,
        required: Vec<String>,
        containers: &[ContainerSummary],
    ) -> Self {
        let required = if required.is_empty() {
            services.clone()
        } else {
            required
        };

        let mut expected = HashSet::new();
        let mut watched = HashMap::new();
        for container in containers {
            if required.iter().any(|s| s == container.service()) {
                expected.insert(container.id.clone());
            }
            watched.insert(container.id.clone(), 0);
        }

        Self {
            client,
            listener,
            hooks,
            project_name: project_name.into(),
            services,
            expected,
            watched,
            replaced: HashSet::new(),
        }
    }

    /// Consume engine events until every expected container has settled or
    /// been terminated, or `cancel` fires (which returns `Ok`).
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        if self.watched.is_empty() {
            return Ok(());
        }

        let mut events = self
            .client
            .subscribe_events(&self.project_name, &self.services)
            .await?;

        loop {
            if self.expected.is_empty() {
                tracing::debug!(project = %self.project_name, "all expected containers settled");
                // Dropping the stream cancels the subscription.
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    /// Apply one engine event to the watcher state.
    ///
    /// This is the transition table keyed on `(container, event kind,
    /// replaced?)`; each arm mirrors one row.
    async fn handle_event(&mut self, event: EngineEvent) -> Result<()> {
        let details = match self.client.inspect_container(&event.container_id).await {
            Ok(details) => details,
            Err(err) if err.is_not_found() => {
                // The container can be gone from the API before we inspect
                // a "die" or "stop"; drop the watch without erroring.
                tracing::debug!(id = %event.container_id, "container vanished before inspect");
                self.watched.remove(&event.container_id);
                self.expected.remove(&event.container_id);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let container = details.summary();
        let id = container.id.clone();
        let reference = ContainerRef {
            id: id.clone(),
            name: container.display_name(&self.project_name),
            service: container.service().to_string(),
        };

        match event.kind {
            EngineEventKind::Stop => {
                if self.watched.contains_key(&id) {
                    let notification = if self.replaced.remove(&id) {
                        ContainerEvent::Recreated(reference)
                    } else {
                        ContainerEvent::Stopped(reference)
                    };
                    self.emit(notification);
                }
                self.watched.remove(&id);
                self.expected.remove(&id);
            }
            EngineEventKind::Die => {
                let restarts = self.watched.get(&id).copied().unwrap_or(0);
                self.watched.insert(id.clone(), restarts + 1);
                let restarting = details.state.restarting;

                let notification = if self.replaced.remove(&id) {
                    ContainerEvent::Recreated(reference)
                } else {
                    ContainerEvent::Exit {
                        container: reference,
                        exit_code: details.state.exit_code,
                        restarting,
                    }
                };
                self.emit(notification);

                if !restarting {
                    self.watched.remove(&id);
                    self.expected.remove(&id);
                }
            }
            EngineEventKind::Start => {
                let must_attach = match self.watched.get(&id).copied() {
                    // A new container scaled into the service mid-watch.
                    None => {
                        self.watched.insert(id.clone(), 0);
                        self.expected.insert(id.clone());
                        true
                    }
                    // A restart; zero restarts means the start we triggered.
                    Some(restarts) => restarts > 0,
                };
                if must_attach {
                    self.hooks.on_start(&container, event.timestamp).await?;
                }
            }
            EngineEventKind::Create => {
                if let Some(old_id) = details.labels.get(CONTAINER_REPLACE_LABEL).cloned() {
                    self.replaced.insert(old_id.clone());
                    self.hooks.on_recreate(&container, event.timestamp).await?;
                    // The replacement inherits the expectation on the old
                    // container.
                    if self.expected.contains(&old_id) {
                        self.expected.insert(id.clone());
                    }
                    self.watched.insert(id.clone(), 1);
                }
            }
        }

        Ok(())
    }

    fn emit(&self, event: ContainerEvent) {
        tracing::debug!(?event, "container event");
        let _ = self.listener.send(event);
    }
}
