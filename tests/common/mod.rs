//! Shared fakes for integration tests: an in-memory runtime client whose
//! event stream the test feeds by hand, and hook/listener recorders.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy::{
    ContainerDetails, ContainerSummary, EngineEvent, EngineEventKind, Error, EventStream, Result,
    RuntimeClient, WatchHooks, SERVICE_LABEL,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct FakeRuntime {
    containers: Mutex<HashMap<String, ContainerDetails>>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    event_rx: Mutex<Option<EventStream>>,
}

impl FakeRuntime {
    pub fn new(containers: Vec<ContainerDetails>) -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            containers: Mutex::new(containers.into_iter().map(|c| (c.id.clone(), c)).collect()),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        })
    }

    /// Feed one engine event into the subscription.
    pub fn push_event(&self, container_id: &str, kind: EngineEventKind) {
        let _ = self.event_tx.send(EngineEvent {
            container_id: container_id.to_string(),
            kind,
            timestamp: Utc::now(),
        });
    }

    pub fn insert_container(&self, details: ContainerDetails) {
        self.containers.lock().insert(details.id.clone(), details);
    }

    pub fn remove_container(&self, id: &str) {
        self.containers.lock().remove(id);
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn list_containers(&self, _project_name: &str) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .containers
            .lock()
            .values()
            .map(ContainerDetails::summary)
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        self.containers
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))
    }

    async fn subscribe_events(
        &self,
        _project_name: &str,
        _services: &[String],
    ) -> Result<EventStream> {
        self.event_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Runtime("event stream already subscribed".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingHooks {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl WatchHooks for RecordingHooks {
    async fn on_start(&self, container: &ContainerSummary, _t: DateTime<Utc>) -> Result<()> {
        self.calls.lock().push(format!("start:{}", container.id));
        Ok(())
    }

    async fn on_recreate(&self, container: &ContainerSummary, _t: DateTime<Utc>) -> Result<()> {
        self.calls.lock().push(format!("recreate:{}", container.id));
        Ok(())
    }
}

/// Container details labelled for `service`, named the way the runtime names
/// project containers.
pub fn container(id: &str, project: &str, service: &str) -> ContainerDetails {
    let mut labels = HashMap::new();
    labels.insert(SERVICE_LABEL.to_string(), service.to_string());
    ContainerDetails {
        id: id.to_string(),
        name: format!("/{project}-{service}-1"),
        labels,
        ..Default::default()
    }
}
