//! Container runtime client seam.
//!
//! The activator never talks to a runtime directly; everything it needs is
//! behind [`RuntimeClient`]: a container snapshot for a project, per-container
//! inspection, and a subscription to the engine's lifecycle event stream.
//! Production implementations wrap a real engine API; tests use in-memory
//! fakes.

use crate::error::Result;
use crate::model::SERVICE_LABEL;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// One container as reported by a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    /// Canonical name, possibly with a leading slash and project prefix.
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    /// Service this container belongs to, from its labels.
    pub fn service(&self) -> &str {
        self.labels.get(SERVICE_LABEL).map(String::as_str).unwrap_or("")
    }

    /// Container name as shown to users: no leading slash, no project prefix.
    pub fn display_name(&self, project_name: &str) -> String {
        let name = self.name.trim_start_matches('/');
        name.strip_prefix(&format!("{project_name}-"))
            .unwrap_or(name)
            .to_string()
    }
}

/// Runtime state of an inspected container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub exit_code: i64,
    /// True while the engine's restart policy is bringing the container back.
    pub restarting: bool,
}

/// Result of inspecting one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub state: ContainerState,
}

impl ContainerDetails {
    /// The summary view of this inspection result.
    pub fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// Lifecycle transition kinds the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    Create,
    Start,
    Die,
    Stop,
}

/// One raw engine event. Carries only the container ID; consumers inspect
/// the container for labels and state.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub container_id: String,
    pub kind: EngineEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Stream of engine events for one subscription. Dropping the receiver ends
/// the subscription.
pub type EventStream = mpsc::UnboundedReceiver<EngineEvent>;

/// Everything the activator consumes from the container runtime.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Snapshot of the containers belonging to a project.
    async fn list_containers(&self, project_name: &str) -> Result<Vec<ContainerSummary>>;

    /// Inspect one container. Returns [`crate::Error::ContainerNotFound`]
    /// when the container vanished before the inspect landed.
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails>;

    /// Subscribe to lifecycle events for a project, filtered to `services`.
    async fn subscribe_events(&self, project_name: &str, services: &[String])
        -> Result<EventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_slash_and_project_prefix() {
        let container = ContainerSummary {
            id: "c1".into(),
            name: "/demo-web-1".into(),
            labels: HashMap::new(),
        };
        assert_eq!(container.display_name("demo"), "web-1");
        // A name without the project prefix passes through untouched.
        assert_eq!(container.display_name("other"), "demo-web-1");
    }

    #[test]
    fn service_reads_the_service_label() {
        let mut labels = HashMap::new();
        labels.insert(SERVICE_LABEL.to_string(), "db".to_string());
        let container = ContainerSummary {
            id: "c1".into(),
            name: "db-1".into(),
            labels,
        };
        assert_eq!(container.service(), "db");
    }
}
