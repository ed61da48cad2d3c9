//! Project model consumed from the loader.
//!
//! A [`Project`] is the minimal shape the activator needs: named services and
//! their declared dependencies. Loading and validating the full configuration
//! file is the loader's job; by the time a project reaches this crate it is
//! already merged and resolved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Container label carrying the name of the service a container belongs to.
pub const SERVICE_LABEL: &str = "com.convoy.service";

/// Container label set on a replacement container, naming the old container
/// ID it supersedes.
pub const CONTAINER_REPLACE_LABEL: &str = "com.convoy.container-replace";

/// A project: a named collection of services with dependency declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl Project {
    pub fn new(name: impl Into<String>, services: Vec<ServiceConfig>) -> Self {
        Self {
            name: name.into(),
            services,
        }
    }

    /// Look up a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }
}

/// One service as the loader hands it to us: a name plus the services it
/// depends on, each with the condition the dependent waits for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub depends_on: BTreeMap<String, DependencyConfig>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: BTreeMap::new(),
        }
    }

    /// Declare a dependency on another service with the default condition.
    pub fn depends_on(self, dependency: impl Into<String>) -> Self {
        self.depends_on_with(dependency, WaitCondition::Started)
    }

    /// Declare a dependency on another service with an explicit condition.
    pub fn depends_on_with(
        mut self,
        dependency: impl Into<String>,
        condition: WaitCondition,
    ) -> Self {
        self.depends_on
            .insert(dependency.into(), DependencyConfig { condition });
        self
    }

    /// Names of the services this service depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = &String> {
        self.depends_on.keys()
    }
}

/// Per-dependency configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConfig {
    #[serde(default)]
    pub condition: WaitCondition,
}

/// What a dependent (or the wait-for-healthy phase) waits for on a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// The service's container has been started.
    #[default]
    Started,
    /// The service reports healthy.
    Healthy,
    /// The service ran to completion with a zero exit code.
    CompletedSuccessfully,
    /// Running, or healthy when a healthcheck is defined. Used by the
    /// wait-for-healthy phase, never declared in configuration.
    RunningOrHealthy,
}

/// Select the condition the wait-for-healthy phase should use for `service`.
///
/// If any other service depends on it with `CompletedSuccessfully`, that
/// condition applies: a one-shot container never reports healthy, so waiting
/// for `RunningOrHealthy` would never finish.
pub fn dependency_wait_condition(service: &ServiceConfig, project: &Project) -> WaitCondition {
    for other in &project.services {
        for (dependency, config) in &other.depends_on {
            if dependency == &service.name
                && config.condition == WaitCondition::CompletedSuccessfully
            {
                return WaitCondition::CompletedSuccessfully;
            }
        }
    }
    WaitCondition::RunningOrHealthy
}
