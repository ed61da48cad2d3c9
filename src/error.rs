use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    #[diagnostic(
        code(convoy::graph::unknown_dependency),
        help("Every depends_on entry must name another service in the project")
    )]
    UnknownDependency { service: String, dependency: String },

    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    #[diagnostic(
        code(convoy::graph::circular),
        help("Services cannot depend on each other in a cycle. Review the depends_on entries")
    )]
    CircularDependency(Vec<String>),

    #[error("Service not found: {0}")]
    #[diagnostic(code(convoy::service::not_found))]
    ServiceNotFound(String),

    #[error("Service '{service}' failed to start: {reason}")]
    #[diagnostic(code(convoy::service::start_failed))]
    ServiceStartFailed { service: String, reason: String },

    #[error("No such container: {0}")]
    ContainerNotFound(String),

    #[error("Runtime error: {0}")]
    #[diagnostic(
        code(convoy::runtime::error),
        help("Check that the container runtime is reachable")
    )]
    Runtime(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("application not healthy after {0:?}")]
    #[diagnostic(
        code(convoy::wait::unhealthy),
        help("One or more services did not reach their wait condition in time. Increase the wait timeout or inspect the slow services")
    )]
    NotHealthy(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the inspect race where a container is gone from the runtime
    /// API before we could look at it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ContainerNotFound(_))
    }
}
