//! Dependency graph over project services.
//!
//! The graph's shape is fixed at construction; only per-vertex status changes
//! afterwards, and every access goes through one graph-wide lock. Neighbor
//! sets store vertex keys rather than references, so the graph owns each
//! vertex exactly once and no reference cycles exist even though the
//! topology itself is bidirectional.
//!
//! All read operations return freshly-allocated snapshots so callers can
//! iterate without holding the lock.

use crate::error::{Error, Result};
use crate::model::ServiceConfig;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Gating status of a service vertex.
///
/// The status decides readiness during traversal, never direction: an
/// up-traversal starts everything `Stopped` and drives it to `Started`, a
/// down-traversal the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Stopped,
    Started,
}

/// One service in the dependency structure.
///
/// `key` identifies the vertex within the graph; `service` is the payload
/// handed to visitors. Today both are the service name, kept separate so a
/// future alias layer doesn't ripple through the traversal.
#[derive(Debug, Clone)]
pub struct Vertex {
    key: String,
    service: String,
    status: ServiceStatus,
    /// Keys of services this vertex depends on.
    children: BTreeSet<String>,
    /// Keys of services depending on this vertex.
    parents: BTreeSet<String>,
}

impl Vertex {
    fn new(key: impl Into<String>, service: impl Into<String>, status: ServiceStatus) -> Self {
        Self {
            key: key.into(),
            service: service.into(),
            status,
            children: BTreeSet::new(),
            parents: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }
}

/// Immutable-shape dependency DAG with mutable per-vertex status.
///
/// Created per operation from the project's services, used to drive one
/// traversal, then discarded. Never shared across operations.
#[derive(Debug)]
pub struct Graph {
    vertices: Mutex<HashMap<String, Vertex>>,
}

impl Graph {
    /// Build the dependency graph of `services`, every vertex starting at
    /// `initial_status`.
    ///
    /// An edge `A -> B` is added for each dependency declaration "A depends
    /// on B". Duplicate declarations are idempotent. A dependency on a name
    /// not present in `services` fails the whole construction, as does any
    /// dependency cycle.
    pub fn from_services(services: &[ServiceConfig], initial_status: ServiceStatus) -> Result<Self> {
        let mut vertices: HashMap<String, Vertex> = HashMap::new();
        for service in services {
            vertices.insert(
                service.name.clone(),
                Vertex::new(&service.name, &service.name, initial_status),
            );
        }

        for service in services {
            for dependency in service.dependencies() {
                if !vertices.contains_key(dependency) {
                    return Err(Error::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                // BTreeSet insertion makes duplicate edges idempotent.
                if let Some(vertex) = vertices.get_mut(&service.name) {
                    vertex.children.insert(dependency.clone());
                }
                if let Some(vertex) = vertices.get_mut(dependency) {
                    vertex.parents.insert(service.name.clone());
                }
            }
        }

        check_cycles(&vertices)?;

        Ok(Self {
            vertices: Mutex::new(vertices),
        })
    }

    pub fn len(&self) -> usize {
        self.vertices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.lock().is_empty()
    }

    /// Vertices with no children: the terminal dependencies.
    pub fn leaves(&self) -> Vec<String> {
        self.vertices
            .lock()
            .values()
            .filter(|v| v.children.is_empty())
            .map(|v| v.key.clone())
            .collect()
    }

    /// Vertices with no parents: the top-level services.
    pub fn roots(&self) -> Vec<String> {
        self.vertices
            .lock()
            .values()
            .filter(|v| v.parents.is_empty())
            .map(|v| v.key.clone())
            .collect()
    }

    pub fn children_of(&self, key: &str) -> Vec<String> {
        self.vertices
            .lock()
            .get(key)
            .map(|v| v.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn parents_of(&self, key: &str) -> Vec<String> {
        self.vertices
            .lock()
            .get(key)
            .map(|v| v.parents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Children of `key` whose status equals `status`.
    pub fn filter_children(&self, key: &str, status: ServiceStatus) -> Vec<String> {
        let vertices = self.vertices.lock();
        let Some(vertex) = vertices.get(key) else {
            return Vec::new();
        };
        vertex
            .children
            .iter()
            .filter(|child| vertices.get(*child).is_some_and(|v| v.status == status))
            .cloned()
            .collect()
    }

    /// Parents of `key` whose status equals `status`.
    pub fn filter_parents(&self, key: &str, status: ServiceStatus) -> Vec<String> {
        let vertices = self.vertices.lock();
        let Some(vertex) = vertices.get(key) else {
            return Vec::new();
        };
        vertex
            .parents
            .iter()
            .filter(|parent| vertices.get(*parent).is_some_and(|v| v.status == status))
            .cloned()
            .collect()
    }

    /// Atomically set the status of one vertex.
    pub fn update_status(&self, key: &str, status: ServiceStatus) {
        if let Some(vertex) = self.vertices.lock().get_mut(key) {
            vertex.status = status;
        }
    }

    /// Snapshot of one vertex, status as of the call.
    pub fn vertex(&self, key: &str) -> Option<Vertex> {
        self.vertices.lock().get(key).cloned()
    }
}

/// White/grey/black DFS over the child edges. A back edge into a grey vertex
/// is a cycle; the error path is trimmed to start at the revisited vertex so
/// it reads `A -> B -> ... -> A`.
fn check_cycles(vertices: &HashMap<String, Vertex>) -> Result<()> {
    let mut discovered = HashSet::new();
    let mut finished = HashSet::new();

    // Sorted start order keeps the reported path deterministic.
    let mut keys: Vec<&String> = vertices.keys().collect();
    keys.sort();

    for key in keys {
        if !discovered.contains(key.as_str()) && !finished.contains(key.as_str()) {
            let mut path = vec![key.clone()];
            visit(vertices, key, &mut path, &mut discovered, &mut finished)?;
        }
    }
    Ok(())
}

fn visit(
    vertices: &HashMap<String, Vertex>,
    key: &str,
    path: &mut Vec<String>,
    discovered: &mut HashSet<String>,
    finished: &mut HashSet<String>,
) -> Result<()> {
    discovered.insert(key.to_string());

    if let Some(vertex) = vertices.get(key) {
        for child in &vertex.children {
            if discovered.contains(child.as_str()) {
                let start = path.iter().position(|k| k == child).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(child.clone());
                return Err(Error::CircularDependency(cycle));
            }
            if !finished.contains(child.as_str()) {
                path.push(child.clone());
                visit(vertices, child, path, discovered, finished)?;
                path.pop();
            }
        }
    }

    discovered.remove(key);
    finished.insert(key.to_string());
    Ok(())
}
