//! Execution endpoints and the per-query active-node lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Network identity of an execution node. Two endpoints are the same
/// node when host and port match; the fabric tag only affects routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub host: String,
    pub port: u16,
    pub fabric: Option<String>,
}

impl NodeEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            fabric: None,
        }
    }

    pub fn with_fabric(host: impl Into<String>, port: u16, fabric: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            fabric: Some(fabric.into()),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for NodeEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for NodeEndpoint {}

impl Hash for NodeEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lookup over the active endpoints of one query, built once per
/// parallelization call. Keeps the caller's iteration order.
#[derive(Debug, Clone)]
pub struct ExecutionNodeMap {
    endpoints: Vec<NodeEndpoint>,
    index: HashMap<(String, u16), usize>,
}

impl ExecutionNodeMap {
    pub fn new(endpoints: &[NodeEndpoint]) -> Self {
        let mut index = HashMap::with_capacity(endpoints.len());
        for (i, ep) in endpoints.iter().enumerate() {
            index.entry((ep.host.clone(), ep.port)).or_insert(i);
        }
        Self {
            endpoints: endpoints.to_vec(),
            index,
        }
    }

    pub fn empty() -> Self {
        Self {
            endpoints: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn endpoints(&self) -> &[NodeEndpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn is_active(&self, endpoint: &NodeEndpoint) -> bool {
        self.index
            .contains_key(&(endpoint.host.clone(), endpoint.port))
    }

    /// Project a raw affinity map (which may mention endpoints from
    /// catalog metadata that are no longer active) onto the active
    /// set. Weights for the same node are summed; inactive endpoints
    /// are dropped. Output order follows the active endpoint order.
    pub fn project_affinity(&self, raw: &[(NodeEndpoint, f64)]) -> Vec<(NodeEndpoint, f64)> {
        let mut weights = vec![0.0f64; self.endpoints.len()];
        for (ep, w) in raw {
            if let Some(&i) = self.index.get(&(ep.host.clone(), ep.port)) {
                weights[i] += w;
            }
        }
        self.endpoints
            .iter()
            .zip(weights)
            .filter(|(_, w)| *w > 0.0)
            .map(|(ep, w)| (ep.clone(), w))
            .collect()
    }
}
