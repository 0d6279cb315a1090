use chrono::{DateTime, Utc};
use mycelium_core::{Artifact, ArtifactKind, EdgeKind, MyceliumError, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Direct and two-hop connections of a node. Neither set contains the node itself
/// and the two sets never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connections {
    pub direct: BTreeSet<NodeId>,
    pub indirect: BTreeSet<NodeId>,
}

impl Connections {
    pub fn all(&self) -> BTreeSet<NodeId> {
        self.direct.union(&self.indirect).cloned().collect()
    }
}

/// Summary of the network for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub node_count: usize,
    pub edge_count: usize,
    pub kinds: BTreeMap<ArtifactKind, usize>,
    pub edge_kinds: BTreeMap<EdgeKind, usize>,
    pub isolated: usize,
    pub average_degree: f64,
    pub mean_health: f64,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Graph of artifacts with typed, bidirectional connections.
///
/// Edges are stored once per unordered pair and kind; `adjacency` is kept as the
/// symmetric closure of `edges` on every mutation, so every registered node has an
/// adjacency entry (possibly empty) and every adjacency entry names a registered node.
#[derive(Debug, Clone, Default)]
pub struct ArtifactGraph {
    nodes: BTreeMap<NodeId, Artifact>,
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
    edges: BTreeSet<(NodeId, NodeId, EdgeKind)>,
}

impl ArtifactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node<I, L>(&mut self, id: I, kind: ArtifactKind, locator: L) -> Result<&Artifact>
    where
        I: Into<NodeId>,
        L: Into<String>,
    {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(MyceliumError::DuplicateNode(id));
        }
        let artifact = Artifact::new(id.clone(), kind, locator);
        debug!(node = %id, kind = %kind, locator = %artifact.locator, "registered artifact");
        self.adjacency.insert(id.clone(), BTreeSet::new());
        Ok(&*self.nodes.entry(id).or_insert(artifact))
    }

    /// Connect two nodes. Returns `Ok(false)` when the same unordered pair is
    /// already connected with this kind.
    pub fn add_edge(&mut self, a: &str, b: &str, kind: EdgeKind) -> Result<bool> {
        self.ensure_node(a)?;
        self.ensure_node(b)?;
        if a == b {
            return Err(MyceliumError::InvalidOperation(format!(
                "cannot connect {} to itself",
                a
            )));
        }

        let key = Self::edge_key(a, b, kind);
        if !self.edges.insert(key) {
            return Ok(false);
        }
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
        debug!(source = %a, target = %b, kind = %kind, "connected artifacts");
        Ok(true)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Artifact> {
        self.nodes.get(id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Artifact> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Stored edges as `(low id, high id, kind)`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, EdgeKind)> {
        self.edges
            .iter()
            .map(|(a, b, kind)| (a.as_str(), b.as_str(), *kind))
    }

    pub fn edges_between(&self, a: &str, b: &str) -> Vec<EdgeKind> {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        self.edges
            .iter()
            .filter(|(x, y, _)| x == low && y == high)
            .map(|(_, _, kind)| *kind)
            .collect()
    }

    pub fn neighbors(&self, id: &str) -> Result<&BTreeSet<NodeId>> {
        self.adjacency
            .get(id)
            .ok_or_else(|| MyceliumError::UnknownNode(id.to_string()))
    }

    /// Number of direct neighbors; zero for unknown ids.
    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn all_neighbors(&self, id: &str) -> Result<Connections> {
        let direct = self.neighbors(id)?.clone();
        let mut indirect = BTreeSet::new();
        for hop in &direct {
            if let Some(second) = self.adjacency.get(hop) {
                for candidate in second {
                    if candidate != id && !direct.contains(candidate) {
                        indirect.insert(candidate.clone());
                    }
                }
            }
        }
        Ok(Connections { direct, indirect })
    }

    /// Set a node's health, clamped to `[0, 1]`. Returns the stored value.
    pub fn set_health(&mut self, id: &str, health: f64) -> Result<f64> {
        let node = self.node_mut(id)?;
        node.health = if health.is_nan() {
            0.0
        } else {
            health.clamp(0.0, 1.0)
        };
        Ok(node.health)
    }

    pub fn mark_synced(&mut self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.node_mut(id)?.last_synced_at = Some(at);
        Ok(())
    }

    pub fn set_version(&mut self, id: &str, version: Option<String>) -> Result<()> {
        self.node_mut(id)?.version = version;
        Ok(())
    }

    /// Mean health over all nodes; an empty graph counts as fully healthy.
    pub fn mean_health(&self) -> f64 {
        if self.nodes.is_empty() {
            return 1.0;
        }
        self.nodes.values().map(|n| n.health).sum::<f64>() / self.nodes.len() as f64
    }

    pub fn status(&self) -> NetworkStatus {
        let mut kinds = BTreeMap::new();
        for node in self.nodes.values() {
            *kinds.entry(node.kind).or_insert(0) += 1;
        }
        let mut edge_kinds = BTreeMap::new();
        for (_, _, kind) in &self.edges {
            *edge_kinds.entry(*kind).or_insert(0) += 1;
        }
        let degree_sum: usize = self.adjacency.values().map(|s| s.len()).sum();
        let average_degree = if self.nodes.is_empty() {
            0.0
        } else {
            degree_sum as f64 / self.nodes.len() as f64
        };
        NetworkStatus {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            kinds,
            edge_kinds,
            isolated: self.adjacency.values().filter(|s| s.is_empty()).count(),
            average_degree,
            mean_health: self.mean_health(),
            last_sync: self.nodes.values().filter_map(|n| n.last_synced_at).max(),
        }
    }

    fn ensure_node(&self, id: &str) -> Result<()> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(MyceliumError::UnknownNode(id.to_string()))
        }
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut Artifact> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| MyceliumError::UnknownNode(id.to_string()))
    }

    fn edge_key(a: &str, b: &str, kind: EdgeKind) -> (NodeId, NodeId, EdgeKind) {
        if a <= b {
            (a.to_string(), b.to_string(), kind)
        } else {
            (b.to_string(), a.to_string(), kind)
        }
    }
}
