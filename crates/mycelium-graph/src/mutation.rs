use mycelium_core::{ArtifactKind, EdgeKind, NodeId, Result};
use serde::{Deserialize, Serialize};

use crate::ArtifactGraph;

/// A structural change to the graph. Registrations that arrive while a sync cycle
/// is running are held as mutations and applied once the cycle is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphMutation {
    AddNode {
        id: NodeId,
        kind: ArtifactKind,
        locator: String,
        #[serde(default)]
        version: Option<String>,
    },
    AddEdge {
        source: NodeId,
        target: NodeId,
        kind: EdgeKind,
    },
    SetVersion {
        id: NodeId,
        version: Option<String>,
    },
}

impl GraphMutation {
    pub fn add_node<I: Into<NodeId>, L: Into<String>>(id: I, kind: ArtifactKind, locator: L) -> Self {
        Self::AddNode {
            id: id.into(),
            kind,
            locator: locator.into(),
            version: None,
        }
    }

    pub fn add_edge<A: Into<NodeId>, B: Into<NodeId>>(source: A, target: B, kind: EdgeKind) -> Self {
        Self::AddEdge {
            source: source.into(),
            target: target.into(),
            kind,
        }
    }

    pub fn apply(&self, graph: &mut ArtifactGraph) -> Result<()> {
        match self {
            GraphMutation::AddNode {
                id,
                kind,
                locator,
                version,
            } => {
                graph.add_node(id.clone(), *kind, locator.clone())?;
                if version.is_some() {
                    graph.set_version(id, version.clone())?;
                }
            }
            GraphMutation::AddEdge {
                source,
                target,
                kind,
            } => {
                graph.add_edge(source, target, *kind)?;
            }
            GraphMutation::SetVersion { id, version } => {
                graph.set_version(id, version.clone())?;
            }
        }
        Ok(())
    }
}
