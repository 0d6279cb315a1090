use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mycelium_core::{ArtifactKind, EdgeKind};
use mycelium_graph::{ArtifactGraph, GraphMutation};
use serde::Deserialize;

/// Artifacts and connections of a project, as written in `mycelium.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactEntry>,
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ArtifactEntry {
    pub id: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub path: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionEntry {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub kind: Option<String>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid manifest")
    }

    /// Read a manifest file. Returns it with the directory its paths are relative to.
    pub fn load(path: &Path) -> Result<(Self, PathBuf)> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let manifest = Self::parse(&text)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((manifest, root))
    }

    pub fn mutations(&self) -> Result<Vec<GraphMutation>> {
        let mut out = Vec::with_capacity(self.artifacts.len() + self.connections.len());
        for artifact in &self.artifacts {
            let kind = match &artifact.kind {
                Some(k) => k.parse::<ArtifactKind>().unwrap_or_default(),
                None => ArtifactKind::default(),
            };
            out.push(GraphMutation::AddNode {
                id: artifact.id.clone(),
                kind,
                locator: artifact.path.clone(),
                version: artifact.version.clone(),
            });
        }
        for connection in &self.connections {
            let kind = match &connection.kind {
                Some(k) => k
                    .parse::<EdgeKind>()
                    .with_context(|| format!("connection {} -> {}", connection.from, connection.to))?,
                None => EdgeKind::default(),
            };
            out.push(GraphMutation::add_edge(
                connection.from.clone(),
                connection.to.clone(),
                kind,
            ));
        }
        Ok(out)
    }

    pub fn build_graph(&self) -> Result<ArtifactGraph> {
        let mut graph = ArtifactGraph::new();
        for mutation in self.mutations()? {
            mutation
                .apply(&mut graph)
                .with_context(|| format!("Failed to apply {:?}", mutation))?;
        }
        Ok(graph)
    }
}
