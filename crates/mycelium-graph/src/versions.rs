use mycelium_core::{NodeId, Result};
use serde::{Deserialize, Serialize};

use crate::ArtifactGraph;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMismatch {
    pub source: NodeId,
    pub target: NodeId,
    pub source_version: String,
    pub target_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReport {
    pub node: NodeId,
    pub in_sync: bool,
    pub issues: Vec<VersionMismatch>,
}

fn major_minor(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.trim().trim_start_matches('v').split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor))
}

/// Two versions drift apart when their majors differ or their minors are more
/// than one release apart. Missing or unparsable versions never drift.
pub fn versions_diverge(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.and_then(major_minor), b.and_then(major_minor)) {
        (Some((major_a, minor_a)), Some((major_b, minor_b))) => {
            major_a != major_b || minor_a.abs_diff(minor_b) > 1
        }
        _ => false,
    }
}

impl ArtifactGraph {
    /// Compare a node's version against each direct neighbor.
    pub fn check_versions(&self, id: &str) -> Result<VersionReport> {
        let neighbors = self.neighbors(id)?;
        let source_version = self.node(id).and_then(|n| n.version.clone());

        let mut issues = Vec::new();
        for neighbor in neighbors {
            let target_version = self.node(neighbor).and_then(|n| n.version.clone());
            if versions_diverge(source_version.as_deref(), target_version.as_deref()) {
                issues.push(VersionMismatch {
                    source: id.to_string(),
                    target: neighbor.clone(),
                    source_version: source_version.clone().unwrap_or_default(),
                    target_version: target_version.unwrap_or_default(),
                });
            }
        }

        Ok(VersionReport {
            node: id.to_string(),
            in_sync: issues.is_empty(),
            issues,
        })
    }
}
