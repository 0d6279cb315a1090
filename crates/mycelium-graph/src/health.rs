//! Per-node health derived from neighbor health and sync recency.
//!
//! `health = clamp(mean(neighbor health) * max(0, 1 - days_since_sync / 30), 0, 1)`
//!
//! A node without neighbors counts its connected health as 1.0, and a node that
//! has never been synced carries no age penalty.

use chrono::{DateTime, Utc};
use mycelium_core::Result;

use crate::ArtifactGraph;

/// Days after which an unsynced artifact has lost all of its health.
pub const SYNC_AGE_HORIZON_DAYS: f64 = 30.0;

/// Health of `id` as it would be after an update, without mutating the graph.
pub fn compute_health(graph: &ArtifactGraph, id: &str, now: DateTime<Utc>) -> Result<f64> {
    let neighbors = graph.neighbors(id)?;
    let connected = if neighbors.is_empty() {
        1.0
    } else {
        let total: f64 = neighbors
            .iter()
            .map(|n| graph.node(n).map(|a| a.health).unwrap_or(1.0))
            .sum();
        total / neighbors.len() as f64
    };

    let age_factor = match graph.node(id).and_then(|a| a.days_since_sync(now)) {
        Some(days) => (1.0 - days / SYNC_AGE_HORIZON_DAYS).max(0.0),
        None => 1.0,
    };

    Ok((connected * age_factor).clamp(0.0, 1.0))
}

/// Recompute and store the health of `id`. Neighbors are not revisited.
pub fn update_health(graph: &mut ArtifactGraph, id: &str, now: DateTime<Utc>) -> Result<f64> {
    let health = compute_health(graph, id, now)?;
    graph.set_health(id, health)
}
