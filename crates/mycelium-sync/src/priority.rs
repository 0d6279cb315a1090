use chrono::{DateTime, Utc};
use mycelium_core::{Artifact, NodeId};
use mycelium_graph::ArtifactGraph;
use std::cmp::Ordering;

pub const STALENESS_WEIGHT: f64 = 0.30;
pub const FAN_OUT_WEIGHT: f64 = 0.20;
pub const KIND_WEIGHT: f64 = 0.30;
pub const HEALTH_WEIGHT: f64 = 0.20;

/// Staleness saturates after this many days.
pub const STALENESS_HORIZON_DAYS: f64 = 30.0;
/// Fan-out saturates at this many direct neighbors.
pub const FAN_OUT_CAP: usize = 10;

/// The four normalized signals behind a priority score, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityBreakdown {
    pub staleness: f64,
    pub fan_out: f64,
    pub kind: f64,
    pub inverse_health: f64,
}

impl PriorityBreakdown {
    pub fn total(&self) -> f64 {
        let raw = self.staleness * STALENESS_WEIGHT
            + self.fan_out * FAN_OUT_WEIGHT
            + self.kind * KIND_WEIGHT
            + self.inverse_health * HEALTH_WEIGHT;
        raw.clamp(0.0, 1.0)
    }
}

pub fn breakdown(node: &Artifact, now: DateTime<Utc>, neighbor_count: usize) -> PriorityBreakdown {
    let staleness = match node.days_since_sync(now) {
        Some(days) => days.min(STALENESS_HORIZON_DAYS) / STALENESS_HORIZON_DAYS,
        None => 1.0,
    };
    let health = if node.health.is_nan() {
        0.0
    } else {
        node.health.clamp(0.0, 1.0)
    };
    PriorityBreakdown {
        staleness,
        fan_out: neighbor_count.min(FAN_OUT_CAP) as f64 / FAN_OUT_CAP as f64,
        kind: node.kind.importance(),
        inverse_health: 1.0 - health,
    }
}

/// Sync priority of a node in `[0, 1]`. Pure: depends only on its arguments.
pub fn score(node: &Artifact, now: DateTime<Utc>, neighbor_count: usize) -> f64 {
    breakdown(node, now, neighbor_count).total()
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub node_id: NodeId,
    pub score: f64,
}

/// Every connected node, highest score first; ties go to the smaller id.
pub fn build_queue(graph: &ArtifactGraph, now: DateTime<Utc>) -> Vec<QueueEntry> {
    let mut queue: Vec<QueueEntry> = graph
        .nodes()
        .filter_map(|node| {
            let degree = graph.degree(&node.id);
            (degree > 0).then(|| QueueEntry {
                node_id: node.id.clone(),
                score: score(node, now, degree),
            })
        })
        .collect();
    queue.sort_by(compare_entries);
    queue
}

fn compare_entries(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.node_id.cmp(&b.node_id))
}
