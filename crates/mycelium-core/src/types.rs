use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::MyceliumError;

pub type NodeId = String;
pub type CycleId = Uuid;

/// The role an artifact plays in the network; drives priority and merge rules.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Roadmap,
    Config,
    Implementation,
    Readme,
    Documentation,
    Other,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Roadmap,
        ArtifactKind::Config,
        ArtifactKind::Implementation,
        ArtifactKind::Readme,
        ArtifactKind::Documentation,
        ArtifactKind::Other,
    ];

    /// Fixed importance weight used by the priority scorer.
    pub fn importance(self) -> f64 {
        match self {
            ArtifactKind::Roadmap => 1.0,
            ArtifactKind::Config => 0.9,
            ArtifactKind::Implementation => 0.8,
            ArtifactKind::Readme => 0.7,
            ArtifactKind::Documentation => 0.6,
            ArtifactKind::Other => 0.5,
        }
    }
}

impl Default for ArtifactKind {
    fn default() -> Self {
        ArtifactKind::Other
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Roadmap => "roadmap",
            ArtifactKind::Config => "config",
            ArtifactKind::Implementation => "implementation",
            ArtifactKind::Readme => "readme",
            ArtifactKind::Documentation => "documentation",
            ArtifactKind::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ArtifactKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "roadmap" => ArtifactKind::Roadmap,
            "config" => ArtifactKind::Config,
            "implementation" => ArtifactKind::Implementation,
            "readme" => ArtifactKind::Readme,
            "documentation" | "docs" => ArtifactKind::Documentation,
            _ => ArtifactKind::Other,
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    DependsOn,
    Extends,
    References,
    SyncsWith,
    Validates,
    Monitors,
}

impl Default for EdgeKind {
    fn default() -> Self {
        EdgeKind::References
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::DependsOn => "depends_on",
            EdgeKind::Extends => "extends",
            EdgeKind::References => "references",
            EdgeKind::SyncsWith => "syncs_with",
            EdgeKind::Validates => "validates",
            EdgeKind::Monitors => "monitors",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EdgeKind {
    type Err = MyceliumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "depends_on" => Ok(EdgeKind::DependsOn),
            "extends" => Ok(EdgeKind::Extends),
            "references" => Ok(EdgeKind::References),
            "syncs_with" => Ok(EdgeKind::SyncsWith),
            "validates" => Ok(EdgeKind::Validates),
            "monitors" => Ok(EdgeKind::Monitors),
            other => Err(MyceliumError::InvalidOperation(format!(
                "unknown edge kind: {}",
                other
            ))),
        }
    }
}

/// A tracked unit of content. The locator is opaque to this crate and is
/// resolved by a [`crate::ContentStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: NodeId,
    pub kind: ArtifactKind,
    pub locator: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub health: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new<I: Into<NodeId>, L: Into<String>>(id: I, kind: ArtifactKind, locator: L) -> Self {
        Self {
            id: id.into(),
            kind,
            locator: locator.into(),
            last_synced_at: None,
            health: 1.0,
            version: None,
            registered_at: Utc::now(),
        }
    }

    /// Fractional days since the last sync, `None` if never synced.
    /// Timestamps in the future count as zero days.
    pub fn days_since_sync(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_synced_at.map(|at| {
            let millis = (now - at).num_milliseconds().max(0) as f64;
            millis / MILLIS_PER_DAY
        })
    }
}

pub const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Which step of an edge failed during a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    ReadSource,
    ReadTarget,
    WriteTarget,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::ReadSource => "read_source",
            FailureStage::ReadTarget => "read_target",
            FailureStage::WriteTarget => "write_target",
        };
        write!(f, "{}", s)
    }
}

/// A recoverable per-edge failure recorded during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFailure {
    pub source: NodeId,
    pub target: NodeId,
    pub stage: FailureStage,
    pub timed_out: bool,
    pub reason: String,
}

impl EdgeFailure {
    pub fn new(source: &str, target: &str, stage: FailureStage, err: &MyceliumError) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            stage,
            timed_out: matches!(err, MyceliumError::ContentTimeout { .. }),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCycleResult {
    pub cycle_id: CycleId,
    pub synced_node_ids: BTreeSet<NodeId>,
    pub started_at: DateTime<Utc>,
    /// Completion time of the cycle.
    pub timestamp: DateTime<Utc>,
    pub failures: Vec<EdgeFailure>,
    pub edges_merged: usize,
    pub mean_health: f64,
    pub next_interval: Duration,
}

/// Result of asking the scheduler to run a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(SyncCycleResult),
    /// Another cycle was already running; nothing was done.
    Skipped,
}

impl TickOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped)
    }

    pub fn into_result(self) -> Option<SyncCycleResult> {
        match self {
            TickOutcome::Completed(r) => Some(r),
            TickOutcome::Skipped => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Whether a registration reached the graph right away or waits for the running cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Applied,
    Deferred,
}

/// Structured events emitted to subscribers of a scheduler.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    CycleStarted { cycle_id: CycleId, queued: usize },
    EdgeMerged { source: NodeId, target: NodeId },
    EdgeFailed(EdgeFailure),
    CycleCompleted(SyncCycleResult),
    CycleSkipped,
    IntervalChanged { interval: Duration },
}
