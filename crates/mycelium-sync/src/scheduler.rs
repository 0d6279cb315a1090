//! Single-flight sync cycles over the artifact graph.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use mycelium_core::{
    ArtifactKind, ContentStore, EdgeFailure, FailureStage, MyceliumError, NodeId, Registration,
    Result, SchedulerState, SyncConfig, SyncCycleResult, SyncEvent, SyncNotifier, TickOutcome,
};
use mycelium_graph::{update_health, ArtifactGraph, GraphMutation};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::merge::MergeResolver;
use crate::priority::build_queue;

type ContentDigest = [u8; 32];

fn digest(content: &str) -> ContentDigest {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(content.as_bytes()));
    out
}

#[derive(Debug, Clone)]
struct PlannedTarget {
    id: NodeId,
    kind: ArtifactKind,
    locator: String,
}

/// A queued source with the neighbors it may push content to.
#[derive(Debug, Clone)]
struct PlannedNode {
    id: NodeId,
    kind: ArtifactKind,
    locator: String,
    targets: Vec<PlannedTarget>,
}

/// Mutable state of one cycle. Lives on the cycle's stack, never shared.
#[derive(Default)]
struct CycleState {
    /// locator -> content as last read or written during this cycle
    contents: HashMap<String, String>,
    touched: BTreeSet<NodeId>,
    locators: HashMap<NodeId, String>,
    failures: Vec<EdgeFailure>,
    /// sources with at least one failed edge this cycle
    failed_sources: BTreeSet<NodeId>,
    edges_merged: usize,
}

impl CycleState {
    fn touch(&mut self, id: &str, locator: &str) {
        self.touched.insert(id.to_string());
        self.locators
            .entry(id.to_string())
            .or_insert_with(|| locator.to_string());
    }
}

/// Resets the running flag and applies deferred registrations when a cycle ends,
/// including when its future is dropped.
struct RunningGuard<'a> {
    scheduler: &'a SyncScheduler,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.finish_cycle();
    }
}

pub struct SyncScheduler {
    graph: RwLock<ArtifactGraph>,
    store: Arc<dyn ContentStore>,
    resolver: MergeResolver,
    config: SyncConfig,
    running: AtomicBool,
    pending: Mutex<Vec<GraphMutation>>,
    digests: DashMap<NodeId, ContentDigest>,
    interval: watch::Sender<Duration>,
    events: broadcast::Sender<SyncEvent>,
    notifier: Option<Arc<dyn SyncNotifier>>,
}

impl SyncScheduler {
    pub fn new(graph: ArtifactGraph, store: Arc<dyn ContentStore>, config: SyncConfig) -> Self {
        let (interval, _rx) = watch::channel(config.initial_interval());
        let (events, _rx) = broadcast::channel(256);
        Self {
            graph: RwLock::new(graph),
            store,
            resolver: MergeResolver::new(config.same_kind_policy),
            config,
            running: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            digests: DashMap::new(),
            interval,
            events,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SyncNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Read access to the graph. Do not hold the guard across an `.await`.
    pub fn graph(&self) -> RwLockReadGuard<'_, ArtifactGraph> {
        self.graph.read()
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn next_interval(&self) -> Duration {
        *self.interval.borrow()
    }

    pub(crate) fn interval_receiver(&self) -> watch::Receiver<Duration> {
        self.interval.subscribe()
    }

    /// Replace the pending timer interval. A running timer restarts its sleep.
    pub fn reschedule(&self, interval: Duration) {
        self.interval.send_replace(interval);
        debug!(?interval, "sync interval rescheduled");
        self.emit(SyncEvent::IntervalChanged { interval });
    }

    /// Apply a mutation now, or queue it until the running cycle finishes.
    pub fn register(&self, mutation: GraphMutation) -> Result<Registration> {
        let mut pending = self.pending.lock();
        if self.running.load(Ordering::Acquire) {
            debug!(?mutation, "cycle running, deferring registration");
            pending.push(mutation);
            return Ok(Registration::Deferred);
        }
        mutation.apply(&mut self.graph.write())?;
        Ok(Registration::Applied)
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now()).await
    }

    /// Run one cycle over every connected node, highest priority first.
    #[instrument(skip(self))]
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let Some(_guard) = self.try_begin() else {
            return self.skipped();
        };
        let plan = {
            let graph = self.graph.read();
            build_queue(&graph, now)
                .into_iter()
                .filter_map(|entry| plan_node(&graph, &entry.node_id))
                .collect::<Vec<_>>()
        };
        TickOutcome::Completed(self.run_cycle(now, plan).await)
    }

    /// Run a cycle scoped to one node's edges.
    #[instrument(skip(self))]
    pub async fn sync_node(&self, id: &str) -> Result<TickOutcome> {
        if !self.graph.read().contains(id) {
            return Err(MyceliumError::UnknownNode(id.to_string()));
        }
        let Some(_guard) = self.try_begin() else {
            return Ok(self.skipped());
        };
        let now = Utc::now();
        let plan = {
            let graph = self.graph.read();
            plan_node(&graph, id).into_iter().collect::<Vec<_>>()
        };
        Ok(TickOutcome::Completed(self.run_cycle(now, plan).await))
    }

    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        let _pending = self.pending.lock();
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard { scheduler: self })
    }

    fn finish_cycle(&self) {
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            let mut graph = self.graph.write();
            for mutation in pending.drain(..) {
                if let Err(e) = mutation.apply(&mut graph) {
                    warn!(error = %e, ?mutation, "deferred registration rejected");
                }
            }
        }
        self.running.store(false, Ordering::Release);
    }

    fn skipped(&self) -> TickOutcome {
        debug!("sync cycle already running, skipping tick");
        counter!("mycelium_cycles_skipped").increment(1);
        self.emit(SyncEvent::CycleSkipped);
        TickOutcome::Skipped
    }

    fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn run_cycle(&self, now: DateTime<Utc>, plan: Vec<PlannedNode>) -> SyncCycleResult {
        let cycle_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%cycle_id, queued = plan.len(), "sync cycle started");
        self.emit(SyncEvent::CycleStarted {
            cycle_id,
            queued: plan.len(),
        });

        let mut state = CycleState::default();
        for node in &plan {
            self.sync_source(node, &mut state).await;
        }

        let order: Vec<NodeId> = plan
            .iter()
            .map(|n| n.id.clone())
            .filter(|id| state.touched.contains(id))
            .chain(state.touched.iter().cloned())
            .collect();
        let mean_health = self.finalize(&order, &state, now);

        let next_interval = self.config.interval_for_health(mean_health);
        let changed = self.interval.send_if_modified(|current| {
            let differs = *current != next_interval;
            *current = next_interval;
            differs
        });
        if changed {
            self.emit(SyncEvent::IntervalChanged {
                interval: next_interval,
            });
        }

        let elapsed = started.elapsed();
        let timestamp =
            now + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        let result = SyncCycleResult {
            cycle_id,
            synced_node_ids: state.touched,
            started_at: now,
            timestamp,
            failures: state.failures,
            edges_merged: state.edges_merged,
            mean_health,
            next_interval,
        };

        counter!("mycelium_sync_cycles").increment(1);
        gauge!("mycelium_mean_health").set(mean_health);
        histogram!("mycelium_cycle_duration").record(elapsed);
        info!(
            %cycle_id,
            synced = result.synced_node_ids.len(),
            merged = result.edges_merged,
            failures = result.failures.len(),
            mean_health,
            next_interval_secs = next_interval.as_secs(),
            "sync cycle completed"
        );

        if let Some(notifier) = &self.notifier {
            notifier.on_cycle_complete(&result);
        }
        self.emit(SyncEvent::CycleCompleted(result.clone()));
        result
    }

    async fn sync_source(&self, node: &PlannedNode, state: &mut CycleState) {
        let source = match self.load(&node.locator, state).await {
            Ok(content) => content,
            Err(e) => {
                warn!(node = %node.id, error = %e, "failed to read source artifact");
                for target in &node.targets {
                    self.record_failure(state, &node.id, &target.id, FailureStage::ReadSource, &e);
                }
                return;
            }
        };
        state.touch(&node.id, &node.locator);

        let changed = self
            .digests
            .get(&node.id)
            .map_or(true, |recorded| *recorded != digest(&source));
        if !changed {
            debug!(node = %node.id, "source unchanged since last sync");
            return;
        }

        for target in &node.targets {
            if !self
                .resolver
                .strategy_for(node.kind, target.kind)
                .may_change_target()
            {
                continue;
            }

            let current = match self.load(&target.locator, state).await {
                Ok(content) => content,
                Err(e) => {
                    self.record_failure(state, &node.id, &target.id, FailureStage::ReadTarget, &e);
                    continue;
                }
            };

            let merged = self
                .resolver
                .resolve(node.kind, &source, target.kind, &current);
            if merged == current {
                debug!(source = %node.id, target = %target.id, "target already up to date");
                continue;
            }

            if let Err(e) = self.store_content(&target.locator, &merged).await {
                self.record_failure(state, &node.id, &target.id, FailureStage::WriteTarget, &e);
                continue;
            }

            debug!(source = %node.id, target = %target.id, "merged edge");
            state.contents.insert(target.locator.clone(), merged);
            state.touch(&target.id, &target.locator);
            state.edges_merged += 1;
            counter!("mycelium_edges_merged").increment(1);
            self.emit(SyncEvent::EdgeMerged {
                source: node.id.clone(),
                target: target.id.clone(),
            });
        }
    }

    /// Content of `locator` as seen by this cycle.
    async fn load(&self, locator: &str, state: &mut CycleState) -> Result<String> {
        if let Some(content) = state.contents.get(locator) {
            return Ok(content.clone());
        }
        let timeout = self.config.edge_timeout();
        let bytes = tokio::time::timeout(timeout, self.store.read(locator))
            .await
            .map_err(|_| MyceliumError::ContentTimeout {
                locator: locator.to_string(),
                timeout,
            })??;
        let content = String::from_utf8(bytes)
            .map_err(|_| MyceliumError::read(locator, "content is not valid UTF-8"))?;
        state.contents.insert(locator.to_string(), content.clone());
        Ok(content)
    }

    async fn store_content(&self, locator: &str, content: &str) -> Result<()> {
        let timeout = self.config.edge_timeout();
        tokio::time::timeout(timeout, self.store.write(locator, content.as_bytes()))
            .await
            .map_err(|_| MyceliumError::ContentTimeout {
                locator: locator.to_string(),
                timeout,
            })?
    }

    fn record_failure(
        &self,
        state: &mut CycleState,
        source: &str,
        target: &str,
        stage: FailureStage,
        error: &MyceliumError,
    ) {
        let failure = EdgeFailure::new(source, target, stage, error);
        warn!(source, target, %stage, error = %error, "edge sync failed");
        counter!("mycelium_edge_failures").increment(1);
        if let Some(notifier) = &self.notifier {
            notifier.on_edge_failure(&failure);
        }
        self.emit(SyncEvent::EdgeFailed(failure.clone()));
        state.failed_sources.insert(failure.source.clone());
        state.failures.push(failure);
    }

    /// Mark touched nodes synced and refresh their health, in order. Returns the
    /// mean health of the whole graph afterwards.
    ///
    /// A source whose edges did not all succeed loses its digest so the next
    /// cycle pushes it again.
    fn finalize(&self, order: &[NodeId], state: &CycleState, now: DateTime<Utc>) -> f64 {
        let mut graph = self.graph.write();
        let mut seen = BTreeSet::new();
        for id in order {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Err(e) = graph.mark_synced(id, now) {
                warn!(node = %id, error = %e, "touched node disappeared from graph");
                continue;
            }
            if let Err(e) = update_health(&mut graph, id, now) {
                warn!(node = %id, error = %e, "health update failed");
            }
            if state.failed_sources.contains(id) {
                self.digests.remove(id);
                continue;
            }
            let content = state
                .locators
                .get(id)
                .and_then(|locator| state.contents.get(locator));
            if let Some(content) = content {
                self.digests.insert(id.clone(), digest(content));
            }
        }
        graph.mean_health()
    }
}

fn plan_node(graph: &ArtifactGraph, id: &str) -> Option<PlannedNode> {
    let node = graph.node(id)?;
    let targets = graph
        .neighbors(id)
        .ok()?
        .iter()
        .filter_map(|n| graph.node(n))
        .map(|t| PlannedTarget {
            id: t.id.clone(),
            kind: t.kind,
            locator: t.locator.clone(),
        })
        .collect();
    Some(PlannedNode {
        id: node.id.clone(),
        kind: node.kind,
        locator: node.locator.clone(),
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContentStore;
    use crate::merge::update_readme_with_roadmap;
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use mycelium_core::EdgeKind;
    use tokio::sync::{Notify, Semaphore};

    const ROADMAP: &str = "# Roadmap\n\n- [x] graph store\n- [ ] scheduler\n";
    const README: &str = "# Mycelium\n\nKeeps documents in step.\n";

    /// Blocks every read until the test releases the gate.
    struct GatedStore {
        inner: MemoryContentStore,
        entered: Notify,
        gate: Semaphore,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryContentStore::new(),
                entered: Notify::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentStore for GatedStore {
        async fn read(&self, locator: &str) -> Result<Vec<u8>> {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await.unwrap();
            self.inner.read(locator).await
        }

        async fn write(&self, locator: &str, bytes: &[u8]) -> Result<()> {
            self.inner.write(locator, bytes).await
        }
    }

    /// Reads of the listed locators never finish.
    struct SlowStore {
        inner: MemoryContentStore,
        slow: Vec<&'static str>,
    }

    #[async_trait]
    impl ContentStore for SlowStore {
        async fn read(&self, locator: &str) -> Result<Vec<u8>> {
            if self.slow.iter().any(|s| *s == locator) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.read(locator).await
        }

        async fn write(&self, locator: &str, bytes: &[u8]) -> Result<()> {
            self.inner.write(locator, bytes).await
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        failures: Mutex<Vec<EdgeFailure>>,
        cycles: Mutex<usize>,
    }

    impl SyncNotifier for RecordingNotifier {
        fn on_edge_failure(&self, failure: &EdgeFailure) {
            self.failures.lock().push(failure.clone());
        }

        fn on_cycle_complete(&self, _result: &SyncCycleResult) {
            *self.cycles.lock() += 1;
        }
    }

    fn roadmap_graph() -> ArtifactGraph {
        let mut g = ArtifactGraph::new();
        g.add_node("R", ArtifactKind::Roadmap, "ROADMAP.md").unwrap();
        g.add_node("M", ArtifactKind::Readme, "README.md").unwrap();
        g.add_edge("R", "M", EdgeKind::SyncsWith).unwrap();
        g
    }

    #[tokio::test]
    async fn roadmap_flows_into_readme() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert("ROADMAP.md", ROADMAP);
        store.insert("README.md", README);
        let scheduler = SyncScheduler::new(roadmap_graph(), store.clone(), SyncConfig::default());

        let now = Utc::now();
        let result = scheduler.tick_at(now).await.into_result().unwrap();

        let readme = store.get_string("README.md").unwrap();
        assert_eq!(readme, update_readme_with_roadmap(README, ROADMAP));
        assert!(readme.starts_with(README));
        assert_eq!(store.get_string("ROADMAP.md").unwrap(), ROADMAP);

        let ids: Vec<&str> = result.synced_node_ids.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["M", "R"]);
        assert_eq!(result.edges_merged, 1);
        assert!(result.failures.is_empty());

        let graph = scheduler.graph();
        assert_eq!(graph.node("R").unwrap().last_synced_at, Some(now));
        assert_eq!(graph.node("M").unwrap().last_synced_at, Some(now));
    }

    #[tokio::test]
    async fn unchanged_sources_do_not_rewrite_targets() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert("ROADMAP.md", ROADMAP);
        store.insert("README.md", README);
        let scheduler = SyncScheduler::new(roadmap_graph(), store.clone(), SyncConfig::default());

        scheduler.tick().await;
        let second = scheduler.tick().await.into_result().unwrap();
        assert_eq!(second.edges_merged, 0);

        store.insert("ROADMAP.md", "# Roadmap\n\n- [x] graph store\n- [x] scheduler\n");
        let third = scheduler.tick().await.into_result().unwrap();
        assert_eq!(third.edges_merged, 1);
        assert!(store
            .get_string("README.md")
            .unwrap()
            .contains("Progress: 2/2 tasks complete (100%)"));
    }

    #[tokio::test]
    async fn readme_missing_then_restored_is_merged_next_cycle() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert("ROADMAP.md", ROADMAP);
        let scheduler = SyncScheduler::new(roadmap_graph(), store.clone(), SyncConfig::default());

        let first = scheduler.tick().await.into_result().unwrap();
        assert_eq!(first.edges_merged, 0);
        assert!(first
            .failures
            .iter()
            .any(|f| f.source == "R" && f.target == "M" && f.stage == FailureStage::ReadTarget));

        store.insert("README.md", README);
        let second = scheduler.tick().await.into_result().unwrap();
        assert_eq!(second.edges_merged, 1);
        assert!(second.failures.is_empty());
        assert_eq!(
            store.get_string("README.md").unwrap(),
            update_readme_with_roadmap(README, ROADMAP)
        );

        let third = scheduler.tick().await.into_result().unwrap();
        assert_eq!(third.edges_merged, 0);
    }

    #[tokio::test]
    async fn tick_while_running_is_skipped_and_registration_deferred() {
        let store = Arc::new(GatedStore::new());
        store.inner.insert("ROADMAP.md", ROADMAP);
        store.inner.insert("README.md", README);
        let scheduler = Arc::new(SyncScheduler::new(
            roadmap_graph(),
            store.clone(),
            SyncConfig::default(),
        ));

        let background = scheduler.clone();
        let first = tokio::spawn(async move { background.tick().await });
        store.entered.notified().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        assert!(scheduler.tick().await.is_skipped());
        assert!(scheduler.sync_node("R").await.unwrap().is_skipped());
        let late = GraphMutation::add_node("late", ArtifactKind::Documentation, "late.md");
        assert_eq!(scheduler.register(late).unwrap(), Registration::Deferred);
        assert!(!scheduler.graph().contains("late"));
        assert!(scheduler.graph().node("R").unwrap().last_synced_at.is_none());

        store.gate.add_permits(64);
        let outcome = first.await.unwrap();
        assert!(!outcome.is_skipped());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.graph().contains("late"));

        let edge = GraphMutation::add_edge("late", "M", EdgeKind::References);
        assert_eq!(scheduler.register(edge).unwrap(), Registration::Applied);
    }

    #[tokio::test]
    async fn interval_follows_mean_health() {
        let mut g = ArtifactGraph::new();
        for (id, health) in [("a", 1.0), ("b", 1.0), ("c", 0.2)] {
            g.add_node(id, ArtifactKind::Documentation, id).unwrap();
            g.set_health(id, health).unwrap();
        }
        let scheduler =
            SyncScheduler::new(g, Arc::new(MemoryContentStore::new()), SyncConfig::default());

        let result = scheduler.tick().await.into_result().unwrap();
        assert_relative_eq!(result.mean_health, 2.2 / 3.0, epsilon = 1e-9);
        assert_eq!(result.next_interval, Duration::from_secs(15 * 60));
        assert_eq!(scheduler.next_interval(), Duration::from_secs(15 * 60));
        assert!(result.synced_node_ids.is_empty());
    }

    #[tokio::test]
    async fn empty_graph_counts_as_healthy() {
        let scheduler = SyncScheduler::new(
            ArtifactGraph::new(),
            Arc::new(MemoryContentStore::new()),
            SyncConfig::default(),
        );
        let result = scheduler.tick().await.into_result().unwrap();
        assert_eq!(result.mean_health, 1.0);
        assert_eq!(result.next_interval, Duration::from_secs(30 * 60));
    }

    #[tokio::test]
    async fn one_failed_read_does_not_stop_other_edges() {
        let store = Arc::new(MemoryContentStore::new());
        let mut g = ArtifactGraph::new();
        g.add_node("hub", ArtifactKind::Documentation, "hub.md").unwrap();
        store.insert("hub.md", "shared");
        for i in 1..=5 {
            let id = format!("t{i}");
            g.add_node(id.as_str(), ArtifactKind::Documentation, format!("{id}.md"))
                .unwrap();
            g.add_edge("hub", &id, EdgeKind::SyncsWith).unwrap();
            if i != 3 {
                store.insert(format!("{id}.md"), "old");
            }
        }
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = SyncScheduler::new(g, store.clone(), SyncConfig::default())
            .with_notifier(notifier.clone());

        let result = scheduler.tick().await.into_result().unwrap();

        assert_eq!(result.edges_merged, 4);
        for id in ["t1", "t2", "t4", "t5"] {
            assert_eq!(store.get_string(&format!("{id}.md")).unwrap(), "shared");
        }
        let read_target: Vec<_> = result
            .failures
            .iter()
            .filter(|f| f.stage == FailureStage::ReadTarget)
            .collect();
        assert_eq!(read_target.len(), 1);
        assert_eq!(read_target[0].source, "hub");
        assert_eq!(read_target[0].target, "t3");
        // t3 also fails as a source of its own edge back to the hub
        assert!(result
            .failures
            .iter()
            .any(|f| f.stage == FailureStage::ReadSource && f.source == "t3"));
        assert!(!result.synced_node_ids.contains("t3"));

        assert_eq!(notifier.failures.lock().len(), result.failures.len());
        assert_eq!(*notifier.cycles.lock(), 1);
    }

    #[tokio::test]
    async fn failed_edge_is_retried_once_target_returns() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert("app.toml", "port = 8080\n");
        store.insert("other.rs", "const PORT: u16 = {{config.port}};\n");
        let mut g = ArtifactGraph::new();
        g.add_node("cfg", ArtifactKind::Config, "app.toml").unwrap();
        g.add_node("main", ArtifactKind::Implementation, "main.rs").unwrap();
        g.add_node("other", ArtifactKind::Implementation, "other.rs").unwrap();
        g.add_edge("cfg", "main", EdgeKind::Validates).unwrap();
        g.add_edge("cfg", "other", EdgeKind::Validates).unwrap();
        let scheduler = SyncScheduler::new(g, store.clone(), SyncConfig::default());

        let first = scheduler.tick().await.into_result().unwrap();
        assert_eq!(first.edges_merged, 1);
        assert!(first
            .failures
            .iter()
            .any(|f| f.source == "cfg" && f.target == "main"));

        // the config itself did not change, only the missing target came back
        store.insert("main.rs", "const PORT: u16 = {{config.port}};\n");
        let second = scheduler.tick().await.into_result().unwrap();
        assert!(second.failures.is_empty());
        assert_eq!(second.edges_merged, 1);
        assert_eq!(store.get_string("main.rs").unwrap(), "const PORT: u16 = 8080;\n");
        assert_eq!(store.get_string("other.rs").unwrap(), "const PORT: u16 = 8080;\n");
        assert!(second.synced_node_ids.contains("main"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reads_time_out_per_edge() {
        let inner = MemoryContentStore::new();
        inner.insert("app.toml", "port = 8080\n");
        inner.insert("main.rs", "const PORT: u16 = {{config.port}};\n");
        inner.insert("other.rs", "const PORT: u16 = {{config.port}};\n");
        let store = Arc::new(SlowStore {
            inner,
            slow: vec!["main.rs"],
        });

        let mut g = ArtifactGraph::new();
        g.add_node("cfg", ArtifactKind::Config, "app.toml").unwrap();
        g.add_node("main", ArtifactKind::Implementation, "main.rs").unwrap();
        g.add_node("other", ArtifactKind::Implementation, "other.rs").unwrap();
        g.add_edge("cfg", "main", EdgeKind::Validates).unwrap();
        g.add_edge("cfg", "other", EdgeKind::Validates).unwrap();

        let config = SyncConfig {
            edge_timeout_ms: 100,
            ..SyncConfig::default()
        };
        let scheduler = SyncScheduler::new(g, store.clone(), config);
        let result = scheduler.tick().await.into_result().unwrap();

        let timed_out = result
            .failures
            .iter()
            .find(|f| f.stage == FailureStage::ReadTarget)
            .unwrap();
        assert_eq!(timed_out.target, "main");
        assert!(timed_out.timed_out);
        assert!(result.failures.iter().all(|f| f.timed_out));

        assert_eq!(result.edges_merged, 1);
        assert_eq!(
            store.inner.get_string("other.rs").unwrap(),
            "const PORT: u16 = 8080;\n"
        );
    }

    #[tokio::test]
    async fn sync_node_is_scoped_and_checks_membership() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert("ROADMAP.md", ROADMAP);
        store.insert("README.md", README);
        let scheduler = SyncScheduler::new(roadmap_graph(), store.clone(), SyncConfig::default());

        assert!(matches!(
            scheduler.sync_node("ghost").await,
            Err(MyceliumError::UnknownNode(_))
        ));

        let result = scheduler
            .sync_node("R")
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(result.edges_merged, 1);
        assert!(result.synced_node_ids.contains("M"));
    }

    #[tokio::test]
    async fn subscribers_see_cycle_events() {
        let store = Arc::new(MemoryContentStore::new());
        store.insert("ROADMAP.md", ROADMAP);
        store.insert("README.md", README);
        let scheduler = SyncScheduler::new(roadmap_graph(), store, SyncConfig::default());
        let mut events = scheduler.subscribe();

        scheduler.tick().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.first(), Some(SyncEvent::CycleStarted { queued: 2, .. })));
        assert!(seen
            .iter()
            .any(|e| matches!(e, SyncEvent::EdgeMerged { source, target } if source == "R" && target == "M")));
        assert!(seen.iter().any(|e| matches!(e, SyncEvent::CycleCompleted(_))));
    }
}
