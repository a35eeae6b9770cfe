use crate::cycle_state::CycleState;
use crate::plugin::{
    ClusterEventWithHint, EnqueueExtensions, FilterPlugin, Fit, PreFilterPlugin, PreScorePlugin,
    ScorePlugin,
};
use crate::snapshot::{NodeLister, Snapshot};
use crate::types::{FilterResult, QueueingHint, ScoreResult};
use crate::{Result, SchedulerError};
use nodefit_core::{ClusterEvent, Workload};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a successful scheduling attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleResult {
    /// Node selected for the workload
    pub node_name: String,
    pub score: i64,
    /// Number of nodes that passed filtering
    pub feasible_nodes: usize,
}

/// Everything one scheduling attempt found out
#[derive(Debug)]
pub struct Evaluation {
    /// Filter verdict of every node, in snapshot order
    pub filtered: Vec<FilterResult>,
    /// Score of every node that passed filtering
    pub scores: Vec<ScoreResult>,
    /// Selected node, or `NoSuitableNodes` with the rejection summary
    pub outcome: Result<ScheduleResult>,
}

impl Evaluation {
    pub fn score_of(&self, node_name: &str) -> Option<i64> {
        self.scores
            .iter()
            .find(|s| s.node_name == node_name)
            .map(|s| s.score)
    }
}

/// Drives scheduling attempts through the fit plugin and keeps workloads
/// that could not be placed until a cluster event may help them
pub struct Scheduler {
    fit: Fit,
    registrations: Vec<ClusterEventWithHint>,
    parked: Mutex<BTreeMap<String, Workload>>,
}

impl Scheduler {
    pub fn new(fit: Fit) -> Self {
        let registrations = fit.events_to_register();
        Self {
            fit,
            registrations,
            parked: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn plugin(&self) -> &Fit {
        &self.fit
    }

    fn parked_pool(&self) -> MutexGuard<'_, BTreeMap<String, Workload>> {
        self.parked.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one attempt through every stage, keeping the verdict and score
    /// of each node. Only internal failures are returned as errors.
    pub fn evaluate(&self, workload: &Workload, snapshot: &Snapshot) -> Result<Evaluation> {
        let state = CycleState::new();
        let nodes = snapshot.list();

        let status = self.fit.pre_filter(&state, workload);
        if status.is_rejected() {
            return Ok(Evaluation {
                filtered: nodes
                    .iter()
                    .map(|node| FilterResult::new(&node.name, status.clone()))
                    .collect(),
                scores: Vec::new(),
                outcome: Err(SchedulerError::no_suitable_nodes(
                    workload.to_string(),
                    status.to_string(),
                )),
            });
        }
        if !status.is_success() {
            return Err(SchedulerError::internal_error(status.to_string()));
        }

        if nodes.is_empty() {
            return Ok(Evaluation {
                filtered: Vec::new(),
                scores: Vec::new(),
                outcome: Err(SchedulerError::no_suitable_nodes(
                    workload.to_string(),
                    "No nodes available",
                )),
            });
        }

        // Phase 1: Filter nodes
        let filtered: Vec<FilterResult> = nodes
            .iter()
            .map(|node| FilterResult::new(&node.name, self.fit.filter(&state, workload, node)))
            .collect();

        if let Some(failed) = filtered.iter().find(|r| !r.passed() && !r.status.is_rejected()) {
            return Err(SchedulerError::internal_error(failed.status.to_string()));
        }

        let feasible: Vec<_> = nodes
            .iter()
            .zip(&filtered)
            .filter(|(_, result)| result.passed())
            .map(|(node, _)| node.clone())
            .collect();

        if feasible.is_empty() {
            let reason = summarize_rejections(&filtered);
            return Ok(Evaluation {
                filtered,
                scores: Vec::new(),
                outcome: Err(SchedulerError::no_suitable_nodes(workload.to_string(), reason)),
            });
        }

        info!("Workload {} has {} feasible nodes", workload, feasible.len());

        // Phase 2: Score nodes
        let status = self.fit.pre_score(&state, workload, &feasible);
        if !status.is_success() {
            return Err(SchedulerError::internal_error(status.to_string()));
        }

        let mut scores = Vec::with_capacity(feasible.len());
        for node in &feasible {
            let score = self.fit.score(&state, workload, &node.name, snapshot)?;
            debug!("Node {} scored {} for {}", node.name, score, workload);
            scores.push(ScoreResult::new(&node.name, score));
        }

        // Phase 3: Select best node, the first one wins a tie
        let mut best: Option<&ScoreResult> = None;
        for result in &scores {
            if best.map_or(true, |b| result.score > b.score) {
                best = Some(result);
            }
        }
        let best = best.ok_or_else(|| SchedulerError::internal_error("No nodes scored"))?;
        info!(
            "Selected node {} for workload {} with score {}",
            best.node_name, workload, best.score
        );

        let outcome = Ok(ScheduleResult {
            node_name: best.node_name.clone(),
            score: best.score,
            feasible_nodes: feasible.len(),
        });
        Ok(Evaluation {
            filtered,
            scores,
            outcome,
        })
    }

    /// Run one attempt for a workload against a snapshot
    pub fn schedule_one(&self, workload: &Workload, snapshot: &Snapshot) -> Result<ScheduleResult> {
        self.evaluate(workload, snapshot)?.outcome
    }

    /// Run one attempt and park the workload if no node can take it
    pub fn schedule(&self, workload: Workload, snapshot: &Snapshot) -> Result<ScheduleResult> {
        match self.schedule_one(&workload, snapshot) {
            Err(e @ SchedulerError::NoSuitableNodes { .. }) => {
                info!("Parking workload {}: {}", workload, e);
                self.park(workload);
                Err(e)
            }
            other => other,
        }
    }

    /// Hold a workload until an event may make it schedulable
    pub fn park(&self, workload: Workload) {
        self.parked_pool().insert(workload.uid.clone(), workload);
    }

    /// Workloads currently parked, in UID order
    pub fn parked(&self) -> Vec<Workload> {
        self.parked_pool().values().cloned().collect()
    }

    /// Evaluate an event against every parked workload and release those
    /// the registered hints say may now be schedulable
    pub fn handle_event(&self, event: &ClusterEvent) -> Vec<Workload> {
        let kind = event.kind();
        let mut pool = self.parked_pool();

        if let ClusterEvent::PodDeleted { old } = event {
            if pool.remove(&old.uid).is_some() {
                debug!("Dropped parked workload {} after deletion", old);
            }
        }

        let released: Vec<String> = pool
            .values()
            .filter(|workload| {
                self.registrations
                    .iter()
                    .filter(|r| r.event.matches(&kind))
                    .any(|r| match (r.hint)(*workload, event) {
                        Ok(hint) => hint == QueueingHint::Queue,
                        Err(e) => {
                            warn!("Queueing hint failed for {}, requeueing: {}", workload, e);
                            true
                        }
                    })
            })
            .map(|workload| workload.uid.clone())
            .collect();

        let requeued: Vec<Workload> = released
            .iter()
            .filter_map(|uid| pool.remove(uid))
            .collect();
        if !requeued.is_empty() {
            info!("Event {:?} requeued {} workloads", kind, requeued.len());
        }
        requeued
    }

    /// Release every parked workload
    fn release_all(&self) -> Vec<Workload> {
        std::mem::take(&mut *self.parked_pool()).into_values().collect()
    }

    /// Run the requeue loop: consume cluster events and send released
    /// workloads back to the scheduling queue
    pub async fn run(
        &self,
        mut events: broadcast::Receiver<ClusterEvent>,
        requeue_tx: mpsc::Sender<Workload>,
        token: CancellationToken,
    ) -> Result<()> {
        info!("Starting requeue controller for {}", Fit::NAME);

        loop {
            let requeued = tokio::select! {
                _ = token.cancelled() => {
                    info!("Requeue controller shutting down");
                    return Ok(());
                }
                received = events.recv() => match received {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} cluster events, requeueing all parked workloads", skipped);
                        self.release_all()
                    }
                    Err(RecvError::Closed) => {
                        info!("Event stream closed, stopping requeue controller");
                        return Ok(());
                    }
                },
            };

            for workload in requeued {
                if requeue_tx.send(workload).await.is_err() {
                    warn!("Scheduling queue closed, stopping requeue controller");
                    return Ok(());
                }
            }
        }
    }
}

/// Count rejection reasons across nodes, e.g.
/// "0/3 nodes are available: 2 Insufficient cpu, 1 Too many pods"
fn summarize_rejections(results: &[FilterResult]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for result in results {
        for reason in result.status.reasons() {
            *counts.entry(reason.as_str()).or_insert(0) += 1;
        }
    }

    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let details: Vec<String> = counts
        .iter()
        .map(|(reason, count)| format!("{} {}", count, reason))
        .collect();
    format!(
        "0/{} nodes are available: {}",
        results.len(),
        details.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureGates, FitArgs};
    use nodefit_core::{ContainerSpec, NodeState, ResourceVector};
    use std::sync::Arc;
    use std::time::Duration;

    const GI: i64 = 1024 * 1024 * 1024;

    fn scheduler() -> Scheduler {
        Scheduler::new(Fit::new(&FitArgs::default(), FeatureGates::default()).unwrap())
    }

    fn node(name: &str, milli_cpu: i64, memory: i64) -> NodeState {
        NodeState::new(
            name,
            ResourceVector::new().with_milli_cpu(milli_cpu).with_memory(memory),
            110,
        )
    }

    fn workload(name: &str, milli_cpu: i64, memory: i64) -> Workload {
        Workload::new("default", name).with_container(ContainerSpec::new(
            "app",
            ResourceVector::new().with_milli_cpu(milli_cpu).with_memory(memory),
        ))
    }

    fn snapshot(nodes: Vec<NodeState>, workloads: &[Workload]) -> Snapshot {
        Snapshot::new(nodes, workloads, &FeatureGates::default())
    }

    #[test]
    fn test_schedule_picks_least_allocated_node() {
        let scheduler = scheduler();
        let busy = workload("busy", 3000, 4 * GI).on_node("node1");
        let snapshot = snapshot(
            vec![node("node1", 4000, 8 * GI), node("node2", 4000, 8 * GI)],
            &[busy],
        );

        let result = scheduler.schedule_one(&workload("web", 500, GI), &snapshot).unwrap();
        assert_eq!(result.node_name, "node2");
        assert_eq!(result.feasible_nodes, 2);
    }

    #[test]
    fn test_schedule_filters_out_full_nodes() {
        let scheduler = scheduler();
        let snapshot = snapshot(
            vec![node("small", 1000, GI), node("large", 8000, 16 * GI)],
            &[],
        );

        let result = scheduler.schedule_one(&workload("web", 2000, 2 * GI), &snapshot).unwrap();
        assert_eq!(result.node_name, "large");
        assert_eq!(result.feasible_nodes, 1);
    }

    #[test]
    fn test_evaluate_reports_every_node() {
        let scheduler = scheduler();
        let snapshot = snapshot(
            vec![
                node("a", 8000, 16 * GI),
                node("b", 8000, 16 * GI),
                node("small", 1000, GI),
            ],
            &[],
        );

        let evaluation = scheduler.evaluate(&workload("web", 2000, 2 * GI), &snapshot).unwrap();
        assert_eq!(evaluation.filtered.len(), 3);
        assert!(evaluation.filtered[0].passed());
        assert_eq!(
            evaluation.filtered[2].status.reasons().to_vec(),
            vec!["Insufficient cpu".to_string(), "Insufficient memory".to_string()]
        );
        assert_eq!(evaluation.scores.len(), 2);
        assert_eq!(evaluation.score_of("small"), None);
        assert_eq!(evaluation.score_of("a"), evaluation.score_of("b"));

        // equal scores go to the first node by name
        let selected = evaluation.outcome.unwrap();
        assert_eq!(selected.node_name, "a");
        assert_eq!(selected.feasible_nodes, 2);
    }

    #[test]
    fn test_evaluate_without_feasible_nodes() {
        let scheduler = scheduler();
        let snapshot = snapshot(vec![node("small", 1000, GI)], &[]);

        let evaluation = scheduler.evaluate(&workload("web", 2000, GI), &snapshot).unwrap();
        assert!(evaluation.scores.is_empty());
        assert!(!evaluation.filtered[0].passed());
        assert!(matches!(
            evaluation.outcome,
            Err(SchedulerError::NoSuitableNodes { .. })
        ));
    }

    #[test]
    fn test_unschedulable_workload_is_parked() {
        let scheduler = scheduler();
        let snapshot = snapshot(vec![node("a", 1000, GI), node("b", 1000, 8 * GI)], &[]);

        let err = scheduler.schedule(workload("web", 2000, 2 * GI), &snapshot).unwrap_err();
        match err {
            SchedulerError::NoSuitableNodes { reason, .. } => {
                assert_eq!(
                    reason,
                    "0/2 nodes are available: 2 Insufficient cpu, 1 Insufficient memory"
                );
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(scheduler.parked().len(), 1);

        let err = scheduler.schedule_one(&workload("web", 1, 1), &Snapshot::default());
        assert!(matches!(err, Err(SchedulerError::NoSuitableNodes { .. })));
    }

    #[test]
    fn test_handle_event_requeues_on_node_add() {
        let scheduler = scheduler();
        let waiting = workload("web", 2000, 2 * GI);
        scheduler.park(waiting.clone());

        let small = ClusterEvent::NodeAdded {
            new: Arc::new(node("small", 1000, GI)),
        };
        assert!(scheduler.handle_event(&small).is_empty());
        assert_eq!(scheduler.parked().len(), 1);

        let large = ClusterEvent::NodeAdded {
            new: Arc::new(node("large", 4000, 8 * GI)),
        };
        let requeued = scheduler.handle_event(&large);
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].uid, waiting.uid);
        assert!(scheduler.parked().is_empty());
    }

    #[test]
    fn test_handle_event_ignores_unregistered_events() {
        let scheduler = scheduler();
        scheduler.park(workload("web", 100, 0));

        let added = ClusterEvent::PodAdded {
            new: Arc::new(workload("other", 100, 0).on_node("node1")),
        };
        assert!(scheduler.handle_event(&added).is_empty());

        let deleted = ClusterEvent::NodeDeleted {
            old: Arc::new(node("node1", 4000, GI)),
        };
        assert!(scheduler.handle_event(&deleted).is_empty());
        assert_eq!(scheduler.parked().len(), 1);
    }

    #[test]
    fn test_deleting_a_parked_workload_drops_it() {
        let scheduler = scheduler();
        let waiting = workload("web", 100, 0);
        scheduler.park(waiting.clone());

        let requeued = scheduler.handle_event(&ClusterEvent::PodDeleted {
            old: Arc::new(waiting),
        });
        assert!(requeued.is_empty());
        assert!(scheduler.parked().is_empty());
    }

    #[tokio::test]
    async fn test_run_requeues_and_shuts_down() {
        let scheduler = Arc::new(scheduler());
        let waiting = workload("web", 2000, 2 * GI);
        scheduler.park(waiting.clone());

        let (event_tx, event_rx) = broadcast::channel(16);
        let (requeue_tx, mut requeue_rx) = mpsc::channel(16);
        let token = CancellationToken::new();

        let handle = {
            let scheduler = scheduler.clone();
            let token = token.clone();
            tokio::spawn(async move { scheduler.run(event_rx, requeue_tx, token).await })
        };

        event_tx
            .send(ClusterEvent::PodDeleted {
                old: Arc::new(workload("gone", 1000, GI).on_node("node1")),
            })
            .unwrap();

        let requeued = tokio::time::timeout(Duration::from_secs(5), requeue_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(requeued.uid, waiting.uid);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_when_events_close() {
        let scheduler = scheduler();
        let (event_tx, event_rx) = broadcast::channel::<ClusterEvent>(4);
        let (requeue_tx, _requeue_rx) = mpsc::channel(4);
        drop(event_tx);

        scheduler
            .run(event_rx, requeue_tx, CancellationToken::new())
            .await
            .unwrap();
    }
}
