//! Cycle engine
//!
//! Drives the per-target actors. Every cycle taken from the intake buffer
//! is fanned out to the actors of its targets, all replies are awaited and
//! assembled into one [`CycleReport`], which is then published.
//!
//! ```text
//!  IntakeBuffer ──take──▶ Engine ──Job──▶ actor "a" ──┐
//!                           │    ──Job──▶ actor "b" ──┤ join_all
//!                           │                         ▼
//!                           └──────────────── CycleReport ──▶ broadcast
//! ```
//!
//! The [`TargetRegistry`] is the only state shared across tasks. Intake
//! removes targets from it directly, and the engine sweeps out targets that
//! have not been updated within the staleness timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use colav_core::{
    rollout, ColavContext, CycleInput, CycleReport, EncounterState, KinematicPredictor,
    TargetReport, TargetSnapshot,
};
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::intake::IntakeBuffer;
use crate::ServerError;

pub mod actor;

use actor::{ActorHandle, Job};

/// Live targets, one actor each
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    actors: Arc<Mutex<HashMap<String, ActorHandle>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActorHandle>> {
        self.actors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submit a job, creating the target's actor on first sight
    fn submit(
        &self,
        context: &Arc<ColavContext>,
        job: Job,
    ) -> impl std::future::Future<Output = Option<TargetReport>> + Send + 'static {
        let mut actors = self.lock();
        let actor = actors.entry(job.target.id.clone()).or_insert_with(|| {
            info!("Target {}: tracking", job.target.id);
            ActorHandle::spawn(&job.target.id, context.clone())
        });
        actor.submit(job)
    }

    /// Drop a target and its actor. Unknown targets are ignored.
    pub fn remove(&self, target_id: &str) -> bool {
        let removed = self.lock().remove(target_id);
        match removed {
            Some(actor) => {
                actor.abort();
                info!("Target {}: removed", target_id);
                true
            }
            None => {
                debug!("Target {}: remove ignored, not tracked", target_id);
                false
            }
        }
    }

    /// Remove every target not updated within `stale_after`
    pub fn sweep(&self, stale_after: Duration) -> Vec<String> {
        let mut actors = self.lock();
        let stale: Vec<String> = actors
            .iter()
            .filter(|(_, actor)| actor.last_seen().elapsed() > stale_after)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            if let Some(actor) = actors.remove(id) {
                actor.abort();
                info!("Target {}: stale, removed", id);
            }
        }
        stale
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.lock().contains_key(target_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

pub struct Engine {
    context: Arc<ColavContext>,
    registry: TargetRegistry,
    tx_reports: broadcast::Sender<Arc<CycleReport>>,
    with_prediction: bool,
    cycle: u64,
}

impl Engine {
    pub fn new(
        context: Arc<ColavContext>,
        registry: TargetRegistry,
        tx_reports: broadcast::Sender<Arc<CycleReport>>,
        with_prediction: bool,
    ) -> Self {
        Engine {
            context,
            registry,
            tx_reports,
            with_prediction,
            cycle: 0,
        }
    }

    /// Run one cycle through the actors.
    ///
    /// Targets removed while the cycle is in flight are left out of the
    /// report.
    pub async fn run_cycle(&mut self, input: CycleInput) -> CycleReport {
        self.cycle += 1;
        let cycle = self.cycle;

        let replies: Vec<_> = input
            .targets
            .iter()
            .map(|target| {
                self.registry.submit(
                    &self.context,
                    Job {
                        cycle,
                        own_ship: input.own_ship,
                        target: target.clone(),
                    },
                )
            })
            .collect();

        let reports: Vec<TargetReport> = join_all(replies).await.into_iter().flatten().collect();
        let nominal = self.context.nominal_rate(&input.own_ship);
        let mut report = CycleReport::aggregate(cycle, nominal, reports);

        if self.with_prediction {
            report.trajectory = self.predict(&input, &report).await;
        }
        report
    }

    /// Roll out the safeguarded trajectory on the blocking pool
    async fn predict(
        &self,
        input: &CycleInput,
        report: &CycleReport,
    ) -> Option<colav_core::Trajectory> {
        let targets: Vec<(TargetSnapshot, EncounterState)> = input
            .targets
            .iter()
            .filter_map(|t| report.target(&t.id).map(|r| (t.clone(), r.encounter)))
            .collect();
        let context = self.context.clone();
        let own_ship = input.own_ship;

        let result = tokio::task::spawn_blocking(move || {
            let predictor = KinematicPredictor::new(&context.config().prediction);
            rollout(&context, &predictor, &own_ship, &targets)
        })
        .await;

        match result {
            Ok(trajectory) => Some(trajectory),
            Err(e) => {
                warn!("Engine: Prediction failed: {}", e);
                None
            }
        }
    }

    fn publish(&self, report: CycleReport) {
        debug!(
            "Engine: Cycle {} with {} targets, heading rate {:.4}",
            report.cycle,
            report.targets.len(),
            report.heading_rate
        );
        // No subscribers is fine
        let _ = self.tx_reports.send(Arc::new(report));
    }

    /// Engine subsystem
    pub async fn run(
        mut self,
        subsys: SubsystemHandle,
        buffer: IntakeBuffer,
        stale_after: Duration,
    ) -> Result<(), ServerError> {
        info!("Engine: Starting");
        let mut sweep = interval(Duration::from_secs(1));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    info!("Engine: Shutdown requested");
                    break;
                }
                _ = buffer.notified() => {
                    while let Some(input) = buffer.take() {
                        let report = self.run_cycle(input).await;
                        self.publish(report);
                    }
                    if buffer.is_closed() {
                        info!("Engine: Input closed after {} cycles", self.cycle);
                        subsys.request_shutdown();
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.registry.sweep(stale_after);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colav_core::{ColavConfig, OwnShipState, Position};
    use std::f64::consts::PI;

    fn engine(predict: bool) -> (Engine, TargetRegistry, broadcast::Receiver<Arc<CycleReport>>) {
        let context = Arc::new(ColavContext::new(ColavConfig::default()).unwrap());
        let registry = TargetRegistry::new();
        let (tx, rx) = broadcast::channel(4);
        (Engine::new(context, registry.clone(), tx, predict), registry, rx)
    }

    fn input() -> CycleInput {
        CycleInput {
            own_ship: OwnShipState::new(Position::new(0.0, 0.0), 0.0, 5.0, 0.0),
            targets: vec![
                TargetSnapshot::new("ho", Position::new(100.0, 0.0), PI, 5.0),
                TargetSnapshot::new("stbd", Position::new(500.0, 500.0), 1.5 * PI, 5.0),
            ],
        }
    }

    #[tokio::test]
    async fn test_cycle_aggregates_all_targets() {
        let (mut engine, registry, _rx) = engine(false);
        let report = engine.run_cycle(input()).await;

        assert_eq!(report.cycle, 1);
        assert_eq!(report.targets.len(), 2);
        assert_eq!(report.target("ho").unwrap().encounter, EncounterState::HeadOn);
        assert_eq!(
            report.target("stbd").unwrap().encounter,
            EncounterState::GiveWay
        );
        // Closest target drives the command
        assert_eq!(
            report.heading_rate,
            report.target("ho").unwrap().safe_heading_rate
        );
        assert!(report.trajectory.is_none());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_removed_target_starts_over() {
        let (mut engine, registry, _rx) = engine(false);
        engine.run_cycle(input()).await;
        assert!(registry.remove("ho"));
        assert!(!registry.remove("ho"));
        assert!(!registry.contains("ho"));

        let report = engine.run_cycle(input()).await;
        assert_eq!(report.targets.len(), 2);
        assert!(registry.contains("ho"));
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_targets() {
        let (mut engine, registry, _rx) = engine(false);
        engine.run_cycle(input()).await;

        assert!(registry.sweep(Duration::from_secs(60)).is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut stale = registry.sweep(Duration::from_millis(1));
        stale.sort();
        assert_eq!(stale, vec!["ho".to_string(), "stbd".to_string()]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let (mut engine, _registry, mut rx) = engine(false);
        let report = engine.run_cycle(input()).await;
        engine.publish(report);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.cycle, 1);
        assert_eq!(received.targets.len(), 2);
    }

    #[tokio::test]
    async fn test_prediction_attached() {
        let (mut engine, _registry, _rx) = engine(true);
        let report = engine.run_cycle(input()).await;
        let trajectory = report.trajectory.unwrap();
        assert!(!trajectory.is_empty());
        assert_eq!(trajectory.points[0].time, 0.0);
    }
}
