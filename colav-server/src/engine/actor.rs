//! One task per target.
//!
//! The actor owns the target's [`TargetTracker`], so a target's state is
//! only ever mutated by one cycle at a time. Its mailbox is a `watch`
//! channel: a job submitted while the previous one has not been picked up
//! simply replaces it.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use colav_core::{ColavContext, OwnShipState, TargetReport, TargetSnapshot, TargetTracker};
use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Work for one target in one cycle
#[derive(Debug, Clone)]
pub struct Job {
    pub cycle: u64,
    pub own_ship: OwnShipState,
    pub target: TargetSnapshot,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub cycle: u64,
    pub report: TargetReport,
}

/// Handle to a running target actor
#[derive(Debug)]
pub struct ActorHandle {
    tx_job: watch::Sender<Option<Job>>,
    rx_reply: watch::Receiver<Option<Reply>>,
    task: JoinHandle<()>,
    last_seen: Instant,
}

impl ActorHandle {
    /// Spawn the actor task for a new target
    pub fn spawn(target_id: &str, context: Arc<ColavContext>) -> Self {
        let (tx_job, rx_job) = watch::channel(None);
        let (tx_reply, rx_reply) = watch::channel(None);
        let tracker = TargetTracker::new(target_id, &context);
        let task = tokio::spawn(run(tracker, context, rx_job, tx_reply));

        ActorHandle {
            tx_job,
            rx_reply,
            task,
            last_seen: Instant::now(),
        }
    }

    /// Hand a job to the actor and return a future resolving to its reply.
    ///
    /// The future yields `None` when the actor goes away before answering.
    pub fn submit(&mut self, job: Job) -> impl Future<Output = Option<TargetReport>> + Send + 'static {
        let cycle = job.cycle;
        self.last_seen = Instant::now();
        self.tx_job.send_replace(Some(job));

        let mut rx = self.rx_reply.clone();
        async move {
            match rx
                .wait_for(|reply| matches!(reply, Some(r) if r.cycle >= cycle))
                .await
            {
                Ok(reply) => reply
                    .as_ref()
                    .filter(|r| r.cycle == cycle)
                    .map(|r| r.report.clone()),
                Err(_) => None,
            }
        }
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Stop the actor; pending replies resolve to `None`
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for ActorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut tracker: TargetTracker,
    context: Arc<ColavContext>,
    mut rx_job: watch::Receiver<Option<Job>>,
    tx_reply: watch::Sender<Option<Reply>>,
) {
    debug!("Actor {}: started", tracker.id());
    while rx_job.changed().await.is_ok() {
        let job = rx_job.borrow_and_update().clone();
        let Some(job) = job else {
            continue;
        };
        let report = tracker.step(&context, &job.own_ship, &job.target);
        if tx_reply
            .send(Some(Reply {
                cycle: job.cycle,
                report,
            }))
            .is_err()
        {
            break;
        }
    }
    debug!("Actor {}: stopped", tracker.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use colav_core::{ColavConfig, EncounterState, Position};
    use std::f64::consts::PI;
    use tokio_test::{assert_pending, task};

    fn context() -> Arc<ColavContext> {
        Arc::new(ColavContext::new(ColavConfig::default()).unwrap())
    }

    fn job(cycle: u64, north: f64) -> Job {
        Job {
            cycle,
            own_ship: OwnShipState::new(Position::new(0.0, 0.0), 0.0, 5.0, 0.0),
            target: TargetSnapshot::new("ho", Position::new(north, 0.0), PI, 5.0),
        }
    }

    #[tokio::test]
    async fn test_actor_replies() {
        let mut actor = ActorHandle::spawn("ho", context());
        let report = actor.submit(job(1, 100.0)).await.unwrap();
        assert_eq!(report.target_id, "ho");
        assert_eq!(report.encounter, EncounterState::HeadOn);

        // State persists in the actor across cycles
        let report = actor.submit(job(2, 80.0)).await.unwrap();
        assert_eq!(report.encounter, EncounterState::HeadOn);
    }

    #[tokio::test]
    async fn test_reply_waits_for_actor() {
        let mut actor = ActorHandle::spawn("ho", context());
        let mut reply = task::spawn(actor.submit(job(1, 100.0)));
        // The actor task has not run yet on this single-threaded runtime
        assert_pending!(reply.poll());
        assert!(reply.await.is_some());
    }

    #[tokio::test]
    async fn test_aborted_actor_reply_is_discarded() {
        let mut actor = ActorHandle::spawn("ho", context());
        let reply = actor.submit(job(1, 100.0));
        actor.abort();
        assert_eq!(reply.await, None);
    }

    #[tokio::test]
    async fn test_newer_job_supersedes_pending() {
        let mut actor = ActorHandle::spawn("ho", context());
        let first = actor.submit(job(1, 100.0));
        let second = actor.submit(job(2, 90.0));

        // Job 1 was replaced before the actor picked it up
        assert_eq!(first.await, None);
        let report = second.await.unwrap();
        assert!((report.range - 90.0).abs() < 1e-9);
    }
}
