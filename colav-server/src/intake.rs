//! Kinematics intake.
//!
//! Reads newline-delimited JSON messages and hands cycles to the engine
//! through an [`IntakeBuffer`]. The buffer holds at most one pending cycle;
//! a newer cycle supersedes the pending one target by target, so intake
//! never waits for the engine and the engine never works on stale data.
//!
//! ```text
//! {"type":"cycle","ownShip":{...},"targets":[{...}]}
//! {"type":"remove","targetId":"257000001"}
//! ```
//!
//! Removals bypass the buffer and go straight to the target registry, which
//! drops the target's actor together with any evaluation in flight.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use colav_core::{CycleInput, OwnShipState, TargetId, TargetSnapshot};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Notify;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::engine::TargetRegistry;
use crate::ServerError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IntakeMessage {
    #[serde(rename_all = "camelCase")]
    Cycle {
        own_ship: OwnShipState,
        #[serde(default)]
        targets: Vec<TargetSnapshot>,
    },
    #[serde(rename_all = "camelCase")]
    Remove { target_id: TargetId },
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<IntakeMessage>, ServerError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| ServerError::ParseJson(e.to_string()))
}

#[derive(Debug, Default)]
struct Pending {
    own_ship: Option<OwnShipState>,
    targets: BTreeMap<TargetId, TargetSnapshot>,
    closed: bool,
}

/// Latest-value-wins hand-off from intake to the engine
#[derive(Debug, Clone, Default)]
pub struct IntakeBuffer {
    pending: Arc<Mutex<Pending>>,
    notify: Arc<Notify>,
}

impl IntakeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        // Pending holds plain data, a poisoned lock is still consistent
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer a new cycle, superseding what is pending
    pub fn push(&self, own_ship: OwnShipState, targets: Vec<TargetSnapshot>) {
        {
            let mut pending = self.lock();
            pending.own_ship = Some(own_ship);
            for target in targets {
                pending.targets.insert(target.id.clone(), target);
            }
        }
        self.notify.notify_one();
    }

    /// Forget a pending snapshot so it does not bring a removed target back
    pub fn discard(&self, target_id: &str) {
        self.lock().targets.remove(target_id);
    }

    /// Take the pending cycle, if any
    pub fn take(&self) -> Option<CycleInput> {
        let mut pending = self.lock();
        let own_ship = pending.own_ship.take()?;
        let targets = std::mem::take(&mut pending.targets).into_values().collect();
        Some(CycleInput { own_ship, targets })
    }

    /// No more input will arrive
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

/// Intake subsystem: reads messages until EOF or shutdown
pub async fn run<R>(
    subsys: SubsystemHandle,
    reader: R,
    buffer: IntakeBuffer,
    registry: TargetRegistry,
) -> Result<(), ServerError>
where
    R: AsyncBufRead + Unpin + Send,
{
    info!("Intake: Starting");
    let mut lines = reader.lines();
    let mut count: u64 = 0;

    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => {
                info!("Intake: Shutdown requested");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("Intake: End of input after {} messages", count);
                        break;
                    }
                    Err(e) => {
                        buffer.close();
                        return Err(ServerError::Io(e));
                    }
                };
                count += 1;
                match parse_line(&line) {
                    Ok(Some(message)) => handle_message(message, &buffer, &registry),
                    Ok(None) => {}
                    Err(e) => warn!("Intake: Skipping line {}: {}", count, e),
                }
            }
        }
    }

    buffer.close();
    Ok(())
}

fn handle_message(message: IntakeMessage, buffer: &IntakeBuffer, registry: &TargetRegistry) {
    match message {
        IntakeMessage::Cycle { own_ship, targets } => {
            debug!("Intake: Cycle with {} targets", targets.len());
            buffer.push(own_ship, targets);
        }
        IntakeMessage::Remove { target_id } => {
            buffer.discard(&target_id);
            registry.remove(&target_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colav_core::Position;

    fn own(course: f64) -> OwnShipState {
        OwnShipState::new(Position::new(0.0, 0.0), course, 5.0, 0.0)
    }

    fn target(id: &str, north: f64) -> TargetSnapshot {
        TargetSnapshot::new(id, Position::new(north, 0.0), 0.0, 1.0)
    }

    #[test]
    fn test_parse_messages() {
        let cycle = parse_line(
            r#"{"type":"cycle","ownShip":{"position":{"north":1.0,"east":2.0},"course":0.5,"speed":5.0,"desiredHeading":0.5},"targets":[]}"#,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(cycle, IntakeMessage::Cycle { ref targets, .. } if targets.is_empty()));

        let remove = parse_line(r#"{"type":"remove","targetId":"42"}"#).unwrap();
        assert_eq!(
            remove,
            Some(IntakeMessage::Remove {
                target_id: "42".to_string()
            })
        );

        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(matches!(
            parse_line(r#"{"type":"bogus"}"#),
            Err(ServerError::ParseJson(_))
        ));
    }

    #[test]
    fn test_latest_value_wins() {
        let buffer = IntakeBuffer::new();
        buffer.push(own(0.1), vec![target("a", 100.0), target("b", 200.0)]);
        buffer.push(own(0.2), vec![target("a", 90.0)]);

        let cycle = buffer.take().unwrap();
        assert!((cycle.own_ship.course - 0.2).abs() < 1e-12);
        assert_eq!(cycle.targets.len(), 2);
        let a = cycle.targets.iter().find(|t| t.id == "a").unwrap();
        assert_eq!(a.position.north, 90.0);

        assert!(buffer.take().is_none());
    }

    #[test]
    fn test_discard_and_close() {
        let buffer = IntakeBuffer::new();
        buffer.push(own(0.0), vec![target("a", 100.0), target("b", 200.0)]);
        buffer.discard("a");
        let cycle = buffer.take().unwrap();
        assert_eq!(cycle.targets.len(), 1);
        assert_eq!(cycle.targets[0].id, "b");

        assert!(!buffer.is_closed());
        buffer.close();
        assert!(buffer.is_closed());
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let buffer = IntakeBuffer::new();
        let waiter = buffer.clone();
        let handle = tokio::spawn(async move {
            waiter.notified().await;
            waiter.take()
        });
        buffer.push(own(0.0), vec![target("a", 100.0)]);
        let cycle = handle.await.unwrap().unwrap();
        assert_eq!(cycle.targets.len(), 1);
    }
}
