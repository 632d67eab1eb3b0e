//! Trajectory prediction under safeguarding.
//!
//! The ship motion model is a capability supplied to the pipeline through
//! the [`Predictor`] trait. [`KinematicPredictor`] is a plain unicycle model
//! that is good enough for a horizon of minutes; a higher fidelity model
//! can be dropped in without touching the barrier code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::PredictionConfig;
use crate::encounter::EncounterState;
use crate::kinematics::{normalize_angle, rotation_s, OwnShipState, Position, TargetSnapshot};
use crate::pipeline::ColavContext;
use crate::switching::ActiveConstraintState;

pub use crate::config::DomainShape;

/// A safe command differing from the nominal one by more than this counts
/// as a maneuver
const MANEUVER_THRESHOLD: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryPoint {
    pub time: f64,
    pub position: Position,
    pub heading: f64,
    pub heading_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
    /// Time (s) at which the safe command first departs from the nominal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maneuver_start: Option<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }
}

/// Ship motion model.
///
/// `control` is called once per step with the elapsed time and the
/// predicted own ship state and returns the heading rate to apply.
pub trait Predictor: Send + Sync {
    fn predict(
        &self,
        initial: &OwnShipState,
        control: &mut dyn FnMut(f64, &OwnShipState) -> f64,
    ) -> Trajectory;
}

/// Unicycle model: `ṗ = u z`, `ż = S z r`, forward Euler with the heading
/// vector renormalized after every step
#[derive(Debug, Clone, Copy)]
pub struct KinematicPredictor {
    pub dt: f64,
    pub horizon: f64,
    pub max_heading_rate: f64,
}

impl KinematicPredictor {
    pub fn new(config: &PredictionConfig) -> Self {
        KinematicPredictor {
            dt: config.dt,
            horizon: config.horizon,
            max_heading_rate: config.max_heading_rate,
        }
    }
}

impl Predictor for KinematicPredictor {
    fn predict(
        &self,
        initial: &OwnShipState,
        control: &mut dyn FnMut(f64, &OwnShipState) -> f64,
    ) -> Trajectory {
        let steps = (self.horizon / self.dt).ceil().max(0.0) as usize;
        let mut points = Vec::with_capacity(steps + 1);

        let mut state = *initial;
        let mut p = state.position.to_vector();
        let mut z = state.heading();

        for k in 0..=steps {
            let t = k as f64 * self.dt;
            let mut r = control(t, &state);
            if !r.is_finite() {
                r = 0.0;
            }
            r = r.clamp(-self.max_heading_rate, self.max_heading_rate);

            points.push(TrajectoryPoint {
                time: t,
                position: state.position,
                heading: state.course,
                heading_rate: r,
            });
            if k == steps {
                break;
            }

            p += z * state.speed * self.dt;
            z += rotation_s() * z * r * self.dt;
            let n = z.norm();
            if n > 0.0 {
                z /= n;
            }

            state.position = Position::from_vector(&p);
            state.course = normalize_angle(z.y.atan2(z.x));
        }

        Trajectory {
            points,
            maneuver_start: None,
        }
    }
}

/// Run the safeguarding loop over the prediction horizon.
///
/// Targets move with constant velocity and keep the encounter state they
/// have now. At every step the closest target constrains the command.
pub fn rollout(
    context: &ColavContext,
    predictor: &dyn Predictor,
    own: &OwnShipState,
    targets: &[(TargetSnapshot, EncounterState)],
) -> Trajectory {
    let mut actives: HashMap<&str, ActiveConstraintState> = HashMap::new();
    let mut maneuver_start = None;

    let mut control = |t: f64, state: &OwnShipState| -> f64 {
        let nominal = context.nominal_rate(state);
        let p = state.position.to_vector();

        let closest = targets
            .iter()
            .filter(|(target, _)| target.is_finite())
            .map(|(target, encounter)| {
                let at = target.extrapolate(t);
                ((at - p).norm(), target, encounter, at)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let Some((_, target, encounter, at)) = closest else {
            return nominal;
        };
        let moved = TargetSnapshot {
            position: Position::from_vector(&at),
            ..target.clone()
        };
        let active = actives.entry(target.id.as_str()).or_default();

        match context.safeguard(*encounter, state, &moved, active, nominal, false) {
            Ok(outcome) => {
                if maneuver_start.is_none() && (outcome.rate - nominal).abs() > MANEUVER_THRESHOLD {
                    maneuver_start = Some(t);
                }
                outcome.rate
            }
            Err(_) => nominal,
        }
    };

    let mut trajectory = predictor.predict(own, &mut control);
    trajectory.maneuver_start = maneuver_start;
    trajectory
}

/// Smallest distance between the trajectory and a target moving with
/// constant velocity
pub fn min_separation(trajectory: &Trajectory, target: &TargetSnapshot) -> Option<f64> {
    trajectory
        .points
        .iter()
        .map(|point| (point.position.to_vector() - target.extrapolate(point.time)).norm())
        .min_by(f64::total_cmp)
}
