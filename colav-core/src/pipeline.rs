//! Per-target pipeline and the target registry.
//!
//! ```text
//!   classify ─▶ state machine ─▶ critical area ─▶ barriers ⇄ switching ─▶ safeguard
//! ```
//!
//! [`ColavContext`] holds everything that is fixed for a run (configuration,
//! classifier, critical area shapes, nominal law) and can be shared between
//! threads. [`TargetTracker`] holds the state that persists across cycles
//! for one target. [`Colav`] owns one tracker per target for synchronous
//! callers; the server runs one tracker per actor task instead.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::barrier::{evaluate_circle, evaluate_polygon, BarrierInput, FaceEvaluation};
use crate::config::{ColavConfig, DomainShape};
use crate::control::{safeguard, HeadingAlignment, NominalControl};
use crate::cpa::{calculate_cpa, time_to_radius, CpaResult};
use crate::encounter::{
    log_transition, EncounterClassifier, EncounterState, EncounterStateMachine,
};
use crate::error::{ConfigError, GeometryError};
use crate::kinematics::{CycleInput, OwnShipState, TargetId, TargetSnapshot};
use crate::predict::{rollout, Predictor, Trajectory};
use crate::switching::ActiveConstraintState;
use crate::tsca::TscaBuilder;

// =============================================================================
// Shared context
// =============================================================================

#[derive(Debug)]
pub struct ColavContext {
    config: ColavConfig,
    classifier: EncounterClassifier,
    builder: TscaBuilder,
    nominal: Box<dyn NominalControl>,
}

/// Result of one safeguarding evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeguardOutcome {
    pub rate: f64,
    pub active_index: usize,
}

impl ColavContext {
    /// Validate the configuration and use the heading alignment law
    pub fn new(config: ColavConfig) -> Result<Self, ConfigError> {
        let nominal = Box::new(HeadingAlignment::new(&config.nominal));
        Self::with_nominal(config, nominal)
    }

    pub fn with_nominal(
        config: ColavConfig,
        nominal: Box<dyn NominalControl>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let builder = TscaBuilder::new(&config)?;
        let classifier =
            EncounterClassifier::new(config.classifier.theta1, config.classifier.theta2);
        Ok(ColavContext {
            config,
            classifier,
            builder,
            nominal,
        })
    }

    pub fn config(&self) -> &ColavConfig {
        &self.config
    }

    pub fn classifier(&self) -> &EncounterClassifier {
        &self.classifier
    }

    pub fn builder(&self) -> &TscaBuilder {
        &self.builder
    }

    pub fn safety_radius(&self, target: &TargetSnapshot) -> f64 {
        target
            .safety_radius
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(self.config.safety_radius)
    }

    /// Nominal heading rate, zero when it cannot be computed
    pub fn nominal_rate(&self, own: &OwnShipState) -> f64 {
        let rate = self
            .nominal
            .heading_rate(own.course, own.desired_heading)
            .rate;
        if rate.is_finite() {
            rate
        } else {
            0.0
        }
    }

    /// Barrier evaluations of the domain around `target` for `state`
    pub fn evaluate(
        &self,
        state: EncounterState,
        own: &OwnShipState,
        target: &TargetSnapshot,
    ) -> Result<Vec<FaceEvaluation>, GeometryError> {
        if !own.is_finite() || !target.is_finite() {
            return Err(GeometryError::NonFiniteInput);
        }
        let input = BarrierInput::new(own, target);
        let radius = self.safety_radius(target);
        let gamma1 = self.config.barrier.gamma1;

        match self.config.prediction.domain_shape {
            DomainShape::Polygon => {
                let tsca = self.builder.materialize(state, target, radius);
                Ok(evaluate_polygon(&tsca, &input, gamma1))
            }
            DomainShape::Circle => Ok(vec![evaluate_circle(radius, &input, gamma1)?]),
        }
    }

    /// Evaluate the barriers, update the active face and clamp `nominal`.
    ///
    /// With `hold` set the active face is only revalidated, never switched.
    pub fn safeguard(
        &self,
        state: EncounterState,
        own: &OwnShipState,
        target: &TargetSnapshot,
        active: &mut ActiveConstraintState,
        nominal: f64,
        hold: bool,
    ) -> Result<SafeguardOutcome, GeometryError> {
        let evals = self.evaluate(state, own, target)?;
        if hold {
            active.revalidate(&evals, state);
        } else {
            active.update(&evals, state, self.config.barrier.delta);
        }

        let rate = match evals.get(active.index) {
            Some(ev) => safeguard(nominal, &ev.admissible_set(self.config.barrier.gamma2)),
            None => nominal,
        };
        Ok(SafeguardOutcome {
            rate,
            active_index: active.index,
        })
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Per-target output of one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub target_id: TargetId,
    /// Numeric encounter code (1..6)
    pub encounter_state: u8,
    pub encounter: EncounterState,
    pub active_constraint_index: usize,
    pub d_at_cpa: Option<f64>,
    pub t_2_cpa: Option<f64>,
    /// Current distance to the target (m)
    pub range: f64,
    pub safe_heading_rate: f64,
    pub nominal_heading_rate: f64,
    /// CPA lies ahead and within the safety radius times the tolerance
    pub close_approach: bool,
    /// Set only when the CPA lies inside the safety radius
    pub time_to_safety_radius: Option<f64>,
    /// Geometry was degenerate; reported as SAFE
    pub degraded: bool,
}

/// Output of one cycle over all targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle: u64,
    /// Own ship heading-rate command for this cycle
    pub heading_rate: f64,
    pub nominal_heading_rate: f64,
    pub targets: Vec<TargetReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Trajectory>,
}

impl CycleReport {
    /// Assemble a cycle from per-target reports.
    ///
    /// The command follows the closest non-degraded target, or the nominal
    /// rate when there is none.
    pub fn aggregate(cycle: u64, nominal: f64, mut targets: Vec<TargetReport>) -> Self {
        targets.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        let heading_rate = targets
            .iter()
            .filter(|t| !t.degraded && t.range.is_finite())
            .min_by(|a, b| a.range.total_cmp(&b.range))
            .map_or(nominal, |t| t.safe_heading_rate);

        CycleReport {
            cycle,
            heading_rate,
            nominal_heading_rate: nominal,
            targets,
            trajectory: None,
        }
    }

    pub fn target(&self, id: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target_id == id)
    }
}

// =============================================================================
// Per-target tracker
// =============================================================================

/// Cross-cycle state of one target
#[derive(Debug, Clone)]
pub struct TargetTracker {
    id: TargetId,
    machine: EncounterStateMachine,
    active: ActiveConstraintState,
}

impl TargetTracker {
    pub fn new(id: &str, context: &ColavContext) -> Self {
        TargetTracker {
            id: id.to_string(),
            machine: EncounterStateMachine::new(context.config().gates),
            active: ActiveConstraintState::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> EncounterState {
        self.machine.state()
    }

    pub fn last_cpa(&self) -> Option<&CpaResult> {
        self.machine.last_cpa()
    }

    pub fn active_constraint(&self) -> &ActiveConstraintState {
        &self.active
    }

    /// Run one cycle for this target. Never fails: degenerate geometry is
    /// reported as a degraded SAFE record.
    pub fn step(
        &mut self,
        context: &ColavContext,
        own: &OwnShipState,
        target: &TargetSnapshot,
    ) -> TargetReport {
        let config = context.config();
        let nominal = context.nominal_rate(own);

        let geometry = context
            .classifier()
            .classify(own, target)
            .and_then(|c| calculate_cpa(own, target).map(|cpa| (c, cpa)));

        let (transition, cpa, degraded) = match geometry {
            Ok((classification, cpa)) => {
                let gated = Some(cpa).filter(|c| c.is_relevant(config.max_distance_to_cpa));
                let transition = self.machine.update(classification.label, gated);
                (transition, Some(cpa), false)
            }
            Err(e) => {
                debug!("Target {}: degraded geometry: {}", self.id, e);
                (self.machine.fail_safe(), None, true)
            }
        };
        if let Some(t) = transition {
            log_transition(&self.id, &t, cpa.as_ref());
        }

        let state = self.machine.state();
        let (rate, active_index) =
            match context.safeguard(state, own, target, &mut self.active, nominal, degraded) {
                Ok(outcome) => (outcome.rate, outcome.active_index),
                Err(e) => {
                    debug!("Target {}: barrier not evaluated: {}", self.id, e);
                    (nominal, self.active.index)
                }
            };

        let radius = context.safety_radius(target);
        let close = cpa.filter(|c| {
            c.t_2_cpa >= 0.0 && c.d_at_cpa <= radius * config.safety_radius_tolerance
        });
        let range = (target.position.to_vector() - own.position.to_vector()).norm();

        TargetReport {
            target_id: self.id.clone(),
            encounter_state: state.code(),
            encounter: state,
            active_constraint_index: active_index,
            d_at_cpa: cpa.map(|c| c.d_at_cpa),
            t_2_cpa: cpa.map(|c| c.t_2_cpa),
            range,
            safe_heading_rate: rate,
            nominal_heading_rate: nominal,
            close_approach: close.is_some(),
            time_to_safety_radius: close
                .filter(|c| c.d_at_cpa < radius)
                .and_then(|_| time_to_radius(own, target, radius)),
            degraded,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Synchronous registry: one tracker per live target
#[derive(Debug)]
pub struct Colav {
    context: Arc<ColavContext>,
    trackers: HashMap<TargetId, TargetTracker>,
    cycle: u64,
}

impl Colav {
    pub fn new(config: ColavConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_context(Arc::new(ColavContext::new(config)?)))
    }

    pub fn with_context(context: Arc<ColavContext>) -> Self {
        Colav {
            context,
            trackers: HashMap::new(),
            cycle: 0,
        }
    }

    pub fn context(&self) -> &Arc<ColavContext> {
        &self.context
    }

    /// Process one target; unknown targets are created
    pub fn update(&mut self, own: &OwnShipState, target: &TargetSnapshot) -> TargetReport {
        let context = &self.context;
        let tracker = self.trackers.entry(target.id.clone()).or_insert_with(|| {
            info!("Target {}: tracking", target.id);
            TargetTracker::new(&target.id, context)
        });
        tracker.step(context, own, target)
    }

    /// Process all targets of a cycle and aggregate the command
    pub fn cycle(&mut self, input: &CycleInput) -> CycleReport {
        self.cycle += 1;
        let reports = input
            .targets
            .iter()
            .map(|target| self.update(&input.own_ship, target))
            .collect();
        CycleReport::aggregate(self.cycle, self.context.nominal_rate(&input.own_ship), reports)
    }

    /// Drop a target. Removing an unknown target is a no-op.
    pub fn remove(&mut self, target_id: &str) -> bool {
        let removed = self.trackers.remove(target_id).is_some();
        if removed {
            info!("Target {}: removed", target_id);
        }
        removed
    }

    pub fn encounter(&self, target_id: &str) -> Option<EncounterState> {
        self.trackers.get(target_id).map(TargetTracker::state)
    }

    pub fn tracker(&self, target_id: &str) -> Option<&TargetTracker> {
        self.trackers.get(target_id)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Predict own ship under safeguarding against the targets of `input`,
    /// using each target's current encounter state
    pub fn predict(&self, predictor: &dyn Predictor, input: &CycleInput) -> Trajectory {
        let targets: Vec<(TargetSnapshot, EncounterState)> = input
            .targets
            .iter()
            .map(|t| (t.clone(), self.encounter(&t.id).unwrap_or_default()))
            .collect();
        rollout(&self.context, predictor, &input.own_ship, &targets)
    }
}
