//! CPA/TCPA Calculation
//!
//! Computes Closest Point of Approach (CPA) and Time to CPA (TCPA)
//! under constant-velocity extrapolation. Everything here is closed form,
//! there is no iterative solver.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::kinematics::{OwnShipState, Position, Relative, TargetSnapshot};

/// Relative speed² (m²/s²) below which the CPA is considered undefined
const MIN_RELATIVE_SPEED_SQ: f64 = 1e-6;

/// Result of CPA/TCPA calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpaResult {
    /// Distance between the ships at CPA in meters
    pub d_at_cpa: f64,
    /// Time to CPA in seconds. Positive = future, Negative = past
    pub t_2_cpa: f64,
    /// Distance own ship travels to reach its CPA position
    pub d_2_cpa: f64,
    /// Own ship position at CPA
    pub own_at_cpa: Position,
    /// Target position at CPA
    pub target_at_cpa: Position,
}

impl CpaResult {
    /// Whether the CPA is close enough to own ship to matter at all
    pub fn is_relevant(&self, max_distance_to_cpa: f64) -> bool {
        self.d_2_cpa <= max_distance_to_cpa
    }
}

/// Calculate CPA and TCPA between own ship and target
///
/// Uses relative velocity method:
/// 1. Compute relative position (target - own ship)
/// 2. Compute relative velocity
/// 3. Find time when distance is minimized: TCPA = -(r · v) / |v|²
///
/// Parallel courses with equal speed leave the CPA undefined and return
/// [`GeometryError::UndefinedCpa`].
pub fn calculate_cpa(
    own: &OwnShipState,
    target: &TargetSnapshot,
) -> Result<CpaResult, GeometryError> {
    if !own.is_finite() || !target.is_finite() {
        return Err(GeometryError::NonFiniteInput);
    }

    let rel = Relative::new(own, target);
    let v_sq = rel.velocity.norm_squared();
    if v_sq < MIN_RELATIVE_SPEED_SQ {
        return Err(GeometryError::UndefinedCpa);
    }

    let t_2_cpa = -rel.position.dot(&rel.velocity) / v_sq;
    let d_at_cpa = (rel.position + rel.velocity * t_2_cpa).norm();

    let own_travel = own.velocity() * t_2_cpa;
    let own_at_cpa = own.position.to_vector() + own_travel;
    let target_at_cpa = target.extrapolate(t_2_cpa);

    Ok(CpaResult {
        d_at_cpa,
        t_2_cpa,
        d_2_cpa: own_travel.norm(),
        own_at_cpa: Position::from_vector(&own_at_cpa),
        target_at_cpa: Position::from_vector(&target_at_cpa),
    })
}

/// Earliest time (s) at which the range to the target shrinks to `radius`.
///
/// Returns `Some(0.0)` when the target is already inside the radius and
/// `None` when the range never reaches it in the future.
pub fn time_to_radius(own: &OwnShipState, target: &TargetSnapshot, radius: f64) -> Option<f64> {
    let rel = Relative::new(own, target);
    let c = rel.position.norm_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }

    let a = rel.velocity.norm_squared();
    if a < MIN_RELATIVE_SPEED_SQ {
        return None;
    }
    let b = 2.0 * rel.position.dot(&rel.velocity);
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }

    let t = (-b - disc.sqrt()) / (2.0 * a);
    if t >= 0.0 && t.is_finite() {
        Some(t)
    } else {
        None
    }
}
