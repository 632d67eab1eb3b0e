//! Barrier function evaluation.
//!
//! Own ship is modeled as a unicycle with heading rate input `r`:
//!
//! ```text
//!   ṗ = u z
//!   ż = S z r
//! ```
//!
//! Targets move with constant velocity. A barrier `B1` is negative in the
//! safe set. Because `r` does not act on `B1` directly (L_g B1 = 0) it is
//! backstepped once:
//!
//! ```text
//!   B2 = L_f B1 + γ1 B1
//! ```
//!
//! and the heading rate is kept in the admissible set
//! `{ r : L_f B2 + L_g B2 r <= -γ2 B2 }`, a half-line since L_g B2 is
//! scalar.

use nalgebra::Vector2;

use crate::error::GeometryError;
use crate::kinematics::{rotation_s, OwnShipState, TargetSnapshot};
use crate::tsca::{HalfPlane, Tsca};

/// |L_g B2| below this leaves the input without effect on the barrier
const MIN_CONTROL_GAIN: f64 = 1e-9;
const MIN_RANGE: f64 = 1e-9;

/// Own ship and target state a barrier is evaluated at
#[derive(Debug, Clone, Copy)]
pub struct BarrierInput {
    pub position: Vector2<f64>,
    /// Unit heading vector z
    pub heading: Vector2<f64>,
    pub speed: f64,
    pub target_position: Vector2<f64>,
    pub target_velocity: Vector2<f64>,
}

impl BarrierInput {
    pub fn new(own: &OwnShipState, target: &TargetSnapshot) -> Self {
        BarrierInput {
            position: own.position.to_vector(),
            heading: own.heading(),
            speed: own.speed,
            target_position: target.position.to_vector(),
            target_velocity: target.velocity(),
        }
    }

    /// Relative velocity w = u z - v0
    fn relative_velocity(&self) -> Vector2<f64> {
        self.heading * self.speed - self.target_velocity
    }
}

/// Barrier values of one face at one state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceEvaluation {
    pub b1: f64,
    pub lf_b1: f64,
    pub b2: f64,
    pub lf_b2: f64,
    pub lg_b2: f64,
}

impl FaceEvaluation {
    /// Heading rates satisfying `L_f B2 + L_g B2 r <= -γ2 B2`
    pub fn admissible_set(&self, gamma2: f64) -> AdmissibleSet {
        let a = self.lf_b2 + gamma2 * self.b2;
        if !(a.is_finite() && self.lg_b2.is_finite()) {
            return AdmissibleSet::Empty;
        }
        if self.lg_b2.abs() < MIN_CONTROL_GAIN {
            return if a <= 0.0 {
                AdmissibleSet::All
            } else {
                AdmissibleSet::Empty
            };
        }
        let bound = -a / self.lg_b2;
        if self.lg_b2 > 0.0 {
            AdmissibleSet::AtMost(bound)
        } else {
            AdmissibleSet::AtLeast(bound)
        }
    }
}

/// Admissible heading rates of one barrier
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmissibleSet {
    /// r <= bound
    AtMost(f64),
    /// r >= bound
    AtLeast(f64),
    /// The input has no effect and the drift already satisfies the constraint
    All,
    /// The input has no effect and the constraint is violated regardless
    Empty,
}

impl AdmissibleSet {
    pub fn contains(&self, rate: f64) -> bool {
        match *self {
            AdmissibleSet::AtMost(bound) => rate <= bound,
            AdmissibleSet::AtLeast(bound) => rate >= bound,
            AdmissibleSet::All => true,
            AdmissibleSet::Empty => false,
        }
    }

    /// Closest admissible rate. An empty set leaves the rate unchanged,
    /// there is nothing a heading command can do about it.
    pub fn clamp(&self, rate: f64) -> f64 {
        match *self {
            AdmissibleSet::AtMost(bound) => rate.min(bound),
            AdmissibleSet::AtLeast(bound) => rate.max(bound),
            AdmissibleSet::All | AdmissibleSet::Empty => rate,
        }
    }
}

/// Evaluate one half-plane face.
///
/// ```text
///   B1    = d - τᵀ(p - p0)
///   L_f B1 = -τᵀ w
///   L_f B2 = γ1 L_f B1
///   L_g B2 = -u τᵀ S z
/// ```
pub fn evaluate_face(face: &HalfPlane, input: &BarrierInput, gamma1: f64) -> FaceEvaluation {
    let e = input.position - input.target_position;
    let w = input.relative_velocity();

    let b1 = face.distance - face.normal.dot(&e);
    let lf_b1 = -face.normal.dot(&w);
    let b2 = lf_b1 + gamma1 * b1;
    let lf_b2 = gamma1 * lf_b1;
    let lg_b2 = -input.speed * face.normal.dot(&(rotation_s() * input.heading));

    FaceEvaluation {
        b1,
        lf_b1,
        b2,
        lf_b2,
        lg_b2,
    }
}

/// Evaluate every face of a critical area
pub fn evaluate_polygon(tsca: &Tsca, input: &BarrierInput, gamma1: f64) -> Vec<FaceEvaluation> {
    tsca.faces
        .iter()
        .map(|face| evaluate_face(face, input, gamma1))
        .collect()
}

/// Evaluate a circular domain of `radius` around the target.
///
/// ```text
///   B1     = R - |e|
///   L_f B1 = -eᵀw / |e|
///   L_f B2 = (eᵀw)² / |e|³ - |w|² / |e| + γ1 L_f B1
///   L_g B2 = -u eᵀ S z / |e|
/// ```
pub fn evaluate_circle(
    radius: f64,
    input: &BarrierInput,
    gamma1: f64,
) -> Result<FaceEvaluation, GeometryError> {
    let e = input.position - input.target_position;
    let range = e.norm();
    if range < MIN_RANGE {
        return Err(GeometryError::CoincidentPositions);
    }
    let w = input.relative_velocity();
    let ew = e.dot(&w);

    let b1 = radius - range;
    let lf_b1 = -ew / range;
    let b2 = lf_b1 + gamma1 * b1;
    let lf_b2 = ew * ew / range.powi(3) - w.norm_squared() / range + gamma1 * lf_b1;
    let lg_b2 = -input.speed * e.dot(&(rotation_s() * input.heading)) / range;

    Ok(FaceEvaluation {
        b1,
        lf_b1,
        b2,
        lf_b2,
        lg_b2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::course_vector;
    use std::f64::consts::PI;

    fn input(own_course: f64, target: Vector2<f64>, target_velocity: Vector2<f64>) -> BarrierInput {
        BarrierInput {
            position: Vector2::zeros(),
            heading: course_vector(own_course),
            speed: 5.0,
            target_position: target,
            target_velocity,
        }
    }

    /// Target astern-facing face: normal points from the target toward own ship
    fn face_towards_origin() -> HalfPlane {
        HalfPlane {
            distance: 50.0,
            normal: Vector2::new(-1.0, 0.0),
        }
    }

    #[test]
    fn test_face_values() {
        // Own ship heading north toward a stationary target 100 m ahead
        let inp = input(0.0, Vector2::new(100.0, 0.0), Vector2::zeros());
        let ev = evaluate_face(&face_towards_origin(), &inp, 0.2);

        // e = p - p0 = (-100, 0); τᵀe = 100
        assert!((ev.b1 - (-50.0)).abs() < 1e-12);
        // Closing at 5 m/s along τ: L_f B1 = -τᵀw = 5
        assert!((ev.lf_b1 - 5.0).abs() < 1e-12);
        assert!((ev.b2 - (5.0 - 10.0)).abs() < 1e-12);
        assert!((ev.lf_b2 - 1.0).abs() < 1e-12);
        // Heading straight at the face, turning has no first-order effect
        assert!(ev.lg_b2.abs() < 1e-12);
    }

    #[test]
    fn test_face_lie_derivative_matches_finite_difference() {
        let inp = input(0.3, Vector2::new(120.0, 40.0), Vector2::new(-2.0, 1.0));
        let face = HalfPlane {
            distance: 60.0,
            normal: course_vector(2.5),
        };
        let ev = evaluate_face(&face, &inp, 0.2);

        let h = 1e-4;
        let mut next = inp;
        next.position += inp.heading * inp.speed * h;
        next.target_position += inp.target_velocity * h;
        let ev_next = evaluate_face(&face, &next, 0.2);
        assert!(((ev_next.b1 - ev.b1) / h - ev.lf_b1).abs() < 1e-6);

        // Turning with rate r changes B2 by L_g B2 * r on top of the drift
        let r = 0.1;
        let mut turned = next;
        turned.heading = course_vector(0.3 + r * h);
        let ev_turned = evaluate_face(&face, &turned, 0.2);
        let rate = (ev_turned.b2 - ev.b2) / h;
        assert!((rate - (ev.lf_b2 + ev.lg_b2 * r)).abs() < 1e-4);
    }

    #[test]
    fn test_circle_lie_derivative_matches_finite_difference() {
        let inp = input(0.3, Vector2::new(120.0, 40.0), Vector2::new(-2.0, 1.0));
        let ev = evaluate_circle(50.0, &inp, 0.2).unwrap();
        assert!((ev.b1 - (50.0 - (120.0f64.powi(2) + 40.0f64.powi(2)).sqrt())).abs() < 1e-9);

        let h = 1e-4;
        let r = -0.05;
        let mut next = inp;
        next.position += inp.heading * inp.speed * h;
        next.target_position += inp.target_velocity * h;
        next.heading = course_vector(0.3 + r * h);
        let ev_next = evaluate_circle(50.0, &next, 0.2).unwrap();

        assert!(((ev_next.b1 - ev.b1) / h - ev.lf_b1).abs() < 1e-4);
        let rate = (ev_next.b2 - ev.b2) / h;
        assert!((rate - (ev.lf_b2 + ev.lg_b2 * r)).abs() < 1e-4);
    }

    #[test]
    fn test_circle_coincident() {
        let inp = input(0.0, Vector2::zeros(), Vector2::zeros());
        assert_eq!(
            evaluate_circle(50.0, &inp, 0.2),
            Err(GeometryError::CoincidentPositions)
        );
    }

    #[test]
    fn test_admissible_set_direction() {
        let ev = FaceEvaluation {
            b1: -1.0,
            lf_b1: 0.0,
            b2: -1.0,
            lf_b2: 2.0,
            lg_b2: 4.0,
        };
        // a = 2 - 40 = -38, L_g > 0: r <= 9.5
        assert_eq!(ev.admissible_set(40.0), AdmissibleSet::AtMost(9.5));

        let ev = FaceEvaluation { lg_b2: -4.0, ..ev };
        assert_eq!(ev.admissible_set(40.0), AdmissibleSet::AtLeast(-9.5));
    }

    #[test]
    fn test_admissible_set_without_control_effect() {
        let ev = FaceEvaluation {
            b1: -1.0,
            lf_b1: 0.0,
            b2: -1.0,
            lf_b2: 0.0,
            lg_b2: 0.0,
        };
        assert_eq!(ev.admissible_set(40.0), AdmissibleSet::All);

        let violated = FaceEvaluation { b2: 1.0, ..ev };
        assert_eq!(violated.admissible_set(40.0), AdmissibleSet::Empty);
        assert_eq!(AdmissibleSet::Empty.clamp(0.1), 0.1);
        assert!(!AdmissibleSet::Empty.contains(0.1));
    }

    #[test]
    fn test_clamp() {
        let set = AdmissibleSet::AtMost(0.05);
        assert_eq!(set.clamp(0.01), 0.01);
        assert_eq!(set.clamp(0.1), 0.05);
        assert_eq!(set.clamp(set.clamp(0.1)), 0.05);

        let set = AdmissibleSet::AtLeast(-PI);
        assert_eq!(set.clamp(-4.0), -PI);
        assert!(set.contains(0.0));
    }
}
