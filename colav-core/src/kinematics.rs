//! Kinematic state of own ship and targets in the local NED frame.
//!
//! All vectors are `[north, east]` in meters (or m/s). Angles are radians,
//! 0 = north, clockwise positive, so a course `c` points along
//! `[cos c, sin c]`.
//!
//! The adapter part of this module turns the flat per-target ARPA records
//! into the own-ship state (shared by all targets of a cycle) and one
//! snapshot per target.

use std::f64::consts::PI;

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

pub const TWO_PI: f64 = 2.0 * PI;

/// Stable identifier of a tracked target (MMSI or ARPA track number)
pub type TargetId = String;

/// Normalize an angle to `[0, 2π)`
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TWO_PI);
    // rem_euclid rounds tiny negative values up to exactly 2π
    if a >= TWO_PI {
        0.0
    } else {
        a
    }
}

/// Unit vector pointing along a course
pub fn course_vector(course: f64) -> Vector2<f64> {
    Vector2::new(course.cos(), course.sin())
}

/// Rotation by +90° in the `[north, east]` frame.
///
/// For a unit heading vector `z`, `S z` is the derivative of `z` with
/// respect to the heading angle, so `ż = S z r` for heading rate `r`.
pub fn rotation_s() -> Matrix2<f64> {
    Matrix2::new(0.0, -1.0, 1.0, 0.0)
}

/// Rotate a body-frame vector (`[forward, starboard]`) into the NED frame
pub fn body_to_ned(course: f64, body: Vector2<f64>) -> Vector2<f64> {
    let (s, c) = course.sin_cos();
    Matrix2::new(c, -s, s, c) * body
}

/// Position in the local NED frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub north: f64,
    pub east: f64,
}

impl Position {
    pub fn new(north: f64, east: f64) -> Self {
        Position { north, east }
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.north, self.east)
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Position {
            north: v.x,
            east: v.y,
        }
    }

    fn is_finite(&self) -> bool {
        self.north.is_finite() && self.east.is_finite()
    }
}

/// Own ship state for one control cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnShipState {
    pub position: Position,
    /// Course over ground (rad)
    pub course: f64,
    /// Speed over ground (m/s)
    pub speed: f64,
    /// Desired heading ψd (rad)
    pub desired_heading: f64,
}

impl OwnShipState {
    pub fn new(position: Position, course: f64, speed: f64, desired_heading: f64) -> Self {
        OwnShipState {
            position,
            course: normalize_angle(course),
            speed,
            desired_heading: normalize_angle(desired_heading),
        }
    }

    /// Unit heading vector z
    pub fn heading(&self) -> Vector2<f64> {
        course_vector(self.course)
    }

    /// Desired heading vector z_d
    pub fn desired_heading_vector(&self) -> Vector2<f64> {
        course_vector(self.desired_heading)
    }

    pub fn velocity(&self) -> Vector2<f64> {
        self.heading() * self.speed
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.course.is_finite()
            && self.speed.is_finite()
            && self.desired_heading.is_finite()
    }
}

/// One target as reported for the current cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub position: Position,
    /// Course over ground (rad)
    pub course: f64,
    /// Speed over ground (m/s)
    pub speed: f64,
    /// Safety radius (m); the configured default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_radius: Option<f64>,
}

impl TargetSnapshot {
    pub fn new(id: &str, position: Position, course: f64, speed: f64) -> Self {
        TargetSnapshot {
            id: id.to_string(),
            position,
            course: normalize_angle(course),
            speed,
            safety_radius: None,
        }
    }

    pub fn with_safety_radius(mut self, radius: f64) -> Self {
        self.safety_radius = Some(radius);
        self
    }

    pub fn heading(&self) -> Vector2<f64> {
        course_vector(self.course)
    }

    pub fn velocity(&self) -> Vector2<f64> {
        self.heading() * self.speed
    }

    /// Position after `t` seconds of constant-velocity motion
    pub fn extrapolate(&self, t: f64) -> Vector2<f64> {
        self.position.to_vector() + self.velocity() * t
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.course.is_finite()
            && self.speed.is_finite()
            && self.safety_radius.map_or(true, |r| r.is_finite())
    }
}

/// Target kinematics relative to own ship
#[derive(Debug, Clone, Copy)]
pub struct Relative {
    /// Target position minus own position
    pub position: Vector2<f64>,
    /// Target velocity minus own velocity
    pub velocity: Vector2<f64>,
}

impl Relative {
    pub fn new(own: &OwnShipState, target: &TargetSnapshot) -> Self {
        Relative {
            position: target.position.to_vector() - own.position.to_vector(),
            velocity: target.velocity() - own.velocity(),
        }
    }
}

// =============================================================================
// Kinematics adapter
// =============================================================================

/// Flat per-target record as supplied by the ARPA collaborator.
///
/// Own-ship fields are repeated in every record of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArpaRecord {
    pub target_id: TargetId,
    pub own_position: Position,
    pub own_course: f64,
    pub own_speed: f64,
    pub own_desired_heading: f64,
    pub target_position: Position,
    pub target_course: f64,
    pub target_speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_radius: Option<f64>,
}

impl ArpaRecord {
    pub fn own_ship(&self) -> OwnShipState {
        OwnShipState::new(
            self.own_position,
            self.own_course,
            self.own_speed,
            self.own_desired_heading,
        )
    }

    pub fn target(&self) -> TargetSnapshot {
        TargetSnapshot {
            id: self.target_id.clone(),
            position: self.target_position,
            course: normalize_angle(self.target_course),
            speed: self.target_speed,
            safety_radius: self.safety_radius,
        }
    }
}

/// Everything one control cycle consumes: own ship once, all targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleInput {
    pub own_ship: OwnShipState,
    #[serde(default)]
    pub targets: Vec<TargetSnapshot>,
}

impl CycleInput {
    /// Group flat ARPA records into one cycle.
    ///
    /// The own-ship state is taken from the first record. Returns `None`
    /// when there are no records at all.
    pub fn from_records(records: &[ArpaRecord]) -> Option<CycleInput> {
        let first = records.first()?;
        Some(CycleInput {
            own_ship: first.own_ship(),
            targets: records.iter().map(ArpaRecord::target).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
        assert!((normalize_angle(5.0 * PI) - PI).abs() < 1e-12);
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(TWO_PI), 0.0);
        assert!(normalize_angle(-1e-18) < TWO_PI);
    }

    #[test]
    fn test_course_vector_is_north_east() {
        let north = course_vector(0.0);
        assert!((north.x - 1.0).abs() < 1e-12 && north.y.abs() < 1e-12);
        let east = course_vector(PI / 2.0);
        assert!(east.x.abs() < 1e-12 && (east.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_s_is_heading_derivative() {
        let course = 0.7;
        let dz = rotation_s() * course_vector(course);
        let expected = Vector2::new(-course.sin(), course.cos());
        assert!((dz - expected).norm() < 1e-12);
    }

    #[test]
    fn test_body_to_ned() {
        // Starboard of a north-going ship is east
        let v = body_to_ned(0.0, Vector2::new(0.0, 1.0));
        assert!((v - Vector2::new(0.0, 1.0)).norm() < 1e-12);
        // Forward of an east-going ship is east
        let v = body_to_ned(PI / 2.0, Vector2::new(1.0, 0.0));
        assert!((v - Vector2::new(0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_cycle_from_records() {
        let record = ArpaRecord {
            target_id: "257000001".to_string(),
            own_position: Position::new(0.0, 0.0),
            own_course: -PI / 2.0,
            own_speed: 5.0,
            own_desired_heading: 0.0,
            target_position: Position::new(100.0, 0.0),
            target_course: PI,
            target_speed: 3.0,
            safety_radius: Some(25.0),
        };
        let cycle = CycleInput::from_records(&[record.clone(), record]).unwrap();
        assert_eq!(cycle.targets.len(), 2);
        assert!((cycle.own_ship.course - 1.5 * PI).abs() < 1e-12);
        assert_eq!(cycle.targets[0].safety_radius, Some(25.0));
        assert!(CycleInput::from_records(&[]).is_none());
    }
}
