//! Target ship critical area (TSCA)
//!
//! A TSCA is a convex polygon around a target, written as the intersection
//! of half-planes
//!
//! ```text
//!   { x : d_q - τ_qᵀ (x - p0) >= 0 }   for every face q
//! ```
//!
//! where `p0` is the target position, `τ_q` the unit outward normal of
//! face q and `d_q` its distance from the target.
//!
//! Templates are configured per encounter state in the target's body frame
//! and in units of its safety radius. [`TscaBuilder::materialize`] scales
//! and rotates a template into NED meters for one cycle.

use nalgebra::Vector2;

use crate::config::ColavConfig;
use crate::encounter::EncounterState;
use crate::error::ConfigError;
use crate::kinematics::{body_to_ned, TargetSnapshot};

/// One half-plane of a critical area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfPlane {
    pub distance: f64,
    /// Unit outward normal
    pub normal: Vector2<f64>,
}

/// Template of one encounter state, normals normalized.
///
/// Distances are in safety radii, normals in the body frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TscaShape {
    faces: Vec<HalfPlane>,
}

impl TscaShape {
    pub fn faces(&self) -> &[HalfPlane] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Smallest face distance; inside this radius every face is violated
    pub fn min_distance(&self) -> f64 {
        self.faces
            .iter()
            .map(|f| f.distance)
            .fold(f64::INFINITY, f64::min)
    }
}

/// A critical area materialized around a target for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Tsca {
    pub state: EncounterState,
    /// Target position p0
    pub center: Vector2<f64>,
    /// Target velocity, the area moves with the target
    pub velocity: Vector2<f64>,
    pub faces: Vec<HalfPlane>,
}

impl Tsca {
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Whether a point lies inside the polygon (all faces violated)
    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        let e = point - self.center;
        self.faces.iter().all(|f| f.distance - f.normal.dot(&e) >= 0.0)
    }
}

/// Selects and materializes the critical area of an encounter state.
///
/// Holds one validated shape per state carrying a template; the reserved
/// EMERGENCY state uses the SAFE shape.
#[derive(Debug, Clone)]
pub struct TscaBuilder {
    /// Indexed by `slot(state)`
    shapes: Vec<TscaShape>,
}

fn slot(state: EncounterState) -> usize {
    match state {
        EncounterState::Emergency => 0,
        other => other.code() as usize - 1,
    }
}

impl TscaBuilder {
    pub fn new(config: &ColavConfig) -> Result<Self, ConfigError> {
        let mut shapes = Vec::with_capacity(EncounterState::ACTIVE.len());
        for state in EncounterState::ACTIVE {
            let template = config
                .tsca
                .get(&state)
                .ok_or(ConfigError::MissingTemplate(state))?;
            template.validate(state)?;

            let faces = template
                .faces
                .iter()
                .map(|face| {
                    let n = Vector2::new(face.normal[0], face.normal[1]);
                    HalfPlane {
                        distance: face.distance,
                        normal: n / n.norm(),
                    }
                })
                .collect();
            shapes.push(TscaShape { faces });
        }
        Ok(TscaBuilder { shapes })
    }

    /// Shape configured for an encounter state
    pub fn select(&self, state: EncounterState) -> &TscaShape {
        &self.shapes[slot(state)]
    }

    /// Critical area around `target` for `state`, with faces scaled by
    /// `radius` and rotated by the target course
    pub fn materialize(&self, state: EncounterState, target: &TargetSnapshot, radius: f64) -> Tsca {
        let faces = self
            .select(state)
            .faces
            .iter()
            .map(|face| HalfPlane {
                distance: face.distance * radius,
                normal: body_to_ned(target.course, face.normal),
            })
            .collect();
        Tsca {
            state,
            center: target.position.to_vector(),
            velocity: target.velocity(),
            faces,
        }
    }
}
