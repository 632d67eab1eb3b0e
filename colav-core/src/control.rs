//! Nominal heading control and the safeguarding law.
//!
//! The nominal law steers toward the desired heading without any regard
//! for traffic. The safeguarding law then moves that command the least
//! possible distance into the admissible set of the active barrier.

use log::warn;

use crate::barrier::AdmissibleSet;
use crate::config::NominalControlConfig;
use crate::kinematics::{course_vector, rotation_s};

/// Nominal heading rate with its numeric guard status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NominalCommand {
    pub rate: f64,
    /// λ·|z̃1| had to be clamped to keep the denominator positive
    pub guard_triggered: bool,
}

/// Pluggable nominal heading-rate law
pub trait NominalControl: Send + Sync + std::fmt::Debug {
    fn heading_rate(&self, heading: f64, desired_heading: f64) -> NominalCommand;
}

/// Heading alignment law
///
/// ```text
///   z̃1 = z_dᵀ z,  z̃2 = (S z_d)ᵀ z
///   r_nom = -k1 z̃2 / sqrt(1 - λ² z̃1²)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HeadingAlignment {
    k1: f64,
    lambda: f64,
    margin: f64,
}

impl HeadingAlignment {
    pub fn new(config: &NominalControlConfig) -> Self {
        HeadingAlignment {
            k1: config.k1,
            lambda: config.lambda,
            margin: config.lambda_margin,
        }
    }
}

impl NominalControl for HeadingAlignment {
    fn heading_rate(&self, heading: f64, desired_heading: f64) -> NominalCommand {
        let z = course_vector(heading);
        let zd = course_vector(desired_heading);
        let z1 = zd.dot(&z);
        let z2 = (rotation_s() * zd).dot(&z);

        let limit = 1.0 - self.margin;
        let mut lz1 = self.lambda * z1.abs();
        let guard_triggered = lz1 > limit;
        if guard_triggered {
            warn!(
                "Heading alignment guard: lambda*|z1| = {:.6} clamped to {:.6}",
                lz1, limit
            );
            lz1 = limit;
        }

        NominalCommand {
            rate: -self.k1 * z2 / (1.0 - lz1 * lz1).sqrt(),
            guard_triggered,
        }
    }
}

/// Safe heading rate: the nominal rate clamped to the admissible set
pub fn safeguard(nominal: f64, admissible: &AdmissibleSet) -> f64 {
    admissible.clamp(nominal)
}
