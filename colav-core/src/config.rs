//! Static configuration for the collision avoidance pipeline.
//!
//! Everything is loaded once and validated before the first cycle; an
//! invalid configuration is fatal. Angles are radians, distances meters,
//! times seconds.
//!
//! JSON uses camelCase field names. Every section falls back to its
//! defaults when omitted, so a partial file such as
//!
//! ```json
//! { "barrier": { "gamma1": 0.3 }, "safetyRadius": 40.0 }
//! ```
//!
//! is accepted. Note that the default CPA gates are derived from the
//! default safety radius; when changing `safetyRadius` also set `gates`.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::encounter::EncounterState;
use crate::error::ConfigError;

/// Normals shorter than this are treated as zero-length
const MIN_NORMAL_LENGTH: f64 = 1e-9;

// =============================================================================
// Sections
// =============================================================================

/// Sector thresholds of the geometric classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    /// Boundary between the ahead sector and the side sectors
    pub theta1: f64,
    /// Boundary between the side sectors and the astern sector
    pub theta2: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            theta1: 20f64.to_radians(),
            theta2: 120f64.to_radians(),
        }
    }
}

/// CPA entry and exit gates of the encounter state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateConfig {
    pub d_entry_max: f64,
    pub t_entry_min: f64,
    pub t_entry_max: f64,
    pub d_exit_min: f64,
    pub t_exit_min: f64,
    pub t_exit_max: f64,
}

impl GateConfig {
    /// Gates scaled to a safety radius
    pub fn for_safety_radius(radius: f64) -> Self {
        GateConfig {
            d_entry_max: 1.5 * radius,
            t_entry_min: 0.0,
            t_entry_max: 600.0,
            d_exit_min: 2.0 * radius,
            t_exit_min: 0.0,
            t_exit_max: 650.0,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig::for_safety_radius(DEFAULT_SAFETY_RADIUS)
    }
}

/// Barrier tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BarrierConfig {
    /// Gain of the first backstepping stage (B2 = L_f B1 + γ1 B1).
    ///
    /// Bounds the closing speed on a face to γ1 times the distance left to
    /// it. Large values let the command react later than the heading rate
    /// limit can follow.
    pub gamma1: f64,
    /// Gain of the admissible input set (L_f B2 + L_g B2 r ≤ −γ2 B2)
    pub gamma2: f64,
    /// Hysteresis width of the switching logic
    pub delta: f64,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        BarrierConfig {
            gamma1: 0.05,
            gamma2: 0.025,
            delta: 0.5,
        }
    }
}

/// Heading alignment law tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NominalControlConfig {
    pub k1: f64,
    pub lambda: f64,
    /// λ·|z̃1| is clamped to at most `1 - lambda_margin`
    pub lambda_margin: f64,
}

impl Default for NominalControlConfig {
    fn default() -> Self {
        NominalControlConfig {
            k1: 1.0,
            lambda: 0.5,
            lambda_margin: 1e-3,
        }
    }
}

/// Shape of the safety domain enforced around a target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainShape {
    /// Critical area polygon selected by the encounter state
    #[default]
    Polygon,
    /// Circle of the safety radius, independent of the encounter state
    Circle,
}

/// Trajectory prediction settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictionConfig {
    /// Integration step (s)
    pub dt: f64,
    /// Prediction horizon (s)
    pub horizon: f64,
    /// Saturation of the heading rate command (rad/s)
    pub max_heading_rate: f64,
    pub domain_shape: DomainShape,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        PredictionConfig {
            dt: 0.2,
            horizon: 600.0,
            max_heading_rate: 0.18,
            domain_shape: DomainShape::Polygon,
        }
    }
}

// =============================================================================
// Critical area templates
// =============================================================================

/// One face of a critical area template.
///
/// `distance` is in units of the target's safety radius and `normal` is
/// in the target's body frame (`[forward, starboard]`). Both are turned
/// into NED meters each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceConfig {
    pub distance: f64,
    pub normal: [f64; 2],
}

impl FaceConfig {
    /// Face whose outward normal points `angle_deg` clockwise from the bow
    pub fn at_bearing(angle_deg: f64, distance: f64) -> Self {
        let a = angle_deg.to_radians();
        FaceConfig {
            distance,
            normal: [a.cos(), a.sin()],
        }
    }

    /// Body-frame angle of the normal in `[0, 2π)`
    pub fn normal_angle(&self) -> f64 {
        crate::kinematics::normalize_angle(self.normal[1].atan2(self.normal[0]))
    }

    fn normal_length(&self) -> f64 {
        self.normal[0].hypot(self.normal[1])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TscaTemplate {
    pub faces: Vec<FaceConfig>,
}

impl TscaTemplate {
    /// Build from `(normal bearing in degrees, distance)` pairs
    pub fn from_bearings(faces: &[(f64, f64)]) -> Self {
        TscaTemplate {
            faces: faces
                .iter()
                .map(|&(angle, distance)| FaceConfig::at_bearing(angle, distance))
                .collect(),
        }
    }

    /// Regular polygon with `n` faces at the same distance
    pub fn regular(n: usize, distance: f64) -> Self {
        TscaTemplate {
            faces: (0..n)
                .map(|i| FaceConfig::at_bearing(360.0 * i as f64 / n as f64, distance))
                .collect(),
        }
    }

    /// Check that the faces bound a closed polygon containing the target.
    ///
    /// Half-plane intersections are always convex. The polygon is bounded
    /// iff no angular gap between consecutive normals reaches π, and it
    /// contains the target iff every distance is positive.
    pub fn validate(&self, state: EncounterState) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTemplate { state, reason };

        if self.faces.len() < 3 {
            return Err(invalid(format!(
                "needs at least 3 faces, has {}",
                self.faces.len()
            )));
        }

        for (i, face) in self.faces.iter().enumerate() {
            if !(face.distance.is_finite() && face.distance > 0.0) {
                return Err(invalid(format!(
                    "face {} has non-positive distance {}",
                    i, face.distance
                )));
            }
            let len = face.normal_length();
            if !len.is_finite() || len < MIN_NORMAL_LENGTH {
                return Err(invalid(format!("face {} has a zero-length normal", i)));
            }
        }

        let mut angles: Vec<f64> = self.faces.iter().map(FaceConfig::normal_angle).collect();
        angles.sort_by(f64::total_cmp);

        let mut max_gap = angles[0] + 2.0 * PI - angles[angles.len() - 1];
        for pair in angles.windows(2) {
            max_gap = max_gap.max(pair[1] - pair[0]);
        }
        if max_gap >= PI - 1e-9 {
            return Err(invalid(format!(
                "polygon is open, normals leave a gap of {:.1} degrees",
                max_gap.to_degrees()
            )));
        }

        Ok(())
    }
}

/// Default templates, shaped after the COLREGS role in each encounter:
/// long ahead of a head-on or give-way target, wider on the side own
/// ship is supposed to pass.
pub fn default_templates() -> BTreeMap<EncounterState, TscaTemplate> {
    let mut map = BTreeMap::new();
    map.insert(EncounterState::Safe, TscaTemplate::regular(8, 1.0));
    map.insert(
        EncounterState::HeadOn,
        TscaTemplate::from_bearings(&[
            (0.0, 3.0),
            (60.0, 2.5),
            (120.0, 1.0),
            (180.0, 1.0),
            (240.0, 1.0),
            (300.0, 1.5),
        ]),
    );
    map.insert(
        EncounterState::GiveWay,
        TscaTemplate::from_bearings(&[
            (0.0, 4.0),
            (60.0, 2.0),
            (120.0, 1.0),
            (180.0, 1.0),
            (240.0, 1.0),
            (300.0, 2.0),
        ]),
    );
    map.insert(
        EncounterState::StandOn,
        TscaTemplate::from_bearings(&[(0.0, 2.0), (90.0, 1.5), (180.0, 1.0), (270.0, 1.5)]),
    );
    map.insert(
        EncounterState::OvertakingStarboard,
        TscaTemplate::from_bearings(&[(0.0, 2.0), (90.0, 1.5), (180.0, 2.0), (270.0, 1.0)]),
    );
    map.insert(
        EncounterState::OvertakingPort,
        TscaTemplate::from_bearings(&[(0.0, 2.0), (90.0, 1.0), (180.0, 2.0), (270.0, 1.5)]),
    );
    map
}

// =============================================================================
// Top level
// =============================================================================

pub const DEFAULT_SAFETY_RADIUS: f64 = 25.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColavConfig {
    pub classifier: ClassifierConfig,
    pub gates: GateConfig,
    pub barrier: BarrierConfig,
    pub nominal: NominalControlConfig,
    pub prediction: PredictionConfig,
    /// Critical area template per encounter state
    pub tsca: BTreeMap<EncounterState, TscaTemplate>,
    /// Safety radius (m) used when a target does not carry its own
    pub safety_radius: f64,
    /// A CPA ahead within this factor of the safety radius is a close approach
    pub safety_radius_tolerance: f64,
    /// Targets whose CPA lies further from own ship are not relevant
    pub max_distance_to_cpa: f64,
}

impl Default for ColavConfig {
    fn default() -> Self {
        ColavConfig {
            classifier: ClassifierConfig::default(),
            gates: GateConfig::default(),
            barrier: BarrierConfig::default(),
            nominal: NominalControlConfig::default(),
            prediction: PredictionConfig::default(),
            tsca: default_templates(),
            safety_radius: DEFAULT_SAFETY_RADIUS,
            safety_radius_tolerance: 1.5,
            max_distance_to_cpa: 2000.0,
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn in_open_range(name: &'static str, value: f64, low: f64, high: f64) -> Result<(), ConfigError> {
    if value > low && value < high {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            low,
            high,
        })
    }
}

impl ColavConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ColavConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.classifier;
        if !(c.theta1 > 0.0 && c.theta1 < c.theta2 && c.theta2 < PI) {
            return Err(ConfigError::InvalidSectors {
                theta1: c.theta1,
                theta2: c.theta2,
            });
        }

        positive("gamma1", self.barrier.gamma1)?;
        positive("gamma2", self.barrier.gamma2)?;
        positive("delta", self.barrier.delta)?;
        positive("k1", self.nominal.k1)?;
        in_open_range("lambda", self.nominal.lambda, 0.0, 1.0)?;
        in_open_range("lambdaMargin", self.nominal.lambda_margin, 0.0, 1.0)?;
        positive("dt", self.prediction.dt)?;
        positive("horizon", self.prediction.horizon)?;
        positive("maxHeadingRate", self.prediction.max_heading_rate)?;
        positive("safetyRadius", self.safety_radius)?;
        positive("safetyRadiusTolerance", self.safety_radius_tolerance)?;
        positive("maxDistanceToCpa", self.max_distance_to_cpa)?;

        self.validate_gates()?;

        for state in EncounterState::ACTIVE {
            match self.tsca.get(&state) {
                Some(template) => template.validate(state)?,
                None => return Err(ConfigError::MissingTemplate(state)),
            }
        }
        Ok(())
    }

    fn validate_gates(&self) -> Result<(), ConfigError> {
        let g = &self.gates;
        positive("dEntryMax", g.d_entry_max)?;
        if !(g.t_entry_min < g.t_entry_max) {
            return Err(ConfigError::InconsistentGates(format!(
                "tEntryMin {} must be below tEntryMax {}",
                g.t_entry_min, g.t_entry_max
            )));
        }
        if !(g.t_exit_min < g.t_exit_max) {
            return Err(ConfigError::InconsistentGates(format!(
                "tExitMin {} must be below tExitMax {}",
                g.t_exit_min, g.t_exit_max
            )));
        }
        if !(g.d_exit_min >= g.d_entry_max) {
            return Err(ConfigError::InconsistentGates(format!(
                "dExitMin {} must not be below dEntryMax {}",
                g.d_exit_min, g.d_entry_max
            )));
        }
        Ok(())
    }
}
