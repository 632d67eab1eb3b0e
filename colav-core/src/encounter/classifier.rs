//! Geometric encounter classifying method.
//!
//! The bearing plane around a ship is split into four sectors by a pair of
//! thresholds θ1 < θ2:
//!
//! ```text
//!                 0
//!        2π-θ1    |    θ1
//!             \ 1 | 1 /
//!        4     \  |  /     2
//!  2π-θ2 ------- ship ------- θ2
//!               /   \
//!              /  3  \
//! ```
//!
//! Every sector is half-open: the lower bound belongs to the sector, the
//! upper bound to the next one.

use log::trace;

use super::EncounterState;
use crate::error::GeometryError;
use crate::kinematics::{normalize_angle, OwnShipState, Relative, TargetSnapshot, TWO_PI};

const MIN_RANGE: f64 = 1e-9;

/// One of the four bearing sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sector {
    /// [2π-θ1, θ1) through 0
    Ahead = 1,
    /// [θ1, θ2)
    Starboard = 2,
    /// [θ2, 2π-θ2)
    Astern = 3,
    /// [2π-θ2, 2π-θ1)
    Port = 4,
}

impl Sector {
    fn index(&self) -> usize {
        *self as usize - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeSituation {
    Increasing = 0,
    Closing = 1,
}

/// Sector of an angle, using modular arithmetic and half-open bounds
pub fn classify_sector(angle: f64, theta1: f64, theta2: f64) -> Sector {
    let a = normalize_angle(angle);
    if a >= theta1 && a < theta2 {
        Sector::Starboard
    } else if a >= theta2 && a < TWO_PI - theta2 {
        Sector::Astern
    } else if a >= TWO_PI - theta2 && a < TWO_PI - theta1 {
        Sector::Port
    } else {
        Sector::Ahead
    }
}

/// CLOSING when the relative position and velocity point against each other
pub fn range_situation(rel: &Relative) -> RangeSituation {
    if rel.position.dot(&rel.velocity) <= 0.0 {
        RangeSituation::Closing
    } else {
        RangeSituation::Increasing
    }
}

/// Entry of the encounter table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Fixed(EncounterState),
    /// Overtaking; port or starboard depends on which half of the astern
    /// situation sector the target course lies in
    OvertakingBySide,
}

use EncounterState::{GiveWay, HeadOn, OvertakingPort, OvertakingStarboard, Safe, StandOn};

const fn f(state: EncounterState) -> Cell {
    Cell::Fixed(state)
}

/// Encounter table indexed `[RBS - 1][SS - 1][RS]` with RS = 0 increasing,
/// 1 closing.
static ENCOUNTER_TABLE: [[[Cell; 2]; 4]; 4] = [
    // RBS 1: target ahead
    [
        [f(HeadOn), f(HeadOn)],
        [f(GiveWay), f(GiveWay)],
        [f(Safe), Cell::OvertakingBySide],
        [f(StandOn), f(StandOn)],
    ],
    // RBS 2: target on starboard side
    [
        [f(GiveWay), f(GiveWay)],
        [f(GiveWay), f(GiveWay)],
        [f(Safe), f(OvertakingStarboard)],
        [f(Safe), f(Safe)],
    ],
    // RBS 3: target astern
    [
        [f(Safe), f(StandOn)],
        [f(Safe), f(StandOn)],
        [f(Safe), f(Safe)],
        [f(Safe), f(StandOn)],
    ],
    // RBS 4: target on port side
    [
        [f(StandOn), f(StandOn)],
        [f(Safe), f(Safe)],
        [f(Safe), f(OvertakingPort)],
        [f(StandOn), f(StandOn)],
    ],
];

/// Look up the table entry for a (RBS, SS, RS) triple
pub fn lookup(rbs: Sector, ss: Sector, rs: RangeSituation) -> Cell {
    ENCOUNTER_TABLE[rbs.index()][ss.index()][rs as usize]
}

/// Outcome of one geometric classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: EncounterState,
    pub rbs: Sector,
    pub ss: Sector,
    pub rs: RangeSituation,
}

/// Geometric classifier, configured with the sector thresholds
#[derive(Debug, Clone, Copy)]
pub struct EncounterClassifier {
    theta1: f64,
    theta2: f64,
}

impl EncounterClassifier {
    /// Thresholds are expected to be validated (0 < θ1 < θ2 < π)
    pub fn new(theta1: f64, theta2: f64) -> Self {
        EncounterClassifier { theta1, theta2 }
    }

    /// Relative bearing of the target as seen from own ship, in [0, 2π)
    pub fn relative_bearing(own: &OwnShipState, rel: &Relative) -> f64 {
        normalize_angle(rel.position.y.atan2(rel.position.x) - own.course)
    }

    /// Classify one snapshot.
    ///
    /// Fails with [`GeometryError::CoincidentPositions`] when the target sits
    /// on top of own ship and the bearing is undefined.
    pub fn classify(
        &self,
        own: &OwnShipState,
        target: &TargetSnapshot,
    ) -> Result<Classification, GeometryError> {
        if !own.is_finite() || !target.is_finite() {
            return Err(GeometryError::NonFiniteInput);
        }

        let rel = Relative::new(own, target);
        if rel.position.norm() < MIN_RANGE {
            return Err(GeometryError::CoincidentPositions);
        }

        let phi = Self::relative_bearing(own, &rel);
        let rbs = classify_sector(phi, self.theta1, self.theta2);

        // Bearing of own ship as seen from the target; rotating the sector
        // thresholds by it is the same as classifying the course offset.
        let phi_ts = normalize_angle(rel.position.y.atan2(rel.position.x) + std::f64::consts::PI);
        let course_offset = normalize_angle(target.course - phi_ts);
        let ss = classify_sector(course_offset, self.theta1, self.theta2);

        let rs = range_situation(&rel);

        let label = match lookup(rbs, ss, rs) {
            Cell::Fixed(state) => state,
            Cell::OvertakingBySide => {
                if course_offset < std::f64::consts::PI {
                    OvertakingPort
                } else {
                    OvertakingStarboard
                }
            }
        };

        trace!(
            "Target {}: phi={:.3} rbs={:?} ss={:?} rs={:?} -> {}",
            target.id, phi, rbs, ss, rs, label
        );

        Ok(Classification { label, rbs, ss, rs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::Position;
    use std::f64::consts::PI;

    const T1: f64 = 20.0 * PI / 180.0;
    const T2: f64 = 120.0 * PI / 180.0;

    const SECTORS: [Sector; 4] = [Sector::Ahead, Sector::Starboard, Sector::Astern, Sector::Port];

    fn own() -> OwnShipState {
        OwnShipState::new(Position::new(0.0, 0.0), 0.0, 5.0, 0.0)
    }

    #[test]
    fn test_sector_interiors() {
        assert_eq!(classify_sector(0.0, T1, T2), Sector::Ahead);
        assert_eq!(classify_sector(0.1, T1, T2), Sector::Ahead);
        assert_eq!(classify_sector(TWO_PI - 0.1, T1, T2), Sector::Ahead);
        assert_eq!(classify_sector(PI / 2.0, T1, T2), Sector::Starboard);
        assert_eq!(classify_sector(PI, T1, T2), Sector::Astern);
        assert_eq!(classify_sector(1.5 * PI, T1, T2), Sector::Port);
        // Unwrapped input is handled modulo 2π
        assert_eq!(classify_sector(-0.1, T1, T2), Sector::Ahead);
        assert_eq!(classify_sector(-PI / 2.0, T1, T2), Sector::Port);
        assert_eq!(classify_sector(PI / 2.0 + TWO_PI, T1, T2), Sector::Starboard);
    }

    #[test]
    fn test_sector_boundaries_are_half_open() {
        assert_eq!(classify_sector(T1, T1, T2), Sector::Starboard);
        assert_eq!(classify_sector(T2, T1, T2), Sector::Astern);
        assert_eq!(classify_sector(TWO_PI - T2, T1, T2), Sector::Port);
        assert_eq!(classify_sector(TWO_PI - T1, T1, T2), Sector::Ahead);

        // Just below each boundary falls in the previous sector
        let eps = 1e-9;
        assert_eq!(classify_sector(T1 - eps, T1, T2), Sector::Ahead);
        assert_eq!(classify_sector(T2 - eps, T1, T2), Sector::Starboard);
        assert_eq!(classify_sector(TWO_PI - T2 - eps, T1, T2), Sector::Astern);
        assert_eq!(classify_sector(TWO_PI - T1 - eps, T1, T2), Sector::Port);
    }

    #[test]
    fn test_table_is_exhaustive() {
        for rbs in SECTORS {
            for ss in SECTORS {
                for rs in [RangeSituation::Increasing, RangeSituation::Closing] {
                    match lookup(rbs, ss, rs) {
                        Cell::Fixed(state) => assert_ne!(state, EncounterState::Emergency),
                        Cell::OvertakingBySide => {
                            assert_eq!((rbs, ss, rs), (Sector::Ahead, Sector::Astern, RangeSituation::Closing))
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_table_entries() {
        use RangeSituation::*;
        assert_eq!(lookup(Sector::Ahead, Sector::Ahead, Closing), Cell::Fixed(HeadOn));
        assert_eq!(lookup(Sector::Starboard, Sector::Starboard, Closing), Cell::Fixed(GiveWay));
        assert_eq!(lookup(Sector::Port, Sector::Port, Closing), Cell::Fixed(StandOn));
        assert_eq!(lookup(Sector::Starboard, Sector::Astern, Closing), Cell::Fixed(OvertakingStarboard));
        assert_eq!(lookup(Sector::Starboard, Sector::Astern, Increasing), Cell::Fixed(Safe));
        assert_eq!(lookup(Sector::Port, Sector::Astern, Closing), Cell::Fixed(OvertakingPort));
        assert_eq!(lookup(Sector::Astern, Sector::Ahead, Closing), Cell::Fixed(StandOn));
        assert_eq!(lookup(Sector::Astern, Sector::Ahead, Increasing), Cell::Fixed(Safe));
        assert_eq!(lookup(Sector::Ahead, Sector::Astern, Increasing), Cell::Fixed(Safe));
    }

    #[test]
    fn test_head_on() {
        let target = TargetSnapshot::new("1", Position::new(100.0, 0.0), PI, 5.0);
        let c = EncounterClassifier::new(T1, T2).classify(&own(), &target).unwrap();
        assert_eq!(c.rbs, Sector::Ahead);
        assert_eq!(c.ss, Sector::Ahead);
        assert_eq!(c.rs, RangeSituation::Closing);
        assert_eq!(c.label, HeadOn);
    }

    #[test]
    fn test_crossing_from_starboard_is_give_way() {
        let target = TargetSnapshot::new("1", Position::new(500.0, 500.0), 1.5 * PI, 5.0);
        let c = EncounterClassifier::new(T1, T2).classify(&own(), &target).unwrap();
        assert_eq!(c.rbs, Sector::Starboard);
        assert_eq!(c.rs, RangeSituation::Closing);
        assert_eq!(c.label, GiveWay);
    }

    #[test]
    fn test_crossing_from_port_is_stand_on() {
        let target = TargetSnapshot::new("1", Position::new(500.0, -500.0), PI / 2.0, 5.0);
        let c = EncounterClassifier::new(T1, T2).classify(&own(), &target).unwrap();
        assert_eq!(c.rbs, Sector::Port);
        assert_eq!(c.rs, RangeSituation::Closing);
        assert_eq!(c.label, StandOn);
    }

    #[test]
    fn test_overtaking_side() {
        let classifier = EncounterClassifier::new(T1, T2);
        let fast = OwnShipState::new(Position::new(0.0, 0.0), 0.0, 10.0, 0.0);

        // Slow target dead ahead, heading slightly to port of our course
        let port = TargetSnapshot::new("1", Position::new(300.0, 0.0), -0.3, 2.0);
        assert_eq!(classifier.classify(&fast, &port).unwrap().label, OvertakingPort);

        // Heading slightly to starboard
        let starboard = TargetSnapshot::new("2", Position::new(300.0, 0.0), 0.3, 2.0);
        assert_eq!(
            classifier.classify(&fast, &starboard).unwrap().label,
            OvertakingStarboard
        );
    }

    #[test]
    fn test_coincident_target() {
        let target = TargetSnapshot::new("1", Position::new(0.0, 0.0), PI, 5.0);
        assert_eq!(
            EncounterClassifier::new(T1, T2).classify(&own(), &target),
            Err(GeometryError::CoincidentPositions)
        );
    }

    #[test]
    fn test_relative_bearing_uses_own_course() {
        // Own ship heading east, target north of us is on the port side
        let own = OwnShipState::new(Position::new(0.0, 0.0), PI / 2.0, 5.0, PI / 2.0);
        let target = TargetSnapshot::new("1", Position::new(100.0, 0.0), 0.0, 0.0);
        let rel = Relative::new(&own, &target);
        let phi = EncounterClassifier::relative_bearing(&own, &rel);
        assert!((phi - 1.5 * PI).abs() < 1e-12);
    }
}
