//! COLREGS encounter classification
//!
//! Two stages:
//!
//! - **classifier**: pure geometric method mapping one (own ship, target)
//!   snapshot to a situation label via relative bearing sector (RBS),
//!   situation sector (SS) and range situation (RS)
//! - **state_machine**: one instance per target, turns the flickering
//!   geometric label into a sticky classification using CPA entry/exit gates

use serde::{Deserialize, Serialize};

mod classifier;
mod state_machine;

pub use classifier::{
    classify_sector, lookup, range_situation, Cell, Classification, EncounterClassifier,
    RangeSituation, Sector,
};
pub use state_machine::{EncounterStateMachine, Transition};
pub(crate) use state_machine::log_transition;

/// Encounter type between own ship and one target
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum EncounterState {
    #[default]
    #[serde(rename = "SAFE")]
    Safe,
    #[serde(rename = "OVERTAKING_STARBOARD")]
    OvertakingStarboard,
    #[serde(rename = "OVERTAKING_PORT")]
    OvertakingPort,
    #[serde(rename = "HEADON")]
    HeadOn,
    #[serde(rename = "GIVEWAY")]
    GiveWay,
    #[serde(rename = "STANDON")]
    StandOn,
    /// Reserved. Nothing transitions into this state.
    #[serde(rename = "EMERGENCY")]
    Emergency,
}

impl EncounterState {
    /// States that carry a critical area template
    pub const ACTIVE: [EncounterState; 6] = [
        EncounterState::Safe,
        EncounterState::OvertakingStarboard,
        EncounterState::OvertakingPort,
        EncounterState::HeadOn,
        EncounterState::GiveWay,
        EncounterState::StandOn,
    ];

    /// Numeric code used on the wire (1..6, 7 reserved)
    pub fn code(&self) -> u8 {
        match self {
            EncounterState::Safe => 1,
            EncounterState::OvertakingStarboard => 2,
            EncounterState::OvertakingPort => 3,
            EncounterState::HeadOn => 4,
            EncounterState::GiveWay => 5,
            EncounterState::StandOn => 6,
            EncounterState::Emergency => 7,
        }
    }

    pub fn is_safe(&self) -> bool {
        *self == EncounterState::Safe
    }
}

impl std::fmt::Display for EncounterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncounterState::Safe => write!(f, "SAFE"),
            EncounterState::OvertakingStarboard => write!(f, "OVERTAKING_STARBOARD"),
            EncounterState::OvertakingPort => write!(f, "OVERTAKING_PORT"),
            EncounterState::HeadOn => write!(f, "HEADON"),
            EncounterState::GiveWay => write!(f, "GIVEWAY"),
            EncounterState::StandOn => write!(f, "STANDON"),
            EncounterState::Emergency => write!(f, "EMERGENCY"),
        }
    }
}
