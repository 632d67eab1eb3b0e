//! Per-target encounter state machine.
//!
//! SAFE is the initial state and the only hub: every other state is entered
//! from SAFE and left towards SAFE.
//!
//! ```text
//!          entry gate && label == X
//!   SAFE ─────────────────────────────▶ X
//!    ▲                                  │
//!    └──────────── exit gate ───────────┘
//! ```
//!
//! While in X the geometric label is ignored; only the exit gate can end
//! the encounter. This keeps the classification from chattering when the
//! geometry sits near a sector boundary.

use log::info;

use super::EncounterState;
use crate::config::GateConfig;
use crate::cpa::CpaResult;

/// A state change produced by [`EncounterStateMachine::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Entered(EncounterState),
    Exited(EncounterState),
}

#[derive(Debug, Clone)]
pub struct EncounterStateMachine {
    state: EncounterState,
    gates: GateConfig,
    /// CPA used by the most recent update
    last_cpa: Option<CpaResult>,
}

impl EncounterStateMachine {
    pub fn new(gates: GateConfig) -> Self {
        EncounterStateMachine {
            state: EncounterState::default(),
            gates,
            last_cpa: None,
        }
    }

    pub fn state(&self) -> EncounterState {
        self.state
    }

    pub fn last_cpa(&self) -> Option<&CpaResult> {
        self.last_cpa.as_ref()
    }

    /// `D@CPA < d_entry_max && t_entry_min < T2CPA < t_entry_max`
    pub fn entry_condition(&self, cpa: &CpaResult) -> bool {
        let g = &self.gates;
        cpa.d_at_cpa < g.d_entry_max && cpa.t_2_cpa > g.t_entry_min && cpa.t_2_cpa < g.t_entry_max
    }

    /// `D@CPA >= d_exit_min || T2CPA < t_exit_min || T2CPA > t_exit_max`.
    ///
    /// A missing or malformed CPA always satisfies the exit condition.
    pub fn exit_condition(&self, cpa: Option<&CpaResult>) -> bool {
        let g = &self.gates;
        match cpa {
            Some(cpa) if cpa.d_at_cpa.is_finite() && cpa.t_2_cpa.is_finite() => {
                cpa.d_at_cpa >= g.d_exit_min
                    || cpa.t_2_cpa < g.t_exit_min
                    || cpa.t_2_cpa > g.t_exit_max
            }
            _ => true,
        }
    }

    /// Advance one cycle with this cycle's geometric label and CPA.
    ///
    /// At most one transition happens per call.
    pub fn update(
        &mut self,
        label: EncounterState,
        cpa: Option<CpaResult>,
    ) -> Option<Transition> {
        self.last_cpa = cpa;

        if self.state.is_safe() {
            let enter = match cpa.as_ref() {
                Some(cpa) => {
                    !label.is_safe()
                        && label != EncounterState::Emergency
                        && self.entry_condition(cpa)
                }
                None => false,
            };
            if enter {
                self.state = label;
                return Some(Transition::Entered(label));
            }
        } else if self.exit_condition(cpa.as_ref()) {
            let previous = self.state;
            self.state = EncounterState::Safe;
            return Some(Transition::Exited(previous));
        }
        None
    }

    /// Fall back to SAFE unconditionally (degenerate geometry)
    pub fn fail_safe(&mut self) -> Option<Transition> {
        self.update(EncounterState::Safe, None)
    }
}

/// Log a transition for a target
pub(crate) fn log_transition(target_id: &str, transition: &Transition, cpa: Option<&CpaResult>) {
    let (d, t) = cpa.map_or((f64::NAN, f64::NAN), |c| (c.d_at_cpa, c.t_2_cpa));
    match transition {
        Transition::Entered(state) => info!(
            "Target {}: SAFE -> {} (D@CPA {:.1} m, T2CPA {:.1} s)",
            target_id, state, d, t
        ),
        Transition::Exited(state) => info!(
            "Target {}: {} -> SAFE (D@CPA {:.1} m, T2CPA {:.1} s)",
            target_id, state, d, t
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::Position;

    fn gates() -> GateConfig {
        GateConfig {
            d_entry_max: 150.0,
            t_entry_min: 0.0,
            t_entry_max: 300.0,
            d_exit_min: 250.0,
            t_exit_min: 0.0,
            t_exit_max: 330.0,
        }
    }

    fn cpa(d_at_cpa: f64, t_2_cpa: f64) -> CpaResult {
        CpaResult {
            d_at_cpa,
            t_2_cpa,
            d_2_cpa: 0.0,
            own_at_cpa: Position::default(),
            target_at_cpa: Position::default(),
        }
    }

    #[test]
    fn test_enters_on_label_with_entry_gate() {
        let mut sm = EncounterStateMachine::new(gates());
        assert_eq!(EncounterState::default(), EncounterState::Safe);
        assert_eq!(sm.state(), EncounterState::Safe);

        let t = sm.update(EncounterState::HeadOn, Some(cpa(10.0, 100.0)));
        assert_eq!(t, Some(Transition::Entered(EncounterState::HeadOn)));
        assert_eq!(sm.state(), EncounterState::HeadOn);
        assert_eq!(sm.last_cpa().map(|c| c.t_2_cpa), Some(100.0));
    }

    #[test]
    fn test_entry_gate_blocks() {
        let mut sm = EncounterStateMachine::new(gates());
        // Too far in the future
        assert_eq!(sm.update(EncounterState::HeadOn, Some(cpa(10.0, 400.0))), None);
        // CPA in the past
        assert_eq!(sm.update(EncounterState::HeadOn, Some(cpa(10.0, -5.0))), None);
        // Passing wide
        assert_eq!(sm.update(EncounterState::HeadOn, Some(cpa(150.0, 100.0))), None);
        // Geometric SAFE never enters
        assert_eq!(sm.update(EncounterState::Safe, Some(cpa(10.0, 100.0))), None);
        // No CPA never enters
        assert_eq!(sm.update(EncounterState::GiveWay, None), None);
        assert_eq!(sm.state(), EncounterState::Safe);
    }

    #[test]
    fn test_no_chatter_while_exit_gate_false() {
        let mut sm = EncounterStateMachine::new(gates());
        sm.update(EncounterState::HeadOn, Some(cpa(10.0, 100.0)));

        for i in 0..50 {
            let label = if i % 2 == 0 {
                EncounterState::GiveWay
            } else {
                EncounterState::HeadOn
            };
            // D@CPA between entry and exit thresholds keeps exit false
            let t = sm.update(label, Some(cpa(200.0, 100.0 - i as f64)));
            assert_eq!(t, None);
            assert_eq!(sm.state(), EncounterState::HeadOn);
        }
    }

    #[test]
    fn test_exit_on_first_cycle_gate_holds() {
        let mut sm = EncounterStateMachine::new(gates());
        sm.update(EncounterState::GiveWay, Some(cpa(10.0, 100.0)));

        // Geometric label still says GIVEWAY, exit gate fires on distance
        let t = sm.update(EncounterState::GiveWay, Some(cpa(260.0, 100.0)));
        assert_eq!(t, Some(Transition::Exited(EncounterState::GiveWay)));
        assert_eq!(sm.state(), EncounterState::Safe);
    }

    #[test]
    fn test_exit_on_time_gates() {
        let mut sm = EncounterStateMachine::new(gates());
        sm.update(EncounterState::StandOn, Some(cpa(10.0, 100.0)));
        // CPA passed
        assert!(sm.update(EncounterState::StandOn, Some(cpa(10.0, -0.1))).is_some());

        sm.update(EncounterState::StandOn, Some(cpa(10.0, 100.0)));
        assert_eq!(sm.state(), EncounterState::StandOn);
        // Beyond t_exit_max
        assert!(sm.update(EncounterState::StandOn, Some(cpa(10.0, 331.0))).is_some());
    }

    #[test]
    fn test_no_direct_transition_between_encounters() {
        let mut sm = EncounterStateMachine::new(gates());
        sm.update(EncounterState::HeadOn, Some(cpa(10.0, 100.0)));
        // Exit cycle goes to SAFE even if the label is another encounter
        let t = sm.update(EncounterState::GiveWay, Some(cpa(300.0, 100.0)));
        assert_eq!(t, Some(Transition::Exited(EncounterState::HeadOn)));
        assert_eq!(sm.state(), EncounterState::Safe);
        // Next cycle may enter the new encounter
        let t = sm.update(EncounterState::GiveWay, Some(cpa(10.0, 100.0)));
        assert_eq!(t, Some(Transition::Entered(EncounterState::GiveWay)));
    }

    #[test]
    fn test_missing_cpa_fails_safe() {
        let mut sm = EncounterStateMachine::new(gates());
        sm.update(EncounterState::HeadOn, Some(cpa(10.0, 100.0)));
        assert_eq!(sm.fail_safe(), Some(Transition::Exited(EncounterState::HeadOn)));
        assert_eq!(sm.state(), EncounterState::Safe);

        sm.update(EncounterState::HeadOn, Some(cpa(10.0, 100.0)));
        let t = sm.update(EncounterState::HeadOn, Some(cpa(f64::NAN, 100.0)));
        assert_eq!(t, Some(Transition::Exited(EncounterState::HeadOn)));
    }
}
