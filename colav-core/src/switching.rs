//! Active constraint switching logic.
//!
//! Only one face of a critical area constrains the heading rate at a time.
//! The active face q moves to a candidate h only when
//!
//! ```text
//!   B1(h) <= max(0, B1(q))      (H1: no step deeper into the area)
//!   B2(h) <= B2(q) - δ          (H2: strict decrease by the hysteresis width)
//! ```
//!
//! and among the candidates the one with the smallest B2 wins, lowest index
//! first on ties. B2 of the active face can only drop by steps of δ, so two
//! faces cannot hand the constraint back and forth.

use log::debug;

use crate::barrier::FaceEvaluation;
use crate::encounter::EncounterState;

/// Index of the smallest B2, lowest index on ties
fn argmin_b2<'a>(candidates: impl Iterator<Item = (usize, &'a FaceEvaluation)>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, ev) in candidates {
        match best {
            Some((_, b2)) if ev.b2 >= b2 => {}
            _ => best = Some((i, ev.b2)),
        }
    }
    best.map(|(i, _)| i)
}

/// Switching decision for one set of evaluations.
///
/// Returns the current index when no face qualifies.
pub fn switch(evals: &[FaceEvaluation], current: usize, delta: f64) -> usize {
    let Some(active) = evals.get(current) else {
        return initial_index(evals);
    };
    let b1_limit = active.b1.max(0.0);
    let b2_limit = active.b2 - delta;

    argmin_b2(
        evals
            .iter()
            .enumerate()
            .filter(|(_, ev)| ev.b1 <= b1_limit && ev.b2 <= b2_limit),
    )
    .unwrap_or(current)
}

/// Face to start from on a fresh critical area
pub fn initial_index(evals: &[FaceEvaluation]) -> usize {
    argmin_b2(evals.iter().enumerate()).unwrap_or(0)
}

/// Active face of one target, persisted across cycles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveConstraintState {
    pub index: usize,
    /// B2 of the active face at the last evaluation
    pub b2: f64,
    /// Encounter state whose critical area `index` refers to
    pub tsca_state: EncounterState,
    seeded: bool,
}

impl Default for ActiveConstraintState {
    fn default() -> Self {
        ActiveConstraintState {
            index: 0,
            b2: f64::NAN,
            tsca_state: EncounterState::Safe,
            seeded: false,
        }
    }
}

impl ActiveConstraintState {
    /// Make sure `index` refers to a face of the critical area of `state`,
    /// reseeding to the smallest B2 when the area changed.
    ///
    /// Returns true when the index was reseeded.
    pub fn revalidate(&mut self, evals: &[FaceEvaluation], state: EncounterState) -> bool {
        let stale = !self.seeded || self.tsca_state != state || self.index >= evals.len();
        if stale {
            self.index = initial_index(evals);
            self.tsca_state = state;
            self.seeded = true;
        }
        if let Some(ev) = evals.get(self.index) {
            self.b2 = ev.b2;
        }
        stale
    }

    /// Revalidate, then apply the switching rule. Returns true on a switch.
    pub fn update(&mut self, evals: &[FaceEvaluation], state: EncounterState, delta: f64) -> bool {
        if self.revalidate(evals, state) {
            return false;
        }
        let next = switch(evals, self.index, delta);
        if next == self.index {
            return false;
        }
        debug!(
            "Active constraint {} -> {} (B2 {:.3} -> {:.3})",
            self.index, next, self.b2, evals[next].b2
        );
        self.index = next;
        self.b2 = evals[next].b2;
        true
    }
}
