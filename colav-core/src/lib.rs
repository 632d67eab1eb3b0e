//! # Colav Core
//!
//! Platform-independent collision avoidance core for surface vessels.
//!
//! This crate classifies the COLREGS encounter with every tracked target and
//! safeguards the own ship heading-rate command with control barrier
//! functions built on a polygonal critical area around each target. It has
//! **no I/O and no async dependencies**; the runtime lives in `colav-server`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  colav-core (pure, synchronous)                              │
//! │  ├── kinematics/  (NED state, ARPA record adapter)           │
//! │  ├── cpa          (closest point of approach)                │
//! │  ├── encounter/   (geometric classifier + state machine)     │
//! │  ├── tsca         (critical area per encounter)              │
//! │  ├── barrier      (B1, B2, Lie derivatives, admissible set)  │
//! │  ├── switching    (active face hysteresis)                   │
//! │  ├── control      (nominal law, safeguarding)                │
//! │  ├── predict      (Predictor trait, rollout)                 │
//! │  └── pipeline     (per-target tracker, registry)             │
//! └──────────────────────────────────────────────────────────────┘
//!                              ▲
//!               ┌──────────────┴──────────────┐
//!               │  colav-server               │
//!               │  (tokio, actor per target)  │
//!               └─────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use colav_core::{Colav, ColavConfig, EncounterState, OwnShipState, Position, TargetSnapshot};
//! use std::f64::consts::PI;
//!
//! let mut colav = Colav::new(ColavConfig::default()).unwrap();
//!
//! let own = OwnShipState::new(Position::new(0.0, 0.0), 0.0, 5.0, 0.0);
//! let target = TargetSnapshot::new("257000001", Position::new(100.0, 0.0), PI, 5.0);
//!
//! let report = colav.update(&own, &target);
//! assert_eq!(report.encounter, EncounterState::HeadOn);
//!
//! colav.remove("257000001");
//! assert!(colav.is_empty());
//! ```

pub mod barrier;
pub mod config;
pub mod control;
pub mod cpa;
pub mod encounter;
pub mod error;
pub mod kinematics;
pub mod pipeline;
pub mod predict;
pub mod switching;
pub mod tsca;

// Re-export commonly used types
pub use barrier::{AdmissibleSet, FaceEvaluation};
pub use config::{ColavConfig, DomainShape, TscaTemplate};
pub use control::{HeadingAlignment, NominalCommand, NominalControl};
pub use cpa::{calculate_cpa, CpaResult};
pub use encounter::{EncounterClassifier, EncounterState, EncounterStateMachine, Transition};
pub use error::{ConfigError, GeometryError};
pub use kinematics::{ArpaRecord, CycleInput, OwnShipState, Position, TargetId, TargetSnapshot};
pub use pipeline::{Colav, ColavContext, CycleReport, TargetReport, TargetTracker};
pub use predict::{rollout, KinematicPredictor, Predictor, Trajectory};
pub use switching::ActiveConstraintState;
pub use tsca::{Tsca, TscaBuilder};
