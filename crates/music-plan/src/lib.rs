//! Deterministic music planning for Jamboree.
//!
//! [`plan`] derives a complete [`MusicPlan`] (bpm, key, scale, section
//! structure, chord grid, production parameters) from a generation request.
//! Every choice flows through a PRNG seeded from the request itself, so the
//! same request always yields a structurally identical plan. [`events`]
//! expands a plan into the time-ordered one-shot grid the renderer places.
//!
//! Both operations are pure: no I/O, no clocks.

pub mod genres;
pub mod moods;
pub mod pitch;
pub mod planner;
pub mod sequencer;
pub mod types;

pub use planner::{derive_seed, plan};
pub use sequencer::events;
pub use types::{Event, EventKind, MusicPlan, PlanError, PlanRequest, Scale, Section};
