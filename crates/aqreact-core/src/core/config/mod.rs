//! Configuration model for the reactive-transport coupling.
//!
//! The on-disk configuration is a nested TOML document with a `reactive`
//! section (reaction-timing schedule) and one section per geochemical phase
//! group. In memory the same information lives in a typed
//! [`SimulationConfig`](model::SimulationConfig); the [`document`] module
//! holds the pure transforms between the nested document and the flat
//! `_`-joined attribute namespace used for programmatic updates.

pub mod document;
pub mod model;
pub mod schedule;

pub use document::ConfigError;
pub use model::{PhaseGroup, PhaseGroupKind, SimulationConfig};
pub use schedule::{ReactionSchedule, ReactionTiming, ScheduleError};
