//! # Engine Module
//!
//! The stateful layer that talks to the external geochemical reaction
//! engine. The engine itself is an opaque command sink; everything here is
//! about preparing exactly the right commands for it.
//!
//! ## Architecture
//!
//! - **Command Log** ([`commands`]) - The closed set of recorded engine
//!   operations and its on-disk YAML document
//! - **Replay** ([`replay`]) - Ordered re-application of a recorded log
//!   against an engine handle, with selective deferral
//! - **Script Generation** ([`script`]) - Per-cell reaction-engine input
//!   script regeneration from the configuration model
//! - **Error Handling** ([`error`]) - Engine-level error aggregation

pub mod commands;
pub mod error;
pub mod replay;
pub mod script;
