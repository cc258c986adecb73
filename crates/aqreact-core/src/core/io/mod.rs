//! File I/O for externally edited model data.
//!
//! Layer field files are the editable interface between the modeler and the
//! regeneration pipeline: one flat numeric file per (phase group, species,
//! layer) triple, merged here into grid-consistent 3-D arrays.

pub mod layers;
