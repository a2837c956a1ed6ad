//! Core library for the cytorun application.
//!
//! This library contains the plate-addressing and data-association core
//! for flow cytometry lab automation: well grids, staged associations
//! against owning entities, bounded-retry export gathering, and the
//! protocol operations that compose them. Instrument-specific behavior
//! sits behind the `instrument::Cytometer` trait; all operator-facing
//! rendering belongs to the host layer.

pub mod assoc;
pub mod config;
pub mod error;
pub mod instrument;
pub mod plate;
pub mod protocol;
pub mod upload;
