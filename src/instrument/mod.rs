//! Cytometer capability trait and instrument variants.
//!
//! Protocol code never names a concrete instrument. It works against the
//! [`Cytometer`] trait, the capability set an instrument model supplies:
//! identity, location, acquisition settings tables, and tube handling for
//! sorters. One variant type exists per instrument model,
//! constructed once per process and passed explicitly to protocol calls.

pub mod bd_accuri;
pub mod mock;
pub mod sony_sh800s;

pub use bd_accuri::BdAccuri;
pub use mock::MockCytometer;
pub use sony_sh800s::SonySh800s;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, CytoError};

/// Settings table for one acquisition, with named fields instead of the
/// free-form key/value screens the vendor software presents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Stop condition: events, time, or volume.
    pub run_limits: String,
    /// Fluidics rate.
    pub fluidics: String,
    /// Signal threshold.
    pub threshold: String,
    /// Wash between wells.
    pub wash: String,
    /// Plate agitation cadence.
    pub agitate: String,
}

impl AcquisitionSettings {
    /// The table as labeled rows, for the host layer to render.
    pub fn settings_rows(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("Run Limits", self.run_limits.as_str()),
            ("Fluidics", self.fluidics.as_str()),
            ("Set Threshold", self.threshold.as_str()),
            ("Wash Settings", self.wash.as_str()),
            ("Agitate Plate", self.agitate.as_str()),
        ]
    }
}

/// Capability set one cytometer model supplies to protocol code.
pub trait Cytometer: Send + Sync {
    /// Instrument display name.
    fn name(&self) -> &str;

    /// Where the instrument lives.
    fn location(&self) -> &str;

    /// Directory the acquisition templates are kept under.
    fn template_dir(&self) -> &str {
        ""
    }

    /// Extension of saved workspace files.
    fn workspace_extension(&self) -> &str {
        ".c6"
    }

    /// Settings for a bead calibration run.
    fn calibration_settings(&self) -> AcquisitionSettings;

    /// Settings for a clean cycle.
    fn clean_settings(&self) -> AcquisitionSettings;

    /// Settings for a sample run under the given organism profile, if this
    /// instrument supports it.
    fn run_settings(&self, profile: &str) -> Option<AcquisitionSettings>;

    /// Tube type samples must arrive in, for tube-fed sorters.
    fn required_sample_tube(&self) -> Option<&str> {
        None
    }

    /// Label for the nth collection tube, for sorters.
    fn tube_label(&self, _index: usize) -> Option<String> {
        None
    }

    /// Events to aim for when sorting a partially-positive population.
    fn target_events(&self, default_to_sort: u64, frac_positive: f64) -> u64 {
        (default_to_sort as f64 * frac_positive) as u64
    }
}

/// Builds the cytometer registered under `key`.
pub fn build_cytometer(key: &str) -> AppResult<Box<dyn Cytometer>> {
    match key {
        "bd_accuri" => Ok(Box::new(BdAccuri::new())),
        "sony_sh800s" => Ok(Box::new(SonySh800s::new())),
        "mock" => Ok(Box::new(MockCytometer::new())),
        other => Err(CytoError::Configuration(format!(
            "unknown cytometer '{other}'"
        ))),
    }
}
