//! The Sony SH800S cell sorter.
//!
//! Tube-fed sorter: samples arrive in round-bottom tubes, sorted fractions
//! land in labeled collection tubes. There is no plate profile, so
//! [`Cytometer::run_settings`] is always `None`; plate runs against this
//! instrument fail fast at the protocol layer.

use super::{AcquisitionSettings, Cytometer};

const CYTOMETER_NAME: &str = "Sony SH800S";
const DEFAULT_LOCATION: &str = "NanoES 380B";
const REQUIRED_SAMPLE_TUBE: &str = "5 mL polystyrene round-bottom tube (Falcon 352054)";

/// Sony SH800S sorter.
#[derive(Clone, Debug, Default)]
pub struct SonySh800s;

impl SonySh800s {
    /// One sorter, constructed per process.
    pub fn new() -> Self {
        Self
    }
}

impl Cytometer for SonySh800s {
    fn name(&self) -> &str {
        CYTOMETER_NAME
    }

    fn location(&self) -> &str {
        DEFAULT_LOCATION
    }

    fn workspace_extension(&self) -> &str {
        ".expt"
    }

    fn calibration_settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            run_limits: "10,000 events".to_string(),
            fluidics: "Sample pressure 4".to_string(),
            threshold: "FSC 0.5%".to_string(),
            wash: "None".to_string(),
            agitate: "None".to_string(),
        }
    }

    fn clean_settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            run_limits: "5 Min".to_string(),
            fluidics: "High".to_string(),
            threshold: "FSC 0.5%".to_string(),
            wash: "None".to_string(),
            agitate: "None".to_string(),
        }
    }

    fn run_settings(&self, _profile: &str) -> Option<AcquisitionSettings> {
        None
    }

    fn required_sample_tube(&self) -> Option<&str> {
        Some(REQUIRED_SAMPLE_TUBE)
    }

    fn tube_label(&self, index: usize) -> Option<String> {
        Some(format!("Tube - {index}"))
    }
}
