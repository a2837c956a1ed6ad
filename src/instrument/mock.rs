//! A mock cytometer for tests and the demo binary.

use super::{AcquisitionSettings, Cytometer};

/// Mock instrument accepting any organism profile.
#[derive(Clone, Debug, Default)]
pub struct MockCytometer;

impl MockCytometer {
    /// Fresh mock.
    pub fn new() -> Self {
        Self
    }

    fn generic_settings() -> AcquisitionSettings {
        AcquisitionSettings {
            run_limits: "10,000 events".to_string(),
            fluidics: "Medium".to_string(),
            threshold: "FSC-H less than 10,000".to_string(),
            wash: "None".to_string(),
            agitate: "None".to_string(),
        }
    }
}

impl Cytometer for MockCytometer {
    fn name(&self) -> &str {
        "Mock Cytometer"
    }

    fn location(&self) -> &str {
        "Test bench"
    }

    fn calibration_settings(&self) -> AcquisitionSettings {
        Self::generic_settings()
    }

    fn clean_settings(&self) -> AcquisitionSettings {
        Self::generic_settings()
    }

    fn run_settings(&self, _profile: &str) -> Option<AcquisitionSettings> {
        Some(Self::generic_settings())
    }
}
