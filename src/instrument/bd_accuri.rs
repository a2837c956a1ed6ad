//! The BD Accuri plate analyzer.
//!
//! Plate-fed benchtop analyzer; acquisition templates live in a shared
//! template directory and saved workspaces use the `.c6` extension.

use super::{AcquisitionSettings, Cytometer};

const CYTOMETER_NAME: &str = "BD Accuri";
const DEFAULT_LOCATION: &str = "Flow bench, main lab";
const TEMPLATE_DIR: &str = "aq_templates";

/// BD Accuri C6 analyzer.
#[derive(Clone, Debug, Default)]
pub struct BdAccuri;

impl BdAccuri {
    /// One analyzer, constructed per process.
    pub fn new() -> Self {
        Self
    }
}

impl Cytometer for BdAccuri {
    fn name(&self) -> &str {
        CYTOMETER_NAME
    }

    fn location(&self) -> &str {
        DEFAULT_LOCATION
    }

    fn template_dir(&self) -> &str {
        TEMPLATE_DIR
    }

    fn calibration_settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            run_limits: "30 uL".to_string(),
            fluidics: "Slow".to_string(),
            threshold: "FSC-H less than 300,000, SSC-H less than 250,000".to_string(),
            wash: "None".to_string(),
            agitate: "None".to_string(),
        }
    }

    fn clean_settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            run_limits: "2 Min".to_string(),
            fluidics: "Slow".to_string(),
            threshold: "FSC-H less than 80,000".to_string(),
            wash: "None".to_string(),
            agitate: "None".to_string(),
        }
    }

    fn run_settings(&self, profile: &str) -> Option<AcquisitionSettings> {
        match profile {
            "E coli" => Some(AcquisitionSettings {
                run_limits: "60,000 events, 1 Min, 50 uL".to_string(),
                fluidics: "Medium".to_string(),
                threshold: "FSC-H less than 8,000".to_string(),
                wash: "None".to_string(),
                agitate: "1 Cycle every 12th well".to_string(),
            }),
            "Yeast" => Some(AcquisitionSettings {
                run_limits: "30,000 events".to_string(),
                fluidics: "Fast".to_string(),
                threshold: "FSC-H less than 400,000".to_string(),
                wash: "None".to_string(),
                agitate: "1 Cycle every 12th well".to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        let cyto = BdAccuri::new();
        assert!(cyto.run_settings("E coli").is_some());
        assert!(cyto.run_settings("Yeast").is_some());
        assert!(cyto.run_settings("CHO").is_none());
    }

    #[test]
    fn test_workspace_extension_default() {
        assert_eq!(BdAccuri::new().workspace_extension(), ".c6");
    }
}
