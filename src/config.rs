//! Application settings with per-operation defaults.
//!
//! Every protocol operation reads its knobs from an explicit settings
//! struct with documented defaults; a TOML file and `CYTORUN_*`
//! environment variables overlay onto those defaults. There is no dynamic
//! argument merging: what a `clean` or plate run consumes is spelled out
//! in the field lists below.
//!
//! Defaults follow the standing lab procedure for the BD-style plate
//! instruments (cleaning rack layout, bead dilution recipe, acquisition
//! templates per organism profile).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AppResult, CytoError};

/// Top-level application settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Registry key of the cytometer variant to drive.
    pub cytometer: String,
    /// Export gathering policy.
    pub export: ExportSettings,
    /// Clean-cycle reagent layout.
    pub clean: CleanSettings,
    /// Calibration sample preparation.
    pub calibration: CalibrationSettings,
    /// Plate-run container and acquisition templates.
    pub plate_run: PlateRunSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cytometer: "bd_accuri".to_string(),
            export: ExportSettings::default(),
            clean: CleanSettings::default(),
            calibration: CalibrationSettings::default(),
            plate_run: PlateRunSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file plus `CYTORUN_*`
    /// environment overrides, overlaid onto the defaults, then validates.
    pub fn new(path: Option<&str>) -> AppResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("CYTORUN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation of values that parse but cannot work.
    pub fn validate(&self) -> AppResult<()> {
        if self.export.expected_uploads < 1 {
            return Err(CytoError::Configuration(
                "export.expected_uploads must be at least 1".to_string(),
            ));
        }
        if self.export.max_attempts < 1 {
            return Err(CytoError::Configuration(
                "export.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.clean.reagent_labels.len() != self.clean.positions.len()
            || self.clean.reagent_labels.len() != self.clean.jar_labels.len()
        {
            return Err(CytoError::Configuration(
                "clean reagent labels, positions, and jar labels must line up".to_string(),
            ));
        }
        if self.plate_run.templates.is_empty() {
            return Err(CytoError::Configuration(
                "plate_run.templates must name at least one profile".to_string(),
            ));
        }
        Ok(())
    }
}

/// Export gathering policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Files expected from one export (default 1).
    pub expected_uploads: usize,
    /// Re-prompt bound before degrading (default 3).
    pub max_attempts: u32,
    /// Directory the technician exports into.
    pub export_root: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            expected_uploads: 1,
            max_attempts: 3,
            export_root: "Desktop/FCS Exports".to_string(),
        }
    }
}

/// Clean-cycle reagent layout and volumes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanSettings {
    /// Instrument template driving the clean cycle.
    pub template_file: String,
    /// Rack holding the cleaning eppendorfs.
    pub container: String,
    /// Eppendorf labels, one per reagent.
    pub reagent_labels: Vec<String>,
    /// Rack positions, aligned with `reagent_labels`.
    pub positions: Vec<String>,
    /// Refill jar labels, aligned with `reagent_labels`.
    pub jar_labels: Vec<String>,
    /// Minimum acceptable volume per eppendorf, in mL.
    pub min_volume_ml: f64,
    /// Volume to add from the jar when below minimum, in mL.
    pub add_volume_ml: f64,
}

impl Default for CleanSettings {
    fn default() -> Self {
        Self {
            template_file: "CleanRegular.c6t".to_string(),
            container: "24 tube rack".to_string(),
            reagent_labels: vec!["C".to_string(), "D".to_string(), "S".to_string()],
            positions: vec!["D4".to_string(), "D5".to_string(), "D6".to_string()],
            jar_labels: vec![
                "Cleaning".to_string(),
                "Decontamination".to_string(),
                "Sheath".to_string(),
            ],
            min_volume_ml: 0.5,
            add_volume_ml: 1.0,
        }
    }
}

/// Calibration sample preparation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Rack holding the diluted bead sample.
    pub container: String,
    /// Instrument template for the calibration run.
    pub template_file: String,
    /// Rack position of the diluted bead sample.
    pub position: String,
    /// Bead stock volume added per dilution.
    pub bead_volume: String,
    /// Dilution media volume.
    pub media_volume: String,
    /// Dilution media.
    pub media: String,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            container: "24 tube rack".to_string(),
            template_file: "calibration_beads_template.c6t".to_string(),
            position: "A1".to_string(),
            bead_volume: "1 drop".to_string(),
            media_volume: "1 mL".to_string(),
            media: "PBS".to_string(),
        }
    }
}

/// Plate-run container and per-profile acquisition templates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateRunSettings {
    /// Container type the samples arrive in.
    pub container: String,
    /// Acquisition template per organism profile.
    pub templates: HashMap<String, String>,
}

impl Default for PlateRunSettings {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert("E coli".to_string(), "Ecoli.c6t".to_string());
        templates.insert("Yeast".to_string(), "Yeast_gates.c6t".to_string());
        Self {
            container: "96 well plate: Flat Bottom (Black)".to_string(),
            templates,
        }
    }
}
