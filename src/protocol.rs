//! Protocol operations composing the grid, association, and upload cores.
//!
//! Three operations mirror what technicians actually run: a clean cycle, a
//! bead calibration, and a sample plate run. Each one prepares the data
//! the host layer renders (settings tables, verification grids, reagent
//! checklists), drives the export gathering where acquisition files come
//! back, and records the resulting associations.
//!
//! All state lives in an explicit [`ProtocolContext`] built once per run:
//! which cytometer, which entity store, which settings. Protocol code
//! holds no globals.
//!
//! # Association keys
//!
//! Every upload is attached to the plan and operation under its own key,
//! `U{upload_id}_SAMPLE_UPLOAD`, so the data for any specific well stays
//! one lookup away. The plate itself gets the full upload grid under
//! `SAMPLE_UPLOADS`, suffixed `_0`, `_1`, ... on repeat runs, never
//! overwriting an earlier run's grid.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assoc::{AssocValue, AssociationMap, EntityId, EntityKind, EntityStore};
use crate::config::Settings;
use crate::error::{AppResult, CytoError};
use crate::instrument::{AcquisitionSettings, Cytometer};
use crate::plate::{WellGrid, EMPTY_WELL};
use crate::upload::{
    classify_by_well, ExportSource, GatherReport, Upload, UploadGatherer,
};

/// Key for one upload attached to a plan or operation.
pub const KEY_SAMPLE: &str = "SAMPLE_UPLOAD";
/// Key for a calibration upload attached to a bead item.
pub const KEY_BEAD: &str = "BEAD_UPLOAD";
/// Key for the per-plate upload grid.
pub const KEY_SAMPLE_MATRIX: &str = "SAMPLE_UPLOADS";
/// Key carrying a bead stock's lot number.
pub const KEY_LOT_NO: &str = "Lot No.";

/// Wells in the rack the cleaning reagents sit in.
const CLEAN_RACK_SIZE: usize = 24;

/// One reagent eppendorf the technician verifies before a clean cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReagentCheck {
    /// Eppendorf label.
    pub label: String,
    /// Rack position.
    pub position: String,
    /// Jar to refill from.
    pub jar_label: String,
    /// Minimum acceptable volume, mL.
    pub min_volume_ml: f64,
    /// Volume to add when short, mL.
    pub add_volume_ml: f64,
}

/// Data for one clean cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanReport {
    /// Instrument cleaned.
    pub cytometer: String,
    /// Template driving the cycle.
    pub template_file: String,
    /// Rack holding the reagents.
    pub container: String,
    /// Acquisition settings for the cycle.
    pub settings: AcquisitionSettings,
    /// Reagent checklist data.
    pub reagents: Vec<ReagentCheck>,
    /// Grid marking the reagent positions, for the occupancy check.
    pub verification_grid: WellGrid,
}

/// Input to a bead calibration.
#[derive(Clone, Debug)]
pub struct CalibrationRequest {
    /// Bead stock the dilution is made from.
    pub bead_stock: EntityId,
    /// Existing diluted-bead item to reuse, when the operator found
    /// usable leftovers. `None` registers a fresh dilution.
    pub reuse_leftovers: Option<EntityId>,
}

/// Result of a bead calibration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Unique id for this run.
    pub run_id: String,
    /// Instrument calibrated.
    pub cytometer: String,
    /// Diluted-bead item the data is attached to.
    pub bead_item: EntityId,
    /// Whether leftovers were reused instead of a fresh dilution.
    pub reused_leftovers: bool,
    /// Workspace file the run was saved under.
    pub workspace_file: String,
    /// Acquisition settings used.
    pub settings: AcquisitionSettings,
    /// Grid with the bead sample position occupied.
    pub sample_grid: WellGrid,
    /// Export gathering outcome.
    pub gather: GatherReport,
    /// Key the calibration upload landed under, when one was obtained.
    pub bead_key: Option<String>,
}

/// Input to a sample plate run.
#[derive(Clone, Debug)]
pub struct PlateRunRequest {
    /// Collection holding the sample plate.
    pub collection: EntityId,
    /// Operation to attach per-upload keys to.
    pub operation: Option<EntityId>,
    /// Plan to attach per-upload keys to.
    pub plan: Option<EntityId>,
    /// Organism profile selecting template and settings.
    pub profile: String,
}

/// Result of a sample plate run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlateRunReport {
    /// Unique id for this run.
    pub run_id: String,
    /// Instrument the plate ran on.
    pub cytometer: String,
    /// Organism profile.
    pub profile: String,
    /// Container type the samples arrived in.
    pub container: String,
    /// Workspace file the run was saved under.
    pub workspace_file: String,
    /// Acquisition settings used.
    pub settings: AcquisitionSettings,
    /// Occupied wells on the sample plate.
    pub occupied_wells: usize,
    /// Export gathering outcome. An abandoned gather means the run
    /// proceeded with fewer files than expected; surface it.
    pub gather: GatherReport,
    /// Key the upload grid was associated to the collection under.
    pub grid_key: String,
    /// Uploads whose filenames did not map to a well.
    pub unplaced: Vec<Upload>,
}

/// Everything one protocol run needs, passed explicitly.
pub struct ProtocolContext<'a> {
    cytometer: &'a dyn Cytometer,
    store: Arc<dyn EntityStore>,
    settings: Settings,
}

impl<'a> ProtocolContext<'a> {
    /// Binds a context to an instrument, an entity store, and settings.
    pub fn new(
        cytometer: &'a dyn Cytometer,
        store: Arc<dyn EntityStore>,
        settings: Settings,
    ) -> Self {
        Self {
            cytometer,
            store,
            settings,
        }
    }

    /// The settings this context runs under.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Name for the saved workspace file: template stem, item id when
    /// given, and today's date.
    pub fn workspace_filename(&self, template_file: &str, item: Option<EntityId>) -> String {
        let stem = template_file
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(template_file);
        let date = Utc::now().format("%Y-%m-%d");
        let ext = self.cytometer.workspace_extension();
        match item {
            Some(id) => format!("{stem}_{id}_{date}{ext}"),
            None => format!("{stem}_{date}{ext}"),
        }
    }

    /// Prepares a clean cycle: reagent checklist plus the verification
    /// grid marking where the cleaning eppendorfs sit.
    pub fn clean(&self) -> AppResult<CleanReport> {
        let clean = &self.settings.clean;
        let reagents: Vec<ReagentCheck> = clean
            .reagent_labels
            .iter()
            .zip(&clean.positions)
            .zip(&clean.jar_labels)
            .map(|((label, position), jar_label)| ReagentCheck {
                label: label.clone(),
                position: position.clone(),
                jar_label: jar_label.clone(),
                min_volume_ml: clean.min_volume_ml,
                add_volume_ml: clean.add_volume_ml,
            })
            .collect();

        let mut grid = WellGrid::create_empty(CLEAN_RACK_SIZE, EMPTY_WELL)?;
        for position in &clean.positions {
            grid.set(position, 1)?;
        }

        info!("clean cycle prepared for {}", self.cytometer.name());
        Ok(CleanReport {
            cytometer: self.cytometer.name().to_string(),
            template_file: clean.template_file.clone(),
            container: clean.container.clone(),
            settings: self.cytometer.clean_settings(),
            reagents,
            verification_grid: grid,
        })
    }

    /// Runs a bead calibration and attaches the resulting export file to
    /// the diluted-bead item.
    ///
    /// A fresh dilution registers a new item carrying the stock's lot
    /// number; reuse skips registration. Exactly one export file is
    /// expected; a shortfall degrades rather than fails, leaving
    /// `bead_key` unset.
    pub async fn bead_calibration(
        &self,
        source: &mut dyn ExportSource,
        request: CalibrationRequest,
    ) -> AppResult<CalibrationReport> {
        let run_id = Uuid::new_v4().to_string();
        let lot = AssociationMap::new(self.store.clone(), request.bead_stock).get(KEY_LOT_NO);

        let (bead_item, reused_leftovers) = match request.reuse_leftovers {
            Some(item) => {
                if !self.store.exists(item) {
                    return Err(CytoError::Protocol(format!(
                        "leftover bead item {item} does not exist"
                    )));
                }
                (item, true)
            }
            None => {
                let item = self.store.create_entity(EntityKind::Item);
                if let Some(lot) = lot {
                    let mut map = AssociationMap::new(self.store.clone(), item);
                    map.put(KEY_LOT_NO, lot);
                    map.save()?;
                }
                (item, false)
            }
        };

        let calibration = &self.settings.calibration;
        let mut sample_grid = WellGrid::create_empty(96, EMPTY_WELL)?;
        sample_grid.set(&calibration.position, bead_item as i64)?;

        let workspace_file =
            self.workspace_filename(&calibration.template_file, Some(bead_item));
        info!(
            "calibration run {run_id} on {} with bead item {bead_item}",
            self.cytometer.name()
        );

        let gather = self.gatherer(1).gather(source).await?;
        let bead_key = match gather.uploads.first() {
            Some(upload) => {
                let mut map = AssociationMap::new(self.store.clone(), bead_item);
                let key = map.put(KEY_BEAD, AssocValue::Reference(upload.id));
                map.save()?;
                Some(key)
            }
            None => {
                warn!("calibration run {run_id} obtained no export files");
                None
            }
        };

        Ok(CalibrationReport {
            run_id,
            cytometer: self.cytometer.name().to_string(),
            bead_item,
            reused_leftovers,
            workspace_file,
            settings: self.cytometer.calibration_settings(),
            sample_grid,
            gather,
            bead_key,
        })
    }

    /// Runs a sample plate and records the well-to-file mapping.
    ///
    /// Validates the collection (a sample matrix with at least one
    /// occupied well), resolves template and settings for the profile,
    /// gathers export files, attaches each upload to the plan and
    /// operation, and associates the classified upload grid to the
    /// collection. An abandoned gather still records whatever arrived;
    /// the report's `gather` field carries the shortfall.
    pub async fn run_sample_plate(
        &self,
        source: &mut dyn ExportSource,
        request: PlateRunRequest,
    ) -> AppResult<PlateRunReport> {
        let run_id = Uuid::new_v4().to_string();

        let matrix = self.store.sample_matrix(request.collection).ok_or_else(|| {
            CytoError::Protocol("collection with a sample matrix expected for a plate run".to_string())
        })?;
        let sample_grid = WellGrid::from_array(matrix)?;
        let occupied_wells = sample_grid.occupied_labels(|v| v > 0).count();
        if occupied_wells == 0 {
            return Err(CytoError::Protocol("no samples to run".to_string()));
        }

        let template_file = self
            .settings
            .plate_run
            .templates
            .get(&request.profile)
            .ok_or_else(|| {
                CytoError::Protocol(format!(
                    "no acquisition template for profile '{}'",
                    request.profile
                ))
            })?;
        let settings = self.cytometer.run_settings(&request.profile).ok_or_else(|| {
            CytoError::Protocol(format!(
                "{} has no settings for profile '{}'",
                self.cytometer.name(),
                request.profile
            ))
        })?;

        let workspace_file = self.workspace_filename(template_file, Some(request.collection));
        info!(
            "plate run {run_id}: {occupied_wells} wells of '{}' on {}",
            request.profile,
            self.cytometer.name()
        );

        let gather = self
            .gatherer(self.settings.export.expected_uploads)
            .gather(source)
            .await?;
        if !gather.is_complete() {
            warn!(
                "plate run {run_id} proceeding with {} of {} export files",
                gather.uploads.len(),
                gather.expected
            );
        }

        // Each upload lands on the plan and the operation under its own key.
        for target in [request.plan, request.operation].into_iter().flatten() {
            let mut map = AssociationMap::new(self.store.clone(), target);
            for upload in &gather.uploads {
                map.put(
                    &format!("U{}_{KEY_SAMPLE}", upload.id),
                    AssocValue::Reference(upload.id),
                );
            }
            map.save()?;
        }

        let classification = classify_by_well(&gather.uploads, sample_grid.size())?;
        let mut map = AssociationMap::new(self.store.clone(), request.collection);
        let grid_key = map.put_matrix(KEY_SAMPLE_MATRIX, &classification.grid);
        map.save()?;

        Ok(PlateRunReport {
            run_id,
            cytometer: self.cytometer.name().to_string(),
            profile: request.profile,
            container: self.settings.plate_run.container.clone(),
            workspace_file,
            settings,
            occupied_wells,
            gather,
            grid_key,
            unplaced: classification.unplaced,
        })
    }

    fn gatherer(&self, expected: usize) -> UploadGatherer {
        UploadGatherer::new(expected)
            .with_max_attempts(self.settings.export.max_attempts)
            .with_directory(&self.settings.export.export_root)
    }
}
