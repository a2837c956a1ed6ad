//! Export-file gathering and well classification.
//!
//! Exporting acquisition files off a cytometer is a manual step: a
//! technician drives the vendor software's export dialog, then points the
//! host platform at the resulting files. The listing that comes back is
//! unreliable (wrong directory, missed files, partial selections), so
//! [`UploadGatherer`] reconciles it against the expected file count with a
//! bounded number of re-prompts.
//!
//! Three attempts bounds operator frustration while tolerating transient
//! mistakes; there is no backoff because the bottleneck is a human, not a
//! resource. Running out of attempts is a *degraded success*, not an
//! error: the gatherer hands back whatever the final attempt produced and
//! flags the shortfall for the caller to surface.
//!
//! Classification maps each gathered file back to the well it came from by
//! parsing the fixed-width well prefix of its filename (`"A01 export.fcs"`
//! came from well A1).

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::plate::{WellGrid, EMPTY_WELL};

/// Width of the well-coordinate prefix in export filenames.
pub const WELL_PREFIX_LEN: usize = 3;

/// Attempts the gatherer makes before degrading to a partial result.
pub const MAX_GATHER_ATTEMPTS: u32 = 3;

/// One exported acquisition file registered by the host platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    /// Host-assigned upload identifier.
    pub id: u64,
    /// Originating filename as exported by the instrument.
    pub filename: String,
}

impl Upload {
    /// Convenience constructor.
    pub fn new(id: u64, filename: &str) -> Self {
        Self {
            id,
            filename: filename.to_string(),
        }
    }
}

/// One request for an export-file listing, handed to the host layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingRequest {
    /// 1-based attempt number.
    pub attempt: u32,
    /// How many files the caller expects.
    pub expected: usize,
    /// True when the previous attempt came up short and the prompt should
    /// carry a warning.
    pub shortfall_warning: bool,
    /// Export directory the technician was told to use.
    pub directory: String,
}

/// External collaborator that produces file listings.
///
/// The host/UI layer implements this by prompting the technician; tests
/// implement it with pre-supplied listings answered synchronously. One
/// call per gathering attempt. This is the only suspension point in the
/// crate.
#[async_trait]
pub trait ExportSource: Send {
    /// Produces the listing for one attempt.
    async fn request_listing(&mut self, request: &ListingRequest) -> AppResult<Vec<Upload>>;
}

/// How a gathering session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The expected number of files was reached.
    Satisfied,
    /// The attempt bound was reached first; the result may be incomplete.
    Abandoned,
}

/// Result of a gathering session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatherReport {
    /// Files obtained on the final attempt, in listing order.
    pub uploads: Vec<Upload>,
    /// Attempts actually made (1 to [`MAX_GATHER_ATTEMPTS`]).
    pub attempts: u32,
    /// Count the caller asked for.
    pub expected: usize,
    /// Terminal state of the session.
    pub disposition: Disposition,
}

impl GatherReport {
    /// True when the expected count was reached.
    pub fn is_complete(&self) -> bool {
        self.disposition == Disposition::Satisfied
    }
}

/// Bounded-retry reconciliation of a manual file export.
#[derive(Clone, Debug)]
pub struct UploadGatherer {
    expected: usize,
    max_attempts: u32,
    directory: String,
}

impl Default for UploadGatherer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl UploadGatherer {
    /// Gatherer expecting `expected` files (clamped to at least 1).
    pub fn new(expected: usize) -> Self {
        Self {
            expected: expected.max(1),
            max_attempts: MAX_GATHER_ATTEMPTS,
            directory: String::new(),
        }
    }

    /// Sets the export directory named in listing requests.
    pub fn with_directory(mut self, directory: &str) -> Self {
        self.directory = directory.to_string();
        self
    }

    /// Overrides the attempt bound (clamped to at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Runs the gathering session against `source`.
    ///
    /// Re-prompts until the listing reaches the expected count or the
    /// attempt bound is hit, whichever comes first. The bound is a
    /// degraded success: the final attempt's listing is returned as-is
    /// with [`Disposition::Abandoned`]. Only a failing `source` call is an
    /// error.
    pub async fn gather(&self, source: &mut dyn ExportSource) -> AppResult<GatherReport> {
        let mut uploads: Vec<Upload> = Vec::new();
        let mut attempt = 0u32;

        while attempt < self.max_attempts && uploads.len() < self.expected {
            attempt += 1;
            let request = ListingRequest {
                attempt,
                expected: self.expected,
                shortfall_warning: attempt > 1,
                directory: self.directory.clone(),
            };
            if request.shortfall_warning {
                warn!(
                    "export listing attempt {attempt}: previous attempt returned {} of {} files",
                    uploads.len(),
                    self.expected
                );
            }
            uploads = source.request_listing(&request).await?;
        }

        let disposition = if uploads.len() >= self.expected {
            Disposition::Satisfied
        } else {
            warn!(
                "abandoning export gathering after {attempt} attempts with {} of {} files",
                uploads.len(),
                self.expected
            );
            Disposition::Abandoned
        };

        Ok(GatherReport {
            uploads,
            attempts: attempt,
            expected: self.expected,
            disposition,
        })
    }
}

/// Uploads placed on a well grid, plus the ones that could not be placed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WellClassification {
    /// Grid of upload ids, sentinel where no file landed.
    pub grid: WellGrid,
    /// Uploads whose filename prefix did not parse as a well on this grid.
    pub unplaced: Vec<Upload>,
}

/// Places each upload on a fresh grid of `plate_size` wells by parsing the
/// well prefix of its filename.
///
/// An upload whose prefix is not a valid label for the grid is skipped and
/// collected in `unplaced` rather than failing the run; a second upload
/// claiming an already-filled well replaces the first. Both cases are
/// logged.
pub fn classify_by_well(uploads: &[Upload], plate_size: usize) -> AppResult<WellClassification> {
    let mut grid = WellGrid::create_empty(plate_size, EMPTY_WELL)?;
    let mut unplaced = Vec::new();

    for upload in uploads {
        let prefix: String = upload.filename.chars().take(WELL_PREFIX_LEN).collect();
        match grid.get(&prefix) {
            Ok(existing) => {
                if existing != EMPTY_WELL {
                    warn!(
                        "well prefix '{prefix}' already holds upload {existing}; \
                         replacing with upload {}",
                        upload.id
                    );
                }
                grid.set(&prefix, upload.id as i64)?;
            }
            Err(_) => {
                warn!(
                    "upload {} ('{}') has no parsable well prefix; leaving unplaced",
                    upload.id, upload.filename
                );
                unplaced.push(upload.clone());
            }
        }
    }

    Ok(WellClassification { grid, unplaced })
}

/// Scripted [`ExportSource`] for tests and the demo binary.
///
/// Answers each attempt with the next pre-supplied listing, synchronously;
/// attempts past the script's end see an empty listing. Requests are
/// recorded for assertions.
#[derive(Default)]
pub struct MockExportSource {
    listings: std::collections::VecDeque<Vec<Upload>>,
    /// Every request this source has answered, in order.
    pub requests: Vec<ListingRequest>,
}

impl MockExportSource {
    /// Source answering attempts with `listings` in order.
    pub fn scripted(listings: Vec<Vec<Upload>>) -> Self {
        Self {
            listings: listings.into(),
            requests: Vec::new(),
        }
    }

    /// Source whose single listing is one file per well label, with
    /// randomly drawn upload ids.
    pub fn well_files(labels: &[&str]) -> Self {
        Self::scripted(vec![well_uploads(labels)])
    }
}

/// One upload per well label, with randomly drawn upload ids.
pub fn well_uploads(labels: &[&str]) -> Vec<Upload> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    labels
        .iter()
        .map(|label| Upload::new(rng.gen_range(1..10_000), &format!("{label} export.fcs")))
        .collect()
}

#[async_trait]
impl ExportSource for MockExportSource {
    async fn request_listing(&mut self, request: &ListingRequest) -> AppResult<Vec<Upload>> {
        self.requests.push(request.clone());
        Ok(self.listings.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gather_satisfied_first_attempt() {
        let mut source =
            MockExportSource::scripted(vec![vec![Upload::new(1, "A01 export.fcs")]]);
        let report = UploadGatherer::new(1).gather(&mut source).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert!(report.is_complete());
        assert_eq!(report.uploads.len(), 1);
        assert!(!source.requests[0].shortfall_warning);
    }

    #[tokio::test]
    async fn test_gather_converges_on_second_attempt() {
        let mut source = MockExportSource::scripted(vec![
            vec![],
            vec![Upload::new(7, "A01 export.fcs")],
        ]);
        let report = UploadGatherer::new(1).gather(&mut source).await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.disposition, Disposition::Satisfied);
        assert_eq!(report.uploads.len(), 1);
        // The re-prompt carried the shortfall warning.
        assert!(!source.requests[0].shortfall_warning);
        assert!(source.requests[1].shortfall_warning);
    }

    #[tokio::test]
    async fn test_gather_abandons_after_three_attempts() {
        let mut source = MockExportSource::default();
        let report = UploadGatherer::new(1).gather(&mut source).await.unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(report.disposition, Disposition::Abandoned);
        assert!(report.uploads.is_empty());
        // Never a fourth prompt.
        assert_eq!(source.requests.len(), 3);
    }

    #[tokio::test]
    async fn test_gather_keeps_final_partial_listing() {
        let mut source = MockExportSource::scripted(vec![
            vec![],
            vec![],
            vec![Upload::new(3, "B02 export.fcs")],
        ]);
        let report = UploadGatherer::new(2).gather(&mut source).await.unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(report.disposition, Disposition::Abandoned);
        assert_eq!(report.uploads.len(), 1);
    }

    #[tokio::test]
    async fn test_gather_overshoot_is_satisfied() {
        let mut source = MockExportSource::scripted(vec![vec![
            Upload::new(1, "A01 a.fcs"),
            Upload::new(2, "A02 b.fcs"),
        ]]);
        let report = UploadGatherer::new(1).gather(&mut source).await.unwrap();
        assert_eq!(report.disposition, Disposition::Satisfied);
        assert_eq!(report.uploads.len(), 2);
    }

    #[test]
    fn test_gather_resolves_without_real_suspension() {
        // Pre-supplied listings answer the prompt synchronously; the whole
        // session completes without timers or I/O.
        let mut source =
            MockExportSource::scripted(vec![vec![Upload::new(1, "A01 export.fcs")]]);
        let report =
            tokio_test::block_on(UploadGatherer::new(1).gather(&mut source)).unwrap();
        assert!(report.is_complete());
    }

    #[test]
    fn test_expected_count_clamped() {
        let gatherer = UploadGatherer::new(0);
        assert_eq!(gatherer.expected, 1);
    }

    #[test]
    fn test_classify_places_and_collects() {
        let uploads = vec![
            Upload::new(10, "A01_x.fcs"),
            Upload::new(11, "H12 y.fcs"),
            Upload::new(12, "junk.fcs"),
        ];
        let classified = classify_by_well(&uploads, 96).unwrap();
        assert_eq!(classified.grid.get("A1").unwrap(), 10);
        assert_eq!(classified.grid.get("H12").unwrap(), 11);
        assert_eq!(classified.unplaced, vec![Upload::new(12, "junk.fcs")]);
        assert_eq!(classified.grid.occupied_labels(|v| v > 0).count(), 2);
    }

    #[test]
    fn test_classify_duplicate_prefix_last_writer_wins() {
        let uploads = vec![
            Upload::new(1, "A01 first.fcs"),
            Upload::new(2, "A01 second.fcs"),
        ];
        let classified = classify_by_well(&uploads, 96).unwrap();
        assert_eq!(classified.grid.get("A1").unwrap(), 2);
        assert!(classified.unplaced.is_empty());
    }

    #[test]
    fn test_classify_out_of_range_prefix_unplaced() {
        // J12 parses the grammar but row J is outside an 8x12 plate.
        let uploads = vec![Upload::new(5, "J12 x.fcs")];
        let classified = classify_by_well(&uploads, 96).unwrap();
        assert_eq!(classified.unplaced.len(), 1);
    }
}
