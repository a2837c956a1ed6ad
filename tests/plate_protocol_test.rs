//! End-to-end protocol flows against the in-memory entity store.

use std::sync::Arc;

use cytorun::assoc::{AssocValue, EntityKind, EntityStore, MemoryStore};
use cytorun::config::Settings;
use cytorun::error::CytoError;
use cytorun::instrument::MockCytometer;
use cytorun::plate::{WellGrid, EMPTY_WELL};
use cytorun::protocol::{PlateRunRequest, ProtocolContext, KEY_SAMPLE_MATRIX};
use cytorun::upload::{MockExportSource, Upload};

fn plate_matrix(wells: &[(usize, usize, i64)]) -> Vec<Vec<i64>> {
    let mut matrix = vec![vec![EMPTY_WELL; 12]; 8];
    for (row, col, id) in wells {
        matrix[*row][*col] = *id;
    }
    matrix
}

#[tokio::test]
async fn test_plate_run_recovers_from_one_bad_export() {
    let store = Arc::new(MemoryStore::new());
    let collection = store.create_collection(plate_matrix(&[(0, 0, 11), (7, 11, 12)]));
    let plan = store.create_entity(EntityKind::Plan);
    let cyto = MockCytometer::new();
    let ctx = ProtocolContext::new(&cyto, store.clone(), Settings::default());

    // First listing is empty (wrong directory); the re-prompt succeeds.
    let mut source = MockExportSource::scripted(vec![
        vec![],
        vec![
            Upload::new(500, "A01 export.fcs"),
            Upload::new(501, "H12 export.fcs"),
        ],
    ]);

    let report = ctx
        .run_sample_plate(
            &mut source,
            PlateRunRequest {
                collection,
                operation: None,
                plan: Some(plan),
                profile: "Yeast".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(report.gather.is_complete());
    assert_eq!(report.gather.attempts, 2);
    assert!(source.requests[1].shortfall_warning);

    // The persisted grid round-trips back through from_array.
    match store.read(collection, &report.grid_key) {
        Some(AssocValue::Matrix(matrix)) => {
            let grid = WellGrid::from_array(matrix).unwrap();
            assert_eq!(grid.get("A1").unwrap(), 500);
            assert_eq!(grid.get("H12").unwrap(), 501);
            assert_eq!(grid.occupied_labels(|v| v > 0).count(), 2);
        }
        other => panic!("expected persisted grid, got {other:?}"),
    }
    assert_eq!(
        store.read(plan, "U500_SAMPLE_UPLOAD"),
        Some(AssocValue::Reference(500))
    );
}

#[tokio::test]
async fn test_abandoned_run_still_records_partial_results() {
    let store = Arc::new(MemoryStore::new());
    let collection = store.create_collection(plate_matrix(&[(0, 0, 11), (1, 1, 12)]));
    let operation = store.create_entity(EntityKind::Operation);
    let cyto = MockCytometer::new();

    let mut settings = Settings::default();
    settings.export.expected_uploads = 2;
    let ctx = ProtocolContext::new(&cyto, store.clone(), settings);

    // Every attempt returns the same single file; the second expected
    // file never shows up.
    let one_file = || vec![Upload::new(700, "A01 export.fcs")];
    let mut source = MockExportSource::scripted(vec![one_file(), one_file(), one_file()]);

    let report = ctx
        .run_sample_plate(
            &mut source,
            PlateRunRequest {
                collection,
                operation: Some(operation),
                plan: None,
                profile: "E coli".to_string(),
            },
        )
        .await
        .unwrap();

    // Degraded success: three attempts, flagged, but everything that did
    // arrive is recorded.
    assert!(!report.gather.is_complete());
    assert_eq!(report.gather.attempts, 3);
    assert_eq!(report.gather.uploads.len(), 1);
    assert_eq!(
        store.read(operation, "U700_SAMPLE_UPLOAD"),
        Some(AssocValue::Reference(700))
    );
    match store.read(collection, &report.grid_key) {
        Some(AssocValue::Matrix(matrix)) => {
            let grid = WellGrid::from_array(matrix).unwrap();
            assert_eq!(grid.get("A1").unwrap(), 700);
        }
        other => panic!("expected persisted grid, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unclassifiable_uploads_reported_not_fatal() {
    let store = Arc::new(MemoryStore::new());
    let collection = store.create_collection(plate_matrix(&[(0, 0, 11)]));
    let cyto = MockCytometer::new();
    let ctx = ProtocolContext::new(&cyto, store.clone(), Settings::default());

    let mut source = MockExportSource::scripted(vec![vec![
        Upload::new(800, "A01 export.fcs"),
        Upload::new(801, "summary.pdf"),
    ]]);

    let report = ctx
        .run_sample_plate(
            &mut source,
            PlateRunRequest {
                collection,
                operation: None,
                plan: None,
                profile: "E coli".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(report.unplaced, vec![Upload::new(801, "summary.pdf")]);
    match store.read(collection, KEY_SAMPLE_MATRIX) {
        Some(AssocValue::Matrix(matrix)) => {
            let grid = WellGrid::from_array(matrix).unwrap();
            assert_eq!(grid.get("A1").unwrap(), 800);
            assert_eq!(grid.occupied_labels(|v| v > 0).count(), 1);
        }
        other => panic!("expected persisted grid, got {other:?}"),
    }
}

#[tokio::test]
async fn test_deleted_plan_surfaces_persistence_error() {
    let store = Arc::new(MemoryStore::new());
    let collection = store.create_collection(plate_matrix(&[(0, 0, 11)]));
    let plan = store.create_entity(EntityKind::Plan);
    store.delete_entity(plan);

    let cyto = MockCytometer::new();
    let ctx = ProtocolContext::new(&cyto, store, Settings::default());
    let mut source =
        MockExportSource::scripted(vec![vec![Upload::new(900, "A01 export.fcs")]]);

    let err = ctx
        .run_sample_plate(
            &mut source,
            PlateRunRequest {
                collection,
                operation: None,
                plan: Some(plan),
                profile: "E coli".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CytoError::Persistence(_)));
}
