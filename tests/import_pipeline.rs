/// End-to-end district import against the in-memory store.
///
/// Covers:
/// 1. Cutoff date from the points' latest measurements
/// 2. Record preparation from raw survey rows
/// 3. Gap filling per device type across several hydrology points
/// 4. Duplicate, invalid and repeated records
/// 5. Dry runs leaving the store untouched
///
/// Run with: cargo test --test import_pipeline

use chrono::{NaiveDate, TimeZone, Utc};
use survey_import_service::error::SourceError;
use survey_import_service::import::ImportCoordinator;
use survey_import_service::ingest::{MeasurementSource, prepare_records};
use survey_import_service::model::{
    HydrologyPoint, MEASUREMENT_TYPE_INTERPOLATED, Measurement, RawSurveyRecord,
};
use survey_import_service::pipeline::run_district;
use survey_import_service::points::PointRegistry;
use survey_import_service::store::InMemoryStore;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct CannedSurvey {
    rows: Vec<RawSurveyRecord>,
}

impl MeasurementSource for CannedSurvey {
    fn fetch(&mut self, _district_number: &str, cutoff: NaiveDate) -> Result<Vec<RawSurveyRecord>, SourceError> {
        Ok(self
            .rows
            .iter()
            .filter(|r| {
                r.diversion_date_ms
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .is_none_or(|dt| dt.date_naive() > cutoff)
            })
            .cloned()
            .collect())
    }
}

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(7, 15)
}

fn point(id: &str, hydrology_id: i32, location_ref: i64) -> HydrologyPoint {
    HydrologyPoint {
        id: id.to_string(),
        hydrology_id,
        water_district_number: "63".to_string(),
        diversion_type_id: Some(1),
        diversion_name: format!("Diversion {}", hydrology_id),
        reach_description: None,
        location_ref,
        diversion_location_ref: None,
        inactive: false,
        comment: None,
    }
}

fn directory() -> PointRegistry {
    PointRegistry::new(vec![
        point("PIPE", 118387, 5001),
        point("DITCH", 119103, 5002),
        point("CANAL", 490936, 5003),
    ])
}

fn stored(point_ref: &str, hydrology_id: i32, on: NaiveDate, discharge: f64) -> Measurement {
    Measurement {
        monitoring_point_ref: point_ref.to_string(),
        hydrology_id,
        diversion_date: on,
        measurement_type_id: 1,
        discharge,
        registration_id: "REG".to_string(),
        user_id: "watermaster".to_string(),
    }
}

fn visit(location_ref: i64, on: NaiveDate, discharge: f64, device: &str) -> RawSurveyRecord {
    RawSurveyRecord {
        object_id: Some(location_ref),
        location_ref: Some(location_ref),
        discharge: Some(discharge),
        diversion_date_ms: Some(
            Utc.from_utc_datetime(&on.and_hms_opt(12, 0, 0).unwrap())
                .timestamp_millis(),
        ),
        measurement_type_id: Some(1),
        device_type: Some(device.to_string()),
        user_id: Some("crew".to_string()),
    }
}

fn seeded_store() -> InMemoryStore {
    InMemoryStore::with_rows([
        stored("PIPE", 118387, date(7, 1), 20.0),
        stored("DITCH", 119103, date(7, 3), 5.0),
        stored("CANAL", 490936, date(7, 2), 40.0),
        // Last year's value must not seed this year's gaps.
        stored("CANAL", 490936, NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(), 1.0),
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_district_import_fills_each_point_by_device_type() {
    let mut coordinator = ImportCoordinator::new(seeded_store()).with_today(today());
    let mut source = CannedSurvey {
        rows: vec![
            visit(5001, date(7, 4), 26.0, "Closed Conduit"),
            visit(5002, date(7, 6), 8.0, "Open Channel"),
            visit(5003, date(7, 3), 42.0, "Closed Conduit"),
        ],
    };

    let result = run_district("63", &mut source, &mut directory(), &mut coordinator, "REG-2024").unwrap();

    // PIPE: 7/2, 7/3. DITCH: 7/4, 7/5. CANAL: adjacent day, none.
    assert_eq!(result.raw_measurement_count, 3);
    assert_eq!(result.interpolation_count, 4);
    assert_eq!(result.success_count, 7);
    assert_eq!(result.duplicate_count, 0);
    assert!(result.invalid_records.is_empty());

    let store = coordinator.into_store();
    let pipe: Vec<f64> = [date(7, 2), date(7, 3)]
        .iter()
        .map(|d| store.get(118387, *d).unwrap().discharge)
        .collect();
    assert_eq!(pipe, vec![22.0, 24.0]);

    let ditch = store.get(119103, date(7, 5)).unwrap();
    assert_eq!(ditch.discharge, 5.0);
    assert_eq!(ditch.measurement_type_id, MEASUREMENT_TYPE_INTERPOLATED);
    assert_eq!(ditch.user_id, "crew");
    assert_eq!(ditch.registration_id, "REG-2024");
    assert_eq!(ditch.monitoring_point_ref, "DITCH");

    assert_eq!(store.len(), 4 + 7);
    assert_eq!(store.commits(), 1);
}

#[test]
fn test_repeated_invalid_and_existing_rows() {
    let mut coordinator = ImportCoordinator::new(seeded_store()).with_today(today());

    let existing = visit(5001, date(7, 1), 99.0, "Closed Conduit");
    let first = visit(5002, date(7, 4), 6.0, "Open Channel");
    let repeat = visit(5002, date(7, 4), 600.0, "Open Channel");
    let mut anonymous = visit(5003, date(7, 4), 44.0, "Closed Conduit");
    anonymous.user_id = None;

    let mut source = CannedSurvey {
        rows: vec![existing, first, repeat, anonymous],
    };
    let result = run_district("63", &mut source, &mut directory(), &mut coordinator, "REG").unwrap();

    // The 7/1 PIPE row predates the cutoff and is never fetched.
    assert_eq!(result.raw_measurement_count, 2);
    // CANAL 7/3 fill carries the empty user id of its next record.
    assert_eq!(result.interpolation_count, 1);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.duplicate_count, 0);
    assert_eq!(result.invalid_records.len(), 2);
    assert!(result.invalid_records.iter().all(|r| r.record_id == "490936"));
    assert!(result.invalid_records.iter().all(|r| r.message == "Invalid fields: UserId"));

    let store = coordinator.into_store();
    assert_eq!(store.get(119103, date(7, 4)).unwrap().discharge, 6.0);
    assert!(store.get(490936, date(7, 4)).is_none());
    assert_eq!(store.get(118387, date(7, 1)).unwrap().discharge, 20.0);
}

#[test]
fn test_rerun_counts_duplicates() {
    let rows = vec![
        visit(5001, date(7, 4), 26.0, "Closed Conduit"),
        visit(5002, date(7, 6), 8.0, "Open Channel"),
    ];
    let mut coordinator = ImportCoordinator::new(seeded_store()).with_today(today());
    let first = run_district(
        "63",
        &mut CannedSurvey { rows: rows.clone() },
        &mut directory(),
        &mut coordinator,
        "REG",
    )
    .unwrap();
    assert_eq!(first.success_count, 6);

    // Same rows handed over again regardless of cutoff.
    let store = coordinator.into_store();
    let mut again = ImportCoordinator::new(store).with_today(today());
    let records = prepare_records(rows, &mut directory(), "REG").unwrap();
    let second = again.import_measurements(&records).unwrap();

    assert_eq!(second.success_count, 0);
    assert_eq!(second.raw_measurement_count, 2);
    assert_eq!(second.duplicate_count, 2);
    assert_eq!(second.interpolation_count, 0);
}

#[test]
fn test_dry_run_leaves_store_untouched() {
    let mut coordinator = ImportCoordinator::new(seeded_store())
        .with_today(today())
        .with_dry_run(true);
    let mut source = CannedSurvey {
        rows: vec![visit(5001, date(7, 4), 26.0, "Closed Conduit")],
    };

    let result = run_district("63", &mut source, &mut directory(), &mut coordinator, "REG").unwrap();
    assert_eq!(result.success_count, 3);

    let store = coordinator.into_store();
    assert_eq!(store.len(), 4);
    assert_eq!(store.commits(), 0);
}

#[test]
fn test_point_without_current_year_data_imports_from_january() {
    let mut coordinator = ImportCoordinator::new(InMemoryStore::with_rows([stored(
        "CANAL",
        490936,
        NaiveDate::from_ymd_opt(2023, 12, 20).unwrap(),
        9.0,
    )]))
    .with_today(today());
    let mut source = CannedSurvey {
        rows: vec![
            visit(5003, date(1, 10), 12.0, "Closed Conduit"),
            visit(5003, date(1, 12), 14.0, "Closed Conduit"),
        ],
    };

    let result = run_district("63", &mut source, &mut directory(), &mut coordinator, "REG").unwrap();

    // First visit of the year has nothing to fill from.
    assert_eq!(result.raw_measurement_count, 2);
    assert_eq!(result.interpolation_count, 1);
    let store = coordinator.into_store();
    assert_eq!(store.get(490936, date(1, 11)).unwrap().discharge, 13.0);
    assert!(store.get(490936, date(1, 1)).is_none());
    assert_eq!(store.get(490936, date(1, 10)).unwrap().measurement_type_id, 1);
}
