/// One district, end to end.
///
/// Works out how far back the district needs refetching, pulls survey
/// records from that date on, matches them to hydrology points and hands the
/// result to the import coordinator.

use tracing::info;

use crate::error::ImportError;
use crate::import::ImportCoordinator;
use crate::ingest::{MeasurementSource, prepare_records};
use crate::model::ImportResult;
use crate::points::HydrologyPointDirectory;
use crate::store::MeasurementStore;

pub fn run_district<S, M, D>(
    district_number: &str,
    source: &mut M,
    directory: &mut D,
    coordinator: &mut ImportCoordinator<S>,
    registration_id: &str,
) -> Result<ImportResult, ImportError>
where
    S: MeasurementStore,
    M: MeasurementSource + ?Sized,
    D: HydrologyPointDirectory + ?Sized,
{
    let cutoff = coordinator.earliest_cutoff_date(directory, district_number)?;
    info!(district = district_number, %cutoff, "fetching survey records");

    let raw = source.fetch(district_number, cutoff)?;
    let fetched = raw.len();
    let records = prepare_records(raw, directory, registration_id)?;
    info!(
        district = district_number,
        fetched,
        matched = records.len(),
        "survey records prepared"
    );

    coordinator.import_measurements(&records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::model::{HydrologyPoint, Measurement, RawSurveyRecord};
    use crate::points::PointRegistry;
    use crate::store::InMemoryStore;
    use chrono::{NaiveDate, TimeZone, Utc};

    struct FakeSource {
        records: Vec<RawSurveyRecord>,
        requested: Vec<(String, NaiveDate)>,
    }

    impl MeasurementSource for FakeSource {
        fn fetch(&mut self, district_number: &str, cutoff: NaiveDate) -> Result<Vec<RawSurveyRecord>, SourceError> {
            self.requested.push((district_number.to_string(), cutoff));
            Ok(self.records.clone())
        }
    }

    struct DownSource;

    impl MeasurementSource for DownSource {
        fn fetch(&mut self, _: &str, _: NaiveDate) -> Result<Vec<RawSurveyRecord>, SourceError> {
            Err(SourceError::Status {
                service: "Survey123",
                status: 503,
            })
        }
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn point() -> HydrologyPoint {
        HydrologyPoint {
            id: "P1".to_string(),
            hydrology_id: 501,
            water_district_number: "63".to_string(),
            diversion_type_id: None,
            diversion_name: "Riverside Ditch".to_string(),
            reach_description: None,
            location_ref: 7001,
            diversion_location_ref: None,
            inactive: false,
            comment: None,
        }
    }

    fn stored(d: NaiveDate, discharge: f64) -> Measurement {
        Measurement {
            monitoring_point_ref: "P1".to_string(),
            hydrology_id: 501,
            diversion_date: d,
            measurement_type_id: 1,
            discharge,
            registration_id: "REG".to_string(),
            user_id: "crew".to_string(),
        }
    }

    fn visit(d: NaiveDate, discharge: f64) -> RawSurveyRecord {
        RawSurveyRecord {
            object_id: Some(1),
            location_ref: Some(7001),
            discharge: Some(discharge),
            diversion_date_ms: Some(
                Utc.from_utc_datetime(&d.and_hms_opt(12, 0, 0).unwrap()).timestamp_millis(),
            ),
            measurement_type_id: Some(1),
            device_type: Some("Closed Conduit".to_string()),
            user_id: Some("crew".to_string()),
        }
    }

    #[test]
    fn test_run_district_fetches_from_last_measurement_and_fills_gap() {
        let store = InMemoryStore::with_rows([stored(date(6, 1), 10.0)]);
        let mut coordinator = ImportCoordinator::new(store).with_today(date(6, 30));
        let mut directory = PointRegistry::new(vec![point()]);
        let mut source = FakeSource {
            records: vec![visit(date(6, 4), 16.0)],
            requested: Vec::new(),
        };

        let result = run_district("63", &mut source, &mut directory, &mut coordinator, "REG").unwrap();

        assert_eq!(source.requested, vec![("63".to_string(), date(6, 1))]);
        assert_eq!(result.raw_measurement_count, 1);
        assert_eq!(result.interpolation_count, 2);
        assert_eq!(result.success_count, 3);

        let store = coordinator.into_store();
        assert_eq!(store.get(501, date(6, 2)).map(|m| m.discharge), Some(12.0));
        assert_eq!(store.get(501, date(6, 3)).map(|m| m.discharge), Some(14.0));
    }

    #[test]
    fn test_unknown_locations_are_not_imported() {
        let mut coordinator = ImportCoordinator::new(InMemoryStore::new()).with_today(date(6, 30));
        let mut directory = PointRegistry::new(vec![point()]);
        let mut stray = visit(date(6, 4), 3.0);
        stray.location_ref = Some(9999);
        let mut source = FakeSource {
            records: vec![stray],
            requested: Vec::new(),
        };

        let result = run_district("63", &mut source, &mut directory, &mut coordinator, "REG").unwrap();

        assert_eq!(result, ImportResult::default());
        assert_eq!(source.requested[0].1, date(1, 1));
    }

    #[test]
    fn test_source_failure_aborts_district() {
        let mut coordinator = ImportCoordinator::new(InMemoryStore::new()).with_today(date(6, 30));
        let mut directory = PointRegistry::new(vec![point()]);

        let err = run_district("63", &mut DownSource, &mut directory, &mut coordinator, "REG").unwrap_err();

        assert!(matches!(err, ImportError::Source(_)));
        assert!(coordinator.store().is_empty());
    }
}
