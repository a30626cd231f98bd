//! Import coordination: reconcile one district's survey measurements with
//! the water master data table.
//!
//! A run deduplicates the incoming records, groups them per hydrology id,
//! walks each group in date order to generate gap fills against the
//! previous known value, then writes raw records followed by fills inside a
//! single store transaction. Duplicate and invalid records are counted and
//! skipped; any other store failure aborts the run and the transaction is
//! rolled back when its guard drops.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::{ImportError, PersistError, StoreError};
use crate::interpolate::interpolate;
use crate::model::{ImportResult, Measurement, MeasurementWithDeviceType};
use crate::points::HydrologyPointDirectory;
use crate::store::{MeasurementStore, StoreTransaction, checked_insert};
use crate::tracker::{PersistOutcome, ResultTracker};

pub struct ImportCoordinator<S> {
    store: S,
    today: NaiveDate,
    dry_run: bool,
}

impl<S: MeasurementStore> ImportCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            today: Local::now().date_naive(),
            dry_run: false,
        }
    }

    /// Pins "today", which decides the current-year scope of previous-value
    /// lookups and the cutoff date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// When set, runs roll back instead of committing.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Imports one batch of measurements and returns its outcome counts.
    ///
    /// Only `Err` on a store failure other than a duplicate or a validation
    /// error; in that case nothing from the batch is kept.
    pub fn import_measurements(
        &mut self,
        records: &[MeasurementWithDeviceType],
    ) -> Result<ImportResult, ImportError> {
        let current_year = self.today.year();
        let mut tracker = ResultTracker::new();

        let survivors = first_arrivals(records);
        if survivors.len() < records.len() {
            debug!(
                dropped = records.len() - survivors.len(),
                "dropped repeated records for an already seen hydrology id and date"
            );
        }
        let groups = group_by_hydrology_id(&survivors);

        let mut tx = self.store.begin()?;

        let mut fills = Vec::new();
        for (hydrology_id, group) in &groups {
            let mut previous: Option<Measurement> = None;
            for record in group {
                if previous.is_none() {
                    previous = tx.last_measurement(*hydrology_id, Some(current_year))?;
                }
                if let Some(prev) = &previous {
                    fills.extend(interpolate(prev, &record.data, record.device_type));
                }
                previous = Some(record.data.clone());
            }
        }

        for record in &survivors {
            add_measurement(&mut tx, &mut tracker, &record.data)?;
        }
        for fill in &fills {
            add_measurement(&mut tx, &mut tracker, fill)?;
        }

        if self.dry_run {
            tx.rollback()?;
            info!("dry run: import rolled back");
        } else {
            tx.commit()?;
        }

        let result = tracker.finish();
        info!(
            points = groups.len(),
            raw = result.raw_measurement_count,
            interpolated = result.interpolation_count,
            inserted = result.success_count,
            duplicates = result.duplicate_count,
            invalid = result.invalid_records.len(),
            "import finished"
        );
        Ok(result)
    }

    /// Earliest "last measured" date across a district's points this year.
    ///
    /// A point with no measurement this year pulls the cutoff back to
    /// January 1. A district without points yields today.
    pub fn earliest_cutoff_date<D: HydrologyPointDirectory + ?Sized>(
        &mut self,
        directory: &mut D,
        district_number: &str,
    ) -> Result<NaiveDate, ImportError> {
        let today = self.today;
        let start_of_year = today - Duration::days(i64::from(today.ordinal0()));
        let points = directory.points_in_district(district_number)?;

        let mut tx = self.store.begin()?;
        let mut cutoff = today;
        for point in &points {
            match tx.last_measurement(point.hydrology_id, Some(today.year()))? {
                Some(last) => cutoff = cutoff.min(last.diversion_date),
                None => {
                    debug!(
                        district = district_number,
                        hydrology_id = point.hydrology_id,
                        "no measurement this year, refetching from January 1"
                    );
                    cutoff = start_of_year;
                    break;
                }
            }
        }
        tx.rollback()?;

        if points.is_empty() {
            warn!(district = district_number, "district has no hydrology points");
        }
        debug!(district = district_number, %cutoff, "cutoff date");
        Ok(cutoff)
    }
}

/// Validates and stores one measurement, recording the outcome.
///
/// Duplicates and invalid records come back as outcomes; only a storage
/// failure is an `Err`.
pub fn add_measurement<T: StoreTransaction>(
    tx: &mut T,
    tracker: &mut ResultTracker,
    measurement: &Measurement,
) -> Result<PersistOutcome, StoreError> {
    tracker.record_attempt(measurement);
    let outcome = match checked_insert(tx, measurement) {
        Ok(()) => PersistOutcome::Inserted,
        Err(PersistError::Duplicate { .. }) => PersistOutcome::Duplicate,
        Err(PersistError::Invalid { fields }) => PersistOutcome::Invalid(fields),
        Err(PersistError::Storage(e)) => return Err(e),
    };
    match &outcome {
        PersistOutcome::Inserted => {}
        PersistOutcome::Duplicate => debug!(
            hydrology_id = measurement.hydrology_id,
            date = %measurement.diversion_date,
            "already stored"
        ),
        PersistOutcome::Invalid(fields) => warn!(
            hydrology_id = measurement.hydrology_id,
            date = %measurement.diversion_date,
            "invalid fields: {}",
            fields.join(",")
        ),
    }
    tracker.record_outcome(measurement, &outcome);
    Ok(outcome)
}

/// Keeps the first record seen for each `(hydrology_id, diversion_date)`,
/// in input order. Arrival order decides, not date order or value.
pub fn first_arrivals(records: &[MeasurementWithDeviceType]) -> Vec<&MeasurementWithDeviceType> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.data.identity()))
        .collect()
}

/// Splits records into per-hydrology-id sequences sorted by date.
///
/// Groups appear in order of their first record; the sort is stable.
pub fn group_by_hydrology_id<'a>(
    records: &[&'a MeasurementWithDeviceType],
) -> Vec<(i32, Vec<&'a MeasurementWithDeviceType>)> {
    let mut index: HashMap<i32, usize> = HashMap::new();
    let mut groups: Vec<(i32, Vec<&'a MeasurementWithDeviceType>)> = Vec::new();
    for &record in records {
        let hydrology_id = record.data.hydrology_id;
        let slot = *index.entry(hydrology_id).or_insert_with(|| {
            groups.push((hydrology_id, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(record);
    }
    for (_, group) in &mut groups {
        group.sort_by_key(|r| r.data.diversion_date);
    }
    groups
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
