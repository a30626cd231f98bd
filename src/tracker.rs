//! Per-run outcome accounting.

use crate::model::{ImportResult, InvalidRecord, Measurement};

/// What happened to one measurement handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    Duplicate,
    Invalid(Vec<&'static str>),
}

/// Counters for one import run. Created fresh by each run and consumed by
/// [`ResultTracker::finish`].
#[derive(Debug, Default)]
pub struct ResultTracker {
    result: ImportResult,
}

impl ResultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a measurement as attempted, split by interpolated vs raw.
    pub fn record_attempt(&mut self, measurement: &Measurement) {
        if measurement.is_interpolated() {
            self.result.interpolation_count += 1;
        } else {
            self.result.raw_measurement_count += 1;
        }
    }

    pub fn record_outcome(&mut self, measurement: &Measurement, outcome: &PersistOutcome) {
        match outcome {
            PersistOutcome::Inserted => self.result.success_count += 1,
            PersistOutcome::Duplicate => self.result.duplicate_count += 1,
            PersistOutcome::Invalid(fields) => self.result.invalid_records.push(InvalidRecord {
                record_id: measurement.hydrology_id.to_string(),
                message: format!("Invalid fields: {}", fields.join(",")),
            }),
        }
    }

    pub fn finish(self) -> ImportResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MEASUREMENT_TYPE_INTERPOLATED;
    use chrono::NaiveDate;

    fn measurement(measurement_type_id: i32) -> Measurement {
        Measurement {
            monitoring_point_ref: "PD".to_string(),
            hydrology_id: 524616,
            diversion_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            measurement_type_id,
            discharge: 1.0,
            registration_id: "REG".to_string(),
            user_id: "u".to_string(),
        }
    }

    #[test]
    fn test_attempts_split_by_interpolation() {
        let mut tracker = ResultTracker::new();
        tracker.record_attempt(&measurement(4));
        tracker.record_attempt(&measurement(MEASUREMENT_TYPE_INTERPOLATED));
        tracker.record_attempt(&measurement(MEASUREMENT_TYPE_INTERPOLATED));

        let result = tracker.finish();
        assert_eq!(result.raw_measurement_count, 1);
        assert_eq!(result.interpolation_count, 2);
        assert_eq!(result.success_count, 0);
    }

    #[test]
    fn test_outcomes_update_their_own_counter() {
        let mut tracker = ResultTracker::new();
        let m = measurement(4);
        tracker.record_outcome(&m, &PersistOutcome::Inserted);
        tracker.record_outcome(&m, &PersistOutcome::Duplicate);
        tracker.record_outcome(&m, &PersistOutcome::Invalid(vec!["HydrologyId", "UserId"]));

        let result = tracker.finish();
        assert_eq!(result.success_count, 1);
        assert_eq!(result.duplicate_count, 1);
        assert_eq!(result.invalid_records.len(), 1);
        assert_eq!(result.invalid_records[0].record_id, "524616");
        assert_eq!(result.invalid_records[0].message, "Invalid fields: HydrologyId,UserId");
    }

    #[test]
    fn test_fresh_tracker_is_empty() {
        assert_eq!(ResultTracker::new().finish(), ImportResult::default());
    }
}
