/// Raw measurement retrieval and preparation.
///
/// Submodules:
/// - `survey123`: blocking client for Survey123 / ArcGIS feature services.

pub mod survey123;

use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, warn};

use crate::error::{SourceError, StoreError};
use crate::model::{
    DeviceType, MEASUREMENT_TYPE_DEFAULT, Measurement, MeasurementWithDeviceType, RawSurveyRecord,
};
use crate::points::HydrologyPointDirectory;

/// Anything that yields raw field visits for a water district.
pub trait MeasurementSource {
    /// Records visited after `cutoff`.
    fn fetch(&mut self, district_number: &str, cutoff: NaiveDate) -> Result<Vec<RawSurveyRecord>, SourceError>;
}

/// Converts an epoch-millisecond timestamp to the local calendar date.
pub fn epoch_ms_to_date(ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.with_timezone(&Local).date_naive())
}

/// Matches raw records to hydrology points and turns them into
/// measurements ready for import.
///
/// Records whose location is unknown to the directory are skipped quietly.
/// Records without a discharge or a usable date are skipped with a warning.
/// A missing or zero measurement type becomes `MEASUREMENT_TYPE_DEFAULT`.
pub fn prepare_records<D: HydrologyPointDirectory + ?Sized>(
    raw: Vec<RawSurveyRecord>,
    directory: &mut D,
    registration_id: &str,
) -> Result<Vec<MeasurementWithDeviceType>, StoreError> {
    let mut prepared = Vec::with_capacity(raw.len());
    for record in raw {
        let Some(location_ref) = record.location_ref else {
            debug!(object_id = ?record.object_id, "survey record has no location");
            continue;
        };
        let Some(point) = directory.resolve_by_location(location_ref)? else {
            debug!(location_ref, "no hydrology point at location");
            continue;
        };
        let Some(discharge) = record.discharge else {
            warn!(object_id = ?record.object_id, hydrology_id = point.hydrology_id, "survey record has no discharge");
            continue;
        };
        let Some(diversion_date) = record.diversion_date_ms.and_then(epoch_ms_to_date) else {
            warn!(object_id = ?record.object_id, hydrology_id = point.hydrology_id, "survey record has no usable date");
            continue;
        };

        let data = Measurement {
            monitoring_point_ref: point.id,
            hydrology_id: point.hydrology_id,
            diversion_date,
            measurement_type_id: record
                .measurement_type_id
                .filter(|t| *t != 0)
                .unwrap_or(MEASUREMENT_TYPE_DEFAULT),
            discharge,
            registration_id: registration_id.to_string(),
            user_id: record.user_id.unwrap_or_default(),
        };
        let device_type = DeviceType::parse(record.device_type.as_deref().unwrap_or_default());
        prepared.push(MeasurementWithDeviceType::new(data, device_type));
    }
    Ok(prepared)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
