/// Core data types for the survey discharge import service.
///
/// This module defines the shared domain model imported by all other modules.
/// Apart from device-type parsing it contains no logic and no I/O.

use chrono::NaiveDate;

// ---------------------------------------------------------------------------
// Measurement type codes
// ---------------------------------------------------------------------------

/// Measurement type assigned to synthesized gap-fill records.
pub const MEASUREMENT_TYPE_INTERPOLATED: i32 = 3;

/// Measurement type used when a survey record does not carry one.
pub const MEASUREMENT_TYPE_DEFAULT: i32 = 4;

// ---------------------------------------------------------------------------
// Measurement types
// ---------------------------------------------------------------------------

/// One daily discharge value at a monitoring point, shaped like a row of
/// the water master data table.
///
/// Identity key is `(hydrology_id, diversion_date)`; the store holds at most
/// one row per key.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Id of the hydrology point (diversion) row this value belongs to.
    pub monitoring_point_ref: String,
    pub hydrology_id: i32,
    pub diversion_date: NaiveDate,
    pub measurement_type_id: i32,
    /// Flow rate in cubic feet per second.
    pub discharge: f64,
    pub registration_id: String,
    pub user_id: String,
}

impl Measurement {
    pub fn identity(&self) -> (i32, NaiveDate) {
        (self.hydrology_id, self.diversion_date)
    }

    pub fn is_interpolated(&self) -> bool {
        self.measurement_type_id == MEASUREMENT_TYPE_INTERPOLATED
    }
}

/// Kind of instrument a reading came from. Decides how the gap leading up
/// to the reading is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    OpenChannel,
    ClosedConduit,
}

impl DeviceType {
    /// Parses a free-text device label from a field survey.
    ///
    /// Any label containing "open" (case-insensitive) is an open channel;
    /// everything else, including an empty label, is a closed conduit.
    pub fn parse(label: &str) -> Self {
        if label.to_lowercase().contains("open") {
            DeviceType::OpenChannel
        } else {
            DeviceType::ClosedConduit
        }
    }
}

/// A measurement plus the device metadata needed to process it.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementWithDeviceType {
    pub data: Measurement,
    pub device_type: DeviceType,
}

impl MeasurementWithDeviceType {
    pub fn new(data: Measurement, device_type: DeviceType) -> Self {
        Self { data, device_type }
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// A monitoring / diversion point, as listed in the hydrology point table.
///
/// Owned by the water district database; this service only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct HydrologyPoint {
    pub id: String,
    pub hydrology_id: i32,
    pub water_district_number: String,
    pub diversion_type_id: Option<i32>,
    pub diversion_name: String,
    pub reach_description: Option<String>,
    /// Spatial id of the point itself. Survey records reference this.
    pub location_ref: i64,
    pub diversion_location_ref: Option<i64>,
    pub inactive: bool,
    pub comment: Option<String>,
}

// ---------------------------------------------------------------------------
// Raw survey input
// ---------------------------------------------------------------------------

/// One field visit as returned by a measurement source, before it has been
/// matched to a hydrology point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSurveyRecord {
    pub object_id: Option<i64>,
    pub location_ref: Option<i64>,
    pub discharge: Option<f64>,
    /// Epoch milliseconds, as feature services report dates.
    pub diversion_date_ms: Option<i64>,
    pub measurement_type_id: Option<i32>,
    pub device_type: Option<String>,
    pub user_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Import results
// ---------------------------------------------------------------------------

/// A measurement that failed field validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRecord {
    /// Hydrology id of the rejected measurement.
    pub record_id: String,
    pub message: String,
}

/// Outcome counts for one import run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResult {
    pub interpolation_count: usize,
    pub raw_measurement_count: usize,
    pub success_count: usize,
    pub duplicate_count: usize,
    pub invalid_records: Vec<InvalidRecord>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
