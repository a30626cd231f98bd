//! Gap filling between two known discharge values.
//!
//! Field crews visit a diversion every few days, but the water master data
//! table holds one value per day. The days between two visits are filled
//! with synthesized records tagged `MEASUREMENT_TYPE_INTERPOLATED`.
//!
//! Closed-conduit meters get a straight line between the two readings.
//! Open channels are filled flat with the earlier reading.

use chrono::Duration;

use crate::model::{DeviceType, MEASUREMENT_TYPE_INTERPOLATED, Measurement};

/// Returns one record per day strictly between `previous` and `next`.
///
/// Metadata (hydrology id, point ref, registration, user) is taken from
/// `next`. Neither endpoint is emitted. Returns an empty vector when `next`
/// is not after `previous`.
pub fn interpolate(
    previous: &Measurement,
    next: &Measurement,
    device_type: DeviceType,
) -> Vec<Measurement> {
    let days = (next.diversion_date - previous.diversion_date).num_days();
    if days <= 0 {
        return Vec::new();
    }

    let step = match device_type {
        DeviceType::ClosedConduit => (next.discharge - previous.discharge) / days as f64,
        DeviceType::OpenChannel => 0.0,
    };

    (1..days)
        .map(|d| Measurement {
            monitoring_point_ref: next.monitoring_point_ref.clone(),
            hydrology_id: next.hydrology_id,
            diversion_date: previous.diversion_date + Duration::days(d),
            measurement_type_id: MEASUREMENT_TYPE_INTERPOLATED,
            discharge: previous.discharge + step * d as f64,
            registration_id: next.registration_id.clone(),
            user_id: next.user_id.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
