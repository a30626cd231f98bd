//! Measurement persistence.
//!
//! A [`MeasurementStore`] hands out one [`StoreTransaction`] per import run.
//! The transaction is a guard: dropping it without calling
//! [`StoreTransaction::commit`] rolls everything back.
//!
//! Field validation and the duplicate pre-check are store independent and
//! live in [`checked_insert`].
//!
//! Submodules:
//! - `memory`: in-process store (tests, dry runs without a database).
//! - `pg`: PostgreSQL store over the water master data table.

pub mod memory;
pub mod pg;

use chrono::NaiveDate;

use crate::error::{PersistError, StoreError};
use crate::model::Measurement;

pub use memory::InMemoryStore;
pub use pg::PgMeasurementStore;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Something that can open a transaction over the measurement table.
pub trait MeasurementStore {
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Transaction<'_>, StoreError>;
}

/// Operations available inside one store transaction.
pub trait StoreTransaction {
    /// Most recent measurement for a hydrology id, optionally restricted to
    /// one calendar year.
    fn last_measurement(
        &mut self,
        hydrology_id: i32,
        within_year: Option<i32>,
    ) -> Result<Option<Measurement>, StoreError>;

    fn find_by_identity(
        &mut self,
        hydrology_id: i32,
        diversion_date: NaiveDate,
    ) -> Result<Option<Measurement>, StoreError>;

    /// Inserts without validation. Fails with `PersistError::Duplicate` when
    /// the identity key is taken; the transaction stays usable afterwards.
    fn insert(&mut self, measurement: &Measurement) -> Result<(), PersistError>;

    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;

    fn rollback(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Field names failing validation, in check order.
///
/// The diversion date is a `NaiveDate`, so its presence check is carried by
/// the type and never reports here.
pub fn invalid_fields(measurement: &Measurement) -> Vec<&'static str> {
    let mut invalid = Vec::new();
    if measurement.hydrology_id < 1 {
        invalid.push("HydrologyId");
    }
    if measurement.measurement_type_id < 1 {
        invalid.push("MeasurementTypeId");
    }
    if measurement.user_id.is_empty() {
        invalid.push("UserId");
    }
    invalid
}

/// Validates and inserts one measurement.
///
/// An existing row for the identity key wins over field errors: the result
/// is `Duplicate` even if the fields are also invalid.
pub fn checked_insert<T: StoreTransaction>(
    tx: &mut T,
    measurement: &Measurement,
) -> Result<(), PersistError> {
    let invalid = invalid_fields(measurement);

    if tx
        .find_by_identity(measurement.hydrology_id, measurement.diversion_date)?
        .is_some()
    {
        return Err(PersistError::Duplicate {
            hydrology_id: measurement.hydrology_id,
            diversion_date: measurement.diversion_date,
        });
    }

    if !invalid.is_empty() {
        return Err(PersistError::Invalid { fields: invalid });
    }

    tx.insert(measurement)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
