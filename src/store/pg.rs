/// PostgreSQL measurement store over `water_master_data`.
///
/// Expected table shape:
///
/// ```text
/// water_master_data (
///     hydrology_pd_id      TEXT NOT NULL,
///     hydrology_id         INTEGER NOT NULL,
///     diversion_date       DATE NOT NULL,
///     measurement_type_id  INTEGER NOT NULL,
///     discharge            DOUBLE PRECISION,
///     registration_id      TEXT NOT NULL,
///     user_id              TEXT NOT NULL,
///     UNIQUE (hydrology_id, diversion_date)
/// )
/// ```

use chrono::NaiveDate;
use postgres::error::SqlState;
use postgres::{Client, Row, Transaction};

use crate::db;
use crate::error::{PersistError, StoreError};
use crate::model::Measurement;
use crate::store::{MeasurementStore, StoreTransaction};

const SELECT_COLUMNS: &str = "
    SELECT hydrology_pd_id,
           hydrology_id,
           diversion_date,
           measurement_type_id,
           discharge,
           registration_id,
           user_id
    FROM water_master_data";

pub struct PgMeasurementStore {
    client: Client,
}

impl PgMeasurementStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(db::connect_and_verify(database_url, &["water_master_data"])?))
    }
}

impl MeasurementStore for PgMeasurementStore {
    type Transaction<'a> = PgTransaction<'a>;

    fn begin(&mut self) -> Result<PgTransaction<'_>, StoreError> {
        Ok(PgTransaction {
            tx: self.client.transaction()?,
        })
    }
}

/// Wraps a `postgres::Transaction`, which already rolls back on drop.
pub struct PgTransaction<'a> {
    tx: Transaction<'a>,
}

fn measurement_from_row(row: &Row) -> Measurement {
    Measurement {
        monitoring_point_ref: row.get(0),
        hydrology_id: row.get(1),
        diversion_date: row.get(2),
        measurement_type_id: row.get(3),
        discharge: row.get::<_, Option<f64>>(4).unwrap_or_default(),
        registration_id: row.get(5),
        user_id: row.get(6),
    }
}

impl StoreTransaction for PgTransaction<'_> {
    fn last_measurement(
        &mut self,
        hydrology_id: i32,
        within_year: Option<i32>,
    ) -> Result<Option<Measurement>, StoreError> {
        let query = format!(
            "{}
             WHERE hydrology_id = $1
               AND ($2::INT IS NULL OR EXTRACT(YEAR FROM diversion_date)::INT = $2)
             ORDER BY diversion_date DESC
             LIMIT 1",
            SELECT_COLUMNS
        );
        let row = self.tx.query_opt(&query, &[&hydrology_id, &within_year])?;
        Ok(row.as_ref().map(measurement_from_row))
    }

    fn find_by_identity(
        &mut self,
        hydrology_id: i32,
        diversion_date: NaiveDate,
    ) -> Result<Option<Measurement>, StoreError> {
        let query = format!(
            "{} WHERE hydrology_id = $1 AND diversion_date = $2",
            SELECT_COLUMNS
        );
        let row = self.tx.query_opt(&query, &[&hydrology_id, &diversion_date])?;
        Ok(row.as_ref().map(measurement_from_row))
    }

    fn insert(&mut self, measurement: &Measurement) -> Result<(), PersistError> {
        // A failed statement aborts the whole transaction in PostgreSQL, so
        // each insert gets its own savepoint.
        let mut savepoint = self.tx.transaction().map_err(StoreError::from)?;
        let inserted = savepoint.execute(
            "INSERT INTO water_master_data
                 (hydrology_pd_id, hydrology_id, diversion_date, measurement_type_id,
                  discharge, registration_id, user_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &measurement.monitoring_point_ref,
                &measurement.hydrology_id,
                &measurement.diversion_date,
                &measurement.measurement_type_id,
                &measurement.discharge,
                &measurement.registration_id,
                &measurement.user_id,
            ],
        );

        match inserted {
            Ok(_) => {
                savepoint.commit().map_err(StoreError::from)?;
                Ok(())
            }
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(PersistError::Duplicate {
                hydrology_id: measurement.hydrology_id,
                diversion_date: measurement.diversion_date,
            }),
            Err(e) => Err(StoreError::from(e).into()),
        }
    }

    fn commit(self) -> Result<(), StoreError> {
        Ok(self.tx.commit()?)
    }

    fn rollback(self) -> Result<(), StoreError> {
        Ok(self.tx.rollback()?)
    }
}
