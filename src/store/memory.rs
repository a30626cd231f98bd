/// In-process measurement store.
///
/// Rows live in a `BTreeMap` keyed by `(hydrology_id, diversion_date)`.
/// A transaction stages inserts separately and only merges them on commit,
/// so dropping it discards everything it wrote.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::error::{PersistError, StoreError};
use crate::model::Measurement;
use crate::store::{MeasurementStore, StoreTransaction};

type Key = (i32, NaiveDate);

#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: BTreeMap<Key, Measurement>,
    commits: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with committed rows. Later rows with an identity
    /// key already seen are ignored.
    pub fn with_rows(rows: impl IntoIterator<Item = Measurement>) -> Self {
        let mut store = Self::new();
        for row in rows {
            store.rows.entry(row.identity()).or_insert(row);
        }
        store
    }

    /// Committed rows in identity-key order.
    pub fn rows(&self) -> impl Iterator<Item = &Measurement> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, hydrology_id: i32, diversion_date: NaiveDate) -> Option<&Measurement> {
        self.rows.get(&(hydrology_id, diversion_date))
    }

    /// Number of transactions committed so far.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl MeasurementStore for InMemoryStore {
    type Transaction<'a> = InMemoryTransaction<'a>;

    fn begin(&mut self) -> Result<InMemoryTransaction<'_>, StoreError> {
        Ok(InMemoryTransaction {
            store: self,
            staged: BTreeMap::new(),
        })
    }
}

pub struct InMemoryTransaction<'a> {
    store: &'a mut InMemoryStore,
    staged: BTreeMap<Key, Measurement>,
}

fn latest_in<'m>(
    rows: &'m BTreeMap<Key, Measurement>,
    hydrology_id: i32,
    within_year: Option<i32>,
) -> Option<&'m Measurement> {
    rows.range((hydrology_id, NaiveDate::MIN)..=(hydrology_id, NaiveDate::MAX))
        .rev()
        .map(|(_, m)| m)
        .find(|m| within_year.is_none_or(|year| m.diversion_date.year() == year))
}

impl StoreTransaction for InMemoryTransaction<'_> {
    fn last_measurement(
        &mut self,
        hydrology_id: i32,
        within_year: Option<i32>,
    ) -> Result<Option<Measurement>, StoreError> {
        let committed = latest_in(&self.store.rows, hydrology_id, within_year);
        let staged = latest_in(&self.staged, hydrology_id, within_year);
        let latest = match (committed, staged) {
            (Some(a), Some(b)) => Some(if b.diversion_date > a.diversion_date { b } else { a }),
            (a, b) => a.or(b),
        };
        Ok(latest.cloned())
    }

    fn find_by_identity(
        &mut self,
        hydrology_id: i32,
        diversion_date: NaiveDate,
    ) -> Result<Option<Measurement>, StoreError> {
        let key = (hydrology_id, diversion_date);
        Ok(self
            .staged
            .get(&key)
            .or_else(|| self.store.rows.get(&key))
            .cloned())
    }

    fn insert(&mut self, measurement: &Measurement) -> Result<(), PersistError> {
        let key = measurement.identity();
        if self.staged.contains_key(&key) || self.store.rows.contains_key(&key) {
            return Err(PersistError::Duplicate {
                hydrology_id: measurement.hydrology_id,
                diversion_date: measurement.diversion_date,
            });
        }
        self.staged.insert(key, measurement.clone());
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        self.store.rows.extend(self.staged);
        self.store.commits += 1;
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
