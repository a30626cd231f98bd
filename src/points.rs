/// Hydrology point directory.
///
/// Resolves the spatial id carried by a survey record to the monitoring
/// point (diversion) it was taken at, and lists the points of a water
/// district. The directory is reference data owned by the district
/// database; nothing here writes to it.

use postgres::{Client, Row};

use crate::db;
use crate::error::StoreError;
use crate::model::HydrologyPoint;

// ---------------------------------------------------------------------------
// Directory capability
// ---------------------------------------------------------------------------

pub trait HydrologyPointDirectory {
    /// Looks up the point whose own spatial id is `location_ref`.
    fn resolve_by_location(&mut self, location_ref: i64) -> Result<Option<HydrologyPoint>, StoreError>;

    /// All points in a water district, in directory order.
    fn points_in_district(&mut self, district_number: &str) -> Result<Vec<HydrologyPoint>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory registry
// ---------------------------------------------------------------------------

/// A fixed list of points, searched linearly.
#[derive(Debug, Clone, Default)]
pub struct PointRegistry {
    points: Vec<HydrologyPoint>,
}

impl PointRegistry {
    pub fn new(points: Vec<HydrologyPoint>) -> Self {
        Self { points }
    }
}

impl HydrologyPointDirectory for PointRegistry {
    fn resolve_by_location(&mut self, location_ref: i64) -> Result<Option<HydrologyPoint>, StoreError> {
        Ok(self
            .points
            .iter()
            .find(|p| p.location_ref == location_ref)
            .cloned())
    }

    fn points_in_district(&mut self, district_number: &str) -> Result<Vec<HydrologyPoint>, StoreError> {
        Ok(self
            .points
            .iter()
            .filter(|p| p.water_district_number == district_number)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL directory
// ---------------------------------------------------------------------------

const SELECT_POINTS: &str = "
    SELECT id,
           hydrology_id,
           water_district_number,
           diversion_type_id,
           diversion_name,
           reach_description,
           location_id,
           diversion_location_id,
           inactive,
           comment
    FROM hydrology_pd";

/// Reads points from the `hydrology_pd` table.
pub struct PgPointDirectory {
    client: Client,
}

impl PgPointDirectory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(db::connect_and_verify(database_url, &["hydrology_pd"])?))
    }
}

fn point_from_row(row: &Row) -> HydrologyPoint {
    HydrologyPoint {
        id: row.get(0),
        hydrology_id: row.get(1),
        water_district_number: row.get(2),
        diversion_type_id: row.get(3),
        diversion_name: row.get(4),
        reach_description: row.get(5),
        location_ref: row.get(6),
        diversion_location_ref: row.get(7),
        inactive: row.get(8),
        comment: row.get(9),
    }
}

impl HydrologyPointDirectory for PgPointDirectory {
    fn resolve_by_location(&mut self, location_ref: i64) -> Result<Option<HydrologyPoint>, StoreError> {
        let query = format!("{} WHERE location_id = $1 LIMIT 1", SELECT_POINTS);
        let row = self.client.query_opt(&query, &[&location_ref])?;
        Ok(row.as_ref().map(point_from_row))
    }

    fn points_in_district(&mut self, district_number: &str) -> Result<Vec<HydrologyPoint>, StoreError> {
        let query = format!(
            "{} WHERE water_district_number = $1 ORDER BY hydrology_id",
            SELECT_POINTS
        );
        let rows = self.client.query(&query, &[&district_number])?;
        Ok(rows.iter().map(point_from_row).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
