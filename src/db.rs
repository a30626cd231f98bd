/// PostgreSQL connection helpers.
///
/// The connection string comes from the config file or `DATABASE_URL`
/// (see `config::Config::database_url`).

use postgres::{Client, NoTls};
use tracing::debug;

use crate::error::StoreError;

/// Tables the import reads from and writes to.
pub const REQUIRED_TABLES: &[&str] = &["hydrology_pd", "water_master_data"];

pub fn connect(database_url: &str) -> Result<Client, StoreError> {
    Ok(Client::connect(database_url, NoTls)?)
}

/// Connects and checks that every table in `tables` exists in the public
/// schema. Fails with `StoreError::MissingTables` listing the absent ones.
pub fn connect_and_verify(database_url: &str, tables: &[&str]) -> Result<Client, StoreError> {
    let mut client = connect(database_url)?;
    let missing = missing_tables(&mut client, tables)?;
    if !missing.is_empty() {
        return Err(StoreError::MissingTables(missing));
    }
    debug!(tables = tables.len(), "database schema verified");
    Ok(client)
}

fn missing_tables(client: &mut Client, tables: &[&str]) -> Result<Vec<String>, StoreError> {
    let rows = client.query(
        "SELECT table_name::TEXT
         FROM information_schema.tables
         WHERE table_schema = 'public'
           AND table_name = ANY($1)",
        &[&tables],
    )?;
    let present: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
    Ok(tables
        .iter()
        .filter(|t| !present.iter().any(|p| p == *t))
        .map(|t| t.to_string())
        .collect())
}
