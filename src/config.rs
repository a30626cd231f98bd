//! Configuration file loading.
//!
//! ```toml
//! registration_id = "45D3E06E-AAB9-46CD-A799-49096572F48D"
//! # database_url = "postgres://..."   (otherwise DATABASE_URL / .env)
//!
//! [logging]
//! level = "info"
//! file = "logs/survey_import.log"
//! console_timestamps = true
//!
//! [hosts.idwr]
//! url = "https://idwr.maps.arcgis.com"
//! username = "importer"
//! password = "..."
//!
//! [surveys."63"]
//! host = "idwr"
//! id = "0123456789abcdef0123456789abcdef"
//!
//! [surveys."63".fields]
//! SpatialDataID = "spatial_data_id"
//! Discharge = "discharge_cfs"
//! DiversionDate = "DateOfVisit"
//! MeasurementTypeId = "measurement_type"
//! DeviceType = "device_type"
//! UserId = "Creator"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::logging::LogLevel;

/// Canonical field names a survey's `fields` table maps from.
pub const FIELD_LOCATION: &str = "SpatialDataID";
pub const FIELD_DISCHARGE: &str = "Discharge";
pub const FIELD_DIVERSION_DATE: &str = "DiversionDate";
pub const FIELD_MEASUREMENT_TYPE: &str = "MeasurementTypeId";
pub const FIELD_DEVICE_TYPE: &str = "DeviceType";
pub const FIELD_USER_ID: &str = "UserId";

/// Fields a survey must map for its records to be usable.
pub const REQUIRED_FIELDS: &[&str] = &[FIELD_LOCATION, FIELD_DISCHARGE, FIELD_DIVERSION_DATE];

/// Canonical field name → feature service field name.
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Registration id stamped on every imported row.
    pub registration_id: String,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub hosts: BTreeMap<String, SurveyHost>,
    /// Keyed by water district number; iterated in key order.
    #[serde(default)]
    pub surveys: BTreeMap<String, SurveyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_true")]
    pub console_timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            console_timestamps: true,
        }
    }
}

/// A Survey123 / ArcGIS portal and the account used to read from it.
#[derive(Debug, Clone, Deserialize)]
pub struct SurveyHost {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurveyConfig {
    /// Key into `Config::hosts`.
    pub host: String,
    /// Portal item id of the survey's feature service.
    pub id: String,
    /// Service date field compared against the cutoff date.
    #[serde(default = "default_cutoff_field")]
    pub cutoff_field: String,
    pub fields: FieldMap,
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

fn default_true() -> bool {
    true
}

fn default_cutoff_field() -> String {
    "DateOfVisit".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.registration_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "registration_id is empty".to_string(),
            });
        }
        for (district, survey) in &self.surveys {
            if !self.hosts.contains_key(&survey.host) {
                return Err(ConfigError::Invalid {
                    reason: format!("survey '{}' references unknown host '{}'", district, survey.host),
                });
            }
            if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !survey.fields.contains_key(**f)) {
                return Err(ConfigError::Invalid {
                    reason: format!("survey '{}' does not map field '{}'", district, missing),
                });
            }
        }
        Ok(())
    }

    /// The configured database URL, else `DATABASE_URL` from the
    /// environment or a `.env` file.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        dotenv::dotenv().ok();
        env::var("DATABASE_URL").map_err(|_| ConfigError::Invalid {
            reason: "no database_url in config and DATABASE_URL is not set".to_string(),
        })
    }

    pub fn host_for(&self, survey: &SurveyConfig) -> Result<&SurveyHost, ConfigError> {
        self.hosts.get(&survey.host).ok_or_else(|| ConfigError::Invalid {
            reason: format!("unknown host '{}'", survey.host),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
