/// Survey123 (ArcGIS feature service) client
///
/// Field crews record diversion visits in Survey123. Each survey stores its
/// answers in layer 0 of a hosted feature service. This client signs in to
/// the portal, resolves the survey's layer and queries visits newer than a
/// cutoff date.
///
/// REST API: https://developers.arcgis.com/rest/services-reference/enterprise/query-feature-service-layer/

use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{
    FIELD_DEVICE_TYPE, FIELD_DISCHARGE, FIELD_DIVERSION_DATE, FIELD_LOCATION, FIELD_MEASUREMENT_TYPE,
    FIELD_USER_ID, FieldMap, SurveyConfig, SurveyHost,
};
use crate::error::SourceError;
use crate::ingest::MeasurementSource;
use crate::model::RawSurveyRecord;

const SERVICE: &str = "Survey123";
const TOKEN_MINUTES: u32 = 60;

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    error: Option<ApiError>,
}

/// Portal item metadata; `url` is the feature service root.
#[derive(Debug, Deserialize)]
struct ItemResponse {
    url: Option<String>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayerResponse {
    object_id_field: Option<String>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    object_id_field_name: Option<String>,
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    exceeded_transfer_limit: bool,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    attributes: Map<String, Value>,
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    pub records: Vec<RawSurveyRecord>,
    /// More features match than the service returned.
    pub exceeded_transfer_limit: bool,
}

fn check(error: Option<ApiError>) -> Result<(), SourceError> {
    match error {
        Some(e) => Err(SourceError::Api {
            service: SERVICE,
            code: e.code,
            message: e.message,
        }),
        None => Ok(()),
    }
}

// ============================================================================
// Client
// ============================================================================

/// Signed-in connection to one portal.
pub struct SurveyClient {
    http: reqwest::blocking::Client,
    portal_url: String,
    token: String,
}

impl SurveyClient {
    /// Signs in to the host's portal and returns a client holding the token.
    pub fn connect(host: &SurveyHost) -> Result<Self, SourceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let portal_url = host.url.trim_end_matches('/').to_string();

        let expiration = TOKEN_MINUTES.to_string();
        let response = http
            .post(format!("{}/sharing/rest/generateToken", portal_url))
            .form(&[
                ("username", host.username.as_str()),
                ("password", host.password.as_str()),
                ("client", "referer"),
                ("referer", portal_url.as_str()),
                ("expiration", expiration.as_str()),
                ("f", "json"),
            ])
            .send()?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        let body: TokenResponse = serde_json::from_str(&response.text()?)?;
        check(body.error)?;
        let token = body
            .token
            .ok_or_else(|| SourceError::Parse("token response has no token".to_string()))?;

        debug!(portal = %portal_url, "signed in");
        Ok(Self {
            http,
            portal_url,
            token,
        })
    }

    fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<String, SourceError> {
        let response = self
            .http
            .get(url)
            .query(params)
            .query(&[("f", "json"), ("token", self.token.as_str())])
            .header("Referer", self.portal_url.as_str())
            .send()?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }
        Ok(response.text()?)
    }

    /// URL of layer 0 of the survey's feature service.
    pub fn layer_url(&self, item_id: &str) -> Result<String, SourceError> {
        let url = format!("{}/sharing/rest/content/items/{}", self.portal_url, item_id);
        let item: ItemResponse = serde_json::from_str(&self.get_json(&url, &[])?)?;
        check(item.error)?;
        let service_url = item
            .url
            .ok_or_else(|| SourceError::Parse(format!("item {} has no service url", item_id)))?;
        Ok(format!("{}/0", service_url.trim_end_matches('/')))
    }

    fn object_id_field(&self, layer_url: &str) -> Result<String, SourceError> {
        let layer: LayerResponse = serde_json::from_str(&self.get_json(layer_url, &[])?)?;
        check(layer.error)?;
        Ok(layer.object_id_field.unwrap_or_else(|| "OBJECTID".to_string()))
    }

    /// Fetches every survey record newer than `cutoff`, following pages
    /// until the service stops reporting a transfer limit.
    pub fn retrieve(&self, survey: &SurveyConfig, cutoff: NaiveDate) -> Result<Vec<RawSurveyRecord>, SourceError> {
        let layer_url = self.layer_url(&survey.id)?;
        let object_id_field = self.object_id_field(&layer_url)?;
        let query_url = format!("{}/query", layer_url);
        let where_clause = where_clause(&survey.cutoff_field, cutoff);
        let out_fields = out_fields(&survey.fields, &object_id_field);

        let mut records = Vec::new();
        loop {
            let offset = records.len().to_string();
            let body = self.get_json(
                &query_url,
                &[
                    ("where", where_clause.as_str()),
                    ("outFields", out_fields.as_str()),
                    ("orderByFields", object_id_field.as_str()),
                    ("returnGeometry", "false"),
                    ("resultOffset", offset.as_str()),
                ],
            )?;
            let page = parse_query_response(&body, &survey.fields)?;
            let fetched = page.records.len();
            records.extend(page.records);
            if !page.exceeded_transfer_limit || fetched == 0 {
                break;
            }
        }

        debug!(survey = %survey.id, count = records.len(), %cutoff, "retrieved survey records");
        Ok(records)
    }
}

/// `"<field>" > DATE 'YYYY-MM-DD'`
pub fn where_clause(cutoff_field: &str, cutoff: NaiveDate) -> String {
    format!("\"{}\" > DATE '{}'", cutoff_field, cutoff.format("%Y-%m-%d"))
}

/// Comma-separated service fields to request, object id field last.
pub fn out_fields(fields: &FieldMap, object_id_field: &str) -> String {
    let mut names: Vec<&str> = fields.values().map(String::as_str).collect();
    if !names.contains(&object_id_field) {
        names.push(object_id_field);
    }
    names.join(",")
}

// ============================================================================
// Response parsing
// ============================================================================

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Parses a feature query response, mapping service fields back to the
/// canonical names in `fields`. Null and absent attributes become `None`.
pub fn parse_query_response(body: &str, fields: &FieldMap) -> Result<QueryPage, SourceError> {
    let response: QueryResponse = serde_json::from_str(body)?;
    check(response.error)?;

    let object_id_field = response
        .object_id_field_name
        .unwrap_or_else(|| "OBJECTID".to_string());

    let records = response
        .features
        .iter()
        .map(|feature| {
            let attr = |canonical: &str| {
                fields
                    .get(canonical)
                    .and_then(|service| feature.attributes.get(service))
                    .filter(|v| !v.is_null())
            };
            RawSurveyRecord {
                object_id: feature.attributes.get(&object_id_field).and_then(as_i64),
                location_ref: attr(FIELD_LOCATION).and_then(as_i64),
                discharge: attr(FIELD_DISCHARGE).and_then(as_f64),
                diversion_date_ms: attr(FIELD_DIVERSION_DATE).and_then(as_i64),
                measurement_type_id: attr(FIELD_MEASUREMENT_TYPE)
                    .and_then(as_i64)
                    .and_then(|t| i32::try_from(t).ok()),
                device_type: attr(FIELD_DEVICE_TYPE).and_then(as_string),
                user_id: attr(FIELD_USER_ID).and_then(as_string),
            }
        })
        .collect();

    Ok(QueryPage {
        records,
        exceeded_transfer_limit: response.exceeded_transfer_limit,
    })
}

// ============================================================================
// Measurement source
// ============================================================================

/// One configured survey, read through a signed-in client.
pub struct SurveyFeed<'a> {
    client: SurveyClient,
    survey: &'a SurveyConfig,
}

impl<'a> SurveyFeed<'a> {
    pub fn new(client: SurveyClient, survey: &'a SurveyConfig) -> Self {
        Self { client, survey }
    }

    pub fn connect(host: &SurveyHost, survey: &'a SurveyConfig) -> Result<Self, SourceError> {
        Ok(Self::new(SurveyClient::connect(host)?, survey))
    }
}

impl MeasurementSource for SurveyFeed<'_> {
    fn fetch(&mut self, district_number: &str, cutoff: NaiveDate) -> Result<Vec<RawSurveyRecord>, SourceError> {
        debug!(district = district_number, survey = %self.survey.id, "querying survey");
        self.client.retrieve(self.survey, cutoff)
    }
}

// ============================================================================
// Tests
// ============================================================================
