use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::app::ports::{OccurrencePort, TraitLookupPort};
use crate::config::{OccurrenceConfig, TraitsConfig};
use crate::constants::{OCCURRENCE_SERVICE, TRAIT_SERVICE};
use crate::domain::{OccurrencePoint, Record, Table, Value};
use crate::error::{Result, TaxaError};
use crate::observability::metrics;

/// GET `url` with `query` and decode the JSON body. Transport errors,
/// non-2xx statuses and undecodable bodies all surface as `ExternalService`.
async fn get_json<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    service: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T> {
    let started = Instant::now();
    let outcome = async {
        let resp = client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| TaxaError::external(service, format!("request to {} failed: {}", url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TaxaError::external(service, format!("{} returned HTTP {}", url, status)));
        }
        resp.json::<T>()
            .await
            .map_err(|e| TaxaError::external(service, format!("undecodable response from {}: {}", url, e)))
    }
    .await;

    metrics::lookup::request_duration(service, started.elapsed().as_secs_f64());
    match &outcome {
        Ok(_) => metrics::lookup::request_success(service),
        Err(e) => {
            error!(service = %service, "{}", e);
            metrics::lookup::request_error(service);
        }
    }
    outcome
}

fn build_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("taxa_merge/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Trait database client: one request per species,
/// `GET {base_url}/{table}?{name_param}=<name>&fields=<a,b,c>`, answering
/// `{"data": [{...}, ...]}`.
pub struct HttpTraitLookup {
    client: reqwest::Client,
    base_url: String,
    table: String,
    name_param: String,
}

impl HttpTraitLookup {
    pub fn new(config: &TraitsConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            table: config.table.clone(),
            name_param: config.name_param.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TraitResponse {
    #[serde(default)]
    data: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Convert one trait response into records carrying `fields`. The name
/// field is filled with the queried name when the service leaves it out.
fn trait_records(
    queried_name: &str,
    name_field: &str,
    fields: &[String],
    rows: &[serde_json::Map<String, serde_json::Value>],
) -> Vec<Record> {
    rows.iter()
        .map(|row| {
            let mut record = Record::new();
            for field in fields {
                let value = row.get(field).map(Value::from_json).unwrap_or_default();
                record.set(field.clone(), value);
            }
            if record.is_null(name_field) {
                record.set(name_field, queried_name);
            }
            record
        })
        .collect()
}

#[async_trait]
impl TraitLookupPort for HttpTraitLookup {
    async fn lookup(&self, names: &BTreeSet<String>, fields: &[String]) -> Result<Table> {
        let url = format!("{}/{}", self.base_url, self.table);
        let mut columns: Vec<String> = fields.to_vec();
        if !columns.contains(&self.name_param) {
            columns.insert(0, self.name_param.clone());
        }
        let mut table = Table::new(columns.iter().cloned());

        for name in names {
            let query = [
                (self.name_param.as_str(), name.clone()),
                ("fields", fields.join(",")),
            ];
            let response: TraitResponse = get_json(&self.client, TRAIT_SERVICE, &url, &query).await?;
            debug!(species = %name, rows = response.data.len(), "Trait lookup answered");
            metrics::lookup::rows_returned(TRAIT_SERVICE, response.data.len());
            for record in trait_records(name, &self.name_param, &columns, &response.data) {
                table.push(record);
            }
        }

        info!(names = names.len(), rows = table.len(), "Trait lookup complete");
        Ok(table)
    }
}

/// Occurrence database client shaped after the OBIS v3 API:
/// `GET {base_url}/occurrence?scientificname=..&startdate=YYYY-MM-DD&size=N`
pub struct HttpOccurrenceSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOccurrenceSource {
    pub fn new(config: &OccurrenceConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OccurrenceResponse {
    #[serde(default)]
    results: Vec<RawOccurrence>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOccurrence {
    decimal_latitude: Option<f64>,
    decimal_longitude: Option<f64>,
    event_date: Option<String>,
    #[serde(rename = "dataset_id")]
    dataset_id: Option<String>,
}

/// Event dates come as days, timestamps or `start/end` intervals; the first
/// calendar day is kept
fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn occurrence_points(scientific_name: &str, results: Vec<RawOccurrence>) -> Vec<OccurrencePoint> {
    let total = results.len();
    let points: Vec<OccurrencePoint> = results
        .into_iter()
        .filter_map(|raw| {
            let latitude = raw.decimal_latitude.filter(|lat| (-90.0..=90.0).contains(lat))?;
            let longitude = raw.decimal_longitude.filter(|lon| (-180.0..=180.0).contains(lon))?;
            Some(OccurrencePoint {
                scientific_name: scientific_name.to_string(),
                latitude,
                longitude,
                event_date: raw.event_date.as_deref().and_then(parse_event_date),
                dataset_id: raw.dataset_id,
            })
        })
        .collect();
    if points.len() < total {
        debug!(
            species = %scientific_name,
            skipped = total - points.len(),
            "Occurrences without usable coordinates skipped"
        );
    }
    points
}

#[async_trait]
impl OccurrencePort for HttpOccurrenceSource {
    async fn fetch(&self, scientific_name: &str, since: NaiveDate, limit: u32) -> Result<Vec<OccurrencePoint>> {
        let url = format!("{}/occurrence", self.base_url);
        let query = [
            ("scientificname", scientific_name.to_string()),
            ("startdate", since.format("%Y-%m-%d").to_string()),
            ("size", limit.to_string()),
        ];
        let response: OccurrenceResponse = get_json(&self.client, OCCURRENCE_SERVICE, &url, &query).await?;
        metrics::lookup::rows_returned(OCCURRENCE_SERVICE, response.results.len());
        Ok(occurrence_points(scientific_name, response.results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trait_records_fill_missing_name_and_fields() {
        let response: TraitResponse = serde_json::from_value(json!({
            "count": 2,
            "data": [
                {"sciname": "Prionace glauca", "TempMin": 8, "TempMax": 25.5},
                {"TempMin": null}
            ]
        }))
        .unwrap();
        let fields = vec!["sciname".to_string(), "TempMin".to_string(), "TempMax".to_string()];

        let records = trait_records("Prionace glauca", "sciname", &fields, &response.data);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("TempMin"), &Value::Number(8.0));
        assert_eq!(records[0].get("TempMax"), &Value::Number(25.5));
        assert_eq!(records[1].text("sciname"), Some("Prionace glauca"));
        assert!(records[1].is_null("TempMax"));
    }

    #[test]
    fn test_occurrence_payload_parsing() {
        let response: OccurrenceResponse = serde_json::from_value(json!({
            "total": 3,
            "results": [
                {"decimalLatitude": -33.8, "decimalLongitude": 151.2, "eventDate": "2016-04-02T00:00:00Z", "dataset_id": "a"},
                {"decimalLatitude": 12.0, "decimalLongitude": null},
                {"decimalLatitude": 40.1, "decimalLongitude": -70.5, "eventDate": "2012-07-01/2012-07-09"}
            ]
        }))
        .unwrap();

        let points = occurrence_points("Prionace glauca", response.results);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].event_date, NaiveDate::from_ymd_opt(2016, 4, 2));
        assert_eq!(points[0].dataset_id.as_deref(), Some("a"));
        assert_eq!(points[1].event_date, NaiveDate::from_ymd_opt(2012, 7, 1));
        assert!(points.iter().all(|p| p.scientific_name == "Prionace glauca"));
    }

    #[test]
    fn test_event_date_rejects_garbage() {
        assert_eq!(parse_event_date("unknown"), None);
        assert_eq!(parse_event_date(""), None);
    }
}
