use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logging;

pub const ALERTS_TABLE: &str = "alertas_medios";
pub const THUMBNAILS_TABLE: &str = "video_thumbnails";
pub const ORDER_COLUMN: &str = "fecha_detencion";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub url: String,
    pub key: String,
    pub http_client: Option<HttpClient>,
}

/// One detected-mention row from the alert table. Field names mirror the
/// backend columns; everything except the id tolerates null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertRecord {
    #[serde(deserialize_with = "id_from_value")]
    pub id: String,
    #[serde(default)]
    pub fecha_detencion: Option<String>,
    #[serde(default)]
    pub fecha_programa: Option<String>,
    #[serde(default)]
    pub hora_programa: Option<String>,
    #[serde(default)]
    pub termino_detectado: Option<Terms>,
    #[serde(default)]
    pub ejecutivo: Option<String>,
    #[serde(default)]
    pub contexto: Option<String>,
    #[serde(default)]
    pub transcripcion: Option<String>,
    #[serde(default)]
    pub relevancia: Option<String>,
    #[serde(default)]
    pub url_video: Option<String>,
    #[serde(default)]
    pub nombre_archivo: Option<String>,
}

/// The detected-term column is either one comma-delimited string or a json
/// list, depending on which pipeline inserted the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Terms {
    Many(Vec<String>),
    One(String),
}

impl Terms {
    /// Ordered list of trimmed, non-empty terms.
    pub fn normalized(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Terms::Many(items) => items.iter().map(String::as_str).collect(),
            Terms::One(text) => text.split(',').collect(),
        };
        raw.iter()
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The raw column text, used for filter matching.
    pub fn raw_text(&self) -> String {
        match self {
            Terms::Many(items) => items.join(", "),
            Terms::One(text) => text.clone(),
        }
    }
}

impl AlertRecord {
    pub fn terms(&self) -> Vec<String> {
        self.termino_detectado
            .as_ref()
            .map(Terms::normalized)
            .unwrap_or_default()
    }
}

fn id_from_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(DeError::custom(format!("unsupported id value: {other}"))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailRecord {
    pub video_id: String,
    pub thumbnail_data: String,
    pub timestamp: f64,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ThumbnailRecord {
    pub fn new(video_id: impl Into<String>, thumbnail_data: String, timestamp: f64) -> Self {
        Self {
            video_id: video_id.into(),
            thumbnail_data,
            timestamp,
            created_at: Some(Utc::now().to_rfc3339()),
        }
    }
}

pub struct Client {
    http: HttpClient,
    base_url: String,
    key: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let url = config.url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            bail!("supabase: service url required");
        }
        if config.key.trim().is_empty() {
            bail!("supabase: access key required");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .context("supabase: build http client")?,
        };

        Ok(Client {
            http,
            base_url: url,
            key: config.key.trim().to_string(),
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Endpoint of the change-notification stream for the alert table.
    pub fn changes_url(&self) -> String {
        format!(
            "{}/realtime/v1/changes?table={}",
            self.base_url, ALERTS_TABLE
        )
    }

    pub fn access_key(&self) -> &str {
        &self.key
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.key).context("supabase: access key header")?;
        headers.insert("apikey", key);
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.key))
            .context("supabase: bearer header")?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Window `[offset, offset + limit)` of the alert table, newest detection
    /// first. An offset past the end returns an empty list, not an error.
    pub fn fetch_alerts(&self, limit: usize, offset: usize) -> Result<Vec<AlertRecord>> {
        logging::debug(format!(
            "supabase: fetch alerts limit={limit} offset={offset}"
        ));
        let response = self
            .http
            .get(self.rest_url(ALERTS_TABLE))
            .headers(self.auth_headers()?)
            .query(&[
                ("select", "*".to_string()),
                ("order", format!("{ORDER_COLUMN}.desc.nullslast")),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .context("supabase: fetch alerts")?;

        let response = ensure_success(response, "fetch alerts")?;
        let rows: Vec<AlertRecord> = response.json().context("supabase: decode alert rows")?;
        logging::debug(format!("supabase: fetched {} rows", rows.len()));
        Ok(rows)
    }

    /// Upsert keyed on `video_id`; a second capture for the same alert
    /// replaces the stored thumbnail.
    pub fn upsert_thumbnail(&self, record: &ThumbnailRecord) -> Result<()> {
        if record.video_id.trim().is_empty() {
            bail!("supabase: thumbnail video id required");
        }
        let response = self
            .http
            .post(self.rest_url(THUMBNAILS_TABLE))
            .headers(self.auth_headers()?)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .header(CONTENT_TYPE, "application/json")
            .query(&[("on_conflict", "video_id")])
            .json(record)
            .send()
            .context("supabase: save thumbnail")?;

        ensure_success(response, "save thumbnail").map(|_| ())
    }

    /// Point lookup; absence is a normal outcome.
    pub fn get_thumbnail(&self, video_id: &str) -> Result<Option<ThumbnailRecord>> {
        let id_filter = format!("eq.{video_id}");
        let response = self
            .http
            .get(self.rest_url(THUMBNAILS_TABLE))
            .headers(self.auth_headers()?)
            .header(ACCEPT, "application/json")
            .query(&[
                ("select", "video_id,thumbnail_data,timestamp,created_at"),
                ("video_id", id_filter.as_str()),
                ("limit", "1"),
            ])
            .send()
            .context("supabase: load thumbnail")?;

        let response = ensure_success(response, "load thumbnail")?;
        let mut rows: Vec<ThumbnailRecord> =
            response.json().context("supabase: decode thumbnail")?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.remove(0)))
        }
    }
}

fn ensure_success(
    response: reqwest::blocking::Response,
    action: &str,
) -> Result<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let detail = body.trim();
    if detail.is_empty() {
        Err(anyhow!("supabase: {action} failed: {status}"))
    } else {
        Err(anyhow!("supabase: {action} failed: {status} - {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_normalize_from_delimited_string() {
        let terms = Terms::One("banco popular , , reservas ,".to_string());
        assert_eq!(terms.normalized(), vec!["banco popular", "reservas"]);
    }

    #[test]
    fn terms_normalize_from_list() {
        let terms = Terms::Many(vec![" eléctrica ".into(), String::new(), "apagón".into()]);
        assert_eq!(terms.normalized(), vec!["eléctrica", "apagón"]);
    }

    #[test]
    fn record_accepts_numeric_and_string_ids() {
        let numeric: AlertRecord = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(numeric.id, "42");
        let text: AlertRecord = serde_json::from_str(r#"{"id": "a-17"}"#).unwrap();
        assert_eq!(text.id, "a-17");
    }

    #[test]
    fn record_tolerates_missing_optionals() {
        let row: AlertRecord = serde_json::from_str(
            r#"{"id": 7, "termino_detectado": ["apagón"], "contexto": null}"#,
        )
        .unwrap();
        assert_eq!(row.terms(), vec!["apagón"]);
        assert!(row.contexto.is_none());
        assert!(row.url_video.is_none());
    }

    #[test]
    fn client_requires_credentials() {
        assert!(Client::new(ClientConfig::default()).is_err());
        assert!(Client::new(ClientConfig {
            url: "https://proj.supabase.co".into(),
            key: String::new(),
            http_client: None,
        })
        .is_err());
    }
}
