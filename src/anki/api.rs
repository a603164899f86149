use std::{
    collections::BTreeMap,
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    json,
    Value,
};
use tokio::time::sleep;

use super::sync::NoteTransport;
use crate::core::{
    http::http_client,
    SyncError,
};

pub const DEFAULT_URL: &str = "http://localhost:8765/";
const API_VERSION: u8 = 6;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// An `error` field always wins, even when a result came along with it.
    pub fn into_result(self) -> Result<Option<T>, SyncError> {
        match self.error {
            Some(error) => Err(SyncError::Anki(error)),
            None => Ok(self.result),
        }
    }
}

/// Talks to the AnkiConnect add-on over its JSON-over-HTTP protocol.
#[derive(Debug, Clone)]
pub struct AnkiConnectClient {
    client: Client,
    url: String,
}

impl AnkiConnectClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        Ok(Self { client: http_client(timeout)?, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn make_request<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        params: Option<Value>,
    ) -> Result<ApiResponse<T>, SyncError> {
        let body = request_body(action, params);

        tracing::debug!("AnkiConnect {}", action);
        let response: ApiResponse<T> =
            self.client.post(&self.url).json(&body).send().await?.json().await?;

        Ok(response)
    }

    // Used to check whether AnkiConnect is online
    pub async fn version(&self) -> Result<u32, SyncError> {
        let response: ApiResponse<u32> = self.make_request("version", None).await?;
        Ok(response.into_result()?.unwrap_or_default())
    }

    /// Polls `version` until AnkiConnect answers, up to `attempts` times.
    pub async fn wait_awake(&self, attempts: u32, delay: Duration) -> Result<u32, SyncError> {
        let mut last_error = SyncError::Anki("AnkiConnect never answered".to_string());
        for attempt in 1..=attempts.max(1) {
            match self.version().await {
                Ok(version) => {
                    tracing::info!("AnkiConnect at {} is up (API version {})", self.url(), version);
                    return Ok(version);
                }
                Err(e) => {
                    tracing::warn!("AnkiConnect not reachable (attempt {}/{}): {}", attempt, attempts, e);
                    last_error = e;
                }
            }
            if attempt < attempts {
                sleep(delay).await;
            }
        }
        Err(last_error)
    }

    pub async fn update_note_fields(
        &self,
        note_id: i64,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), SyncError> {
        let response: ApiResponse<Value> =
            self.make_request("updateNoteFields", Some(update_params(note_id, fields))).await?;
        response.into_result()?;
        Ok(())
    }

    /// AnkiConnect downloads `url` itself and returns the stored filename.
    pub async fn store_media_file(&self, filename: &str, url: &str) -> Result<String, SyncError> {
        let params = json!({ "filename": filename, "url": url });
        let response: ApiResponse<String> = self.make_request("storeMediaFile", Some(params)).await?;
        Ok(response.into_result()?.unwrap_or_else(|| filename.to_string()))
    }
}

#[async_trait]
impl NoteTransport for AnkiConnectClient {
    async fn send_update(
        &self,
        note_id: i64,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), SyncError> {
        self.update_note_fields(note_id, fields).await
    }

    async fn store_media(&self, filename: &str, url: &str) -> Result<(), SyncError> {
        let stored = self.store_media_file(filename, url).await?;
        if stored != filename {
            tracing::warn!("AnkiConnect stored {} as {}", filename, stored);
        }
        Ok(())
    }
}

fn request_body(action: &str, params: Option<Value>) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("action".to_string(), Value::String(action.to_string()));
    body.insert("version".to_string(), Value::Number(API_VERSION.into()));

    if let Some(params) = params {
        body.insert("params".to_string(), params);
    }

    Value::Object(body)
}

fn update_params(note_id: i64, fields: &BTreeMap<String, String>) -> Value {
    json!({ "note": { "id": note_id, "fields": fields } })
}
