use std::time::Duration;

use reqwest::Client;

use crate::core::SyncError;

pub fn http_client(timeout: Duration) -> Result<Client, SyncError> {
    Client::builder()
        .timeout(timeout)
        .user_agent("jreader-anki/1.0 (+reqwest)")
        .build()
        .map_err(|e| SyncError::Custom(format!("HTTP client build failed: {e}")))
}
