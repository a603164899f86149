use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::Mutex;

use crate::{
    anki::{
        api::DEFAULT_URL,
        FieldMapping,
        SyncPersistence,
    },
    core::{
        Card,
        CardId,
        SyncError,
        SyncStatus,
    },
    render::RenderOptions,
};

const APP_NAME: &str = "jreader-anki";
pub const SETTINGS_FILE: &str = "sync_settings.json";
pub const URL_ENV: &str = "JREADER_ANKI_URL";

pub fn get_app_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let app_dir = data_dir.join(APP_NAME);
        let _ = fs::create_dir_all(&app_dir);
        app_dir
    } else {
        PathBuf::from(".")
    }
}

pub fn get_data_file_path(filename: &str) -> PathBuf {
    get_app_data_dir().join(filename)
}

pub fn save_json<T: Serialize>(data: &T, path: &Path) -> Result<(), SyncError> {
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json)?;
    tracing::debug!("Data saved to: {}", path.display());
    Ok(())
}

pub fn load_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T, SyncError> {
    if !path.exists() {
        return Ok(T::default());
    }

    let json = fs::read_to_string(path)?;
    let data: T = serde_json::from_str(&json)?;
    tracing::debug!("Data loaded from: {}", path.display());
    Ok(data)
}

pub fn load_json_or_default<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> T {
    match load_json::<T>(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Failed to load {}: {}. Using defaults.", path.display(), e);
            T::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub anki_connect_url: String,
    pub request_timeout_secs: u64,
    pub concurrency: usize,
    pub field_mapping: FieldMapping,
    pub wrap_japanese: bool,
    pub lookup_class: String,
    pub media_base_url: String,
    pub image_base_url: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let render = RenderOptions::default();
        Self {
            anki_connect_url: DEFAULT_URL.to_string(),
            request_timeout_secs: 5,
            concurrency: 1,
            field_mapping: FieldMapping::mining_defaults(),
            wrap_japanese: render.wrap_japanese,
            lookup_class: render.lookup_class,
            media_base_url: "http://localhost:8080/audio/".to_string(),
            image_base_url: "http://localhost:8080/dictionary-images/".to_string(),
        }
    }
}

impl SyncSettings {
    /// Settings from the app data dir, with `JREADER_ANKI_URL` taking precedence.
    pub fn load() -> Self {
        Self::load_from(&get_data_file_path(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Self {
        let settings: SyncSettings = load_json_or_default(path);
        settings.with_env_override(std::env::var(URL_ENV).ok())
    }

    pub fn save(&self) -> Result<(), SyncError> {
        self.save_to(&get_data_file_path(SETTINGS_FILE))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SyncError> {
        save_json(self, path)
    }

    fn with_env_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            tracing::debug!("AnkiConnect URL overridden from environment: {}", url);
            self.anki_connect_url = url;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions { wrap_japanese: self.wrap_japanese, lookup_class: self.lookup_class.clone() }
    }
}

/// A JSON array of cards on disk. Succeeded cards are written back as synced.
#[derive(Debug)]
pub struct CardFile {
    path: PathBuf,
    cards: Mutex<Vec<Card>>,
}

impl CardFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let json = fs::read_to_string(&path)?;
        let cards: Vec<Card> = serde_json::from_str(&json)?;
        tracing::info!("Loaded {} cards from {}", cards.len(), path.display());
        Ok(Self { path, cards: Mutex::new(cards) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn cards(&self) -> Vec<Card> {
        self.cards.lock().await.clone()
    }
}

#[async_trait]
impl SyncPersistence for CardFile {
    async fn mark_synced(&self, card_ids: &[CardId], at: DateTime<Utc>) -> Result<(), SyncError> {
        let mut cards = self.cards.lock().await;
        let mut updated = 0;
        for card in cards.iter_mut().filter(|c| card_ids.contains(&c.id)) {
            card.sync_status = SyncStatus::Synced;
            card.synced_at = Some(at);
            updated += 1;
        }
        if updated != card_ids.len() {
            tracing::warn!(
                "{} of {} synced cards are missing from {}",
                card_ids.len() - updated,
                card_ids.len(),
                self.path.display()
            );
        }
        save_json(&*cards, &self.path)?;
        tracing::info!("Marked {} cards synced in {}", updated, self.path.display());
        Ok(())
    }
}
