use std::{
    collections::{
        BTreeMap,
        HashSet,
    },
    fmt,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use futures::{
    future::join_all,
    stream::{
        self,
        StreamExt,
    },
};
use serde::Serialize;
use url::Url;

use super::{
    fields::build_fields,
    media::{
        build_plan,
        MediaPlan,
        MediaUpload,
    },
    types::{
        BuiltFields,
        FieldMapping,
    },
};
use crate::{
    core::{
        Card,
        CardId,
        SyncError,
    },
    render::{
        placeholder::find_placeholders,
        MediaKind,
        RenderOptions,
    },
};

/// The flashcard program, as far as syncing is concerned.
#[async_trait]
pub trait NoteTransport: Send + Sync {
    async fn send_update(
        &self,
        note_id: i64,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), SyncError>;

    /// Stores the file found at `url` in the program's media folder as `filename`.
    async fn store_media(&self, filename: &str, url: &str) -> Result<(), SyncError>;
}

/// Turns a planned upload into a URL the transport can fetch from. Signed URLs
/// expire quickly, so this runs right before each upload.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn resolve_upload_url(&self, upload: &MediaUpload) -> Result<String, SyncError>;
}

#[async_trait]
pub trait SyncPersistence: Send + Sync {
    async fn mark_synced(&self, card_ids: &[CardId], at: DateTime<Utc>) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotSynced,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotSynced => write!(f, "not_synced"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Media,
    Timeout,
    UnresolvedPlaceholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    fn from_error(kind: FailureKind, error: &SyncError) -> Self {
        let kind = match error {
            SyncError::Timeout(_) => FailureKind::Timeout,
            _ => kind,
        };
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CardOutcome {
    Skipped { reason: SkipReason },
    Succeeded,
    Failed { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardResult {
    pub card_id: CardId,
    #[serde(flatten)]
    pub outcome: CardOutcome,
}

/// One result per input card, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub results: Vec<CardResult>,
}

impl SyncReport {
    pub fn succeeded_ids(&self) -> Vec<CardId> {
        self.results
            .iter()
            .filter(|r| r.outcome == CardOutcome::Succeeded)
            .map(|r| r.card_id)
            .collect()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (CardId, SkipReason)> + '_ {
        self.results.iter().filter_map(|r| match &r.outcome {
            CardOutcome::Skipped { reason } => Some((r.card_id, *reason)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (CardId, &FailureReason)> + '_ {
        self.results.iter().filter_map(|r| match &r.outcome {
            CardOutcome::Failed { reason } => Some((r.card_id, reason)),
            _ => None,
        })
    }

    pub fn outcome(&self, card_id: CardId) -> Option<&CardOutcome> {
        self.results.iter().find(|r| r.card_id == card_id).map(|r| &r.outcome)
    }

    /// Records the succeeded cards. Makes no call at all when nothing succeeded.
    pub async fn persist(
        &self,
        persistence: &dyn SyncPersistence,
        now: DateTime<Utc>,
    ) -> Result<usize, SyncError> {
        let succeeded = self.succeeded_ids();
        if succeeded.is_empty() {
            tracing::info!("No card succeeded; sync metadata left untouched");
            return Ok(0);
        }
        persistence.mark_synced(&succeeded, now).await?;
        Ok(succeeded.len())
    }
}

pub struct SyncOrchestrator {
    transport: Arc<dyn NoteTransport>,
    assets: Arc<dyn AssetFetcher>,
    mapping: FieldMapping,
    options: RenderOptions,
    timeout: Duration,
    concurrency: usize,
}

impl SyncOrchestrator {
    pub fn new(
        transport: Arc<dyn NoteTransport>,
        assets: Arc<dyn AssetFetcher>,
        mapping: FieldMapping,
    ) -> Self {
        Self {
            transport,
            assets,
            mapping,
            options: RenderOptions::default(),
            timeout: Duration::from_secs(5),
            concurrency: 1,
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Processes every card exactly once. Never fails as a whole: per-card problems
    /// end up in that card's outcome.
    pub async fn sync_batch(&self, cards: &[Card]) -> SyncReport {
        tracing::info!(
            "Syncing {} cards (concurrency {}, timeout {:?})",
            cards.len(),
            self.concurrency,
            self.timeout
        );

        // `buffered` keeps input order regardless of completion order
        let results: Vec<CardResult> = stream::iter(cards)
            .map(|card| async move {
                CardResult { card_id: card.id, outcome: self.sync_card(card).await }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = SyncReport { results };
        tracing::info!(
            "Sync finished: {} succeeded, {} skipped, {} failed",
            report.succeeded_ids().len(),
            report.skipped().count(),
            report.failed().count()
        );
        report
    }

    async fn sync_card(&self, card: &Card) -> CardOutcome {
        let Some(note_id) = card.anki_note_id else {
            tracing::debug!("Card {} has no note yet, skipping", card.id);
            return CardOutcome::Skipped { reason: SkipReason::NotSynced };
        };

        let built = build_fields(card, &self.mapping, &self.options);
        let plan = build_plan(card, &built.media);
        if !built.wants_audio && plan.audio.is_some() {
            tracing::debug!("Card {} has audio but no field asks for it", card.id);
        }

        self.push_fields(note_id, built, &plan).await
    }

    /// Uploads the plan's media, resolves placeholders and sends the update. The
    /// update is withheld when an upload fails or a placeholder is left over.
    pub(crate) async fn push_fields(
        &self,
        note_id: i64,
        mut built: BuiltFields,
        plan: &MediaPlan,
    ) -> CardOutcome {
        if let Err(reason) = self.upload_media(plan.card_id, plan, built.wants_audio).await {
            tracing::warn!("Card {} failed during media upload: {}", plan.card_id, reason);
            return CardOutcome::Failed { reason };
        }

        let unresolved = plan.resolve_fields(&mut built.fields);
        if !unresolved.is_empty() {
            let tokens: Vec<String> = unresolved
                .iter()
                .filter_map(|name| built.fields.get(name))
                .flat_map(|value| find_placeholders(value))
                .collect();
            tracing::error!(
                "Card {} still has placeholders {:?} in fields {:?} after resolution",
                plan.card_id,
                tokens,
                unresolved
            );
            return CardOutcome::Failed {
                reason: FailureReason::new(
                    FailureKind::UnresolvedPlaceholder,
                    format!("unresolved placeholder in {}", unresolved.join(", ")),
                ),
            };
        }

        tracing::debug!("Sending {} fields for note {}", built.fields.len(), note_id);
        match self.with_deadline(self.transport.send_update(note_id, &built.fields)).await {
            Ok(()) => CardOutcome::Succeeded,
            Err(error) => {
                let reason = FailureReason::from_error(FailureKind::Transport, &error);
                tracing::warn!("Card {} update rejected: {}", plan.card_id, reason);
                CardOutcome::Failed { reason }
            }
        }
    }

    async fn upload_media(
        &self,
        card_id: CardId,
        plan: &MediaPlan,
        wants_audio: bool,
    ) -> Result<(), FailureReason> {
        let mut seen = HashSet::new();
        let uploads: Vec<&MediaUpload> = plan
            .uploads()
            .filter(|upload| wants_audio || upload.kind != MediaKind::Audio)
            .filter(|upload| seen.insert(upload.filename.clone()))
            .collect();

        if uploads.is_empty() {
            return Ok(());
        }
        tracing::debug!("Uploading {} media files for card {}", uploads.len(), card_id);

        let outcomes = join_all(uploads.into_iter().map(|upload| self.upload_one(upload))).await;
        outcomes.into_iter().collect()
    }

    async fn upload_one(&self, upload: &MediaUpload) -> Result<(), FailureReason> {
        let url = self
            .with_deadline(self.assets.resolve_upload_url(upload))
            .await
            .map_err(|e| FailureReason::from_error(FailureKind::Media, &e))?;

        self.with_deadline(self.transport.store_media(&upload.filename, &url))
            .await
            .map_err(|e| {
                let reason = FailureReason::from_error(FailureKind::Media, &e);
                FailureReason::new(reason.kind, format!("{}: {}", upload.filename, reason.message))
            })
    }

    async fn with_deadline<T, F>(&self, call: F) -> Result<T, SyncError>
    where
        F: std::future::Future<Output = Result<T, SyncError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.timeout)),
        }
    }
}

/// Resolves uploads against two base URLs: audio paths against `media_base`,
/// image paths against `image_base/<namespace>/`. Sources that are already
/// `http(s)` URLs pass through untouched.
#[derive(Debug, Clone)]
pub struct BaseUrlAssetFetcher {
    media_base: Url,
    image_base: Url,
}

impl BaseUrlAssetFetcher {
    pub fn new(media_base: &str, image_base: &str) -> Result<Self, SyncError> {
        Ok(Self { media_base: directory_url(media_base)?, image_base: directory_url(image_base)? })
    }

    pub fn url_for(&self, upload: &MediaUpload) -> Result<Url, SyncError> {
        let source = upload.source_path.trim();
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(Url::parse(source)?);
        }

        let relative = source.trim_start_matches('/');
        if relative.is_empty() {
            return Err(SyncError::Asset(format!("empty source path for {}", upload.filename)));
        }

        match (upload.kind, upload.namespace.as_deref()) {
            (MediaKind::Image, Some(namespace)) => {
                let dictionary = self.image_base.join(&format!("{}/", encode_segment(namespace)))?;
                Ok(dictionary.join(relative)?)
            }
            (MediaKind::Image, None) => Ok(self.image_base.join(relative)?),
            (MediaKind::Audio, _) => Ok(self.media_base.join(relative)?),
        }
    }
}

#[async_trait]
impl AssetFetcher for BaseUrlAssetFetcher {
    async fn resolve_upload_url(&self, upload: &MediaUpload) -> Result<String, SyncError> {
        Ok(self.url_for(upload)?.to_string())
    }
}

// `Url::join` drops the last segment unless the base ends with a slash
fn directory_url(base: &str) -> Result<Url, SyncError> {
    let base = base.trim();
    if base.ends_with('/') {
        Ok(Url::parse(base)?)
    } else {
        Ok(Url::parse(&format!("{}/", base))?)
    }
}

fn encode_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' => "%2F".to_string(),
            '?' => "%3F".to_string(),
            '#' => "%23".to_string(),
            '%' => "%25".to_string(),
            other => other.to_string(),
        })
        .collect()
}
