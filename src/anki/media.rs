use std::collections::{
    BTreeMap,
    HashSet,
};

use serde::Serialize;

use crate::{
    core::{
        Card,
        CardId,
    },
    render::{
        namespace_hash,
        placeholder::{
            contains_placeholder,
            AUDIO_TOKEN,
        },
        MediaKind,
        MediaReference,
    },
};

pub const AUDIO_PREFIX: &str = "jreader_audio_";
pub const IMAGE_PREFIX: &str = "jreader_img_";
pub const AUDIO_EXTENSION: &str = "ogg";

// Brackets would end a `[sound:...]` reference early
const UNSAFE_FILENAME_CHARS: [char; 12] =
    ['/', '\\', '.', ':', '*', '?', '"', '<', '>', '|', '[', ']'];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaUpload {
    pub kind: MediaKind,
    pub source_path: String,
    /// Name the file is stored under in the flashcard program
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// What has to be fetched and stored before a card's fields are final.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaPlan {
    pub card_id: CardId,
    pub audio: Option<MediaUpload>,
    pub images: Vec<MediaUpload>,
    /// Placeholder token -> stored filename
    #[serde(skip)]
    pub substitutions: BTreeMap<String, String>,
}

impl MediaPlan {
    pub fn uploads(&self) -> impl Iterator<Item = &MediaUpload> {
        self.audio.iter().chain(self.images.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.images.is_empty()
    }

    /// Swaps every placeholder in `fields` for its stored filename and returns the
    /// names of fields that still contain one afterwards.
    pub fn resolve_fields(&self, fields: &mut BTreeMap<String, String>) -> Vec<String> {
        let mut unresolved = Vec::new();
        for (name, value) in fields.iter_mut() {
            if !contains_placeholder(value) {
                continue;
            }
            for (token, filename) in &self.substitutions {
                if value.contains(token.as_str()) {
                    *value = value.replace(token.as_str(), filename);
                }
            }
            if contains_placeholder(value) {
                unresolved.push(name.clone());
            }
        }
        unresolved
    }
}

/// Plans the card's audio (at most one) and every referenced image. Performs no I/O.
pub fn build_plan(card: &Card, media: &[MediaReference]) -> MediaPlan {
    let mut substitutions = BTreeMap::new();

    let audio = card
        .expression_audio
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(|path| {
            let filename = audio_filename(path);
            substitutions.insert(AUDIO_TOKEN.to_string(), filename.clone());
            MediaUpload {
                kind: MediaKind::Audio,
                source_path: path.to_string(),
                filename,
                namespace: None,
            }
        });

    let mut images = Vec::new();
    let mut planned: HashSet<String> = HashSet::new();
    for reference in media.iter().filter(|r| r.kind == MediaKind::Image) {
        let filename = image_filename(&reference.namespace, &reference.source_path);

        if let Some(previous) = substitutions.insert(reference.token.clone(), filename.clone()) {
            if previous != filename {
                tracing::warn!(
                    "Placeholder {} maps to both {} and {}; keeping the latter",
                    reference.token,
                    previous,
                    filename
                );
            }
        }

        // Main definition and glossary often reference the same picture
        if planned.insert(filename.clone()) {
            images.push(MediaUpload {
                kind: MediaKind::Image,
                source_path: reference.source_path.clone(),
                filename,
                namespace: Some(reference.namespace.clone()),
            });
        }
    }

    MediaPlan { card_id: card.id, audio, images, substitutions }
}

/// `jpod/あ.opus` -> `jreader_audio_jpod_あ_opus.ogg`
///
/// Distinct paths could in principle collapse to the same name (`a/b` and `a.b`); this
/// is accepted.
pub fn audio_filename(source_path: &str) -> String {
    format!("{}{}.{}", AUDIO_PREFIX, sanitize(source_path), AUDIO_EXTENSION)
}

/// `("daijirin", "img/1.png")` -> `jreader_img_<hash>_img_1.png`
///
/// The namespace hash keeps two dictionaries' `img/1.png` apart in the media folder.
pub fn image_filename(namespace: &str, source_path: &str) -> String {
    let hash = namespace_hash(namespace);
    match split_extension(source_path) {
        Some((stem, extension)) => {
            format!("{}{}_{}.{}", IMAGE_PREFIX, hash, sanitize(stem), extension.to_ascii_lowercase())
        }
        None => format!("{}{}_{}", IMAGE_PREFIX, hash, sanitize(source_path)),
    }
}

fn split_extension(path: &str) -> Option<(&str, &str)> {
    let (stem, extension) = path.rsplit_once('.')?;
    let usable = !stem.is_empty()
        && (1..=5).contains(&extension.len())
        && extension.chars().all(|c| c.is_ascii_alphanumeric());
    usable.then_some((stem, extension))
}

fn sanitize(path: &str) -> String {
    path.trim()
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) || c.is_whitespace() { '_' } else { c })
        .collect()
}
