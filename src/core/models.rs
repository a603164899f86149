use std::collections::BTreeMap;

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use serde_json::Value;
use uuid::Uuid;

pub type CardId = Uuid;

pub const UNKNOWN_DICTIONARY: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
    // Unknown statuses read as unsynced
    #[default]
    #[serde(other)]
    Unsynced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::Unsynced => "unsynced",
        }
    }
}

/// A flashcard draft plus the metadata needed to push field updates to Anki.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub expression: String,
    #[serde(default)]
    pub reading: Option<String>,
    #[serde(default)]
    pub sentence: Option<String>,
    #[serde(default)]
    pub pitch_accent: Option<String>,
    #[serde(default, deserialize_with = "deserialize_frequency_pairs")]
    pub frequency: Vec<FrequencyPair>,
    #[serde(default)]
    pub expression_audio: Option<String>,
    #[serde(default)]
    pub document_title: Option<String>,
    #[serde(default)]
    pub definitions: Vec<Definition>,

    #[serde(default)]
    pub anki_note_id: Option<i64>,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    // Anything else on the record, reachable through custom `{field}` markers
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Card {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            expression: expression.into(),
            reading: None,
            sentence: None,
            pitch_accent: None,
            frequency: Vec::new(),
            expression_audio: None,
            document_title: None,
            definitions: Vec::new(),
            anki_note_id: None,
            sync_status: SyncStatus::default(),
            synced_at: None,
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }

    /// Looks a card property up by its record name. Unknown names fall through to `extra`.
    pub fn property(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.to_string()),
            "expression" => Some(self.expression.clone()),
            "reading" => self.reading.clone(),
            "sentence" => self.sentence.clone(),
            "pitch_accent" => self.pitch_accent.clone(),
            "expression_audio" => self.expression_audio.clone(),
            "document_title" => self.document_title.clone(),
            "anki_note_id" => self.anki_note_id.map(|id| id.to_string()),
            "sync_status" => Some(self.sync_status.as_str().to_string()),
            "synced_at" => self.synced_at.map(|at| at.to_rfc3339()),
            "updated_at" => self.updated_at.map(|at| at.to_rfc3339()),
            _ => self.extra.get(name).and_then(value_as_text),
        }
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    #[default]
    Simple,
    // Unknown kinds are given the structured treatment, which falls back to text anyway
    #[serde(other)]
    Structured,
}

/// One dictionary's explanation of the headword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    #[serde(rename = "type", default)]
    pub kind: DefinitionKind,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_origin: Option<String>,
    // Legacy single attribution field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<String>,
}

impl Definition {
    pub fn simple(text: impl Into<String>) -> Self {
        Self {
            kind: DefinitionKind::Simple,
            content: Value::String(text.into()),
            dictionary_title: None,
            dictionary_origin: None,
            dictionary: None,
        }
    }

    pub fn structured(content: Value) -> Self {
        Self {
            kind: DefinitionKind::Structured,
            content,
            dictionary_title: None,
            dictionary_origin: None,
            dictionary: None,
        }
    }

    pub fn with_dictionary(mut self, dictionary: impl Into<String>) -> Self {
        self.dictionary = Some(dictionary.into());
        self
    }

    pub fn with_attribution(mut self, title: impl Into<String>, origin: impl Into<String>) -> Self {
        self.dictionary_title = Some(title.into());
        self.dictionary_origin = Some(origin.into());
        self
    }

    /// Name shown to the reader: title, then origin or legacy name, then "unknown".
    pub fn display_title(&self) -> &str {
        first_present(&[&self.dictionary_title, &self.dictionary_origin, &self.dictionary])
            .unwrap_or(UNKNOWN_DICTIONARY)
    }

    /// Asset namespace: origin, then legacy name, then "unknown". Independent of the title.
    pub fn namespace(&self) -> &str {
        first_present(&[&self.dictionary_origin, &self.dictionary]).unwrap_or(UNKNOWN_DICTIONARY)
    }
}

fn first_present<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates.iter().filter_map(|c| c.as_deref()).map(str::trim).find(|s| !s.is_empty())
}

/// Raw per-dictionary rank as it arrives from lookup results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RankValue {
    Number(f64),
    Text(String),
    Flag(bool),
    Null,
}

impl std::fmt::Display for RankValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankValue::Number(n) => write!(f, "{}", n),
            RankValue::Text(s) => write!(f, "{}", s),
            RankValue::Flag(b) => write!(f, "{}", b),
            RankValue::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyPair {
    pub source: String,
    pub value: RankValue,
}

impl FrequencyPair {
    pub fn new(source: impl Into<String>, value: RankValue) -> Self {
        Self { source: source.into(), value }
    }
}

/// Accepts `[name, value]` pairs or `{source|dictionary|name, value|frequency}` objects.
/// Anything that is not a list becomes an empty list; unreadable entries are dropped.
fn deserialize_frequency_pairs<'de, D>(deserializer: D) -> Result<Vec<FrequencyPair>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(frequency_pairs_from_value(&value))
}

pub fn frequency_pairs_from_value(value: &Value) -> Vec<FrequencyPair> {
    let Value::Array(items) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::Array(pair) => {
                let source = pair.first().and_then(value_as_text).unwrap_or_default();
                let value = pair.get(1).map(rank_value_from).unwrap_or(RankValue::Null);
                Some(FrequencyPair { source, value })
            }
            Value::Object(map) => {
                let source = ["source", "dictionary", "name"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(value_as_text))
                    .unwrap_or_default();
                let value = ["value", "frequency", "displayValue"]
                    .iter()
                    .find_map(|key| map.get(*key))
                    .map(rank_value_from)
                    .unwrap_or(RankValue::Null);
                Some(FrequencyPair { source, value })
            }
            _ => None,
        })
        .collect()
}

fn rank_value_from(value: &Value) -> RankValue {
    match value {
        Value::Number(n) => n.as_f64().map(RankValue::Number).unwrap_or(RankValue::Null),
        Value::String(s) => RankValue::Text(s.clone()),
        Value::Bool(b) => RankValue::Flag(*b),
        // Nested frequency objects ({value, displayValue}) keep their numeric value
        Value::Object(map) => map.get("value").map(rank_value_from).unwrap_or(RankValue::Null),
        _ => RankValue::Null,
    }
}
