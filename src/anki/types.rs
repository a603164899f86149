use std::collections::BTreeMap;

use serde::{
    Deserialize,
    Serialize,
};

use crate::render::MediaReference;

/// Output field name -> marker, e.g. `"Glossary" -> "{glossary}"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, String>);

impl FieldMapping {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, field: impl Into<String>, marker: impl Into<String>) -> Self {
        self.0.insert(field.into(), marker.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(field, marker)| (field.as_str(), marker.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layout of a typical Japanese mining note type.
    pub fn mining_defaults() -> Self {
        Self::new()
            .with("Expression", "{expression}")
            .with("ExpressionReading", "{reading}")
            .with("ExpressionFurigana", "{expression_furigana}")
            .with("ExpressionAudio", "{expression_audio}")
            .with("Sentence", "{sentence}")
            .with("MainDefinition", "{main_definition}")
            .with("Glossary", "{glossary}")
            .with("Frequency", "{frequency}")
            .with("FreqSort", "{frequency-harmonic-rank}")
            .with("PitchAccent", "{pitch_accent}")
            .with("DocumentTitle", "{document-title}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Expression,
    Reading,
    Sentence,
    DocumentTitle,
    MainDefinition,
    Glossary,
    Frequency,
    FrequencyHarmonicRank,
    ExpressionFurigana,
    ExpressionAudio,
    /// `{anything_else}`, looked up as a card property
    Property(String),
    /// `none`: the field is left out of the update
    Skip,
    /// Not a `{marker}` at all
    Unrecognized,
}

impl Marker {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("none") {
            return Marker::Skip;
        }

        let Some(inner) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) else {
            return Marker::Unrecognized;
        };

        match inner.trim() {
            "expression" => Marker::Expression,
            "reading" => Marker::Reading,
            "sentence" => Marker::Sentence,
            "document-title" => Marker::DocumentTitle,
            "main_definition" => Marker::MainDefinition,
            "glossary" => Marker::Glossary,
            "frequency" => Marker::Frequency,
            "frequency-harmonic-rank" => Marker::FrequencyHarmonicRank,
            "expression_furigana" => Marker::ExpressionFurigana,
            "expression_audio" => Marker::ExpressionAudio,
            "" => Marker::Unrecognized,
            other => Marker::Property(other.to_string()),
        }
    }
}

/// Field strings for one card plus the media they reference. Image and audio
/// placeholders are still unresolved at this point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltFields {
    pub fields: BTreeMap<String, String>,
    pub media: Vec<MediaReference>,
    /// Some field carries the audio marker and the card has audio
    pub wants_audio: bool,
}
