use super::types::{
    BuiltFields,
    FieldMapping,
    Marker,
};
use crate::{
    core::{
        utils::defuse_placeholders,
        Card,
    },
    dictionary::frequency::{
        extract_ranks,
        format_list,
        harmonic_rank,
    },
    render::{
        placeholder::AUDIO_TOKEN,
        render_definitions,
        RenderOptions,
        RenderScope,
        Rendered,
    },
};

/// Resolves every mapped field against the card. Pure: no network or storage access.
///
/// Each render scope is rendered at most once per call, however many fields use it,
/// so its media references are collected once.
pub fn build_fields(card: &Card, mapping: &FieldMapping, options: &RenderOptions) -> BuiltFields {
    let mut built = BuiltFields::default();
    let mut main: Option<Rendered> = None;
    let mut full: Option<Rendered> = None;

    for (field, raw_marker) in mapping.iter() {
        let value = match Marker::parse(raw_marker) {
            Marker::Skip => continue,
            Marker::Unrecognized => String::new(),
            Marker::Expression => defuse_placeholders(&card.expression),
            Marker::Reading => defuse_placeholders(card.reading.as_deref().unwrap_or_default()),
            Marker::Sentence => defuse_placeholders(card.sentence.as_deref().unwrap_or_default()),
            Marker::DocumentTitle => {
                defuse_placeholders(card.document_title.as_deref().unwrap_or_default())
            }
            Marker::MainDefinition => {
                let rendered = main.get_or_insert_with(|| {
                    render_scope(card, RenderScope::Main, options, &mut built)
                });
                rendered.html.clone()
            }
            Marker::Glossary => {
                let rendered = full.get_or_insert_with(|| {
                    render_scope(card, RenderScope::Full, options, &mut built)
                });
                rendered.html.clone()
            }
            Marker::Frequency => format_list(&card.frequency),
            Marker::FrequencyHarmonicRank => {
                harmonic_rank(&extract_ranks(&card.frequency)).to_string()
            }
            Marker::ExpressionFurigana => defuse_placeholders(&furigana(card)),
            Marker::ExpressionAudio => match non_empty(card.expression_audio.as_deref()) {
                Some(_) => {
                    built.wants_audio = true;
                    format!("[sound:{}]", AUDIO_TOKEN)
                }
                None => String::new(),
            },
            Marker::Property(name) => {
                defuse_placeholders(&card.property(&name).unwrap_or_default())
            }
        };
        built.fields.insert(field.to_string(), value);
    }

    built
}

fn render_scope(
    card: &Card,
    scope: RenderScope,
    options: &RenderOptions,
    built: &mut BuiltFields,
) -> Rendered {
    let rendered = render_definitions(&card.definitions, scope, options);
    built.media.extend(rendered.media.iter().cloned());
    rendered
}

/// `expression[reading]` when both are present, otherwise nothing at all.
pub fn furigana(card: &Card) -> String {
    match (non_empty(Some(&card.expression)), non_empty(card.reading.as_deref())) {
        (Some(expression), Some(reading)) => format!("{}[{}]", expression, reading),
        _ => String::new(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
