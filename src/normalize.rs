//! Turns whatever the text model answered into an [`EtymologyResult`].
//!
//! [`normalize`] is total: any input string yields a well-formed result with a
//! non-blank `word`. When no JSON object can be recovered the raw answer is
//! kept as narrative and the structured sections stay empty.

use crate::model::{EtymologyResult, Morphology, Origin, RelatedWord};
use serde_json::{Map, Value};
use tracing::debug;

type Object = Map<String, Value>;

pub fn normalize(word: &str, raw: &str) -> EtymologyResult {
    let cleaned = strip_code_fences(raw);
    match extract_object(&cleaned) {
        Some(object) => from_object(word, object),
        None => {
            debug!(word, raw_len = raw.len(), "model answer is not JSON; degrading");
            degraded(word, raw)
        }
    }
}

const FENCE: &str = "```";

/// Removes the Markdown fence pair wrapping the answer, with an optional
/// `json` info string. Backticks inside the body are left alone.
pub fn strip_code_fences(text: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix(FENCE) {
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        body = if rest[..tag_len].eq_ignore_ascii_case("json") {
            &rest[tag_len..]
        } else {
            rest
        };
        body = body.trim_start();
    }
    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest;
    }
    body.trim().to_string()
}

fn extract_object(text: &str) -> Option<Object> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) {
        return Some(object);
    }
    // Prose around the object: retry on the outermost braces.
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Result used when the answer carries no recoverable JSON.
pub fn degraded(word: &str, raw: &str) -> EtymologyResult {
    EtymologyResult {
        word: word.to_string(),
        etymology: Origin {
            evolution_narrative: raw.to_string(),
            ..Origin::default()
        },
        historical_context: raw.to_string(),
        ..EtymologyResult::default()
    }
}

fn from_object(word: &str, mut object: Object) -> EtymologyResult {
    let word = match object.remove("word") {
        Some(Value::String(answered)) if !answered.trim().is_empty() => answered,
        _ => word.to_string(),
    };
    let etymology = match object.remove("etymology") {
        Some(Value::Object(inner)) => origin_from(inner),
        None | Some(Value::Null) => Origin::default(),
        Some(other) => Origin {
            evolution_narrative: into_text(other),
            ..Origin::default()
        },
    };
    let morphology = match object.remove("morphology") {
        Some(Value::Object(inner)) => morphology_from(inner),
        None | Some(Value::Null) => Morphology::default(),
        Some(other) => Morphology {
            explanation: into_text(other),
            ..Morphology::default()
        },
    };
    let related_words = match object.remove("relatedWords") {
        Some(Value::Array(items)) => items.into_iter().filter_map(related_word_from).collect(),
        _ => Vec::new(),
    };
    let curiosities = match object.remove("curiosities") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(into_text)
            .filter(|text| !text.is_empty())
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => vec![into_text(other)],
    };
    EtymologyResult {
        word,
        etymology,
        morphology,
        related_words,
        historical_context: take_text(&mut object, "historicalContext"),
        curiosities,
        extra: object,
    }
}

fn origin_from(mut object: Object) -> Origin {
    Origin {
        origin_language: take_text(&mut object, "origin"),
        original_form: take_text(&mut object, "originalForm"),
        original_meaning: take_text(&mut object, "meaning"),
        evolution_narrative: take_text(&mut object, "evolution"),
        extra: object,
    }
}

fn morphology_from(mut object: Object) -> Morphology {
    Morphology {
        prefix: take_optional_text(&mut object, "prefix"),
        root: take_text(&mut object, "root"),
        suffix: take_optional_text(&mut object, "suffix"),
        explanation: take_text(&mut object, "explanation"),
        extra: object,
    }
}

fn related_word_from(value: Value) -> Option<RelatedWord> {
    match value {
        Value::Object(mut object) => Some(RelatedWord {
            word: take_text(&mut object, "word"),
            relationship: take_text(&mut object, "relationship"),
            explanation: take_text(&mut object, "explanation"),
        }),
        Value::Null => None,
        other => Some(RelatedWord {
            word: into_text(other),
            ..RelatedWord::default()
        }),
    }
}

fn take_text(object: &mut Object, key: &str) -> String {
    object.remove(key).map(into_text).unwrap_or_default()
}

fn take_optional_text(object: &mut Object, key: &str) -> Option<String> {
    match object.remove(key) {
        None | Some(Value::Null) => None,
        Some(value) => Some(into_text(value)),
    }
}

/// Renders a value of any JSON type as display text. Arrays join their
/// non-empty items with `; `.
fn into_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Array(items) => items
            .into_iter()
            .map(into_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}
