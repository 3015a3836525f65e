use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured etymology returned to callers.
///
/// Every field except `word` may be empty: the model is asked for this shape
/// but nothing guarantees it answers with it. Keys the model adds beyond the
/// requested schema are kept in `extra` and serialized back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtymologyResult {
    pub word: String,
    #[serde(default)]
    pub etymology: Origin,
    #[serde(default)]
    pub morphology: Morphology,
    #[serde(default)]
    pub related_words: Vec<RelatedWord>,
    #[serde(default)]
    pub historical_context: String,
    #[serde(default)]
    pub curiosities: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EtymologyResult {
    /// True when at least one structured section carries data.
    pub fn has_structure(&self) -> bool {
        !self.morphology.root.is_empty()
            || !self.related_words.is_empty()
            || !self.etymology.origin_language.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    #[serde(rename = "origin", default)]
    pub origin_language: String,
    #[serde(default)]
    pub original_form: String,
    #[serde(rename = "meaning", default)]
    pub original_meaning: String,
    #[serde(rename = "evolution", default)]
    pub evolution_narrative: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Morphology {
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| !p.trim().is_empty())
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref().filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedWord {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub explanation: String,
}

/// Output of the etymology operation: the normalized data plus the model's
/// untouched answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtymologyAnalysis {
    pub data: EtymologyResult,
    pub raw_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub image_url: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub photographer: String,
    pub username: String,
    pub profile_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No stock-photo credential is configured.
    NoApiKey,
    /// The search succeeded but matched nothing.
    NoResults,
    /// The search call failed or timed out.
    UpstreamError,
    /// Something broke inside the resolver itself.
    InternalError,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::NoApiKey => "no_api_key",
            FallbackReason::NoResults => "no_results",
            FallbackReason::UpstreamError => "upstream_error",
            FallbackReason::InternalError => "internal_error",
        }
    }
}

/// Image shown next to an etymology. `image_url` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Attribution>,
    pub using_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FallbackReason>,
}
