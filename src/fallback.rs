//! Compiled-in images and search queries for the featured words.
//!
//! These tables are the floor of the image fallback chain: whatever happens
//! upstream, a lookup here always yields a resolvable URL.

use crate::model::{FallbackReason, ImageResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const DEFAULT_IMAGE_URL: &str = "https://images.unsplash.com/photo-1481627834876-b7833e8f5570?w=400&h=300&fit=crop&auto=format&q=80";

/// Guaranteed image plus the curated stock-photo query for a featured word.
#[derive(Debug, Clone, Copy)]
pub struct FallbackImage {
    pub word: &'static str,
    pub image_url: &'static str,
    pub search_query: &'static str,
}

/// One Greek root cited by a featured word.
#[derive(Debug, Clone, Copy)]
pub struct Root {
    pub greek: &'static str,
    pub transliteration: &'static str,
    pub gloss: &'static str,
}

/// Card shown on the main screen.
#[derive(Debug, Clone, Copy)]
pub struct FeaturedWord {
    pub word: &'static str,
    pub origin: &'static str,
    pub meaning: &'static str,
    pub roots: &'static [Root],
}

static FALLBACK_IMAGES: &[FallbackImage] = &[
    FallbackImage {
        word: "Filosofia",
        image_url: "https://images.unsplash.com/photo-1481627834876-b7833e8f5570?w=400&h=300&fit=crop&auto=format&q=80",
        search_query: "ancient greek philosophy marble statue wisdom",
    },
    FallbackImage {
        word: "Democracia",
        image_url: "https://images.unsplash.com/photo-1541872703-74c34d2846b5?w=400&h=300&fit=crop&auto=format&q=80",
        search_query: "ancient greek agora columns democracy athens",
    },
    FallbackImage {
        word: "Biblioteca",
        image_url: "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=400&h=300&fit=crop&auto=format&q=80",
        search_query: "ancient library alexandria scrolls books knowledge",
    },
    FallbackImage {
        word: "Psicologia",
        image_url: "https://images.unsplash.com/photo-1559757148-5c350d0d3c56?w=400&h=300&fit=crop&auto=format&q=80",
        search_query: "human brain psychology mind consciousness thought",
    },
    FallbackImage {
        word: "Tecnologia",
        image_url: "https://images.unsplash.com/photo-1518709268805-4e9042af2176?w=400&h=300&fit=crop&auto=format&q=80",
        search_query: "ancient tools craftsmanship engineering innovation",
    },
    FallbackImage {
        word: "Nostalgia",
        image_url: "https://images.unsplash.com/photo-1506905925346-21bda4d32df4?w=400&h=300&fit=crop&auto=format&q=80",
        search_query: "vintage sepia memories old photographs melancholy",
    },
];

pub static FEATURED_WORDS: &[FeaturedWord] = &[
    FeaturedWord {
        word: "Filosofia",
        origin: "Do grego φιλοσοφία (philosophía)",
        meaning: "Amor pela sabedoria",
        roots: &[
            Root { greek: "φίλος", transliteration: "phílos", gloss: "amigo" },
            Root { greek: "σοφία", transliteration: "sophía", gloss: "sabedoria" },
        ],
    },
    FeaturedWord {
        word: "Democracia",
        origin: "Do grego δημοκρατία (dēmokratía)",
        meaning: "Governo do povo",
        roots: &[
            Root { greek: "δῆμος", transliteration: "dêmos", gloss: "povo" },
            Root { greek: "κράτος", transliteration: "krátos", gloss: "poder" },
        ],
    },
    FeaturedWord {
        word: "Biblioteca",
        origin: "Do grego βιβλιοθήκη (bibliothēkē)",
        meaning: "Depósito de livros",
        roots: &[
            Root { greek: "βιβλίον", transliteration: "biblíon", gloss: "livro" },
            Root { greek: "θήκη", transliteration: "thēkē", gloss: "depósito" },
        ],
    },
    FeaturedWord {
        word: "Psicologia",
        origin: "Do grego ψυχολογία (psychología)",
        meaning: "Estudo da alma",
        roots: &[
            Root { greek: "ψυχή", transliteration: "psychē", gloss: "alma" },
            Root { greek: "λογία", transliteration: "logía", gloss: "estudo" },
        ],
    },
    FeaturedWord {
        word: "Tecnologia",
        origin: "Do grego τεχνολογία (teknología)",
        meaning: "Estudo da técnica",
        roots: &[
            Root { greek: "τέχνη", transliteration: "téchnē", gloss: "arte/técnica" },
            Root { greek: "λογία", transliteration: "logía", gloss: "estudo" },
        ],
    },
    FeaturedWord {
        word: "Nostalgia",
        origin: "Do grego νοσταλγία (nostalgía)",
        meaning: "Dor do retorno",
        roots: &[
            Root { greek: "νόστος", transliteration: "nóstos", gloss: "retorno" },
            Root { greek: "ἄλγος", transliteration: "álgos", gloss: "dor" },
        ],
    },
];

static IMAGE_INDEX: Lazy<HashMap<String, &'static FallbackImage>> = Lazy::new(|| {
    FALLBACK_IMAGES
        .iter()
        .map(|entry| (entry.word.to_lowercase(), entry))
        .collect()
});

fn lookup_key(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Returns the table entry for a featured word, ignoring case.
pub fn lookup(word: &str) -> Option<&'static FallbackImage> {
    IMAGE_INDEX.get(&lookup_key(word)).copied()
}

/// Guaranteed image URL for `word`, or the default image.
pub fn image_url_for(word: &str) -> &'static str {
    lookup(word)
        .map(|entry| entry.image_url)
        .unwrap_or(DEFAULT_IMAGE_URL)
}

/// Curated query, falling back to a templated one built from the word.
pub fn search_query_for(word: &str) -> String {
    match lookup(word) {
        Some(entry) => entry.search_query.to_string(),
        None => format!("ancient manuscript {}", word.trim().to_lowercase()),
    }
}

pub fn featured(word: &str) -> Option<&'static FeaturedWord> {
    let key = lookup_key(word);
    FEATURED_WORDS
        .iter()
        .find(|featured| featured.word.to_lowercase() == key)
}

/// The image returned when the request names nothing to look up.
pub fn default_image() -> ImageResult {
    ImageResult {
        image_url: DEFAULT_IMAGE_URL.to_string(),
        thumbnail_url: None,
        description: "Imagem padrão".to_string(),
        attribution: None,
        using_fallback: true,
        reason: None,
    }
}

/// The image returned when resolution itself broke down.
pub fn default_image_after_error() -> ImageResult {
    ImageResult {
        image_url: DEFAULT_IMAGE_URL.to_string(),
        thumbnail_url: Some(DEFAULT_IMAGE_URL.to_string()),
        description: "Imagem padrão de pergaminho".to_string(),
        attribution: None,
        using_fallback: true,
        reason: Some(FallbackReason::InternalError),
    }
}

/// Table-backed image for `word`, used after the live search gave up.
pub fn image_for(word: &str, reason: FallbackReason) -> ImageResult {
    let url = image_url_for(word);
    ImageResult {
        image_url: url.to_string(),
        thumbnail_url: Some(url.to_string()),
        description: format!("Imagem relacionada a {}", word.trim()),
        attribution: None,
        using_fallback: true,
        reason: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn featured_words_have_images_and_queries() {
        for featured in FEATURED_WORDS {
            let entry = lookup(featured.word).expect("featured word has a fallback image");
            assert!(!entry.image_url.is_empty());
            assert!(!entry.search_query.is_empty());
            assert!(!featured.roots.is_empty());
        }
    }

    #[test]
    fn lookup_ignores_case_and_padding() {
        let entry = lookup("  nostalgia ").expect("case-insensitive match");
        assert_eq!(entry.word, "Nostalgia");
    }

    #[test]
    fn unknown_words_use_default_url_and_templated_query() {
        assert_eq!(image_url_for("Saudade"), DEFAULT_IMAGE_URL);
        assert_eq!(search_query_for("Saudade"), "ancient manuscript saudade");
    }

    #[test]
    fn curated_query_wins_for_featured_words() {
        assert_eq!(
            search_query_for("Biblioteca"),
            "ancient library alexandria scrolls books knowledge"
        );
    }

    #[test]
    fn table_image_reuses_url_for_thumbnail() {
        let image = image_for("Filosofia", FallbackReason::NoApiKey);
        assert_eq!(image.thumbnail_url.as_deref(), Some(image.image_url.as_str()));
        assert!(image.using_fallback);
        assert_eq!(image.reason, Some(FallbackReason::NoApiKey));
    }

    #[test]
    fn default_image_is_never_empty() {
        let image = default_image();
        assert!(!image.image_url.is_empty());
        assert!(image.thumbnail_url.is_none());
        assert!(image.using_fallback);
        let image = default_image_after_error();
        assert_eq!(image.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(image.reason, Some(FallbackReason::InternalError));
    }
}
