//! Arabic orthographic normalization
//!
//! Vocalized and unvocalized spellings of the same word should embed the
//! same, so diacritics are stripped and letter variants unified first.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::EmbeddingProvider;
use crate::error::Result;

const TATWEEL: char = '\u{0640}';

fn is_diacritic(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{06D6}'..='\u{06ED}')
}

/// Strip tashkeel and tatweel, unify alef forms, map taa marbuta to haa and
/// alef maqsura to yaa, and collapse whitespace
pub fn normalize_arabic(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter(|c| !is_diacritic(*c) && *c != TATWEEL)
        .map(|c| match c {
            '\u{0622}' | '\u{0623}' | '\u{0625}' | '\u{0671}' => '\u{0627}',
            '\u{0629}' => '\u{0647}',
            '\u{0649}' => '\u{064A}',
            other => other,
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Provider that normalizes Arabic text before delegating
pub struct ArabicNormalizing {
    inner: Arc<dyn EmbeddingProvider>,
}

impl ArabicNormalizing {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EmbeddingProvider for ArabicNormalizing {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(&normalize_arabic(text)).await
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let texts = texts.iter().map(|t| normalize_arabic(t)).collect();
        self.inner.embed_batch(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tashkeel() {
        assert_eq!(normalize_arabic("بِسْمِ اللَّهِ"), "بسم الله");
    }

    #[test]
    fn test_unifies_letter_forms() {
        assert_eq!(normalize_arabic("أحمد إيمان آمن"), "احمد ايمان امن");
        assert_eq!(normalize_arabic("رحمة"), "رحمه");
        assert_eq!(normalize_arabic("هدى"), "هدي");
    }

    #[test]
    fn test_collapses_whitespace_and_tatweel() {
        assert_eq!(normalize_arabic("  الـــحمد \n لله  "), "الحمد لله");
    }

    #[test]
    fn test_latin_untouched() {
        assert_eq!(normalize_arabic("Sahih al-Bukhari"), "Sahih al-Bukhari");
    }
}
