//! Phonetic similarity unit.
//!
//! Scores how alike two strings *sound*: both sides are mapped through a
//! double-metaphone encoder (one code per word, concatenated with intra-code
//! spaces stripped) and compared with a Levenshtein-derived ratio on the code
//! strings. Tolerant of the homophone substitutions a speech recognizer
//! makes ("write" for "right", "their" for "there").
//!
//! Code lookups and ratio calls are memoized behind bounded LRU caches — the
//! candidate chunk strings recur many times per second at runtime, and the
//! query side repeats across every candidate of a comparison.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use anyhow::Result;
use lru::LruCache;
use rphonetic::{DoubleMetaphone, Encoder};

use crate::models::Chunk;

use super::SimilarityUnit;

/// Bounded capacity for both memoization caches.
const CACHE_CAPACITY: usize = 10_000;

pub struct PhoneticUnit {
    encoder: DoubleMetaphone,
    code_cache: Mutex<LruCache<String, String>>,
    ratio_cache: Mutex<LruCache<(String, String), f32>>,
}

impl Default for PhoneticUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl PhoneticUnit {
    pub fn new() -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero cache capacity");
        Self {
            encoder: DoubleMetaphone::default(),
            code_cache: Mutex::new(LruCache::new(capacity)),
            ratio_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Double-metaphone code for `text`: one primary code per word, joined
    /// with no separator.
    fn phonetic_code(&self, text: &str) -> String {
        {
            let mut cache = self.code_cache.lock().expect("code cache poisoned");
            if let Some(code) = cache.get(text) {
                return code.clone();
            }
        }

        let code: String = text
            .split_whitespace()
            .map(|word| self.encoder.encode(word))
            .collect();

        self.code_cache
            .lock()
            .expect("code cache poisoned")
            .put(text.to_string(), code.clone());
        code
    }

    /// Levenshtein-derived similarity ratio between two code strings, in [0,1].
    fn code_ratio(&self, a: &str, b: &str) -> f32 {
        let key = (a.to_string(), b.to_string());
        {
            let mut cache = self.ratio_cache.lock().expect("ratio cache poisoned");
            if let Some(&ratio) = cache.get(&key) {
                return ratio;
            }
        }

        let ratio = strsim::normalized_levenshtein(a, b) as f32;

        self.ratio_cache
            .lock()
            .expect("ratio cache poisoned")
            .put(key, ratio);
        ratio
    }
}

impl SimilarityUnit for PhoneticUnit {
    fn name(&self) -> &'static str {
        "phonetic"
    }

    fn scores(&self, query: &str, candidates: &[Chunk]) -> Result<Vec<f32>> {
        let query_code = self.phonetic_code(query);
        Ok(candidates
            .iter()
            .map(|candidate| {
                let code = self.phonetic_code(&candidate.partial_content);
                self.code_ratio(&query_code, &code)
            })
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
