//! Core data model.
//!
//! | Type | Role |
//! |------|------|
//! | [`Section`]          | one slide's worth of spoken script |
//! | [`Chunk`]            | a sliding window of words with back-references |
//! | [`SimilarityResult`] | a scored candidate chunk |
//! | [`Speaker`]          | a stored speaker profile |
//! | [`Settings`]         | global LLM configuration |
//! | [`ProcessResult`]    | outcome of processing one speaker |
//!
//! `Section`s are produced once (offline) and never mutated afterwards, so
//! they are shared behind [`Arc`] — every chunk that touches a section holds
//! a reference to the same allocation.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The spoken script for a single slide.
///
/// `section_index` values within a list are `0..N-1`, contiguous and strictly
/// increasing in list order. The array position in `sections.json` equals the
/// index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub content: String,
    pub section_index: usize,
}

impl Section {
    pub fn new(content: impl Into<String>, section_index: usize) -> Self {
        Self {
            content: content.into(),
            section_index,
        }
    }
}

/// A window of consecutive spoken words drawn from the concatenated sections.
///
/// `partial_content` is already normalized (see [`crate::normalize`]);
/// `source_sections` is deduplicated and sorted by `section_index`, and is
/// never empty for a chunk produced by [`crate::chunks::generate_chunks`].
#[derive(Debug, Clone)]
pub struct Chunk {
    pub partial_content: String,
    pub source_sections: Vec<Arc<Section>>,
}

impl Chunk {
    /// The most recent section the window covers — where a navigation
    /// decision based on this chunk lands.
    pub fn last_section(&self) -> Option<&Arc<Section>> {
        self.source_sections.last()
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.partial_content == other.partial_content
            && self
                .source_sections
                .iter()
                .map(|s| s.section_index)
                .eq(other.source_sections.iter().map(|s| s.section_index))
    }
}

impl Eq for Chunk {}

/// A candidate chunk with its (fused or per-metric) similarity score in [0,1].
#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// A stored speaker profile. Paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    pub speaker_id: String,
    pub source_presentation: PathBuf,
    pub source_transcript: PathBuf,
}

/// Outcome of resolving a speaker pattern against the stored profiles.
///
/// An exact `speaker_id` match is always unique; a name may legitimately
/// match several profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakerMatch {
    NotFound,
    Unique(Speaker),
    Ambiguous(Vec<Speaker>),
}

/// Global settings stored in `settings.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// LLM model identifier passed through to the chat-completions call.
    pub model: String,
    /// API key for the LLM endpoint.
    pub key: String,
    /// OpenAI-compatible endpoint root.
    pub base_url: String,
}

/// Where a processed artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileOrigin {
    /// Copied from the speaker's configured source path.
    Source,
    /// Reused from a previously cached copy in the profile directory.
    Local,
}

/// Returned by the section producer for each processed speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub section_count: usize,
    pub transcript_from: FileOrigin,
    pub presentation_from: FileOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_json_round_trip() {
        let sections = vec![
            Section::new("the ability to say no", 0),
            Section::new("have you ever struggled", 1),
        ];
        let json = serde_json::to_string(&sections).unwrap();
        let back: Vec<Section> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sections);
    }

    #[test]
    fn test_chunk_equality_ignores_allocation() {
        let a = Arc::new(Section::new("alpha beta", 0));
        let b = Arc::new(Section::new("alpha beta", 0));
        let c1 = Chunk {
            partial_content: "alpha beta".into(),
            source_sections: vec![a],
        };
        let c2 = Chunk {
            partial_content: "alpha beta".into(),
            source_sections: vec![b],
        };
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_last_section() {
        let chunk = Chunk {
            partial_content: "x".into(),
            source_sections: vec![
                Arc::new(Section::new("a", 3)),
                Arc::new(Section::new("b", 4)),
            ],
        };
        assert_eq!(chunk.last_section().unwrap().section_index, 4);
    }

    #[test]
    fn test_file_origin_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&FileOrigin::Source).unwrap(),
            "\"SOURCE\""
        );
        assert_eq!(
            serde_json::to_string(&FileOrigin::Local).unwrap(),
            "\"LOCAL\""
        );
    }
}
