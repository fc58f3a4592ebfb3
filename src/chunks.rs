//! Sliding-window chunk production.
//!
//! Flattens an ordered section list into `(word, owning section)` pairs and
//! slides a fixed-size window over them one word at a time. Each window
//! position becomes one [`Chunk`] carrying the normalized window text and the
//! distinct sections that contributed words to it.
//!
//! The candidate filter then restricts a full chunk list to the neighbourhood
//! a speaker can plausibly reach from the current section.

use std::sync::Arc;

use crate::models::{Chunk, Section};
use crate::normalize::normalize;

/// Default number of recent spoken words aligned at each decision.
pub const DEFAULT_WINDOW_SIZE: usize = 12;

/// How far (in sections) a speaker can plausibly jump between decisions.
const CANDIDATE_REACH: isize = 2;

/// Produce every window of exactly `window_size` words over `sections`.
///
/// Section contents are split on whitespace without normalization — the
/// window text is normalized as a whole, so word boundaries inside a section
/// survive exactly as written. Returns an empty list when the sections hold
/// fewer than `window_size` words in total.
pub fn generate_chunks(sections: &[Arc<Section>], window_size: usize) -> Vec<Chunk> {
    let words_with_sources: Vec<(&str, &Arc<Section>)> = sections
        .iter()
        .flat_map(|section| section.content.split_whitespace().map(move |w| (w, section)))
        .collect();

    if window_size == 0 || words_with_sources.len() < window_size {
        return Vec::new();
    }

    words_with_sources
        .windows(window_size)
        .map(|window| {
            let text = window.iter().map(|(w, _)| *w).collect::<Vec<_>>().join(" ");

            let mut sources: Vec<Arc<Section>> = Vec::new();
            for (_, section) in window {
                if sources
                    .last()
                    .map_or(true, |prev| prev.section_index != section.section_index)
                {
                    sources.push(Arc::clone(section));
                }
            }
            // Window words arrive in section order, so `sources` is already
            // deduplicated and sorted by section_index.

            Chunk {
                partial_content: normalize(&text),
                source_sections: sources,
            }
        })
        .collect()
}

/// Restrict `all_chunks` to the candidates reachable from `current_section`.
///
/// A chunk qualifies iff every section it touches lies within
/// `[i-2, i+2]` of the current index, and it is not wholly contained in a
/// single section sitting exactly on either edge of that window — the window
/// only clips the edge sections, so a chunk living entirely inside one of
/// them is weak evidence.
pub fn get_candidate_chunks(current_section: &Section, all_chunks: &[Chunk]) -> Vec<Chunk> {
    let idx = current_section.section_index as isize;
    let lo = idx - CANDIDATE_REACH;
    let hi = idx + CANDIDATE_REACH;

    all_chunks
        .iter()
        .filter(|chunk| {
            chunk
                .source_sections
                .iter()
                .all(|s| (lo..=hi).contains(&(s.section_index as isize)))
        })
        .filter(|chunk| {
            !(chunk.source_sections.len() == 1
                && matches!(
                    chunk.source_sections[0].section_index as isize,
                    i if i == lo || i == hi
                ))
        })
        .cloned()
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
