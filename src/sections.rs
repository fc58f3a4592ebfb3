//! Offline section production.
//!
//! Turns a slide deck and a transcript (both PDFs) into the aligned section
//! list the runtime consumes:
//!
//! 1. Extract the deck page by page, each page prefixed `# Slide Page <k>`.
//! 2. Extract the transcript as one blob.
//! 3. Ask an LLM to split the transcript into one string per slide page,
//!    returned as a JSON array.
//! 4. Wrap each string into a [`Section`] indexed by its position.
//!
//! Persistence is a plain JSON array of `{content, section_index}` objects
//! whose array position equals the index; [`sections_to_json`] and
//! [`sections_from_json`] are inverse on well-formed data.
//!
//! Failures (PDF extraction, the HTTP call, JSON coercion, a length
//! mismatch) surface to the caller; there is no retry here.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::models::{Section, Settings};

/// Generous ceiling for one segmentation call; decks with many slides make
/// the model emit the whole transcript back.
const LLM_TIMEOUT: Duration = Duration::from_secs(300);

// ─────────────────────────────────────────────────────────────────────────────
// PDF extraction
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfKind {
    /// Slide deck: pages are kept apart with `# Slide Page <k>` headers so
    /// the model can count them.
    Presentation,
    /// Spoken transcript: pages concatenated bare.
    Transcript,
}

/// Join per-page text according to `kind`.
fn join_pages(pages: &[String], kind: PdfKind) -> String {
    match kind {
        PdfKind::Presentation => pages
            .iter()
            .enumerate()
            .map(|(k, text)| format!("# Slide Page {k}\n{text}"))
            .collect::<Vec<_>>()
            .join("\n"),
        PdfKind::Transcript => pages.join("\n"),
    }
}

/// Extract text from a PDF.
///
/// Returns the joined text and the page count.
pub fn extract_pdf(path: &Path, kind: PdfKind) -> Result<(String, usize)> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .with_context(|| format!("Cannot extract text from PDF: {}", path.display()))?;
    if pages.is_empty() {
        bail!("PDF has no pages: {}", path.display());
    }
    let joined = join_pages(&pages, kind);
    Ok((joined, pages.len()))
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM segmentation
// ─────────────────────────────────────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "\
You align a talk transcript with its slide deck. The user message contains \
the deck (pages marked '# Slide Page <k>') followed by the raw transcript. \
Split the transcript into one segment per slide page, in order: segment k is \
exactly the part of the transcript the speaker delivers while slide page k \
is shown. Use the transcript's own wording; do not summarise, reorder or \
invent text. Respond with a JSON array of strings only, one string per slide \
page, with no surrounding prose.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Strip an optional markdown code fence from a model reply.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse the model reply into per-slide segments.
fn parse_segments(reply: &str, slide_count: usize) -> Result<Vec<String>> {
    let segments: Vec<String> = serde_json::from_str(strip_code_fence(reply))
        .context("Model reply is not a JSON array of strings")?;
    if segments.len() != slide_count {
        bail!(
            "Model returned {} segments for {} slide pages",
            segments.len(),
            slide_count
        );
    }
    Ok(segments)
}

fn call_llm(
    settings: &Settings,
    presentation_text: &str,
    transcript_text: &str,
    slide_count: usize,
) -> Result<Vec<String>> {
    let url = format!(
        "{}/chat/completions",
        settings.base_url.trim_end_matches('/')
    );
    let body = json!({
        "model": settings.model,
        "temperature": 0,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": format!(
                "{presentation_text}\n\n---\n\nTranscript:\n{transcript_text}"
            )},
        ],
    });

    debug!(model = %settings.model, slide_count, "requesting transcript segmentation");
    let client = reqwest::blocking::Client::builder()
        .timeout(LLM_TIMEOUT)
        .build()
        .context("Cannot build HTTP client")?;
    let response = client
        .post(&url)
        .bearer_auth(&settings.key)
        .json(&body)
        .send()
        .with_context(|| format!("LLM request failed: {url}"))?
        .error_for_status()
        .context("LLM request was rejected")?;

    let parsed: ChatResponse = response
        .json()
        .context("LLM response is not valid JSON")?;
    let reply = parsed
        .choices
        .first()
        .map(|choice| choice.message.content.as_str())
        .context("LLM response has no choices")?;

    parse_segments(reply, slide_count)
}

// ─────────────────────────────────────────────────────────────────────────────
// Public operations
// ─────────────────────────────────────────────────────────────────────────────

/// Produce the aligned section list for one presentation/transcript pair.
pub fn generate_sections(
    presentation_pdf: &Path,
    transcript_pdf: &Path,
    settings: &Settings,
) -> Result<Vec<Section>> {
    let (presentation_text, slide_count) = extract_pdf(presentation_pdf, PdfKind::Presentation)?;
    let (transcript_text, _) = extract_pdf(transcript_pdf, PdfKind::Transcript)?;

    let segments = call_llm(settings, &presentation_text, &transcript_text, slide_count)?;
    info!(sections = segments.len(), "transcript segmented");

    Ok(segments
        .into_iter()
        .enumerate()
        .map(|(index, content)| Section::new(content, index))
        .collect())
}

/// Serialize sections as the persisted JSON array.
pub fn sections_to_json(sections: &[Section]) -> Result<String> {
    serde_json::to_string_pretty(sections).context("Cannot serialize sections")
}

/// Reload sections from the persisted JSON array, enforcing that the array
/// position equals each `section_index`.
pub fn sections_from_json(raw: &str) -> Result<Vec<Arc<Section>>> {
    let sections: Vec<Section> =
        serde_json::from_str(raw).context("sections.json is not a valid section array")?;
    for (position, section) in sections.iter().enumerate() {
        if section.section_index != position {
            bail!(
                "sections.json is out of order: index {} at position {}",
                section.section_index,
                position
            );
        }
    }
    Ok(sections.into_iter().map(Arc::new).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
