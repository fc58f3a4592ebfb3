//! Speaker profile management.
//!
//! A speaker is a named pair of source PDFs plus whatever processing has
//! produced for them, stored under `~/.moves/speakers/<speaker_id>/`. The
//! manager covers the profile lifecycle: create, edit, resolve by id or
//! name, process into sections, and delete.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

use crate::models::{FileOrigin, ProcessResult, Section, Settings, Speaker, SpeakerMatch};
use crate::sections;
use crate::storage::DataDir;

const SPEAKER_FILE: &str = "speaker.json";
const SECTIONS_FILE: &str = "sections.json";
const PRESENTATION_FILE: &str = "presentation.pdf";
const TRANSCRIPT_FILE: &str = "transcript.pdf";

/// Random-suffix length in generated speaker ids.
const ID_SUFFIX_LEN: usize = 5;

/// Derive a speaker id from a display name: the lowercased alphanumeric name
/// words joined with hyphens, plus a random suffix ("Test User" →
/// "test-user-x7k2q").
pub fn generate_speaker_id(name: &str) -> String {
    let slug: Vec<String> = name
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect();

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();

    if slug.is_empty() {
        format!("speaker-{suffix}")
    } else {
        format!("{}-{suffix}", slug.join("-"))
    }
}

pub struct SpeakerManager {
    data: DataDir,
}

impl SpeakerManager {
    pub fn new(data: DataDir) -> Self {
        Self { data }
    }

    fn speaker_file(&self, speaker_id: &str) -> std::path::PathBuf {
        self.data.speaker_dir(speaker_id).join(SPEAKER_FILE)
    }

    fn persist(&self, speaker: &Speaker) -> Result<()> {
        let json =
            serde_json::to_string_pretty(speaker).context("Cannot serialize speaker profile")?;
        self.data
            .write_text(&self.speaker_file(&speaker.speaker_id), &json)
    }

    /// Create a new speaker profile.
    ///
    /// The name must not collide with any existing speaker's *id* — ids are
    /// the unambiguous handle, and a name shadowing one would make `resolve`
    /// ambiguous in kind rather than in count.
    pub fn add(
        &self,
        name: &str,
        source_presentation: &Path,
        source_transcript: &Path,
    ) -> Result<Speaker> {
        let existing = self.list()?;
        if existing.iter().any(|speaker| speaker.speaker_id == name) {
            bail!(
                "Name '{}' matches an existing speaker's ID and cannot be used",
                name
            );
        }

        let speaker = Speaker {
            name: name.to_string(),
            speaker_id: generate_speaker_id(name),
            source_presentation: source_presentation
                .canonicalize()
                .unwrap_or_else(|_| source_presentation.to_path_buf()),
            source_transcript: source_transcript
                .canonicalize()
                .unwrap_or_else(|_| source_transcript.to_path_buf()),
        };
        self.persist(&speaker)?;
        info!(speaker_id = %speaker.speaker_id, "speaker profile created");
        Ok(speaker)
    }

    /// Replace either source path on an existing profile.
    pub fn edit(
        &self,
        speaker: &mut Speaker,
        source_presentation: Option<&Path>,
        source_transcript: Option<&Path>,
    ) -> Result<()> {
        if let Some(path) = source_presentation {
            speaker.source_presentation = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        }
        if let Some(path) = source_transcript {
            speaker.source_transcript = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        }
        self.persist(speaker)
    }

    /// All stored profiles, in speaker-id order.
    pub fn list(&self) -> Result<Vec<Speaker>> {
        let mut speakers = Vec::new();
        for dir in self.data.subdirectories(&self.data.speakers_dir())? {
            let file = dir.join(SPEAKER_FILE);
            if !file.exists() {
                continue;
            }
            let raw = self.data.read_text(&file)?;
            let speaker: Speaker = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt speaker profile: {}", file.display()))?;
            speakers.push(speaker);
        }
        Ok(speakers)
    }

    /// Resolve a pattern against the stored profiles: exact id match first,
    /// then name match (which may be ambiguous).
    pub fn resolve(&self, pattern: &str) -> Result<SpeakerMatch> {
        let speakers = self.list()?;

        if let Some(by_id) = speakers.iter().find(|s| s.speaker_id == pattern) {
            return Ok(SpeakerMatch::Unique(by_id.clone()));
        }

        let by_name: Vec<Speaker> = speakers
            .into_iter()
            .filter(|s| s.name == pattern)
            .collect();
        Ok(match by_name.len() {
            0 => SpeakerMatch::NotFound,
            1 => SpeakerMatch::Unique(by_name.into_iter().next().expect("one match")),
            _ => SpeakerMatch::Ambiguous(by_name),
        })
    }

    /// Resolve one artifact for processing: prefer the configured source
    /// (caching a copy into the profile), fall back to a previous cache.
    fn resolve_artifact(
        &self,
        source: &Path,
        cached: &Path,
        description: &str,
        speaker: &Speaker,
    ) -> Result<FileOrigin> {
        if source.exists() {
            self.data.cache_file(source, cached)?;
            Ok(FileOrigin::Source)
        } else if cached.exists() {
            Ok(FileOrigin::Local)
        } else {
            bail!(
                "Missing {} for speaker {} ({}): {} does not exist and no cached copy is present",
                description,
                speaker.name,
                speaker.speaker_id,
                source.display()
            )
        }
    }

    /// Run the section producer for each speaker and persist `sections.json`.
    ///
    /// Fails fast: an LLM or extraction error for one speaker aborts the
    /// batch with no retry.
    pub fn process(&self, speakers: &[Speaker], settings: &Settings) -> Result<Vec<ProcessResult>> {
        // Validate every speaker's inputs up front so a missing file on the
        // last speaker does not waste LLM calls on the first.
        for speaker in speakers {
            let dir = self.data.speaker_dir(&speaker.speaker_id);
            let sources_ok =
                speaker.source_presentation.exists() && speaker.source_transcript.exists();
            let cached_ok =
                dir.join(PRESENTATION_FILE).exists() && dir.join(TRANSCRIPT_FILE).exists();
            if !sources_ok && !cached_ok {
                bail!(
                    "Missing files for speaker {} ({})",
                    speaker.name,
                    speaker.speaker_id
                );
            }
        }

        let mut results = Vec::with_capacity(speakers.len());
        for speaker in speakers {
            let dir = self.data.speaker_dir(&speaker.speaker_id);
            let presentation = dir.join(PRESENTATION_FILE);
            let transcript = dir.join(TRANSCRIPT_FILE);

            let presentation_from = self.resolve_artifact(
                &speaker.source_presentation,
                &presentation,
                "presentation file",
                speaker,
            )?;
            let transcript_from = self.resolve_artifact(
                &speaker.source_transcript,
                &transcript,
                "transcript file",
                speaker,
            )?;

            let sections = sections::generate_sections(&presentation, &transcript, settings)?;
            self.data.write_text(
                &dir.join(SECTIONS_FILE),
                &sections::sections_to_json(&sections)?,
            )?;
            info!(
                speaker_id = %speaker.speaker_id,
                sections = sections.len(),
                "speaker processed"
            );

            results.push(ProcessResult {
                section_count: sections.len(),
                transcript_from,
                presentation_from,
            });
        }
        Ok(results)
    }

    /// Load the processed sections for a live session.
    pub fn load_sections(&self, speaker: &Speaker) -> Result<Vec<Arc<Section>>> {
        let path = self
            .data
            .speaker_dir(&speaker.speaker_id)
            .join(SECTIONS_FILE);
        if !path.exists() {
            bail!(
                "Speaker {} ({}) has not been processed yet — run `moves speaker process {}` first",
                speaker.name,
                speaker.speaker_id,
                speaker.speaker_id
            );
        }
        let raw = self.data.read_text(&path)?;
        let sections = sections::sections_from_json(&raw)?;
        if sections.is_empty() {
            bail!(
                "Speaker {} ({}) has an empty section list",
                speaker.name,
                speaker.speaker_id
            );
        }
        Ok(sections)
    }

    /// Remove a speaker's whole profile directory.
    pub fn delete(&self, speaker: &Speaker) -> Result<()> {
        self.data
            .delete_dir(&self.data.speaker_dir(&speaker.speaker_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn manager() -> (tempfile::TempDir, SpeakerManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = SpeakerManager::new(DataDir::at(dir.path()));
        (dir, manager)
    }

    fn touch(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"%PDF-stub").unwrap();
        path
    }

    #[test]
    fn test_generate_speaker_id_shape() {
        let id = generate_speaker_id("Test User");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "test");
        assert_eq!(parts[1], "user");
        assert_eq!(parts[2].len(), 5);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_speaker_id_strips_punctuation() {
        let id = generate_speaker_id("Dr. O'Brien!");
        assert!(id.starts_with("dr-obrien-"));
    }

    #[test]
    fn test_generate_speaker_id_empty_name() {
        let id = generate_speaker_id("   ");
        assert!(id.starts_with("speaker-"));
    }

    #[test]
    fn test_add_list_round_trip() {
        let (dir, manager) = manager();
        let pres = touch(dir.path(), "deck.pdf");
        let trans = touch(dir.path(), "talk.pdf");

        let speaker = manager.add("Alice", &pres, &trans).unwrap();
        assert_eq!(speaker.name, "Alice");
        assert!(speaker.source_presentation.is_absolute());

        let listed = manager.list().unwrap();
        assert_eq!(listed, vec![speaker]);
    }

    #[test]
    fn test_add_rejects_name_equal_to_existing_id() {
        let (dir, manager) = manager();
        let pres = touch(dir.path(), "deck.pdf");
        let trans = touch(dir.path(), "talk.pdf");

        let first = manager.add("Alice", &pres, &trans).unwrap();
        assert!(manager.add(&first.speaker_id, &pres, &trans).is_err());
    }

    #[test]
    fn test_resolve_by_id_name_and_ambiguity() {
        let (dir, manager) = manager();
        let pres = touch(dir.path(), "deck.pdf");
        let trans = touch(dir.path(), "talk.pdf");

        let a = manager.add("Alice", &pres, &trans).unwrap();
        let b = manager.add("Bob", &pres, &trans).unwrap();
        let b2 = manager.add("Bob", &pres, &trans).unwrap();

        assert_eq!(
            manager.resolve(&a.speaker_id).unwrap(),
            SpeakerMatch::Unique(a.clone())
        );
        assert_eq!(
            manager.resolve("Alice").unwrap(),
            SpeakerMatch::Unique(a)
        );
        match manager.resolve("Bob").unwrap() {
            SpeakerMatch::Ambiguous(matches) => {
                assert_eq!(matches.len(), 2);
                assert!(matches.contains(&b));
                assert!(matches.contains(&b2));
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert_eq!(manager.resolve("Carol").unwrap(), SpeakerMatch::NotFound);
    }

    #[test]
    fn test_edit_updates_paths() {
        let (dir, manager) = manager();
        let pres = touch(dir.path(), "deck.pdf");
        let trans = touch(dir.path(), "talk.pdf");
        let new_pres = touch(dir.path(), "deck-v2.pdf");

        let mut speaker = manager.add("Alice", &pres, &trans).unwrap();
        manager.edit(&mut speaker, Some(&new_pres), None).unwrap();
        assert!(speaker
            .source_presentation
            .to_string_lossy()
            .contains("deck-v2"));

        // The stored profile reflects the edit.
        let reloaded = manager.list().unwrap();
        assert_eq!(reloaded[0].source_presentation, speaker.source_presentation);
        assert_eq!(reloaded[0].source_transcript, speaker.source_transcript);
    }

    #[test]
    fn test_delete_removes_profile() {
        let (dir, manager) = manager();
        let pres = touch(dir.path(), "deck.pdf");
        let trans = touch(dir.path(), "talk.pdf");

        let speaker = manager.add("Alice", &pres, &trans).unwrap();
        manager.delete(&speaker).unwrap();
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_load_sections_requires_processing() {
        let (dir, manager) = manager();
        let pres = touch(dir.path(), "deck.pdf");
        let trans = touch(dir.path(), "talk.pdf");

        let speaker = manager.add("Alice", &pres, &trans).unwrap();
        let err = manager.load_sections(&speaker).unwrap_err();
        assert!(err.to_string().contains("not been processed"));
    }

    #[test]
    fn test_load_sections_reads_persisted_list() {
        let (dir, manager) = manager();
        let pres = touch(dir.path(), "deck.pdf");
        let trans = touch(dir.path(), "talk.pdf");

        let speaker = manager.add("Alice", &pres, &trans).unwrap();
        let sections = vec![
            Section::new("first slide words", 0),
            Section::new("second slide words", 1),
        ];
        let data = DataDir::at(dir.path());
        data.write_text(
            &data.speaker_dir(&speaker.speaker_id).join("sections.json"),
            &sections::sections_to_json(&sections).unwrap(),
        )
        .unwrap();

        let loaded = manager.load_sections(&speaker).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].content, "second slide words");
    }

    #[test]
    fn test_process_rejects_missing_files_up_front() {
        let (dir, manager) = manager();
        let pres = touch(dir.path(), "deck.pdf");
        let trans = touch(dir.path(), "talk.pdf");

        let mut speaker = manager.add("Alice", &pres, &trans).unwrap();
        fs::remove_file(&pres).unwrap();
        fs::remove_file(&trans).unwrap();
        // Paths were canonicalized at add time; refresh the in-memory copy.
        speaker.source_presentation = dir.path().join("deck.pdf");
        speaker.source_transcript = dir.path().join("talk.pdf");

        let err = manager
            .process(&[speaker], &Settings::default())
            .unwrap_err();
        assert!(err.to_string().contains("Missing files"));
    }
}
