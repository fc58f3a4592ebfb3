//! # moves
//!
//! Voice-driven presentation navigator. A speaker delivers a prepared talk;
//! moves transcribes the live speech, matches the recent words against a
//! pre-segmented script of the talk, infers which slide the speaker has
//! reached, and taps Right/Left arrow keys to keep the deck on that slide.
//! The speaker is never interrupted; navigation is a silent side effect.
//!
//! ## Pipeline
//! 1. **Capture** — the default microphone delivers ~100 ms mono f32 frames
//!    onto a bounded drop-oldest queue.
//! 2. **Decode** — a streaming transducer (ONNX encoder/decoder/joiner)
//!    grows a partial transcript; its normalized last `W` words form the
//!    alignment query.
//! 3. **Align** — candidate windows around the current section are ranked by
//!    a fused phonetic + semantic similarity score.
//! 4. **Navigate** — the best window's last source section becomes the
//!    target; the section delta is emitted as synthetic arrow keystrokes.
//!
//! ## Offline preparation
//! `speaker process` extracts both PDFs, asks an LLM to split the transcript
//! into one segment per slide, and persists the result as `sections.json` —
//! the only input the live session needs besides the models.
//!
//! ## Quick start
//!
//! ```no_run
//! use moves::settings::SettingsEditor;
//! use moves::speakers::SpeakerManager;
//! use moves::storage::DataDir;
//!
//! let data = DataDir::default_root().unwrap();
//! let manager = SpeakerManager::new(data.clone());
//! let speaker = manager.add(
//!     "Alice",
//!     std::path::Path::new("deck.pdf"),
//!     std::path::Path::new("talk.pdf"),
//! ).unwrap();
//!
//! let settings = SettingsEditor::open(data).unwrap().list().unwrap();
//! manager.process(std::slice::from_ref(&speaker), &settings).unwrap();
//! ```

pub mod asr;
pub mod audio;
pub mod chunks;
pub mod controller;
pub mod keys;
pub mod listener;
pub mod models;
pub mod normalize;
pub mod sections;
pub mod settings;
pub mod similarity;
pub mod speakers;
pub mod storage;

// ─── Re-exports for convenience ─────────────────────────────────────────────

/// The runtime orchestrator binding capture, decoding and navigation.
pub use controller::PresentationController;

/// Canonical text normalization applied to every string the aligner sees.
pub use normalize::normalize;

/// The fused phonetic + semantic ranking engine.
pub use similarity::SimilarityEngine;
