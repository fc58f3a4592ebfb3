//! The runtime orchestrator.
//!
//! Owns the capture stream, the decode and navigator threads, the
//! current-section state and the keystroke emitter, and binds the alignment
//! components together:
//!
//! ```text
//! microphone → frame queue → recognizer → last W words (normalized)
//!    → candidate chunks around the current section
//!    → similarity engine → best chunk → its last source section
//!    → |delta| arrow keys → current section updated
//! ```
//!
//! Coarse states: *initializing* until [`PresentationController::run`] opens
//! the audio stream, *listening* while the workers idle, *navigating* while
//! the navigator holds the section mutex for a step, *stopped* once the
//! shutdown flag is up. The navigator thread is the only voice-driven writer
//! to the current section; the supervised override shares the same mutex, so
//! section updates are always serialized.
//!
//! Failure policy: any worker error (decode, similarity, key emission) is
//! fatal to the session. The first error is kept, the shutdown flag raised,
//! every thread joined, and the audio device released last. The only soft
//! skips are an empty candidate window, an unchanged word window, and a word
//! window still shorter than `W`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use thiserror::Error;
use tracing::{debug, info};

use crate::asr::StreamingRecognizer;
use crate::audio::{AudioCapture, FrameQueue, QUEUE_CAPACITY};
use crate::chunks::{generate_chunks, get_candidate_chunks};
use crate::keys::{press_burst, KeyEmitter};
use crate::listener::{spawn_listener, OverrideEvent};
use crate::models::{Chunk, Section};
use crate::normalize::normalize;
use crate::similarity::SimilarityEngine;

/// Timed wait used by every worker poll; the shutdown flag is observed at
/// least this often.
const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Main-loop cadence while the session is live.
const MAIN_LOOP_INTERVAL: Duration = Duration::from_millis(20);
/// Patience per worker thread at teardown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Words of speech and match shown in the per-navigation status line.
const STATUS_TAIL_WORDS: usize = 7;

/// The ways a live session dies. All of them are fatal: a session is
/// coherent or aborted, never half-recovered.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Audio capture failed")]
    Capture,
    #[error("Audio processing error")]
    Decode(#[source] anyhow::Error),
    #[error("Navigation execution error")]
    Navigation(#[source] anyhow::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared session state
// ─────────────────────────────────────────────────────────────────────────────

/// Serialized navigation state; one mutex covers the whole navigation step.
struct NavState {
    current: Arc<Section>,
    previous_words: Vec<String>,
}

struct Shared {
    shutdown: AtomicBool,
    paused: AtomicBool,
    /// True while a navigation step is in flight. Sole mutual exclusion for
    /// voice-driven steps, and the signal the override handler uses to
    /// ignore echoes of the navigator's own synthetic presses.
    navigating: AtomicBool,
    /// Latest normalized word window published by the decode thread.
    recent_words: Mutex<Vec<String>>,
    nav: Mutex<NavState>,
    /// First fatal error of the session.
    failure: Mutex<Option<anyhow::Error>>,
}

impl Shared {
    fn new(start: Arc<Section>) -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            navigating: AtomicBool::new(false),
            recent_words: Mutex::new(Vec::new()),
            nav: Mutex::new(NavState {
                current: start,
                previous_words: Vec::new(),
            }),
            failure: Mutex::new(None),
        }
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Record the session's first fatal error and raise the shutdown flag.
    fn fail(&self, err: anyhow::Error) {
        let mut slot = self.failure.lock().expect("failure slot poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum StepOutcome {
    /// Window identical to the last processed snapshot.
    Unchanged,
    /// No candidate chunks around the current section.
    NoCandidates,
    /// Step completed; `delta.abs()` keystrokes were emitted.
    Navigated { delta: isize },
}

/// The decision half of the controller, separated from the thread plumbing.
struct Navigator {
    chunks: Vec<Chunk>,
    engine: SimilarityEngine,
    emitter: Box<dyn KeyEmitter>,
    total_sections: usize,
}

fn tail_words<'a>(words: impl DoubleEndedIterator<Item = &'a str>, n: usize) -> String {
    let mut tail: Vec<&str> = words.rev().take(n).collect();
    tail.reverse();
    tail.join(" ")
}

impl Navigator {
    /// One navigation step over the locked state.
    ///
    /// The caller holds the navigation mutex for the whole call, so the read
    /// of `current`, the key burst and the write-back are atomic with respect
    /// to the supervised override.
    fn step(&mut self, nav: &mut NavState, words: &[String]) -> Result<StepOutcome> {
        if words == nav.previous_words.as_slice() {
            return Ok(StepOutcome::Unchanged);
        }

        let candidates = get_candidate_chunks(&nav.current, &self.chunks);
        if candidates.is_empty() {
            debug!(
                section = nav.current.section_index,
                "no candidate chunks, skipping step"
            );
            return Ok(StepOutcome::NoCandidates);
        }

        let query = words.join(" ");
        let results = self.engine.compare(&query, &candidates)?;
        let best = results
            .first()
            .context("similarity engine returned no results for a non-empty window")?;
        let target = Arc::clone(
            best.chunk
                .last_section()
                .context("candidate chunk with empty source sections")?,
        );

        let matched = best.chunk.partial_content.clone();
        self.navigate(nav, target, words, &matched)
    }

    /// Drive the deck to `target` and commit the step.
    fn navigate(
        &mut self,
        nav: &mut NavState,
        target: Arc<Section>,
        words: &[String],
        matched: &str,
    ) -> Result<StepOutcome> {
        let delta = target.section_index as isize - nav.current.section_index as isize;
        if delta != 0 {
            press_burst(self.emitter.as_mut(), delta)?;
        }

        println!("\n[{}/{}]", target.section_index + 1, self.total_sections);
        println!(
            "Speech  -> {}",
            tail_words(words.iter().map(String::as_str), STATUS_TAIL_WORDS)
        );
        println!(
            "Match   -> {}",
            tail_words(matched.split_whitespace(), STATUS_TAIL_WORDS)
        );

        nav.current = target;
        nav.previous_words = words.to_vec();
        Ok(StepOutcome::Navigated { delta })
    }
}

/// Reject section lists that violate the controller's invariants: the list
/// must be non-empty with indices `0..N-1` in order, the start index must
/// name an existing section, and the window must be positive.
fn validate_sections(
    sections: &[Arc<Section>],
    start_index: usize,
    window_size: usize,
) -> Result<()> {
    if sections.is_empty() {
        bail!("Cannot control an empty presentation");
    }
    for (position, section) in sections.iter().enumerate() {
        if section.section_index != position {
            bail!(
                "Section list is out of order: index {} at position {}",
                section.section_index,
                position
            );
        }
    }
    if start_index >= sections.len() {
        bail!(
            "Start section {} out of range (0..{})",
            start_index,
            sections.len()
        );
    }
    if window_size == 0 {
        bail!("Window size must be positive");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// PresentationController
// ─────────────────────────────────────────────────────────────────────────────

pub struct PresentationController {
    sections: Arc<Vec<Arc<Section>>>,
    window_size: usize,
    shared: Arc<Shared>,
    navigator: Navigator,
    recognizer: StreamingRecognizer,
}

impl PresentationController {
    /// Assemble a controller over `sections`, starting at `start_index`.
    pub fn new(
        sections: Vec<Arc<Section>>,
        start_index: usize,
        window_size: usize,
        engine: SimilarityEngine,
        recognizer: StreamingRecognizer,
        emitter: Box<dyn KeyEmitter>,
    ) -> Result<Self> {
        validate_sections(&sections, start_index, window_size)?;
        let start = &sections[start_index];

        let chunks = generate_chunks(&sections, window_size);
        info!(
            sections = sections.len(),
            chunks = chunks.len(),
            window_size,
            "controller assembled"
        );

        let navigator = Navigator {
            chunks,
            engine,
            emitter,
            total_sections: sections.len(),
        };

        Ok(Self {
            shared: Arc::new(Shared::new(Arc::clone(start))),
            sections: Arc::new(sections),
            window_size,
            navigator,
            recognizer,
        })
    }

    /// Run the session until Ctrl-C or a fatal error.
    ///
    /// Blocks the calling thread; the capture stream lives on it and is the
    /// last resource released.
    pub fn run(self) -> Result<()> {
        let Self {
            sections,
            window_size,
            shared,
            navigator,
            recognizer,
        } = self;

        let queue = Arc::new(FrameQueue::new(QUEUE_CAPACITY));

        {
            let shared = Arc::clone(&shared);
            ctrlc::set_handler(move || {
                shared.shutdown.store(true, Ordering::SeqCst);
            })
            .context("Cannot install Ctrl-C handler")?;
        }

        let decode_handle = spawn_decode_thread(
            Arc::clone(&shared),
            Arc::clone(&queue),
            recognizer,
            window_size,
        )?;
        let navigator_handle =
            spawn_navigator_thread(Arc::clone(&shared), navigator, window_size)?;

        {
            let shared = Arc::clone(&shared);
            let sections = Arc::clone(&sections);
            spawn_listener(move |event| handle_override(&shared, &sections, event));
        }

        let capture_failed = Arc::new(AtomicBool::new(false));
        let capture = AudioCapture::start(Arc::clone(&queue), Arc::clone(&capture_failed))?;
        info!("listening — Ctrl-C to stop");

        while !shared.shutting_down() {
            if capture_failed.load(Ordering::SeqCst) {
                shared.fail(SessionError::Capture.into());
                break;
            }
            thread::sleep(MAIN_LOOP_INTERVAL);
        }

        shared.shutdown.store(true, Ordering::SeqCst);
        join_with_timeout(decode_handle, JOIN_TIMEOUT, "decode");
        join_with_timeout(navigator_handle, JOIN_TIMEOUT, "navigator");
        drop(capture);

        match shared.failure.lock().expect("failure slot poisoned").take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker threads
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_decode_thread(
    shared: Arc<Shared>,
    queue: Arc<FrameQueue>,
    mut recognizer: StreamingRecognizer,
    window_size: usize,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("decode".into())
        .spawn(move || {
            while !shared.shutting_down() {
                let Some(frame) = queue.pop_timeout(POLL_INTERVAL) else {
                    continue;
                };

                match recognizer.accept_waveform(&frame) {
                    Ok(true) => {
                        let normalized = normalize(recognizer.partial());
                        let tokens: Vec<&str> = normalized.split_whitespace().collect();
                        let tail = &tokens[tokens.len().saturating_sub(window_size)..];
                        if tail.is_empty() {
                            continue;
                        }
                        let words: Vec<String> = tail.iter().map(|w| (*w).to_string()).collect();

                        let mut recent =
                            shared.recent_words.lock().expect("recent words poisoned");
                        if *recent != words {
                            *recent = words;
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        shared.fail(SessionError::Decode(err).into());
                        return;
                    }
                }
            }
        })
        .context("Cannot spawn decode thread")
}

fn spawn_navigator_thread(
    shared: Arc<Shared>,
    mut navigator: Navigator,
    window_size: usize,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("navigator".into())
        .spawn(move || {
            while !shared.shutting_down() {
                if shared.paused.load(Ordering::SeqCst) {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }

                let words = shared
                    .recent_words
                    .lock()
                    .expect("recent words poisoned")
                    .clone();
                if words.len() < window_size {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }

                if !shared.navigating.swap(true, Ordering::SeqCst) {
                    let outcome = {
                        let mut nav = shared.nav.lock().expect("nav state poisoned");
                        navigator.step(&mut nav, &words)
                    };
                    shared.navigating.store(false, Ordering::SeqCst);

                    if let Err(err) = outcome {
                        shared.fail(SessionError::Navigation(err).into());
                        return;
                    }
                }

                thread::sleep(POLL_INTERVAL);
            }
        })
        .context("Cannot spawn navigator thread")
}

/// Apply a supervised-override event to the shared state.
///
/// Right/Left only adjust the controller's belief about the current section;
/// the operator's physical press already reached the deck application, so no
/// synthetic keystroke is emitted. Echoes of the navigator's own synthetic
/// presses are filtered by the in-flight flag.
fn handle_override(shared: &Shared, sections: &[Arc<Section>], event: OverrideEvent) {
    if shared.shutting_down() {
        return;
    }

    match event {
        OverrideEvent::TogglePause => {
            let paused = !shared.paused.load(Ordering::SeqCst);
            shared.paused.store(paused, Ordering::SeqCst);
            println!("\n[{}]", if paused { "Paused" } else { "Resumed" });
        }
        OverrideEvent::Next | OverrideEvent::Previous => {
            if shared.navigating.load(Ordering::SeqCst) {
                return;
            }
            let mut nav = shared.nav.lock().expect("nav state poisoned");
            let current = nav.current.section_index;
            let target = match event {
                OverrideEvent::Next if current + 1 < sections.len() => current + 1,
                OverrideEvent::Previous if current > 0 => current - 1,
                _ => return,
            };
            nav.current = Arc::clone(&sections[target]);
            println!(
                "\n[{} Section] ({}/{} -> {}/{})",
                if matches!(event, OverrideEvent::Next) {
                    "Next"
                } else {
                    "Previous"
                },
                current + 1,
                sections.len(),
                target + 1,
                sections.len(),
            );
        }
    }
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        debug!("{name} thread still running at teardown, detaching");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Arrow;
    use crate::similarity::SimilarityUnit;
    use anyhow::anyhow;
    use std::sync::mpsc;

    /// Records taps through a channel so the navigator can own the emitter
    /// while the test still observes it.
    struct ChannelEmitter {
        sender: mpsc::Sender<Arrow>,
    }

    impl KeyEmitter for ChannelEmitter {
        fn tap(&mut self, arrow: Arrow) -> Result<()> {
            self.sender.send(arrow).unwrap();
            Ok(())
        }
    }

    /// Scores a candidate 1.0 when its last source section matches the
    /// rigged target, 0.6 otherwise.
    struct TargetUnit {
        target_index: usize,
    }

    impl SimilarityUnit for TargetUnit {
        fn name(&self) -> &'static str {
            "target"
        }

        fn scores(&self, _query: &str, candidates: &[Chunk]) -> Result<Vec<f32>> {
            Ok(candidates
                .iter()
                .map(|chunk| {
                    let last = chunk
                        .last_section()
                        .map(|s| s.section_index)
                        .unwrap_or(usize::MAX);
                    if last == self.target_index {
                        1.0
                    } else {
                        0.6
                    }
                })
                .collect())
        }
    }

    fn sections(n: usize) -> Vec<Arc<Section>> {
        (0..n)
            .map(|i| Arc::new(Section::new(format!("word{i}a word{i}b word{i}c"), i)))
            .collect()
    }

    fn navigator_for(
        sections: &[Arc<Section>],
        target_index: usize,
    ) -> (Navigator, mpsc::Receiver<Arrow>) {
        let (sender, receiver) = mpsc::channel();
        let engine = SimilarityEngine::from_units(
            0.4,
            0.6,
            Box::new(TargetUnit { target_index }),
            Box::new(TargetUnit { target_index }),
        );
        let navigator = Navigator {
            chunks: generate_chunks(sections, 3),
            engine,
            emitter: Box::new(ChannelEmitter { sender }),
            total_sections: sections.len(),
        };
        (navigator, receiver)
    }

    fn words(seed: &str) -> Vec<String> {
        seed.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_forward_jump_emits_right_presses() {
        let sections = sections(8);
        let (mut navigator, taps) = navigator_for(&sections, 5);
        let mut nav = NavState {
            current: Arc::clone(&sections[3]),
            previous_words: Vec::new(),
        };

        let outcome = navigator.step(&mut nav, &words("a b c")).unwrap();
        assert_eq!(outcome, StepOutcome::Navigated { delta: 2 });
        assert_eq!(nav.current.section_index, 5);

        let pressed: Vec<Arrow> = taps.try_iter().collect();
        assert_eq!(pressed, vec![Arrow::Right, Arrow::Right]);
    }

    #[test]
    fn test_backward_jump_emits_left_presses() {
        // Framed below the candidate filter: given a best chunk whose last
        // source section is two behind, the burst must be two Lefts.
        let sections = sections(8);
        let (mut navigator, taps) = navigator_for(&sections, 5);
        let mut nav = NavState {
            current: Arc::clone(&sections[7]),
            previous_words: Vec::new(),
        };

        let outcome = navigator
            .navigate(&mut nav, Arc::clone(&sections[5]), &words("a b c"), "a b c")
            .unwrap();
        assert_eq!(outcome, StepOutcome::Navigated { delta: -2 });
        assert_eq!(nav.current.section_index, 5);

        let pressed: Vec<Arrow> = taps.try_iter().collect();
        assert_eq!(pressed, vec![Arrow::Left, Arrow::Left]);
    }

    #[test]
    fn test_no_op_updates_snapshot_without_keystrokes() {
        let sections = sections(8);
        let (mut navigator, taps) = navigator_for(&sections, 4);
        let mut nav = NavState {
            current: Arc::clone(&sections[4]),
            previous_words: Vec::new(),
        };

        let outcome = navigator.step(&mut nav, &words("a b c")).unwrap();
        assert_eq!(outcome, StepOutcome::Navigated { delta: 0 });
        assert_eq!(nav.current.section_index, 4);
        assert_eq!(nav.previous_words, words("a b c"));
        assert!(taps.try_iter().next().is_none());
    }

    #[test]
    fn test_unchanged_words_skip_the_step() {
        let sections = sections(8);
        let (mut navigator, taps) = navigator_for(&sections, 5);
        let mut nav = NavState {
            current: Arc::clone(&sections[3]),
            previous_words: words("same old words"),
        };

        let outcome = navigator.step(&mut nav, &words("same old words")).unwrap();
        assert_eq!(outcome, StepOutcome::Unchanged);
        assert_eq!(nav.current.section_index, 3);
        assert!(taps.try_iter().next().is_none());
    }

    #[test]
    fn test_empty_candidates_skip_the_step() {
        let sections = sections(8);
        let (mut navigator, taps) = navigator_for(&sections, 5);
        navigator.chunks.clear();
        let mut nav = NavState {
            current: Arc::clone(&sections[3]),
            previous_words: Vec::new(),
        };

        let outcome = navigator.step(&mut nav, &words("a b c")).unwrap();
        assert_eq!(outcome, StepOutcome::NoCandidates);
        assert_eq!(nav.current.section_index, 3);
        assert!(nav.previous_words.is_empty());
        assert!(taps.try_iter().next().is_none());
    }

    #[test]
    fn test_override_bounded_at_both_ends() {
        let sections = sections(3);
        let shared = Shared::new(Arc::clone(&sections[0]));

        handle_override(&shared, &sections, OverrideEvent::Previous);
        assert_eq!(shared.nav.lock().unwrap().current.section_index, 0);

        handle_override(&shared, &sections, OverrideEvent::Next);
        handle_override(&shared, &sections, OverrideEvent::Next);
        handle_override(&shared, &sections, OverrideEvent::Next);
        assert_eq!(shared.nav.lock().unwrap().current.section_index, 2);
    }

    #[test]
    fn test_override_toggles_pause() {
        let sections = sections(2);
        let shared = Shared::new(Arc::clone(&sections[0]));
        assert!(!shared.paused.load(Ordering::SeqCst));

        handle_override(&shared, &sections, OverrideEvent::TogglePause);
        assert!(shared.paused.load(Ordering::SeqCst));
        handle_override(&shared, &sections, OverrideEvent::TogglePause);
        assert!(!shared.paused.load(Ordering::SeqCst));
    }

    #[test]
    fn test_override_ignored_mid_navigation() {
        let sections = sections(3);
        let shared = Shared::new(Arc::clone(&sections[0]));
        shared.navigating.store(true, Ordering::SeqCst);

        handle_override(&shared, &sections, OverrideEvent::Next);
        assert_eq!(shared.nav.lock().unwrap().current.section_index, 0);
    }

    #[test]
    fn test_fail_keeps_first_error_and_raises_shutdown() {
        let sections = sections(2);
        let shared = Shared::new(Arc::clone(&sections[0]));
        shared.fail(anyhow!("first"));
        shared.fail(anyhow!("second"));
        assert!(shared.shutting_down());
        let err = shared.failure.lock().unwrap().take().unwrap();
        assert_eq!(err.to_string(), "first");
    }

    #[test]
    fn test_validate_sections() {
        let good = sections(3);
        assert!(validate_sections(&good, 0, 12).is_ok());
        assert!(validate_sections(&good, 2, 12).is_ok());

        assert!(validate_sections(&[], 0, 12).is_err());
        assert!(validate_sections(&good, 3, 12).is_err());
        assert!(validate_sections(&good, 0, 0).is_err());

        let out_of_order: Vec<Arc<Section>> = vec![
            Arc::new(Section::new("a", 1)),
            Arc::new(Section::new("b", 0)),
        ];
        assert!(validate_sections(&out_of_order, 0, 12).is_err());
    }

    #[test]
    fn test_tail_words() {
        let sentence = "one two three four five six seven eight nine";
        assert_eq!(
            tail_words(sentence.split_whitespace(), 7),
            "three four five six seven eight nine"
        );
        assert_eq!(tail_words("a b".split_whitespace(), 7), "a b");
    }
}
