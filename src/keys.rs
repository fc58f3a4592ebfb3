//! Synthetic arrow-key emission.
//!
//! Navigation is a silent side effect: the deck application is driven with
//! OS-level Right/Left key events aimed at whichever window has focus, the
//! same events a presenter remote would produce.

use std::time::Duration;

use anyhow::{anyhow, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};

/// Pause between presses inside a multi-press burst, giving the deck
/// application time to process each key. The final press has no trailing
/// sleep.
const INTER_KEY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Right,
    Left,
}

/// Something that can tap an arrow key. The production implementation
/// synthesises real OS events; tests substitute a recorder.
pub trait KeyEmitter: Send {
    fn tap(&mut self, arrow: Arrow) -> Result<()>;
}

/// [`KeyEmitter`] backed by OS event injection.
pub struct EnigoEmitter {
    enigo: Enigo,
}

impl EnigoEmitter {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow!("Cannot initialise keystroke synthesis: {e}"))?;
        Ok(Self { enigo })
    }
}

impl KeyEmitter for EnigoEmitter {
    fn tap(&mut self, arrow: Arrow) -> Result<()> {
        let key = match arrow {
            Arrow::Right => Key::RightArrow,
            Arrow::Left => Key::LeftArrow,
        };
        self.enigo
            .key(key, Direction::Press)
            .map_err(|e| anyhow!("Key press failed: {e}"))?;
        self.enigo
            .key(key, Direction::Release)
            .map_err(|e| anyhow!("Key release failed: {e}"))?;
        Ok(())
    }
}

/// Tap Right (`delta > 0`) or Left (`delta < 0`) exactly `|delta|` times.
///
/// A zero delta emits nothing. Any emission failure aborts the burst — a
/// half-applied burst leaves the deck desynchronized, and the caller treats
/// that as fatal.
pub fn press_burst(emitter: &mut dyn KeyEmitter, delta: isize) -> Result<()> {
    let arrow = if delta > 0 { Arrow::Right } else { Arrow::Left };
    let presses = delta.unsigned_abs();

    for i in 0..presses {
        emitter.tap(arrow)?;
        if i + 1 < presses {
            std::thread::sleep(INTER_KEY_DELAY);
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingEmitter {
        taps: Vec<Arrow>,
        fail_after: Option<usize>,
    }

    impl KeyEmitter for RecordingEmitter {
        fn tap(&mut self, arrow: Arrow) -> Result<()> {
            if self.fail_after == Some(self.taps.len()) {
                anyhow::bail!("injection refused");
            }
            self.taps.push(arrow);
            Ok(())
        }
    }

    #[test]
    fn test_positive_delta_taps_right() {
        let mut emitter = RecordingEmitter::default();
        press_burst(&mut emitter, 2).unwrap();
        assert_eq!(emitter.taps, vec![Arrow::Right, Arrow::Right]);
    }

    #[test]
    fn test_negative_delta_taps_left() {
        let mut emitter = RecordingEmitter::default();
        press_burst(&mut emitter, -3).unwrap();
        assert_eq!(emitter.taps, vec![Arrow::Left; 3]);
    }

    #[test]
    fn test_zero_delta_is_silent() {
        let mut emitter = RecordingEmitter::default();
        press_burst(&mut emitter, 0).unwrap();
        assert!(emitter.taps.is_empty());
    }

    #[test]
    fn test_burst_aborts_on_failure() {
        let mut emitter = RecordingEmitter {
            taps: Vec::new(),
            fail_after: Some(1),
        };
        assert!(press_burst(&mut emitter, 3).is_err());
        assert_eq!(emitter.taps.len(), 1);
    }
}
