//! Supervised-override keyboard listener.
//!
//! Alongside voice-driven navigation the operator can steer by hand: Right
//! and Left nudge the controller's notion of the current section (the
//! physical press already reaches the deck application directly), and Insert
//! toggles a pause that silences the navigator while capture and decoding
//! continue.
//!
//! The OS-level hook has no cancellation handle, so the listener runs on a
//! detached thread for the life of the process; the handler is expected to
//! consult the session's shutdown state and go quiet after teardown.

use rdev::{listen, EventType, Key};
use tracing::{error, warn};

/// An operator action decoded from the global keyboard stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideEvent {
    /// Right arrow: advance one section.
    Next,
    /// Left arrow: retreat one section.
    Previous,
    /// Insert: toggle the paused flag.
    TogglePause,
}

fn decode(event_type: &EventType) -> Option<OverrideEvent> {
    match event_type {
        EventType::KeyPress(Key::RightArrow) => Some(OverrideEvent::Next),
        EventType::KeyPress(Key::LeftArrow) => Some(OverrideEvent::Previous),
        EventType::KeyPress(Key::Insert) => Some(OverrideEvent::TogglePause),
        _ => None,
    }
}

/// Start the global listener, invoking `handler` for each override event.
pub fn spawn_listener<F>(handler: F)
where
    F: Fn(OverrideEvent) + Send + 'static,
{
    std::thread::Builder::new()
        .name("override-listener".into())
        .spawn(move || {
            let result = listen(move |event| {
                if let Some(action) = decode(&event.event_type) {
                    handler(action);
                }
            });
            if let Err(err) = result {
                // Typically missing accessibility/input permissions; voice
                // navigation keeps working without the override.
                error!("keyboard listener unavailable: {err:?}");
                warn!("supervised override disabled for this session");
            }
        })
        .expect("failed to spawn listener thread");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
