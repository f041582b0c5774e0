use crate::effect::EffectRunner;
use crate::hotkey::Hotkey;
use crate::media::MediaSelector;
use rdev::{listen, Button, EventType, Key};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Receives global input events, resolves a media pair on each pointer
/// press and hands it to the effect runner on a fresh thread so the
/// listener is never blocked. Serialization of concurrent attempts is
/// entirely the runner's permit; the dispatcher holds no locks across work.
pub struct TriggerDispatcher {
    selector: MediaSelector,
    runner: Arc<EffectRunner>,
    quit_hotkey: Option<Hotkey>,
    quit: Arc<Mutex<bool>>,
}

impl TriggerDispatcher {
    pub fn new(
        selector: MediaSelector,
        runner: Arc<EffectRunner>,
        quit_hotkey: Option<Hotkey>,
    ) -> Self {
        Self {
            selector,
            runner,
            quit_hotkey,
            quit: Arc::new(Mutex::new(false)),
        }
    }

    /// One physical pointer transition. Release events produce no effect.
    pub fn on_pointer_event(&self, button: Button, pressed: bool) {
        if !pressed {
            return;
        }
        let pair = match self.selector.select() {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!("{err}");
                return;
            }
        };
        tracing::debug!(
            ?button,
            audio = %pair.audio.display(),
            image = %pair.image.display(),
            "click accepted"
        );
        // Fire and forget; a spawned attempt that loses the permit race
        // returns immediately, so spawn depth stays bounded in practice.
        let runner = Arc::clone(&self.runner);
        thread::spawn(move || runner.attempt(pair));
    }

    /// True once after the quit hotkey fired.
    pub fn take_quit(&self) -> bool {
        let mut quit = self.quit.lock().unwrap();
        if *quit {
            *quit = false;
            true
        } else {
            false
        }
    }

    fn quit_matches(&self, key: Key, ctrl: bool, shift: bool, alt: bool) -> bool {
        match self.quit_hotkey {
            Some(hotkey) => {
                key == hotkey.key
                    && (!hotkey.ctrl || ctrl)
                    && (!hotkey.shift || shift)
                    && (!hotkey.alt || alt)
            }
            None => false,
        }
    }

    /// Spawn the global input listener. Runs until the process exits,
    /// restarting the OS hook after a short pause if it fails.
    pub fn start_listener(self: &Arc<Self>) {
        let dispatcher = Arc::clone(self);
        thread::spawn(move || loop {
            let inner = Arc::clone(&dispatcher);
            let mut ctrl_pressed = false;
            let mut shift_pressed = false;
            let mut alt_pressed = false;

            let result = listen(move |event| match event.event_type {
                EventType::ButtonPress(button) => inner.on_pointer_event(button, true),
                EventType::ButtonRelease(button) => inner.on_pointer_event(button, false),
                EventType::KeyPress(key) => {
                    match key {
                        Key::ControlLeft | Key::ControlRight => ctrl_pressed = true,
                        Key::ShiftLeft | Key::ShiftRight => shift_pressed = true,
                        Key::Alt | Key::AltGr => alt_pressed = true,
                        _ => {}
                    }
                    if inner.quit_matches(key, ctrl_pressed, shift_pressed, alt_pressed) {
                        tracing::debug!("quit hotkey pressed");
                        if let Ok(mut flag) = inner.quit.lock() {
                            *flag = true;
                        }
                    }
                }
                EventType::KeyRelease(key) => match key {
                    Key::ControlLeft | Key::ControlRight => ctrl_pressed = false,
                    Key::ShiftLeft | Key::ShiftRight => shift_pressed = false,
                    Key::Alt | Key::AltGr => alt_pressed = false,
                    _ => {}
                },
                _ => {}
            });

            match result {
                Ok(()) => tracing::warn!("input listener exited unexpectedly. Restarting shortly"),
                Err(e) => tracing::warn!("input listener failed: {:?}. Retrying shortly", e),
            }

            thread::sleep(Duration::from_millis(500));
        });
    }
}
