use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("failed to load audio track {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
}

/// Lifecycle of one invocation's audio. `Loaded` and `Stopped` are terminal
/// for the invocation; there is no replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Loaded,
    Playing,
    Stopped,
}

/// Owns audio decode and playback for one effect invocation. `is_active` is
/// the sole oracle the render loop uses to decide whether to keep going.
pub trait PlaybackClock {
    fn load(&mut self, path: &Path) -> Result<(), PlaybackError>;
    fn play(&mut self);
    /// Safe to call multiple times, from both the shutdown and the
    /// cancellation path.
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    fn state(&self) -> PlaybackState;
}

/// Creates a playback clock per effect invocation. Creation itself can fail
/// when no audio output device is available.
pub trait ClockFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn PlaybackClock>, PlaybackError>;
}

/// Plays through the default system output via rodio.
pub struct RodioClock {
    // The stream must stay alive for the sink to keep playing.
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    state: PlaybackState,
}

impl RodioClock {
    pub fn new() -> Result<Self, PlaybackError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| PlaybackError::Output(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            state: PlaybackState::Stopped,
        })
    }
}

impl PlaybackClock for RodioClock {
    fn load(&mut self, path: &Path) -> Result<(), PlaybackError> {
        let load_err = |reason: String| PlaybackError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| load_err(e.to_string()))?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| load_err(e.to_string()))?;
        let sink = Sink::try_new(&self.handle).map_err(|e| PlaybackError::Output(e.to_string()))?;
        sink.pause();
        sink.append(source);
        self.sink = Some(sink);
        self.state = PlaybackState::Loaded;
        Ok(())
    }

    fn play(&mut self) {
        if self.state != PlaybackState::Loaded {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.play();
            self.state = PlaybackState::Playing;
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        self.state = PlaybackState::Stopped;
    }

    fn is_active(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    fn state(&self) -> PlaybackState {
        match self.state {
            // The sink drains on its own when the track ends.
            PlaybackState::Playing if self.sink.as_ref().map_or(true, |s| s.empty()) => {
                PlaybackState::Stopped
            }
            state => state,
        }
    }
}

pub struct RodioClockFactory;

impl ClockFactory for RodioClockFactory {
    fn create(&self) -> Result<Box<dyn PlaybackClock>, PlaybackError> {
        Ok(Box::new(RodioClock::new()?))
    }
}

#[derive(Default)]
struct MockClockState {
    created: AtomicUsize,
    loaded: AtomicUsize,
    played: AtomicUsize,
    stopped: AtomicUsize,
    active_polls: AtomicUsize,
    fail_create: AtomicBool,
    fail_load: AtomicBool,
}

/// Deterministic clock for tests: reports itself active for a fixed number
/// of `is_active` polls after `play`, then stops.
pub struct MockClock {
    state: Arc<MockClockState>,
    local: PlaybackState,
}

impl PlaybackClock for MockClock {
    fn load(&mut self, path: &Path) -> Result<(), PlaybackError> {
        if self.state.fail_load.load(Ordering::SeqCst) {
            return Err(PlaybackError::Load {
                path: path.to_path_buf(),
                reason: "mock load failure".into(),
            });
        }
        self.state.loaded.fetch_add(1, Ordering::SeqCst);
        self.local = PlaybackState::Loaded;
        Ok(())
    }

    fn play(&mut self) {
        if self.local == PlaybackState::Loaded {
            self.state.played.fetch_add(1, Ordering::SeqCst);
            self.local = PlaybackState::Playing;
        }
    }

    fn stop(&mut self) {
        self.state.stopped.fetch_add(1, Ordering::SeqCst);
        self.state.active_polls.store(0, Ordering::SeqCst);
        self.local = PlaybackState::Stopped;
    }

    fn is_active(&self) -> bool {
        if self.local != PlaybackState::Playing {
            return false;
        }
        self.state
            .active_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn state(&self) -> PlaybackState {
        match self.local {
            PlaybackState::Playing
                if self.state.active_polls.load(Ordering::SeqCst) == 0 =>
            {
                PlaybackState::Stopped
            }
            state => state,
        }
    }
}

pub struct MockClockFactory {
    state: Arc<MockClockState>,
}

pub struct MockClockHandle {
    state: Arc<MockClockState>,
}

impl MockClockFactory {
    /// `active_polls` is how many times `is_active` reports true after
    /// `play` before the clock drains.
    pub fn new(active_polls: usize) -> (Self, MockClockHandle) {
        let state = Arc::new(MockClockState {
            active_polls: AtomicUsize::new(active_polls),
            ..Default::default()
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            MockClockHandle { state },
        )
    }
}

impl ClockFactory for MockClockFactory {
    fn create(&self) -> Result<Box<dyn PlaybackClock>, PlaybackError> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(PlaybackError::Output("mock output unavailable".into()));
        }
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockClock {
            state: Arc::clone(&self.state),
            local: PlaybackState::Stopped,
        }))
    }
}

impl MockClockHandle {
    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn loaded(&self) -> usize {
        self.state.loaded.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> usize {
        self.state.played.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.state.stopped.load(Ordering::SeqCst)
    }

    pub fn remaining_polls(&self) -> usize {
        self.state.active_polls.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self) {
        self.state.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_load(&self) {
        self.state.fail_load.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_counts_polls_and_stops() {
        let (factory, handle) = MockClockFactory::new(3);
        let mut clock = factory.create().unwrap();
        clock.load(Path::new("track.mp3")).unwrap();
        assert_eq!(clock.state(), PlaybackState::Loaded);
        assert!(!clock.is_active());

        clock.play();
        assert_eq!(clock.state(), PlaybackState::Playing);
        assert!(clock.is_active());
        assert!(clock.is_active());
        assert!(clock.is_active());
        assert!(!clock.is_active());
        assert_eq!(clock.state(), PlaybackState::Stopped);
        assert_eq!(handle.played(), 1);
    }

    #[test]
    fn mock_stop_is_idempotent_and_terminal() {
        let (factory, handle) = MockClockFactory::new(100);
        let mut clock = factory.create().unwrap();
        clock.load(Path::new("track.mp3")).unwrap();
        clock.play();
        assert!(clock.is_active());

        clock.stop();
        clock.stop();
        assert!(!clock.is_active());
        assert_eq!(clock.state(), PlaybackState::Stopped);
        assert_eq!(handle.stopped(), 2);

        // no replay after stop
        clock.play();
        assert!(!clock.is_active());
    }
}
