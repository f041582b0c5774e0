use crate::capture::{grayscale_base, PrimaryScreen, ScreenSource};
use crate::compositor::{load_overlay, sample_jitter, Compositor};
use crate::media::MediaPair;
use crate::playback::{ClockFactory, PlaybackClock, RodioClockFactory};
use crate::surface::{DefaultSurfaceFactory, PresentationSurface, SurfaceFactory};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Effect tunables, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy)]
pub struct EffectConfig {
    /// Maximum per-frame displacement in pixels.
    pub shake_amplitude: i32,
    /// Delay between rendered frames.
    pub frame_period: Duration,
    /// Overlay max size relative to the screen, in `(0, 1]`.
    pub max_overlay_ratio: f32,
    /// Delay between starting the audio and the first frame.
    pub initial_delay: Duration,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            shake_amplitude: 18,
            frame_period: Duration::from_millis(30),
            max_overlay_ratio: 0.6,
            initial_delay: Duration::from_millis(80),
        }
    }
}

/// Process-wide exclusivity token: at most one effect invocation holds it.
#[derive(Debug, Default)]
pub struct RunPermit {
    held: AtomicBool,
}

impl RunPermit {
    /// Non-blocking acquire. Returns `None` while another invocation holds
    /// the permit; never waits.
    pub fn try_acquire(&self) -> Option<PermitGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| PermitGuard { permit: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the permit on drop, which covers every exit path of an attempt.
pub struct PermitGuard<'a> {
    permit: &'a RunPermit,
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        self.permit.held.store(false, Ordering::Release);
    }
}

/// Orchestrates one effect invocation end to end: permit, audio, capture,
/// compositing, surface, render loop, teardown.
pub struct EffectRunner {
    permit: RunPermit,
    config: EffectConfig,
    screen: Arc<dyn ScreenSource>,
    clocks: Arc<dyn ClockFactory>,
    surfaces: Arc<dyn SurfaceFactory>,
}

impl EffectRunner {
    pub fn new(config: EffectConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(PrimaryScreen),
            Arc::new(RodioClockFactory),
            Arc::new(DefaultSurfaceFactory),
        )
    }

    pub fn with_backends(
        config: EffectConfig,
        screen: Arc<dyn ScreenSource>,
        clocks: Arc<dyn ClockFactory>,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> Self {
        Self {
            permit: RunPermit::default(),
            config,
            screen,
            clocks,
            surfaces,
        }
    }

    /// Whether no invocation currently holds the run permit.
    pub fn is_idle(&self) -> bool {
        !self.permit.is_held()
    }

    /// Run one effect invocation. Safe to call concurrently with itself:
    /// while an invocation is active, every further call returns
    /// immediately with no side effects. Failures are contained and logged
    /// here; nothing propagates to the caller.
    pub fn attempt(&self, pair: MediaPair) {
        let Some(_guard) = self.permit.try_acquire() else {
            tracing::debug!("effect already running; ignoring trigger");
            return;
        };
        if let Err(err) = self.run_once(&pair) {
            tracing::error!(
                ?err,
                audio = %pair.audio.display(),
                image = %pair.image.display(),
                "effect attempt aborted"
            );
        }
    }

    fn run_once(&self, pair: &MediaPair) -> anyhow::Result<()> {
        let mut clock = self.clocks.create()?;
        clock.load(&pair.audio)?;

        let capture = self.screen.capture()?;
        let overlay = load_overlay(&pair.image)?;
        let mut compositor = Compositor::new(
            grayscale_base(&capture),
            overlay,
            self.config.max_overlay_ratio,
        );

        let mut surface = self.surfaces.create();
        let result = self.run_presentation(&mut compositor, clock.as_mut(), surface.as_mut());
        // The clock is silenced before any presentation error is reported,
        // and the surface is torn down before the permit frees.
        clock.stop();
        surface.close();
        result
    }

    fn run_presentation(
        &self,
        compositor: &mut Compositor,
        clock: &mut dyn PlaybackClock,
        surface: &mut dyn PresentationSurface,
    ) -> anyhow::Result<()> {
        let (width, height) = compositor.dimensions();
        surface.open(width, height)?;

        clock.play();
        // Avoids a visible flash before the audio is audible.
        std::thread::sleep(self.config.initial_delay);

        let mut rng = StdRng::from_entropy();
        while clock.is_active() {
            if !surface.is_open() {
                // Escape inside the surface, or the window died underneath us.
                break;
            }
            let jitter = sample_jitter(&mut rng, self.config.shake_amplitude);
            let frame = compositor.compose(jitter);
            surface.present(frame)?;
            std::thread::sleep(self.config.frame_period);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[test]
    fn permit_is_exclusive_under_contention() {
        let permit = Arc::new(RunPermit::default());
        let barrier = Arc::new(Barrier::new(8));
        let acquired = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let permit = Arc::clone(&permit);
                let barrier = Arc::clone(&barrier);
                let acquired = Arc::clone(&acquired);
                std::thread::spawn(move || {
                    barrier.wait();
                    if let Some(_guard) = permit.try_acquire() {
                        acquired.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(50));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert!(!permit.is_held());
    }

    #[test]
    fn dropping_the_guard_frees_the_permit() {
        let permit = RunPermit::default();
        let guard = permit.try_acquire().expect("first acquire succeeds");
        assert!(permit.is_held());
        assert!(permit.try_acquire().is_none());

        drop(guard);
        assert!(!permit.is_held());
        assert!(permit.try_acquire().is_some());
    }
}
