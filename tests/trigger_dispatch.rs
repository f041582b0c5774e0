use clickjolt::capture::StaticScreen;
use clickjolt::effect::{EffectConfig, EffectRunner};
use clickjolt::media::MediaSelector;
use clickjolt::playback::{MockClockFactory, MockClockHandle};
use clickjolt::surface::{MockSurfaceFactory, MockSurfaceHandle};
use clickjolt::trigger::TriggerDispatcher;
use image::RgbaImage;
use rdev::Button;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn write_media(audio_dir: &Path, image_dir: &Path) {
    std::fs::create_dir_all(audio_dir).unwrap();
    std::fs::create_dir_all(image_dir).unwrap();
    std::fs::write(audio_dir.join("track.mp3"), b"mock").unwrap();
    RgbaImage::from_pixel(4, 4, image::Rgba([0, 255, 0, 255]))
        .save(image_dir.join("overlay.png"))
        .unwrap();
}

fn dispatcher_with_mocks(
    audio_dir: &Path,
    image_dir: &Path,
    active_polls: usize,
) -> (
    Arc<TriggerDispatcher>,
    Arc<EffectRunner>,
    MockClockHandle,
    MockSurfaceHandle,
) {
    let (clocks, clock_handle) = MockClockFactory::new(active_polls);
    let (surfaces, surface_handle) = MockSurfaceFactory::new();
    let config = EffectConfig {
        shake_amplitude: 4,
        frame_period: Duration::from_millis(1),
        max_overlay_ratio: 0.6,
        initial_delay: Duration::ZERO,
    };
    let runner = Arc::new(EffectRunner::with_backends(
        config,
        Arc::new(StaticScreen::solid(32, 32, [10, 20, 30, 255])),
        Arc::new(clocks),
        Arc::new(surfaces),
    ));
    let selector = MediaSelector::from_seed(audio_dir, image_dir, 1);
    let dispatcher = Arc::new(TriggerDispatcher::new(selector, Arc::clone(&runner), None));
    (dispatcher, runner, clock_handle, surface_handle)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn release_events_never_start_an_effect() {
    let tmp = tempfile::tempdir().unwrap();
    let audio = tmp.path().join("music");
    let image = tmp.path().join("photo");
    write_media(&audio, &image);
    let (dispatcher, runner, clock, surface) = dispatcher_with_mocks(&audio, &image, 5);

    for _ in 0..1000 {
        dispatcher.on_pointer_event(Button::Left, false);
    }
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(clock.created(), 0);
    assert_eq!(surface.opened(), 0);
    assert!(runner.is_idle());
}

#[test]
fn empty_audio_listing_drops_the_trigger() {
    let tmp = tempfile::tempdir().unwrap();
    let audio = tmp.path().join("music");
    let image = tmp.path().join("photo");
    std::fs::create_dir_all(&audio).unwrap();
    std::fs::create_dir_all(&image).unwrap();
    RgbaImage::from_pixel(4, 4, image::Rgba([0, 255, 0, 255]))
        .save(image.join("overlay.png"))
        .unwrap();
    let (dispatcher, runner, clock, surface) = dispatcher_with_mocks(&audio, &image, 5);

    dispatcher.on_pointer_event(Button::Left, true);
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(clock.created(), 0);
    assert_eq!(surface.opened(), 0);
    assert!(runner.is_idle());
}

#[test]
fn press_event_runs_an_effect_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let audio = tmp.path().join("music");
    let image = tmp.path().join("photo");
    write_media(&audio, &image);
    let (dispatcher, runner, clock, surface) = dispatcher_with_mocks(&audio, &image, 3);

    dispatcher.on_pointer_event(Button::Left, true);

    assert!(wait_until(Duration::from_secs(5), || {
        surface.presented() >= 3 && runner.is_idle()
    }));
    assert_eq!(surface.opened(), 1);
    assert_eq!(clock.created(), 1);
    assert!(clock.stopped() >= 1);
}

#[test]
fn quit_flag_starts_clear_and_resets_after_take() {
    let tmp = tempfile::tempdir().unwrap();
    let audio = tmp.path().join("music");
    let image = tmp.path().join("photo");
    write_media(&audio, &image);
    let (dispatcher, _runner, _clock, _surface) = dispatcher_with_mocks(&audio, &image, 1);

    assert!(!dispatcher.take_quit());
    assert!(!dispatcher.take_quit());
}
