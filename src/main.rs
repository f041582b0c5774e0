use clickjolt::effect::EffectRunner;
use clickjolt::media::MediaSelector;
use clickjolt::settings::Settings;
use clickjolt::trigger::TriggerDispatcher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SETTINGS_FILE: &str = "settings.json";

fn main() -> anyhow::Result<()> {
    let settings = Settings::load(SETTINGS_FILE)?;
    clickjolt::logging::init(settings.debug_logging, settings.log_file.clone());

    if !Path::new(&settings.audio_dir).is_dir() {
        tracing::warn!(
            "create a folder named '{}' and drop .mp3 files in it",
            settings.audio_dir
        );
    }
    if !Path::new(&settings.image_dir).is_dir() {
        tracing::warn!(
            "create a folder named '{}' and drop .png files in it",
            settings.image_dir
        );
    }

    let runner = Arc::new(EffectRunner::new(settings.effect_config()));
    let selector = MediaSelector::new(settings.audio_dir.as_str(), settings.image_dir.as_str());
    let dispatcher = Arc::new(TriggerDispatcher::new(
        selector,
        runner,
        settings.quit_hotkey(),
    ));
    dispatcher.start_listener();

    match settings.quit_hotkey.as_deref() {
        Some(hotkey) => tracing::info!("listening for clicks; press {hotkey} to quit"),
        None => tracing::info!("listening for clicks; interrupt the process to quit"),
    }

    loop {
        if dispatcher.take_quit() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    tracing::info!("exiting");
    Ok(())
}
