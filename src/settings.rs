use crate::effect::EffectConfig;
use crate::hotkey::{parse_hotkey, Hotkey};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Directory scanned for audio tracks.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
    /// Directory scanned for overlay images.
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    /// Maximum per-frame displacement of the shaken frame, in pixels.
    #[serde(default = "default_shake_amplitude")]
    pub shake_amplitude: i32,
    /// Delay between rendered frames in milliseconds.
    #[serde(default = "default_frame_period_ms")]
    pub frame_period_ms: u64,
    /// Overlay max size relative to the screen, in `(0, 1]`.
    #[serde(default = "default_max_overlay_ratio")]
    pub max_overlay_ratio: f32,
    /// Delay before the first frame so the window never flashes ahead of the
    /// audio, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// When enabled the application initialises the logger at debug level.
    /// Defaults to `false` when the field is missing in the settings file.
    #[serde(default)]
    pub debug_logging: bool,
    /// Optional log file. If `None`, logs go to stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Global hotkey that exits the listener. If `None`, only an external
    /// interrupt stops the process.
    #[serde(default = "default_quit_hotkey")]
    pub quit_hotkey: Option<String>,
}

fn default_audio_dir() -> String {
    "music".into()
}

fn default_image_dir() -> String {
    "photo".into()
}

fn default_shake_amplitude() -> i32 {
    18
}

fn default_frame_period_ms() -> u64 {
    30
}

fn default_max_overlay_ratio() -> f32 {
    0.6
}

fn default_initial_delay_ms() -> u64 {
    80
}

fn default_quit_hotkey() -> Option<String> {
    Some("Ctrl+Shift+Q".into())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            image_dir: default_image_dir(),
            shake_amplitude: default_shake_amplitude(),
            frame_period_ms: default_frame_period_ms(),
            max_overlay_ratio: default_max_overlay_ratio(),
            initial_delay_ms: default_initial_delay_ms(),
            debug_logging: false,
            log_file: None,
            quit_hotkey: default_quit_hotkey(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn quit_hotkey(&self) -> Option<Hotkey> {
        if let Some(hotkey) = &self.quit_hotkey {
            match parse_hotkey(hotkey) {
                Some(k) => return Some(k),
                None => {
                    tracing::warn!(
                        "provided quit_hotkey string '{}' is invalid; ignoring",
                        hotkey
                    );
                }
            }
        }
        None
    }

    /// Effect tunables with out-of-range values clamped.
    pub fn effect_config(&self) -> EffectConfig {
        let mut amplitude = self.shake_amplitude;
        if amplitude < 0 {
            tracing::warn!(
                "shake_amplitude {} is negative; using 0",
                self.shake_amplitude
            );
            amplitude = 0;
        }
        let mut ratio = self.max_overlay_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            tracing::warn!(
                "max_overlay_ratio {} is outside (0, 1]; using {}",
                self.max_overlay_ratio,
                default_max_overlay_ratio()
            );
            ratio = default_max_overlay_ratio();
        }
        EffectConfig {
            shake_amplitude: amplitude,
            frame_period: Duration::from_millis(self.frame_period_ms.max(1)),
            max_overlay_ratio: ratio,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
        }
    }
}
