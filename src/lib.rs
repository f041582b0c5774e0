pub mod capture;
pub mod compositor;
pub mod effect;
pub mod hotkey;
pub mod logging;
pub mod media;
pub mod playback;
pub mod settings;
pub mod surface;
pub mod trigger;
