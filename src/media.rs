use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Extensions accepted in the audio directory.
pub const AUDIO_EXTS: &[&str] = &["mp3"];
/// Extensions accepted in the image directory.
pub const IMAGE_EXTS: &[&str] = &["png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Image,
}

impl MediaKind {
    fn exts(self) -> &'static [&'static str] {
        match self {
            MediaKind::Audio => AUDIO_EXTS,
            MediaKind::Image => IMAGE_EXTS,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio (.mp3)"),
            MediaKind::Image => write!(f, "image (.png)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no {kind} files found in {}", dir.display())]
    EmptyListing { kind: MediaKind, dir: PathBuf },
}

/// The audio track and overlay image chosen for one effect invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPair {
    pub audio: PathBuf,
    pub image: PathBuf,
}

/// Picks random media files from the configured directories.
pub struct MediaSelector {
    audio_dir: PathBuf,
    image_dir: PathBuf,
    rng: Mutex<StdRng>,
}

impl MediaSelector {
    /// Create a new selector using randomness from the operating system.
    pub fn new(audio_dir: impl Into<PathBuf>, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            image_dir: image_dir.into(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a selector with a fixed seed (useful for deterministic tests).
    pub fn from_seed(
        audio_dir: impl Into<PathBuf>,
        image_dir: impl Into<PathBuf>,
        seed: u64,
    ) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            image_dir: image_dir.into(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Resolve one media pair. Fails with the first empty listing, naming
    /// the missing category.
    pub fn select(&self) -> Result<MediaPair, SelectError> {
        let mut rng = self.rng.lock().unwrap();
        let audio = pick_random_file(&self.audio_dir, MediaKind::Audio, &mut *rng)?;
        let image = pick_random_file(&self.image_dir, MediaKind::Image, &mut *rng)?;
        Ok(MediaPair { audio, image })
    }
}

/// List `dir` filtered to the extensions of `kind` and pick one entry
/// uniformly. A missing or unreadable directory behaves as an empty listing.
fn pick_random_file(
    dir: &Path,
    kind: MediaKind,
    rng: &mut impl Rng,
) -> Result<PathBuf, SelectError> {
    let files = list_media_files(dir, kind.exts());
    if files.is_empty() {
        return Err(SelectError::EmptyListing {
            kind,
            dir: dir.to_path_buf(),
        });
    }
    Ok(files[rng.gen_range(0..files.len())].clone())
}

fn list_media_files(dir: &Path, exts: &[&str]) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| exts.iter().any(|e| ext.eq_ignore_ascii_case(e)))
                    .unwrap_or(false)
        })
        .collect();
    // Directory iteration order is platform dependent; sort so a seeded rng
    // picks the same file everywhere.
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn missing_directory_is_an_empty_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let selector = MediaSelector::from_seed(
            tmp.path().join("nope"),
            tmp.path().join("also-nope"),
            0,
        );
        let err = selector.select().unwrap_err();
        assert!(matches!(
            err,
            SelectError::EmptyListing {
                kind: MediaKind::Audio,
                ..
            }
        ));
    }

    #[test]
    fn listing_filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "track.mp3");
        touch(tmp.path(), "TRACK2.MP3");
        touch(tmp.path(), "readme.txt");
        touch(tmp.path(), "cover.png");

        let files = list_media_files(tmp.path(), AUDIO_EXTS);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("mp3"))
                .unwrap_or(false)
        }));
    }

    #[test]
    fn empty_image_listing_names_the_image_category() {
        let tmp = tempfile::tempdir().unwrap();
        let audio = tmp.path().join("music");
        let image = tmp.path().join("photo");
        fs::create_dir_all(&audio).unwrap();
        fs::create_dir_all(&image).unwrap();
        touch(&audio, "track.mp3");

        let selector = MediaSelector::from_seed(&audio, &image, 0);
        let err = selector.select().unwrap_err();
        match err {
            SelectError::EmptyListing { kind, dir } => {
                assert_eq!(kind, MediaKind::Image);
                assert_eq!(dir, image);
            }
        }
    }

    #[test]
    fn seeded_selection_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let audio = tmp.path().join("music");
        let image = tmp.path().join("photo");
        fs::create_dir_all(&audio).unwrap();
        fs::create_dir_all(&image).unwrap();
        for i in 0..5 {
            touch(&audio, &format!("track{i}.mp3"));
            touch(&image, &format!("pic{i}.png"));
        }

        let a = MediaSelector::from_seed(&audio, &image, 7).select().unwrap();
        let b = MediaSelector::from_seed(&audio, &image, 7).select().unwrap();
        assert_eq!(a, b);
    }
}
