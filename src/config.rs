//! Configuration types for sync and download runs.

use std::path::PathBuf;

/// Options controlling what gets synchronized and downloaded.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether channel 1 (screen capture) jobs are included in the manifest.
    pub include_screen: bool,
    /// Transcript language key requested from the platform.
    pub transcript_lang: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            include_screen: false,
            transcript_lang: crate::sync::DEFAULT_TRANSCRIPT_LANG.to_string(),
        }
    }
}

impl SyncConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether screen-capture jobs are included.
    #[must_use]
    pub const fn with_include_screen(mut self, include: bool) -> Self {
        self.include_screen = include;
        self
    }

    /// Sets the transcript language key.
    #[must_use]
    pub fn with_transcript_lang(mut self, lang: impl Into<String>) -> Self {
        self.transcript_lang = lang.into();
        self
    }
}

/// Path configuration for downloads and persisted state.
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Directory where the manifest, videos, and subtitles land.
    pub download_dir: PathBuf,
    /// File holding the persisted authentication cookie.
    pub cookie_path: PathBuf,
    /// File holding the resource snapshot between runs.
    pub snapshot_path: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("canvas-vod");

        Self {
            download_dir: PathBuf::from("."),
            cookie_path: data_dir.join("cookies.txt"),
            snapshot_path: data_dir.join("subjects.json"),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
