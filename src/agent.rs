//! Boundary to the external bulk-download agent (aria2c).
//!
//! The agent consumes `download.txt` from its working directory; the flag set
//! is fixed: 16 connections, 1 MiB chunks, no overwrite, conditional GET.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// Manifest file name inside the download directory.
pub const MANIFEST_FILE: &str = "download.txt";

/// Writes the manifest text into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be
/// written.
pub fn write_manifest(dir: &Path, text: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(MANIFEST_FILE);
    std::fs::write(&path, text)?;
    Ok(path)
}

/// Runs aria2c over the manifest in `dir` and waits for it to finish.
///
/// # Errors
///
/// Returns an error if the aria2c binary cannot be spawned.
pub fn run_aria2(dir: &Path) -> std::io::Result<ExitStatus> {
    let manifest = dir.join(MANIFEST_FILE);
    log::info!("invoking aria2c on {}", manifest.display());
    Command::new("aria2c")
        .args([
            "-x",
            "16",
            "-s",
            "16",
            "-k",
            "1M",
            "--auto-file-renaming=false",
            "--allow-overwrite=false",
            "--conditional-get=true",
        ])
        .arg("-d")
        .arg(dir)
        .arg("-i")
        .arg(&manifest)
        .status()
}
