//! Persistence for the single jAccount authentication cookie.
//!
//! The store keeps one `JAAuthCookie` value in a Netscape `cookies.txt`-style
//! file so a later run can resume the identity-provider session without an
//! interactive login. A missing or unreadable file is not an error; login
//! falls back to the interactive flow.

use std::path::{Path, PathBuf};

/// Name of the persisted identity-provider cookie.
pub const AUTH_COOKIE: &str = "JAAuthCookie";

const COOKIE_DOMAIN: &str = "jaccount.sjtu.edu.cn";
const HEADER: &str = "# Netscape HTTP Cookie File";

/// Loads and saves the persisted authentication cookie.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store backed by the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the persisted cookie value, or `None` if the file is missing
    /// or does not contain one.
    #[must_use]
    pub fn load(&self) -> Option<String> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        contents
            .lines()
            .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
            .filter_map(parse_line)
            .find(|(name, _)| name == AUTH_COOKIE)
            .map(|(_, value)| value)
    }

    /// Writes the cookie value, overwriting any prior one.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, value: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // Session cookie: no known expiry, so expiry field is 0.
        let line = format!("{COOKIE_DOMAIN}\tFALSE\t/\tTRUE\t0\t{AUTH_COOKIE}\t{value}");
        std::fs::write(&self.path, format!("{HEADER}\n{line}\n"))?;
        log::info!("cookie saved to {}", self.path.display());
        Ok(())
    }
}

/// Parses one `cookies.txt` line into `(name, value)`.
fn parse_line(line: &str) -> Option<(String, String)> {
    let mut fields = line.split('\t');
    let name = fields.nth(5)?;
    let value = fields.next()?;
    Some((name.to_string(), value.to_string()))
}
