//! canvas-vod - A library for synchronizing classroom recordings from the
//! SJTU Canvas video platform.
//!
//! The crate authenticates against the jAccount identity provider, exchanges
//! the Canvas session for per-subject bearer tokens, incrementally syncs the
//! course tree, and builds an aria2c manifest plus SRT subtitle files for
//! bulk download.
//!
//! # Example
//!
//! ```no_run
//! use canvas_vod::{CredentialStore, Manager, SyncConfig, auth, manifest};
//!
//! # struct Prompts;
//! # impl canvas_vod::Operator for Prompts {
//! #     fn username(&mut self, _: Option<&str>) -> std::io::Result<String> { Ok(String::new()) }
//! #     fn password(&mut self) -> std::io::Result<String> { Ok(String::new()) }
//! #     fn captcha(&mut self, _: &[u8]) -> std::io::Result<String> { Ok(String::new()) }
//! # }
//! # fn example() -> canvas_vod::Result<()> {
//! let store = CredentialStore::new("cookies.txt");
//! let mut prompts = Prompts;
//! let session = auth::authenticate(auth::CLIENT_URL, &store, &mut prompts)?;
//!
//! let mut manager = Manager::new();
//! manager.authorize(&session)?;
//! manager.refresh();
//!
//! let selection = manifest::select_all(&manager.subjects);
//! let dir = std::path::Path::new("videos");
//! manager.download(&selection, dir, &SyncConfig::default())?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod agent;
pub mod auth;
pub mod canvas;
pub mod config;
pub mod cookies;
pub mod error;
pub mod manager;
pub mod manifest;
pub mod model;
pub mod sync;
pub mod wire;

// Re-export main types for convenience
pub use auth::{Operator, Session};
pub use canvas::Canvas;
pub use config::{AppConfig, PathConfig, SyncConfig};
pub use cookies::{AUTH_COOKIE, CredentialStore};
pub use error::{AuthError, Error, Result, TokenError};
pub use manager::Manager;
pub use manifest::{DownloadJob, Selection};
pub use model::{Channel, Course, Snapshot, Subject, SubjectToken, TranscriptSegment};
pub use sync::CourseClient;
