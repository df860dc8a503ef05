//! Data model for subjects, courses, and the persisted snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Media channel key: 0 is the classroom camera, 1 the screen capture.
pub type Channel = u8;

/// The secondary (screen capture) channel.
pub const SCREEN_CHANNEL: Channel = 1;

/// Bearer credential scoped to one subject, minted by the token exchange.
///
/// Both fields come from a single successful exchange; modeling them as one
/// struct keeps them present together or absent together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectToken {
    /// Opaque bearer token, supplied as the `token` header on resource calls.
    pub access_token: String,
    /// Subject id in the video platform's own namespace.
    pub canvas_subject_id: String,
}

/// A top-level enrollment entity containing zero or more courses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    /// Present only after a successful token exchange for this subject.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub token: Option<SubjectToken>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub courses: Vec<Course>,
}

impl Subject {
    /// Creates an unauthorized subject with no courses.
    #[must_use]
    pub const fn new(id: i64, name: String) -> Self {
        Self {
            id,
            name,
            token: None,
            courses: Vec::new(),
        }
    }
}

/// One scheduled class session with associated media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    /// Opaque id used to resolve the media variants for this course.
    pub media_ref: String,
    /// Channel → download URL. Empty until resolved; an empty map is also how
    /// a previously failed resolution looks, so it is retried on update.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub download_urls: BTreeMap<Channel, String>,
}

impl Course {
    /// Returns `true` once media variants have been resolved for this course.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.download_urls.is_empty()
    }
}

/// One transcript line; times are milliseconds from the start of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Persisted resource snapshot, used to resume incremental updates without a
/// full resync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    /// Unix timestamp (seconds) of the last completed refresh.
    #[serde(default)]
    pub last_update_at: Option<i64>,
}

impl Snapshot {
    /// Loads a snapshot from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves the snapshot to a JSON file atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: i64, name: &str) -> Course {
        Course {
            id,
            name: name.to_string(),
            start_time: "2025-03-03 08:00:00".to_string(),
            end_time: "2025-03-03 09:40:00".to_string(),
            media_ref: format!("vid-{id}"),
            download_urls: BTreeMap::new(),
        }
    }

    #[test]
    fn subject_token_fields_are_flattened() {
        let mut subject = Subject::new(7, "Calculus".to_string());
        subject.token = Some(SubjectToken {
            access_token: "tok".to_string(),
            canvas_subject_id: "900".to_string(),
        });

        let json = serde_json::to_value(&subject).unwrap();
        assert_eq!(json["access_token"], "tok");
        assert_eq!(json["canvas_subject_id"], "900");
        assert!(json.get("token").is_none());
    }

    #[test]
    fn subject_without_token_omits_both_fields() {
        let json = serde_json::to_value(Subject::new(7, "Calculus".to_string())).unwrap();
        assert!(json.get("access_token").is_none());
        assert!(json.get("canvas_subject_id").is_none());
    }

    #[test]
    fn unresolved_course_omits_download_urls() {
        let json = serde_json::to_value(course(1, "wk1")).unwrap();
        assert!(json.get("download_urls").is_none());
    }

    #[test]
    fn resolved_course_round_trips_channel_keys() {
        let mut c = course(1, "wk1");
        c.download_urls.insert(0, "https://cdn/a.mp4".to_string());
        c.download_urls.insert(1, "https://cdn/b.mp4".to_string());
        assert!(c.is_resolved());

        let json = serde_json::to_string(&c).unwrap();
        let back: Course = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn snapshot_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state/subjects.json");

        let mut subject = Subject::new(42, "Physics".to_string());
        subject.token = Some(SubjectToken {
            access_token: "tok".to_string(),
            canvas_subject_id: "901".to_string(),
        });
        subject.courses.push(course(5, "wk2"));

        let snapshot = Snapshot {
            subjects: vec![subject],
            last_update_at: Some(1_756_000_000),
        };
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.subjects, snapshot.subjects);
        assert_eq!(loaded.last_update_at, Some(1_756_000_000));
        // No stray tmp file left behind
        assert!(!dir.path().join("state/subjects.json.tmp").exists());
    }

    #[test]
    fn snapshot_load_missing_file_is_io_error() {
        let err = Snapshot::load(Path::new("/nonexistent/subjects.json")).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
