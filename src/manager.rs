//! Orchestration across subjects: snapshot lifecycle, token minting,
//! incremental refresh, and the download driver.
//!
//! One subject failing to sync does not abort the run; the failure is logged
//! and the remaining subjects proceed.

use std::path::Path;

use chrono::Utc;

use crate::agent;
use crate::auth::Session;
use crate::canvas::Canvas;
use crate::config::SyncConfig;
use crate::error::{Error, Result, TokenError};
use crate::manifest::{self, Selection};
use crate::model::{Snapshot, Subject};
use crate::sync::CourseClient;

/// Holds the subject tree between authentication and download.
#[derive(Debug, Default)]
pub struct Manager {
    pub subjects: Vec<Subject>,
    pub last_update_at: Option<i64>,
}

impl Manager {
    /// Creates an empty manager with no known subjects.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager from a previously saved snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            subjects: snapshot.subjects,
            last_update_at: snapshot.last_update_at,
        }
    }

    /// Loads a manager from a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_snapshot(Snapshot::load(path)?))
    }

    /// Saves the current state to a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        Snapshot {
            subjects: self.subjects.clone(),
            last_update_at: self.last_update_at,
        }
        .save(path)
    }

    /// Rebuilds the subject list from Canvas and mints a bearer token per
    /// subject.
    ///
    /// Courses already known from a previous run are carried forward by
    /// subject id so the next [`refresh`](Self::refresh) can skip resolved
    /// ones. A rejected token exchange is logged and leaves that subject
    /// unauthorized; an expired Canvas session aborts, since every remaining
    /// exchange would fail the same way.
    ///
    /// # Errors
    ///
    /// Fails on transport errors and on [`TokenError::SessionExpired`].
    pub fn authorize(&mut self, session: &Session) -> Result<()> {
        let canvas = Canvas::new(session);
        let mut fresh = canvas.subject_list()?;
        log::info!("{} subject(s) listed", fresh.len());

        for subject in &mut fresh {
            if let Some(previous) = self.subjects.iter().find(|s| s.id == subject.id) {
                subject.courses = previous.courses.clone();
            }
            match canvas.acquire_token(subject.id) {
                Ok(token) => subject.token = Some(token),
                Err(err @ Error::Token(TokenError::SessionExpired)) => return Err(err),
                Err(err) => {
                    log::error!("token exchange failed for `{}`: {err}", subject.name);
                }
            }
        }
        self.subjects = fresh;
        Ok(())
    }

    /// Incrementally refreshes every authorized subject's course list.
    ///
    /// Returns the number of subjects that failed; their previous course
    /// lists are left untouched.
    pub fn refresh(&mut self) -> usize {
        let mut failures = 0;
        for subject in &mut self.subjects {
            let Some(token) = &subject.token else {
                log::warn!("skipping `{}`: no access token", subject.name);
                failures += 1;
                continue;
            };
            match CourseClient::new(token).and_then(|client| client.update(subject.courses.clone()))
            {
                Ok(courses) => {
                    log::info!("`{}`: {} course(s)", subject.name, courses.len());
                    subject.courses = courses;
                }
                Err(err) => {
                    log::error!("sync failed for `{}`: {err}", subject.name);
                    failures += 1;
                }
            }
        }
        self.last_update_at = Some(Utc::now().timestamp());
        failures
    }

    /// Builds the manifest and subtitle files for `selection` under `dir`,
    /// then hands the manifest to the download agent.
    ///
    /// # Errors
    ///
    /// Fails if the manifest or a subject directory cannot be written, or if
    /// the agent cannot be spawned. Per-course transcript failures are logged
    /// and skipped.
    pub fn download(&self, selection: &Selection, dir: &Path, config: &SyncConfig) -> Result<()> {
        let jobs = manifest::build_manifest(selection, &self.subjects, config.include_screen);
        agent::write_manifest(dir, &manifest::manifest_text(&jobs))?;
        log::info!("{} download job(s) queued", jobs.len());

        self.write_subtitles(selection, dir, &config.transcript_lang)?;

        let status = agent::run_aria2(dir)?;
        if !status.success() {
            log::warn!("aria2c exited with {status}");
        }
        Ok(())
    }

    /// Fetches transcripts for every selected course and writes one
    /// `{subject}/{course}_0.srt` per course.
    fn write_subtitles(&self, selection: &Selection, dir: &Path, lang: &str) -> Result<()> {
        for (subject_id, course_ids) in selection {
            let Some(subject) = self.subjects.iter().find(|s| s.id == *subject_id) else {
                continue;
            };
            let Some(token) = &subject.token else {
                log::warn!("skipping transcripts for `{}`: no access token", subject.name);
                continue;
            };
            let client = CourseClient::new(token)?;
            let subject_dir = dir.join(&subject.name);
            std::fs::create_dir_all(&subject_dir)?;

            for course_id in course_ids {
                let Some(course) = subject.courses.iter().find(|c| c.id == *course_id) else {
                    continue;
                };
                match client.resolve_transcripts(course.id, lang) {
                    Ok(segments) => {
                        let srt = manifest::render_subtitles(&segments);
                        std::fs::write(subject_dir.join(format!("{}_0.srt", course.name)), srt)?;
                    }
                    Err(err) => {
                        log::error!("transcript fetch failed for `{}`: {err}", course.name);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubjectToken;

    #[test]
    fn snapshot_round_trip_through_manager() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("subjects.json");

        let mut manager = Manager::new();
        let mut subject = Subject::new(1, "Calculus".to_string());
        subject.token = Some(SubjectToken {
            access_token: "tok".to_string(),
            canvas_subject_id: "900".to_string(),
        });
        manager.subjects.push(subject);
        manager.last_update_at = Some(1_756_000_000);
        manager.save(&path).unwrap();

        let loaded = Manager::load(&path).unwrap();
        assert_eq!(loaded.subjects, manager.subjects);
        assert_eq!(loaded.last_update_at, Some(1_756_000_000));
    }

    #[test]
    fn load_missing_snapshot_is_an_error() {
        assert!(Manager::load(Path::new("/nonexistent/subjects.json")).is_err());
    }

    #[test]
    fn new_manager_is_empty() {
        let manager = Manager::new();
        assert!(manager.subjects.is_empty());
        assert!(manager.last_update_at.is_none());
    }
}
