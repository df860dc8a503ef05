//! Download manifest building and subtitle rendering.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{SCREEN_CHANNEL, Subject, TranscriptSegment};

/// Subject id → selected course ids.
pub type Selection = BTreeMap<i64, BTreeSet<i64>>;

/// One (URL, output path) pair consumed by the download agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub output_path: String,
}

/// Selects every course of every subject.
#[must_use]
pub fn select_all(subjects: &[Subject]) -> Selection {
    subjects
        .iter()
        .map(|s| (s.id, s.courses.iter().map(|c| c.id).collect()))
        .collect()
}

/// Builds the deduplicated job list for the selected courses.
///
/// Channel 1 (screen capture) is skipped unless `include_screen` is set.
/// Selection entries that reference unknown subjects or courses are skipped
/// with a warning. Two same-named courses within one subject produce
/// colliding output paths; that collision is kept as-is.
#[must_use]
pub fn build_manifest(
    selection: &Selection,
    subjects: &[Subject],
    include_screen: bool,
) -> Vec<DownloadJob> {
    let mut jobs = Vec::new();
    for (subject_id, course_ids) in selection {
        let Some(subject) = subjects.iter().find(|s| s.id == *subject_id) else {
            log::warn!("selection references unknown subject {subject_id}");
            continue;
        };
        for course_id in course_ids {
            let Some(course) = subject.courses.iter().find(|c| c.id == *course_id) else {
                log::warn!(
                    "selection references unknown course {course_id} in `{}`",
                    subject.name
                );
                continue;
            };
            for (channel, url) in &course.download_urls {
                if !include_screen && *channel == SCREEN_CHANNEL {
                    continue;
                }
                let ext = file_extension(url);
                jobs.push(DownloadJob {
                    url: url.clone(),
                    output_path: format!("{}/{}_{channel}.{ext}", subject.name, course.name),
                });
            }
        }
    }
    jobs
}

/// Renders the job list in the agent's two-line record format, blank-line
/// separated.
#[must_use]
pub fn manifest_text(jobs: &[DownloadJob]) -> String {
    jobs.iter()
        .map(|job| format!("{}\n  out={}\n", job.url, job.output_path))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Derives a file extension from the URL path component before any query
/// string: split on `.`, take the last segment.
#[must_use]
pub fn file_extension(url: &str) -> &str {
    let path = url.split('?').next().unwrap_or(url);
    path.split('.').next_back().unwrap_or(path)
}

/// Formats a millisecond count as `HH:MM:SS,mmm`. Hours are not clamped.
#[must_use]
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Renders transcript segments as SRT text: 1-based sequential index, a
/// timestamp pair per segment, text with embedded newlines collapsed to
/// spaces. Segments are blank-line separated with no trailing blank line.
#[must_use]
pub fn render_subtitles(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for (idx, segment) in segments.iter().enumerate() {
        let text = segment.text.replace('\n', " ");
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            idx + 1,
            format_timestamp(segment.start_ms),
            format_timestamp(segment.end_ms),
            text.trim(),
        ));
    }
    out.trim().to_string()
}
