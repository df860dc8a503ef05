//! Incremental synchronization of one subject's course recordings.
//!
//! `refresh` re-fetches everything; `update` merges against a previous course
//! list so the slow media-resolution call is only issued for courses that are
//! new or still unresolved.

use std::collections::{BTreeMap, HashMap};

use reqwest::blocking::{Client, multipart};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::model::{Channel, Course, SubjectToken, TranscriptSegment};
use crate::wire::{self, Envelope};

const LIST_URL: &str =
    "https://v.sjtu.edu.cn/jy-application-canvas-sjtu/directOnDemandPlay/findVodVideoList";
const MEDIA_URL: &str =
    "https://v.sjtu.edu.cn/jy-application-canvas-sjtu/directOnDemandPlay/getVodVideoInfos";
const TRANSCRIPT_URL: &str =
    "https://v.sjtu.edu.cn/jy-application-canvas-sjtu/transfer/translate/detail";

/// Header name carrying the bearer token on every resource call.
const TOKEN_HEADER: &str = "token";

/// Transcript language key for the original (untranslated) text.
pub const DEFAULT_TRANSCRIPT_LANG: &str = "res";

/// Client for one subject's resources on the video platform.
///
/// Holds the subject-scoped bearer token; these endpoints do not use the
/// Canvas session cookies.
pub struct CourseClient {
    http: Client,
    token: String,
    canvas_subject_id: String,
}

impl CourseClient {
    /// Creates a client from a minted subject token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(token: &SubjectToken) -> Result<Self> {
        Ok(Self {
            http: Client::builder().build()?,
            token: token.access_token.clone(),
            canvas_subject_id: token.canvas_subject_id.clone(),
        })
    }

    /// Fetches the course list, leaving `download_urls` unresolved.
    ///
    /// A `code == -1` response or absent data means "no recordings yet" and
    /// yields an empty list, not an error.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or malformed records.
    pub fn fetch_course_list(&self) -> Result<Vec<Course>> {
        let payload = json!({ "canvasCourseId": wire::quote(&self.canvas_subject_id) });
        let res: Envelope<Value> = self
            .http
            .post(LIST_URL)
            .header(TOKEN_HEADER, &self.token)
            .json(&payload)
            .send()?
            .error_for_status()?
            .json()?;

        if res.code()? == -1 {
            return Ok(Vec::new());
        }
        let Some(data) = res.data else {
            return Ok(Vec::new());
        };

        data.get("records")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(course_from_record)
            .collect()
    }

    /// Full resync: fetch the course list and resolve media for every course.
    ///
    /// # Errors
    ///
    /// Fails on the first transport or shape error.
    pub fn refresh(&self) -> Result<Vec<Course>> {
        let mut courses = self.fetch_course_list()?;
        for course in &mut courses {
            course.download_urls = self.resolve_media(&course.media_ref)?;
        }
        Ok(courses)
    }

    /// Incremental resync: courses already carrying resolved media are copied
    /// forward without a media-resolution call.
    ///
    /// # Errors
    ///
    /// Fails on the first transport or shape error.
    pub fn update(&self, previous: Vec<Course>) -> Result<Vec<Course>> {
        let fresh = self.fetch_course_list()?;
        merge_courses(previous, fresh, |media_ref| self.resolve_media(media_ref))
    }

    /// Resolves the channel → URL mapping for one course's media.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or descriptors missing their fields.
    pub fn resolve_media(&self, media_ref: &str) -> Result<BTreeMap<Channel, String>> {
        let form = multipart::Form::new()
            .text("playTypeHls", "true")
            .text("isAudit", "true")
            .text("id", media_ref.to_string());
        let res: Envelope<Value> = self
            .http
            .post(MEDIA_URL)
            .header(TOKEN_HEADER, &self.token)
            .multipart(form)
            .send()?
            .error_for_status()?
            .json()?;

        let data = res
            .data
            .ok_or_else(|| Error::Shape("media response missing data".to_string()))?;
        let descriptors = data
            .get("videoPlayResponseVoList")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        classify_channels(descriptors)
    }

    /// Fetches the transcript segments for a course, in source order.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or segments missing their timestamps.
    pub fn resolve_transcripts(
        &self,
        course_id: i64,
        lang: &str,
    ) -> Result<Vec<TranscriptSegment>> {
        let payload = json!({ "courseId": course_id, "platform": 1 });
        let res: Envelope<Value> = self
            .http
            .post(TRANSCRIPT_URL)
            .header(TOKEN_HEADER, &self.token)
            .json(&payload)
            .send()?
            .error_for_status()?
            .json()?;

        let Some(data) = res.data else {
            return Ok(Vec::new());
        };
        data.get("originalList")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|item| segment_from_item(item, lang))
            .collect()
    }
}

/// Reconciles a previous course list against a fresh listing.
///
/// Rules: a previous course that already has resolved media is kept untouched
/// (fresh metadata discarded, no resolver call); a course that is new or
/// still unresolved gets `resolve` invoked on its media ref. Previous courses
/// absent from the fresh listing are retained. Previous ordering is kept, new
/// courses are appended in listing order.
pub fn merge_courses<F>(
    previous: Vec<Course>,
    fresh: Vec<Course>,
    mut resolve: F,
) -> Result<Vec<Course>>
where
    F: FnMut(&str) -> Result<BTreeMap<Channel, String>>,
{
    let mut merged = previous;
    let mut index: HashMap<i64, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, i))
        .collect();

    for mut course in fresh {
        match index.get(&course.id).copied() {
            Some(i) if merged[i].is_resolved() => {}
            Some(i) => {
                course.download_urls = resolve(&course.media_ref)?;
                merged[i] = course;
            }
            None => {
                course.download_urls = resolve(&course.media_ref)?;
                index.insert(course.id, merged.len());
                merged.push(course);
            }
        }
    }
    Ok(merged)
}

/// Maps media descriptors to channel keys.
///
/// The platform exposes no channel field; the stream whose view counter is
/// zero is the classroom camera (channel 0), the other the screen capture
/// (channel 1). This matches the live service and must not be "improved".
fn classify_channels(descriptors: &[Value]) -> Result<BTreeMap<Channel, String>> {
    let mut channels = BTreeMap::new();
    for descriptor in descriptors {
        let views = wire::int_field(descriptor, "cdviViewNum")?;
        let url = wire::string_field(descriptor, "rtmpUrlHdv")?;
        channels.insert(Channel::from(views != 0), url);
    }
    Ok(channels)
}

fn course_from_record(record: &Value) -> Result<Course> {
    Ok(Course {
        id: wire::int_field(record, "courId")?,
        name: wire::string_field(record, "videoName")?,
        start_time: record
            .get("courseBeginTime")
            .and_then(wire::as_string)
            .unwrap_or_default(),
        end_time: record
            .get("courseEndTime")
            .and_then(wire::as_string)
            .unwrap_or_default(),
        media_ref: wire::string_field(record, "videoId")?,
        download_urls: BTreeMap::new(),
    })
}

#[allow(clippy::cast_sign_loss)]
fn segment_from_item(item: &Value, lang: &str) -> Result<TranscriptSegment> {
    Ok(TranscriptSegment {
        start_ms: wire::int_field(item, "bg")?.max(0) as u64,
        end_ms: wire::int_field(item, "ed")?.max(0) as u64,
        text: item
            .get(lang)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn course(id: i64, resolved: bool) -> Course {
        let mut download_urls = BTreeMap::new();
        if resolved {
            download_urls.insert(0, format!("https://cdn/{id}_0.mp4"));
        }
        Course {
            id,
            name: format!("week {id}"),
            start_time: String::new(),
            end_time: String::new(),
            media_ref: format!("vid-{id}"),
            download_urls,
        }
    }

    #[test]
    fn merge_skips_resolution_for_fully_resolved_previous() {
        let previous = vec![course(1, true), course(2, true)];
        let fresh = vec![course(1, false), course(2, false)];
        let calls = Cell::new(0);

        let merged = merge_courses(previous.clone(), fresh, |_| {
            calls.set(calls.get() + 1);
            Ok(BTreeMap::new())
        })
        .unwrap();

        assert_eq!(calls.get(), 0);
        assert_eq!(merged, previous);
    }

    #[test]
    fn merge_with_empty_previous_resolves_everything() {
        let fresh = vec![course(1, false), course(2, false)];
        let calls = Cell::new(0);

        let merged = merge_courses(Vec::new(), fresh, |media_ref| {
            calls.set(calls.get() + 1);
            let mut urls = BTreeMap::new();
            urls.insert(0, format!("https://cdn/{media_ref}.mp4"));
            Ok(urls)
        })
        .unwrap();

        assert_eq!(calls.get(), 2);
        assert!(merged.iter().all(Course::is_resolved));
        assert_eq!(merged[0].download_urls[&0], "https://cdn/vid-1.mp4");
    }

    #[test]
    fn merge_retries_previously_unresolved_course() {
        // Course 2 failed to resolve last run (empty map); the fresh record
        // replaces it in place, at its original position.
        let previous = vec![course(1, true), course(2, false), course(3, true)];
        let mut fresh_2 = course(2, false);
        fresh_2.name = "week 2 (renamed)".to_string();
        let fresh = vec![course(1, false), fresh_2, course(3, false)];

        let merged = merge_courses(previous, fresh, |media_ref| {
            assert_eq!(media_ref, "vid-2");
            let mut urls = BTreeMap::new();
            urls.insert(0, "https://cdn/retry.mp4".to_string());
            Ok(urls)
        })
        .unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].name, "week 2 (renamed)");
        assert_eq!(merged[1].download_urls[&0], "https://cdn/retry.mp4");
    }

    #[test]
    fn merge_appends_new_courses_and_keeps_stale_ones() {
        let previous = vec![course(1, true)];
        let fresh = vec![course(2, false)];

        let merged = merge_courses(previous, fresh, |_| {
            let mut urls = BTreeMap::new();
            urls.insert(0, "https://cdn/new.mp4".to_string());
            Ok(urls)
        })
        .unwrap();

        // Stale course 1 retained, course 2 appended after it.
        assert_eq!(merged.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(merged[1].is_resolved());
    }

    #[test]
    fn merge_propagates_resolver_errors() {
        let fresh = vec![course(1, false)];
        let err = merge_courses(Vec::new(), fresh, |_| {
            Err(Error::Shape("boom".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn channel_classification_by_view_count() {
        let descriptors = vec![
            json!({"cdviViewNum": 0, "rtmpUrlHdv": "A"}),
            json!({"cdviViewNum": 5, "rtmpUrlHdv": "B"}),
        ];
        let channels = classify_channels(&descriptors).unwrap();
        assert_eq!(channels[&0], "A");
        assert_eq!(channels[&1], "B");
    }

    #[test]
    fn channel_classification_accepts_string_view_counts() {
        let descriptors = vec![json!({"cdviViewNum": "3", "rtmpUrlHdv": "B"})];
        let channels = classify_channels(&descriptors).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[&1], "B");
    }

    #[test]
    fn descriptor_missing_view_count_is_shape_error() {
        let descriptors = vec![json!({"rtmpUrlHdv": "A"})];
        assert!(matches!(
            classify_channels(&descriptors),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn course_record_coerces_loose_types() {
        let record = json!({
            "courId": "77",
            "videoName": "lecture 3",
            "courseBeginTime": "2025-03-10 10:00:00",
            "courseEndTime": null,
            "videoId": 123456
        });
        let course = course_from_record(&record).unwrap();
        assert_eq!(course.id, 77);
        assert_eq!(course.name, "lecture 3");
        assert_eq!(course.end_time, "");
        assert_eq!(course.media_ref, "123456");
        assert!(!course.is_resolved());
    }

    #[test]
    fn course_record_missing_id_is_shape_error() {
        let record = json!({"videoName": "x", "videoId": "v"});
        assert!(matches!(course_from_record(&record), Err(Error::Shape(_))));
    }

    #[test]
    fn segment_picks_requested_language() {
        let item = json!({"bg": 1500, "ed": 3000, "res": "原文", "en": "translated"});
        let seg = segment_from_item(&item, DEFAULT_TRANSCRIPT_LANG).unwrap();
        assert_eq!(seg.start_ms, 1500);
        assert_eq!(seg.end_ms, 3000);
        assert_eq!(seg.text, "原文");

        let seg = segment_from_item(&item, "en").unwrap();
        assert_eq!(seg.text, "translated");
    }

    #[test]
    fn segment_missing_language_defaults_to_empty_text() {
        let item = json!({"bg": 0, "ed": 10});
        let seg = segment_from_item(&item, DEFAULT_TRANSCRIPT_LANG).unwrap();
        assert_eq!(seg.text, "");
    }
}
