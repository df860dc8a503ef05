//! Canvas subject listing and the LTI token exchange.
//!
//! Minting a bearer token for one subject reproduces what the browser does
//! when the "Classroom Video" external tool is opened: an LTI launch page
//! whose form is auto-submitted to the video platform, a second handshake
//! form, and a final redirect whose query string resolves to the token.

use reqwest::header::LOCATION;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::Session;
use crate::error::{Error, Result, TokenError};
use crate::model::{Subject, SubjectToken};
use crate::wire::{self, Envelope};

const FAVORITES_URL: &str = "https://oc.sjtu.edu.cn/api/v1/users/self/favorites/courses";
const TOKEN_URL: &str =
    "https://v.sjtu.edu.cn/jy-application-canvas-sjtu/lti3/getAccessTokenByTokenId";
/// Id of the "Classroom Video" external tool in Canvas.
const EXTERNAL_TOOL_ID: u32 = 8329;
const LOGIN_FORM_ID: &str = "login_form";

/// An auto-submit form extracted from a redirect page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectForm {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

/// Read-only view over an authenticated session for Canvas API calls.
pub struct Canvas<'s> {
    session: &'s Session,
}

impl<'s> Canvas<'s> {
    #[must_use]
    pub const fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Fetches the user's subjects from the Courses sidebar favorites.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or an unexpected response shape.
    pub fn subject_list(&self) -> Result<Vec<Subject>> {
        #[derive(Deserialize)]
        struct Favorite {
            id: i64,
            name: String,
        }

        let favorites: Vec<Favorite> = self
            .session
            .http()
            .get(FAVORITES_URL)
            .send()?
            .error_for_status()?
            .json()?;

        Ok(favorites
            .into_iter()
            .map(|f| Subject::new(f.id, f.name))
            .collect())
    }

    /// Walks the 3-hop redirect/form chain and mints a bearer token scoped to
    /// `subject_id`.
    ///
    /// # Errors
    ///
    /// Fails with [`TokenError::SessionExpired`] when the launch page serves a
    /// login form, [`TokenError::Rejected`] when the token endpoint answers
    /// with a non-zero code, and a shape error when any hop is missing its
    /// form or redirect location.
    pub fn acquire_token(&self, subject_id: i64) -> Result<SubjectToken> {
        let http = self.session.http();

        // Hop 1: LTI launch page
        let launch_url =
            format!("https://oc.sjtu.edu.cn/courses/{subject_id}/external_tools/{EXTERNAL_TOOL_ID}");
        let body = http.get(&launch_url).send()?.error_for_status()?.text()?;
        let form = parse_redirect_form(&body)?;

        // Hop 2: LTI → external-tool handshake
        let body = http
            .post(&form.action)
            .form(&form.fields)
            .send()?
            .error_for_status()?
            .text()?;
        let form = parse_redirect_form(&body)?;

        // Hop 3: submit without following the redirect; the token id lives in
        // the Location header's query string.
        let res = self
            .session
            .http_no_redirect()
            .post(&form.action)
            .form(&form.fields)
            .send()?
            .error_for_status()?;
        let location = res
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let query = location_query(location.as_deref())?;

        let res: Envelope<Value> = http
            .get(format!("{TOKEN_URL}?{query}"))
            .send()?
            .error_for_status()?
            .json()?;
        if res.code()? != 0 {
            let message = res.message.unwrap_or_else(|| "Unknown error".to_string());
            return Err(TokenError::Rejected(message).into());
        }
        let data = res
            .data
            .ok_or_else(|| Error::Shape("token response missing data".to_string()))?;

        let access_token = wire::string_field(&data, "token")?;
        let params = data
            .get("params")
            .ok_or_else(|| Error::Shape("token response missing params".to_string()))?;
        let canvas_subject_id = wire::string_field(params, "courId")?;

        log::debug!("acquired token for subject {subject_id}");
        Ok(SubjectToken {
            access_token,
            canvas_subject_id,
        })
    }
}

/// Extracts the query string from a redirect `Location` header value.
fn location_query(location: Option<&str>) -> Result<String> {
    let location =
        location.ok_or_else(|| Error::Shape("redirect response missing Location".to_string()))?;
    location
        .split_once('?')
        .map(|(_, query)| query.to_string())
        .ok_or_else(|| Error::Shape(format!("redirect location has no query: {location}")))
}

/// Parses the single auto-submit form out of a redirect page.
///
/// A page whose form is the identity provider's login form means the Canvas
/// session is gone; that is reported as [`TokenError::SessionExpired`] so the
/// caller can re-authenticate.
fn parse_redirect_form(html: &str) -> Result<RedirectForm> {
    let doc = Html::parse_document(html);
    let form_sel = Selector::parse("form").expect("valid selector");
    let input_sel = Selector::parse("input").expect("valid selector");

    let form: ElementRef<'_> = doc
        .select(&form_sel)
        .next()
        .ok_or_else(|| Error::Shape("redirect page contains no form".to_string()))?;
    if form.value().id() == Some(LOGIN_FORM_ID) {
        return Err(TokenError::SessionExpired.into());
    }

    let action = form
        .value()
        .attr("action")
        .ok_or_else(|| Error::Shape("redirect form has no action".to_string()))?
        .to_string();
    let fields = form
        .select(&input_sel)
        .filter_map(|input| {
            let input = input.value();
            let name = input.attr("name")?;
            Some((name.to_string(), input.attr("value").unwrap_or("").to_string()))
        })
        .collect();

    Ok(RedirectForm { action, fields })
}
