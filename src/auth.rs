//! jAccount SSO authentication.
//!
//! Login follows an explicit outcome-driven loop: probe the client URL with
//! any saved cookie, and if the identity provider answers with its challenge
//! page, run the interactive credential/captcha exchange until it either
//! succeeds or fails with a non-retryable error. Only credential and captcha
//! mismatches are retried; transport errors abort immediately.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::cookie::Jar;
use reqwest::header::REFERER;
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use crate::cookies::{AUTH_COOKIE, CredentialStore};
use crate::error::{AuthError, Error, Result};
use crate::wire;

/// Client URL whose authentication establishes the Canvas session.
pub const CLIENT_URL: &str = "https://oc.sjtu.edu.cn/login/openid_connect";

const IDP_HOST: &str = "jaccount.sjtu.edu.cn";
const IDP_ORIGIN: &str = "https://jaccount.sjtu.edu.cn/";
const CAPTCHA_URL: &str = "https://jaccount.sjtu.edu.cn/jaccount/captcha";
const LOGIN_URL: &str = "https://jaccount.sjtu.edu.cn/jaccount/ulogin";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Timeout for the probe, submit, and finalize requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated HTTP context: two blocking clients sharing one cookie jar.
///
/// The secondary client has redirects disabled; the token exchange needs to
/// read a `Location` header instead of following it.
pub struct Session {
    http: Client,
    http_no_redirect: Client,
    jar: Arc<Jar>,
    auth_cookie: Option<String>,
}

impl Session {
    fn new() -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        let http_no_redirect = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            http,
            http_no_redirect,
            jar,
            auth_cookie: None,
        })
    }

    /// Redirect-following client, cookies attached.
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Client with redirects disabled, sharing the same cookie jar.
    #[must_use]
    pub fn http_no_redirect(&self) -> &Client {
        &self.http_no_redirect
    }

    /// The identity-provider cookie value backing this session, if known.
    #[must_use]
    pub fn auth_cookie(&self) -> Option<&str> {
        self.auth_cookie.as_deref()
    }

    fn seed_cookie(&self, value: &str) {
        let origin = Url::parse(IDP_ORIGIN).expect("valid origin");
        self.jar.add_cookie_str(
            &format!("{AUTH_COOKIE}={value}; Domain={IDP_HOST}; Path=/"),
            &origin,
        );
    }
}

/// Parameters extracted from the identity provider's challenge page.
#[derive(Debug, Clone)]
pub struct ChallengeContext {
    /// Resolved URL of the challenge page, used as `Referer` on follow-ups.
    pub referer: Url,
    /// Single-use challenge token scoping the captcha image.
    pub uuid: String,
    /// Query parameters of the challenge page URL, forwarded verbatim.
    pub query: Vec<(String, String)>,
}

/// Synchronous prompts answered by the human operator.
pub trait Operator {
    /// Asks for a username; `last` pre-fills the previously used value and an
    /// empty answer reuses it.
    fn username(&mut self, last: Option<&str>) -> std::io::Result<String>;

    /// Asks for the password.
    fn password(&mut self) -> std::io::Result<String>;

    /// Shows the captcha image and asks for its transcription.
    fn captcha(&mut self, image: &[u8]) -> std::io::Result<String>;
}

/// Result of one credential submission.
enum LoginOutcome {
    /// `errno == 0`; carries the auth cookie set by the response, if any.
    Success { cookie: Option<String> },
    /// The provider said no; retryable variants drive the prompt loop.
    Denied(AuthError),
}

/// Seam between the retry loop and the identity provider's HTTP surface.
trait LoginBackend {
    fn fetch_captcha(&mut self, ctx: &ChallengeContext) -> Result<Vec<u8>>;
    fn submit(
        &mut self,
        user: &str,
        pass: &str,
        captcha: &str,
        ctx: &ChallengeContext,
    ) -> Result<LoginOutcome>;
    /// Re-requests the client URL so the resource server completes its side
    /// of the session.
    fn finalize(&mut self, ctx: &ChallengeContext) -> Result<()>;
}

struct HttpBackend<'s> {
    session: &'s Session,
}

impl LoginBackend for HttpBackend<'_> {
    fn fetch_captcha(&mut self, ctx: &ChallengeContext) -> Result<Vec<u8>> {
        let t = chrono::Utc::now().timestamp_millis().to_string();
        let res = self
            .session
            .http
            .get(CAPTCHA_URL)
            .query(&[("uuid", ctx.uuid.as_str()), ("t", t.as_str())])
            .header(REFERER, ctx.referer.as_str())
            .send()?
            .error_for_status()?;
        Ok(res.bytes()?.to_vec())
    }

    fn submit(
        &mut self,
        user: &str,
        pass: &str,
        captcha: &str,
        ctx: &ChallengeContext,
    ) -> Result<LoginOutcome> {
        let mut form: Vec<(&str, &str)> = vec![
            ("user", user),
            ("pass", pass),
            ("captcha", captcha),
            ("lt", "p"),
            ("uuid", &ctx.uuid),
        ];
        for (key, value) in &ctx.query {
            // uuid comes from the challenge anchor, not the page query
            if key != "uuid" {
                form.push((key, value));
            }
        }

        let res = self
            .session
            .http
            .post(LOGIN_URL)
            .form(&form)
            .timeout(HTTP_TIMEOUT)
            .send()?
            .error_for_status()?;
        let cookie = res
            .cookies()
            .find(|c| c.name() == AUTH_COOKIE)
            .map(|c| c.value().to_string());
        let body: Value = res.json()?;
        Ok(classify_login_response(&body, cookie))
    }

    fn finalize(&mut self, ctx: &ChallengeContext) -> Result<()> {
        self.session
            .http
            .get(ctx.referer.clone())
            .timeout(HTTP_TIMEOUT)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

/// Maps the login endpoint's JSON body to an outcome.
fn classify_login_response(body: &Value, cookie: Option<String>) -> LoginOutcome {
    let errno = body.get("errno").and_then(wire::as_int).unwrap_or(1);
    if errno == 0 {
        return LoginOutcome::Success { cookie };
    }
    match body.get("code").and_then(Value::as_str) {
        Some("WRONG_USER_OR_PASSWORD") => LoginOutcome::Denied(AuthError::BadCredentials),
        Some("WRONG_CAPTCHA") => LoginOutcome::Denied(AuthError::BadCaptcha),
        _ => LoginOutcome::Denied(AuthError::Unknown(body.to_string())),
    }
}

/// Extracts the challenge context from the identity provider's login page.
fn parse_challenge(page_url: &Url, html: &str) -> Result<ChallengeContext> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("a#firefox_link").expect("valid selector");
    let href = doc
        .select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| Error::Shape("challenge page missing captcha link".to_string()))?;
    let link = page_url
        .join(href)
        .map_err(|e| Error::Shape(format!("bad captcha link `{href}`: {e}")))?;
    let uuid = link
        .query_pairs()
        .find(|(k, _)| k == "uuid")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| Error::Shape("captcha link missing uuid".to_string()))?;
    let query = page_url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    Ok(ChallengeContext {
        referer: page_url.clone(),
        uuid,
        query,
    })
}

enum Probe {
    Authenticated,
    Challenge(ChallengeContext),
}

/// Requests the client URL and decides whether the session is already live.
///
/// If the final resolved location is not on the identity provider's host, the
/// cookie was accepted and no interactive login is needed.
fn probe(session: &Session, client_url: &str) -> Result<Probe> {
    let res = session
        .http
        .get(client_url)
        .timeout(HTTP_TIMEOUT)
        .send()?
        .error_for_status()?;
    let final_url = res.url().clone();
    if final_url.host_str() != Some(IDP_HOST) {
        return Ok(Probe::Authenticated);
    }
    let body = res.text()?;
    Ok(Probe::Challenge(parse_challenge(&final_url, &body)?))
}

/// Credential/captcha retry loop.
///
/// The username is remembered across captcha retries within one login
/// attempt; a wrong password restarts from the credential prompt, a wrong
/// captcha only refetches the image. Retries are unbounded.
fn run_login<B: LoginBackend, O: Operator + ?Sized>(
    backend: &mut B,
    operator: &mut O,
    ctx: &ChallengeContext,
) -> Result<Option<String>> {
    let mut last_user: Option<String> = None;
    loop {
        let entered = operator.username(last_user.as_deref())?;
        let user = {
            let trimmed = entered.trim();
            if trimmed.is_empty() {
                last_user.clone().unwrap_or_default()
            } else {
                trimmed.to_string()
            }
        };
        last_user = Some(user.clone());
        let pass = operator.password()?;

        loop {
            let image = backend.fetch_captcha(ctx)?;
            let answer = operator.captcha(&image)?;
            match backend.submit(&user, &pass, answer.trim(), ctx)? {
                LoginOutcome::Success { cookie } => {
                    backend.finalize(ctx)?;
                    return Ok(cookie);
                }
                LoginOutcome::Denied(AuthError::BadCredentials) => {
                    log::warn!("incorrect username or password");
                    break;
                }
                LoginOutcome::Denied(AuthError::BadCaptcha) => {
                    log::warn!("incorrect captcha");
                }
                LoginOutcome::Denied(err) => return Err(err.into()),
            }
        }
    }
}

/// Authenticates against the identity provider and returns a live session.
///
/// Tries the persisted cookie first; if the provider still presents its
/// challenge page, runs the interactive login and persists the fresh cookie
/// on success.
///
/// # Errors
///
/// Fails on transport errors at any step and on non-retryable login
/// rejections.
pub fn authenticate(
    client_url: &str,
    store: &CredentialStore,
    operator: &mut dyn Operator,
) -> Result<Session> {
    let mut session = Session::new()?;
    if let Some(value) = store.load() {
        session.seed_cookie(&value);
        session.auth_cookie = Some(value);
    }

    match probe(&session, client_url)? {
        Probe::Authenticated => {
            log::info!("resumed session from saved cookie");
            Ok(session)
        }
        Probe::Challenge(ctx) => {
            log::info!("login required");
            let cookie = {
                let mut backend = HttpBackend { session: &session };
                run_login(&mut backend, operator, &ctx)?
            };
            if let Some(value) = &cookie {
                if let Err(err) = store.save(value) {
                    log::warn!("failed to persist auth cookie: {err}");
                }
            }
            session.auth_cookie = cookie;
            log::info!("logged in");
            Ok(session)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ChallengeContext {
        ChallengeContext {
            referer: Url::parse("https://jaccount.sjtu.edu.cn/jaccount/jalogin?client_id=x")
                .unwrap(),
            uuid: "u-1".to_string(),
            query: vec![("client_id".to_string(), "x".to_string())],
        }
    }

    /// Operator with canned answers, recording what it was asked.
    struct ScriptedOperator {
        usernames: Vec<&'static str>,
        username_prompts: Vec<Option<String>>,
        password_count: usize,
        captcha_count: usize,
    }

    impl ScriptedOperator {
        fn new(usernames: Vec<&'static str>) -> Self {
            Self {
                usernames,
                username_prompts: Vec::new(),
                password_count: 0,
                captcha_count: 0,
            }
        }
    }

    impl Operator for ScriptedOperator {
        fn username(&mut self, last: Option<&str>) -> std::io::Result<String> {
            self.username_prompts.push(last.map(str::to_string));
            Ok(self.usernames.remove(0).to_string())
        }

        fn password(&mut self) -> std::io::Result<String> {
            self.password_count += 1;
            Ok(format!("pw{}", self.password_count))
        }

        fn captcha(&mut self, image: &[u8]) -> std::io::Result<String> {
            assert!(!image.is_empty());
            self.captcha_count += 1;
            Ok(format!("cap{}", self.captcha_count))
        }
    }

    /// Backend that replays a fixed sequence of outcomes.
    struct ScriptedBackend {
        outcomes: Vec<LoginOutcome>,
        captcha_fetches: usize,
        submissions: Vec<(String, String, String)>,
        finalized: bool,
    }

    impl ScriptedBackend {
        fn new(outcomes: Vec<LoginOutcome>) -> Self {
            Self {
                outcomes,
                captcha_fetches: 0,
                submissions: Vec::new(),
                finalized: false,
            }
        }
    }

    impl LoginBackend for ScriptedBackend {
        fn fetch_captcha(&mut self, _ctx: &ChallengeContext) -> Result<Vec<u8>> {
            self.captcha_fetches += 1;
            Ok(vec![0xff, 0xd8])
        }

        fn submit(
            &mut self,
            user: &str,
            pass: &str,
            captcha: &str,
            _ctx: &ChallengeContext,
        ) -> Result<LoginOutcome> {
            self.submissions
                .push((user.to_string(), pass.to_string(), captcha.to_string()));
            Ok(self.outcomes.remove(0))
        }

        fn finalize(&mut self, _ctx: &ChallengeContext) -> Result<()> {
            self.finalized = true;
            Ok(())
        }
    }

    #[test]
    fn captcha_retries_keep_username_and_refetch_image() {
        let mut backend = ScriptedBackend::new(vec![
            LoginOutcome::Denied(AuthError::BadCaptcha),
            LoginOutcome::Denied(AuthError::BadCaptcha),
            LoginOutcome::Success {
                cookie: Some("c0".to_string()),
            },
        ]);
        let mut operator = ScriptedOperator::new(vec!["alice"]);

        let cookie = run_login(&mut backend, &mut operator, &ctx()).unwrap();

        assert_eq!(cookie.as_deref(), Some("c0"));
        assert_eq!(backend.captcha_fetches, 3);
        assert!(backend.finalized);
        // One credential prompt; username identical across all three attempts
        assert_eq!(operator.username_prompts, vec![None]);
        assert_eq!(operator.password_count, 1);
        assert!(backend.submissions.iter().all(|(u, _, _)| u == "alice"));
    }

    #[test]
    fn bad_credentials_reprompt_with_last_username() {
        let mut backend = ScriptedBackend::new(vec![
            LoginOutcome::Denied(AuthError::BadCredentials),
            LoginOutcome::Success { cookie: None },
        ]);
        let mut operator = ScriptedOperator::new(vec!["alice", ""]);

        run_login(&mut backend, &mut operator, &ctx()).unwrap();

        // Second prompt pre-filled with the previous username; empty answer
        // reuses it.
        assert_eq!(
            operator.username_prompts,
            vec![None, Some("alice".to_string())]
        );
        assert_eq!(operator.password_count, 2);
        assert_eq!(backend.submissions[1].0, "alice");
        assert_eq!(backend.submissions[1].1, "pw2");
    }

    #[test]
    fn unknown_rejection_is_terminal() {
        let mut backend = ScriptedBackend::new(vec![LoginOutcome::Denied(AuthError::Unknown(
            r#"{"errno":64}"#.to_string(),
        ))]);
        let mut operator = ScriptedOperator::new(vec!["alice"]);

        let err = run_login(&mut backend, &mut operator, &ctx()).unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Unknown(_))));
        assert!(!backend.finalized);
    }

    #[test]
    fn classify_success_with_cookie() {
        let outcome =
            classify_login_response(&json!({"errno": 0}), Some("v".to_string()));
        assert!(matches!(
            outcome,
            LoginOutcome::Success { cookie: Some(c) } if c == "v"
        ));
    }

    #[test]
    fn classify_string_errno_zero() {
        let outcome = classify_login_response(&json!({"errno": "0"}), None);
        assert!(matches!(outcome, LoginOutcome::Success { cookie: None }));
    }

    #[test]
    fn classify_known_denials() {
        let outcome =
            classify_login_response(&json!({"errno": 1, "code": "WRONG_USER_OR_PASSWORD"}), None);
        assert!(matches!(
            outcome,
            LoginOutcome::Denied(AuthError::BadCredentials)
        ));

        let outcome =
            classify_login_response(&json!({"errno": 1, "code": "WRONG_CAPTCHA"}), None);
        assert!(matches!(outcome, LoginOutcome::Denied(AuthError::BadCaptcha)));
    }

    #[test]
    fn classify_unknown_denial_carries_payload() {
        let outcome = classify_login_response(&json!({"errno": 64, "code": "LOCKED"}), None);
        match outcome {
            LoginOutcome::Denied(AuthError::Unknown(payload)) => {
                assert!(payload.contains("LOCKED"));
            }
            _ => panic!("expected unknown denial"),
        }
    }

    #[test]
    fn parse_challenge_extracts_uuid_and_query() {
        let page_url = Url::parse(
            "https://jaccount.sjtu.edu.cn/jaccount/jalogin?client_id=abc&response_type=code",
        )
        .unwrap();
        let html = r##"<html><body>
            <a id="firefox_link" href="/jaccount/jalogin?uuid=55aa&client_id=abc">retry</a>
        </body></html>"##;

        let ctx = parse_challenge(&page_url, html).unwrap();
        assert_eq!(ctx.uuid, "55aa");
        assert_eq!(ctx.referer, page_url);
        assert!(
            ctx.query
                .contains(&("client_id".to_string(), "abc".to_string()))
        );
        assert!(
            ctx.query
                .contains(&("response_type".to_string(), "code".to_string()))
        );
    }

    #[test]
    fn parse_challenge_missing_anchor_is_shape_error() {
        let page_url = Url::parse("https://jaccount.sjtu.edu.cn/jaccount/jalogin").unwrap();
        let err = parse_challenge(&page_url, "<html><body>nope</body></html>").unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn parse_challenge_anchor_without_uuid_is_shape_error() {
        let page_url = Url::parse("https://jaccount.sjtu.edu.cn/jaccount/jalogin").unwrap();
        let html = r##"<a id="firefox_link" href="/jaccount/jalogin?client_id=x">retry</a>"##;
        let err = parse_challenge(&page_url, html).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }
}
