// API client module: a small blocking HTTP client that talks to the public
// Scratch endpoints, and the `ScratchApi` trait every other module programs
// against.
//
// Optional operations return `Capability<T>` so a backend can say
// "unsupported" explicitly. Callers match on the variant instead of guessing
// what a backend can do.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.scratch.mit.edu";
pub const DEFAULT_SITE_URL: &str = "https://scratch.mit.edu";

/// Largest page the list endpoints hand out in one request.
pub const MAX_PAGE_SIZE: u32 = 40;

/// Result of an optional backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
    Supported(T),
    Unsupported,
}

/// An authenticated Scratch session.
///
/// Only the post-login session id and the derived identifiers are kept;
/// passwords never reach this type.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub username: String,
    pub user_id: Option<u64>,
    pub xtoken: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &"<redacted>")
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .field("xtoken", &self.xtoken.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct SessionStringPayload {
    session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            username: username.into(),
            user_id: None,
            xtoken: None,
        }
    }

    /// Portable single-string form of the session, or `None` when the
    /// username is unknown and the string could not be restored later.
    pub fn session_string(&self) -> Option<String> {
        if self.session_id.is_empty() || self.username.is_empty() {
            return None;
        }
        let payload = SessionStringPayload {
            session_id: self.session_id.clone(),
            username: Some(self.username.clone()),
        };
        let json = serde_json::to_vec(&payload).ok()?;
        Some(STANDARD.encode(json))
    }

    /// Split a session string back into `(session_id, username)`.
    pub fn decode_session_string(session_string: &str) -> Result<(String, Option<String>)> {
        let bytes = STANDARD
            .decode(session_string.trim())
            .map_err(|_| Error::InvalidSessionString)?;
        let payload: SessionStringPayload =
            serde_json::from_slice(&bytes).map_err(|_| Error::InvalidSessionString)?;
        if payload.session_id.is_empty() {
            return Err(Error::InvalidSessionString);
        }
        Ok((payload.session_id, payload.username))
    }
}

/// `GET /users/{username}` document. Every field is optional so partial
/// documents still deserialize.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUser {
    pub id: Option<u64>,
    pub username: Option<String>,
    #[serde(default)]
    pub scratchteam: Option<bool>,
    #[serde(default)]
    pub history: RawUserHistory,
    #[serde(default)]
    pub profile: RawProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUserHistory {
    pub joined: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProfile {
    pub id: Option<u64>,
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    /// "What I'm working on"
    pub status: Option<String>,
    /// "About me"
    pub bio: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProject {
    pub id: Option<u64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub stats: RawProjectStats,
    #[serde(default)]
    pub history: RawProjectHistory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProjectStats {
    pub views: Option<u64>,
    pub loves: Option<u64>,
    pub favorites: Option<u64>,
    pub remixes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProjectHistory {
    pub created: Option<String>,
    pub modified: Option<String>,
    pub shared: Option<String>,
}

/// Everything the front ends need from a Scratch backend.
pub trait ScratchApi: Send + Sync {
    /// Look up a user. Fails with `Error::Retrieval` when the lookup
    /// reports failure.
    fn user(&self, username: &str, session: Option<&Session>) -> Result<RawUser>;

    fn login_with_password(&self, username: &str, password: &str) -> Result<Session>;

    fn login_by_session_id(&self, session_id: &str, username: Option<&str>) -> Result<Session>;

    fn login_by_session_string(&self, session_string: &str) -> Result<Session> {
        let (session_id, username) = Session::decode_session_string(session_string)?;
        self.login_by_session_id(&session_id, username.as_deref())
    }

    fn message_count(&self, _username: &str, _session: &Session) -> Capability<Result<u64>> {
        Capability::Unsupported
    }

    fn projects(&self, _username: &str, _limit: u32) -> Capability<Result<Vec<RawProject>>> {
        Capability::Unsupported
    }

    fn messages(
        &self,
        _session: &Session,
        _username: &str,
        _limit: u32,
    ) -> Capability<Result<Vec<Value>>> {
        Capability::Unsupported
    }

    /// Re-validate a session and pick up a fresh X-Token.
    fn refresh(&self, _session: &mut Session) -> Capability<Result<()>> {
        Capability::Unsupported
    }
}

/// Blocking client for `api.scratch.mit.edu` and `scratch.mit.edu`.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_url: Url,
    site_url: Url,
}

#[derive(Deserialize)]
struct LoginEntry {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    success: Option<u8>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Deserialize)]
struct SessionInfo {
    #[serde(default)]
    user: Option<SessionUser>,
}

#[derive(Deserialize)]
struct SessionUser {
    id: Option<u64>,
    username: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct MessageCount {
    count: u64,
}

impl ApiClient {
    /// Create an ApiClient configured from `SCRATCH_API_URL` and
    /// `SCRATCH_SITE_URL`, falling back to the public Scratch hosts.
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("SCRATCH_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let site_url =
            std::env::var("SCRATCH_SITE_URL").unwrap_or_else(|_| DEFAULT_SITE_URL.into());
        Self::new(&api_url, &site_url)
    }

    pub fn new(api_url: &str, site_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("scratch-cli/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(ApiClient {
            client,
            api_url: parse_base_url(api_url)?,
            site_url: parse_base_url(site_url)?,
        })
    }

    pub fn site_url(&self) -> &str {
        self.site_url.as_str()
    }

    /// `base` with `segments` appended, each percent-encoded as one path
    /// segment.
    fn endpoint(base: &Url, segments: &[&str]) -> Url {
        let mut url = base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Headers the main site expects on its XHR endpoints.
    fn site_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-csrftoken", HeaderValue::from_static("a"));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        if let Ok(referer) = HeaderValue::from_str(self.site_url()) {
            headers.insert(REFERER, referer);
        }
        headers
    }

    fn with_session(&self, req: RequestBuilder, session: Option<&Session>) -> RequestBuilder {
        match session.and_then(|s| s.xtoken.as_deref()) {
            Some(token) => req.header("x-token", token),
            None => req,
        }
    }

    fn read_json<T: DeserializeOwned>(res: Response, username: &str) -> Result<T> {
        if !res.status().is_success() {
            let status = res.status();
            return Err(Error::Retrieval {
                username: username.to_string(),
                reason: format!("server answered {}", status),
            });
        }
        Ok(res.json()?)
    }

    fn session_user(&self, session_id: &str) -> Result<SessionUser> {
        let url = Self::endpoint(&self.site_url, &["session", ""]);
        let cookie = format!(
            "scratchsessionsid={}; scratchcsrftoken=a; scratchlanguage=en",
            session_id
        );
        let res = self
            .client
            .get(url)
            .headers(self.site_headers())
            .header(COOKIE, cookie)
            .send()?;
        if !res.status().is_success() {
            return Err(Error::Login(format!("session lookup answered {}", res.status())));
        }
        let info: SessionInfo = res.json()?;
        info.user
            .ok_or_else(|| Error::Login("session is invalid or expired".into()))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "not a hierarchical URL".into(),
        });
    }
    Ok(url)
}

impl ScratchApi for ApiClient {
    fn user(&self, username: &str, session: Option<&Session>) -> Result<RawUser> {
        let url = Self::endpoint(&self.api_url, &["users", username]);
        debug!(%url, "fetching user");
        let res = self.with_session(self.client.get(url), session).send()?;
        let user: RawUser = Self::read_json(res, username)?;
        if user.username.is_none() {
            return Err(Error::Retrieval {
                username: username.to_string(),
                reason: "user not found".into(),
            });
        }
        Ok(user)
    }

    fn login_with_password(&self, username: &str, password: &str) -> Result<Session> {
        let url = Self::endpoint(&self.site_url, &["login", ""]);
        let res = self
            .client
            .post(url)
            .headers(self.site_headers())
            .header(COOKIE, "scratchcsrftoken=a; scratchlanguage=en")
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()?;
        if !res.status().is_success() {
            return Err(Error::Login(format!("server answered {}", res.status())));
        }

        // The session id only travels in the Set-Cookie header.
        let session_id = res
            .cookies()
            .find(|c| c.name() == "scratchsessionsid")
            .map(|c| c.value().trim_matches('"').to_string());

        let entries: Vec<LoginEntry> = res.json()?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::Login("empty login response".into()))?;
        if entry.success == Some(0) {
            return Err(Error::Login(
                entry.msg.unwrap_or_else(|| "credentials rejected".into()),
            ));
        }
        let session_id =
            session_id.ok_or_else(|| Error::Login("no session cookie in login response".into()))?;

        Ok(Session {
            session_id,
            username: entry.username.unwrap_or_else(|| username.to_string()),
            user_id: entry.id,
            xtoken: entry.token,
        })
    }

    fn login_by_session_id(&self, session_id: &str, username: Option<&str>) -> Result<Session> {
        let user = self.session_user(session_id)?;
        if let Some(expected) = username {
            if !expected.eq_ignore_ascii_case(&user.username) {
                debug!(expected, actual = %user.username, "session belongs to a different user");
            }
        }
        Ok(Session {
            session_id: session_id.to_string(),
            username: user.username,
            user_id: user.id,
            xtoken: user.token,
        })
    }

    fn message_count(&self, username: &str, session: &Session) -> Capability<Result<u64>> {
        let url = Self::endpoint(&self.api_url, &["users", username, "messages", "count"]);
        let result = self
            .with_session(self.client.get(url), Some(session))
            .send()
            .map_err(Error::from)
            .and_then(|res| Self::read_json::<MessageCount>(res, username))
            .map(|c| c.count);
        Capability::Supported(result)
    }

    fn projects(&self, username: &str, limit: u32) -> Capability<Result<Vec<RawProject>>> {
        let url = Self::endpoint(&self.api_url, &["users", username, "projects"]);
        let limit = limit.min(MAX_PAGE_SIZE);
        if limit == 0 {
            return Capability::Supported(Ok(Vec::new()));
        }
        let result = self
            .client
            .get(url)
            .query(&[("limit", limit), ("offset", 0)])
            .send()
            .map_err(Error::from)
            .and_then(|res| Self::read_json(res, username));
        Capability::Supported(result)
    }

    fn messages(
        &self,
        session: &Session,
        username: &str,
        limit: u32,
    ) -> Capability<Result<Vec<Value>>> {
        if session.xtoken.is_none() {
            return Capability::Supported(Err(Error::AuthenticationRequired));
        }
        let url = Self::endpoint(&self.api_url, &["users", username, "messages"]);
        let limit = limit.min(MAX_PAGE_SIZE);
        if limit == 0 {
            return Capability::Supported(Ok(Vec::new()));
        }
        let result = self
            .with_session(self.client.get(url), Some(session))
            .query(&[("limit", limit), ("offset", 0)])
            .send()
            .map_err(Error::from)
            .and_then(|res| Self::read_json(res, username));
        Capability::Supported(result)
    }

    fn refresh(&self, session: &mut Session) -> Capability<Result<()>> {
        let result = self.session_user(&session.session_id).map(|user| {
            session.user_id = user.id.or(session.user_id);
            if user.token.is_some() {
                session.xtoken = user.token;
            }
        });
        Capability::Supported(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_string_round_trips() {
        let session = Session::new("abc123", "alice");
        let encoded = session.session_string().unwrap();
        let (id, username) = Session::decode_session_string(&encoded).unwrap();
        assert_eq!(id, "abc123");
        assert_eq!(username.as_deref(), Some("alice"));
    }

    #[test]
    fn session_string_needs_username() {
        assert!(Session::new("abc123", "").session_string().is_none());
    }

    #[test]
    fn garbage_session_string_is_rejected() {
        assert!(matches!(
            Session::decode_session_string("not base64 at all!"),
            Err(Error::InvalidSessionString)
        ));
        let not_json = STANDARD.encode(b"plain text");
        assert!(matches!(
            Session::decode_session_string(&not_json),
            Err(Error::InvalidSessionString)
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut session = Session::new("very-secret-id", "alice");
        session.xtoken = Some("very-secret-token".into());
        let shown = format!("{:?}", session);
        assert!(!shown.contains("very-secret"));
        assert!(shown.contains("alice"));
    }

    #[test]
    fn raw_user_tolerates_partial_documents() {
        let user: RawUser = serde_json::from_str(
            r#"{"id": 7, "username": "alice", "profile": {"bio": "hi"}}"#,
        )
        .unwrap();
        assert_eq!(user.id, Some(7));
        assert_eq!(user.profile.bio.as_deref(), Some("hi"));
        assert!(user.history.joined.is_none());
        assert!(user.profile.images.is_empty());
    }

    #[test]
    fn endpoints_encode_each_segment() {
        let client = ApiClient::new("http://api.example/", "http://site.example").unwrap();
        let url = ApiClient::endpoint(&client.api_url, &["users", "alice#frag"]);
        assert_eq!(url.as_str(), "http://api.example/users/alice%23frag");
        let url = ApiClient::endpoint(&client.api_url, &["users", "a/b?c", "projects"]);
        assert_eq!(url.path(), "/users/a%2Fb%3Fc/projects");
        let url = ApiClient::endpoint(&client.site_url, &["session", ""]);
        assert_eq!(url.as_str(), "http://site.example/session/");
    }

    #[test]
    fn endpoints_keep_a_base_path() {
        let client = ApiClient::new("http://mirror.example/scratch/api", "http://site.example").unwrap();
        let url = ApiClient::endpoint(&client.api_url, &["users", "alice"]);
        assert_eq!(url.as_str(), "http://mirror.example/scratch/api/users/alice");
    }

    #[test]
    fn bad_base_url_is_rejected() {
        assert!(matches!(
            ApiClient::new("not a url", "http://site.example"),
            Err(Error::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            ApiClient::new("http://api.example", "mailto:someone@example.com"),
            Err(Error::InvalidBaseUrl { .. })
        ));
    }
}
