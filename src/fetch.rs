// Profile fetching: turn backend documents into the flat records the
// output formatter works with.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::api::{Capability, RawProject, RawUser, ScratchApi, Session};
use crate::error::{Error, Result};

/// Public (and, when logged in, private) attributes of a user.
///
/// Missing attributes serialize as `null`; keys are never dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileRecord {
    pub id: Option<u64>,
    pub username: Option<String>,
    pub about_me: Option<String>,
    pub wiwo: Option<String>,
    pub country: Option<String>,
    pub icon_url: Option<String>,
    pub join_date: Option<String>,
    pub scratchteam: Option<bool>,
    #[serde(flatten)]
    pub authenticated: Option<AuthenticatedView>,
}

/// Extra fields only available through a logged-in session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedView {
    pub authenticated_view: bool,
    pub message_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub id: Option<u64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub views: Option<u64>,
    pub loves: Option<u64>,
    pub favorites: Option<u64>,
    pub remixes: Option<u64>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub shared: Option<String>,
}

pub type MessageRecord = Map<String, Value>;

impl From<RawUser> for ProfileRecord {
    fn from(user: RawUser) -> Self {
        let icon_url = user.profile.images.get("90x90").cloned();
        ProfileRecord {
            id: user.id,
            username: user.username,
            about_me: user.profile.bio,
            wiwo: user.profile.status,
            country: user.profile.country,
            icon_url,
            join_date: user.history.joined,
            scratchteam: user.scratchteam,
            authenticated: None,
        }
    }
}

impl From<RawProject> for ProjectRecord {
    fn from(project: RawProject) -> Self {
        ProjectRecord {
            id: project.id,
            title: project.title,
            description: project.description,
            instructions: project.instructions,
            views: project.stats.views,
            loves: project.stats.loves,
            favorites: project.stats.favorites,
            remixes: project.stats.remixes,
            created: project.history.created,
            modified: project.history.modified,
            shared: project.history.shared,
        }
    }
}

/// Look up `username` without logging in.
pub fn fetch_public_profile(api: &dyn ScratchApi, username: &str) -> Result<ProfileRecord> {
    let user = api.user(username, None)?;
    Ok(user.into())
}

/// Look up `username` through `session`. A failed message-count lookup
/// leaves the count empty instead of failing the fetch.
pub fn fetch_authenticated_profile(
    api: &dyn ScratchApi,
    session: &Session,
    username: &str,
) -> Result<ProfileRecord> {
    let user = api.user(username, Some(session))?;
    let message_count = match api.message_count(username, session) {
        Capability::Supported(Ok(count)) => Some(count),
        Capability::Supported(Err(e)) => {
            debug!(error = %e, "message count unavailable");
            None
        }
        Capability::Unsupported => None,
    };

    let mut record = ProfileRecord::from(user);
    record.authenticated = Some(AuthenticatedView {
        authenticated_view: true,
        message_count,
    });
    Ok(record)
}

/// Up to `limit` shared projects. A backend without project listing yields
/// an empty list.
pub fn list_projects(api: &dyn ScratchApi, username: &str, limit: u32) -> Result<Vec<ProjectRecord>> {
    match api.projects(username, limit) {
        Capability::Supported(projects) => {
            Ok(projects?.into_iter().map(ProjectRecord::from).collect())
        }
        Capability::Unsupported => {
            debug!("backend cannot list projects");
            Ok(Vec::new())
        }
    }
}

/// Messages of the logged-in user. Without a session this fails before any
/// request is made.
pub fn list_messages(
    api: &dyn ScratchApi,
    session: Option<&Session>,
    username: &str,
    limit: u32,
) -> Result<Vec<MessageRecord>> {
    let session = session.ok_or(Error::AuthenticationRequired)?;
    if !session.username.eq_ignore_ascii_case(username) {
        warn!(
            logged_in = %session.username,
            requested = username,
            "messages are only visible to their owner"
        );
    }
    match api.messages(session, username, limit) {
        Capability::Supported(messages) => Ok(messages?.into_iter().map(flatten_message).collect()),
        Capability::Unsupported => {
            debug!("backend cannot list messages");
            Ok(Vec::new())
        }
    }
}

/// Keep top-level scalars as they are and render anything nested as a
/// string so every record is a flat mapping.
fn flatten_message(message: Value) -> MessageRecord {
    match message {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
                    scalar => scalar,
                };
                (key, value)
            })
            .collect(),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), Value::String(other.to_string()));
            map
        }
    }
}
