// Scripted in-memory backend for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::api::{Capability, RawProfile, RawProject, RawUser, RawUserHistory, ScratchApi, Session};
use crate::error::{Error, Result};

#[derive(Default)]
pub(crate) struct FakeApi {
    pub users: HashMap<String, RawUser>,
    /// session id -> username
    pub sessions: HashMap<String, String>,
    /// username -> password
    pub passwords: HashMap<String, String>,
    /// `None` makes the count lookup fail.
    pub message_count: Option<u64>,
    /// `None` reports the capability as unsupported.
    pub projects: Option<Vec<RawProject>>,
    pub messages: Option<Vec<Value>>,
    pub supports_refresh: bool,
    pub fail_refresh: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn with_user(mut self, username: &str) -> Self {
        self.users.insert(username.to_lowercase(), sample_user(username));
        self
    }

    pub fn with_session(mut self, session_id: &str, username: &str) -> Self {
        self.sessions
            .insert(session_id.to_string(), username.to_string());
        self
    }

    pub fn with_password(mut self, username: &str, password: &str) -> Self {
        self.passwords
            .insert(username.to_string(), password.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub(crate) fn sample_user(username: &str) -> RawUser {
    RawUser {
        id: Some(42),
        username: Some(username.to_string()),
        scratchteam: Some(false),
        history: RawUserHistory {
            joined: Some("2015-03-01T12:00:00.000Z".into()),
        },
        profile: RawProfile {
            id: Some(4242),
            images: [(
                "90x90".to_string(),
                format!("https://cdn2.scratch.mit.edu/get_image/user/{}_90x90.png", username),
            )]
            .into_iter()
            .collect(),
            status: Some("Building a platformer".into()),
            bio: Some("I like cats and code.".into()),
            country: Some("Canada".into()),
        },
    }
}

impl ScratchApi for FakeApi {
    fn user(&self, username: &str, session: Option<&Session>) -> Result<RawUser> {
        self.record(format!(
            "user:{}:{}",
            username,
            if session.is_some() { "auth" } else { "anon" }
        ));
        self.users
            .get(&username.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::Retrieval {
                username: username.to_string(),
                reason: "server answered 404 Not Found".into(),
            })
    }

    fn login_with_password(&self, username: &str, password: &str) -> Result<Session> {
        self.record(format!("login_password:{}", username));
        match self.passwords.get(username) {
            Some(expected) if expected == password => {
                Ok(Session::new(format!("sid-{}", username), username))
            }
            _ => Err(Error::Login("Incorrect username or password.".into())),
        }
    }

    fn login_by_session_id(&self, session_id: &str, _username: Option<&str>) -> Result<Session> {
        self.record(format!("login_id:{}", session_id));
        match self.sessions.get(session_id) {
            Some(username) => {
                let mut session = Session::new(session_id, username.clone());
                session.xtoken = Some(format!("token-{}", session_id));
                Ok(session)
            }
            None => Err(Error::Login("session is invalid or expired".into())),
        }
    }

    fn message_count(&self, username: &str, _session: &Session) -> Capability<Result<u64>> {
        self.record(format!("message_count:{}", username));
        Capability::Supported(
            self.message_count
                .ok_or_else(|| Error::Login("count unavailable".into())),
        )
    }

    fn projects(&self, username: &str, limit: u32) -> Capability<Result<Vec<RawProject>>> {
        self.record(format!("projects:{}:{}", username, limit));
        match &self.projects {
            Some(projects) => Capability::Supported(Ok(projects
                .iter()
                .take(limit as usize)
                .cloned()
                .collect())),
            None => Capability::Unsupported,
        }
    }

    fn messages(
        &self,
        _session: &Session,
        username: &str,
        limit: u32,
    ) -> Capability<Result<Vec<Value>>> {
        self.record(format!("messages:{}:{}", username, limit));
        match &self.messages {
            Some(messages) => Capability::Supported(Ok(messages.clone())),
            None => Capability::Unsupported,
        }
    }

    fn refresh(&self, session: &mut Session) -> Capability<Result<()>> {
        self.record(format!("refresh:{}", session.username));
        if !self.supports_refresh {
            return Capability::Unsupported;
        }
        if self.fail_refresh {
            return Capability::Supported(Err(Error::Login("refresh rejected".into())));
        }
        session.xtoken = Some("refreshed".into());
        Capability::Supported(Ok(()))
    }
}
