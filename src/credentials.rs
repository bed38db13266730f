// Credential resolution: decide who we are for this run.
//
// Every field is looked up through an ordered list of sources and the first
// non-empty value wins:
//
//   CLI flag -> environment -> config profile -> saved session / keyring
//
// The saved session only feeds the session-string slot. Resolution itself is
// pure apart from reading the session store; logging in happens afterwards
// in `log_in`, which never aborts the run.

use std::fmt;

use tracing::{debug, warn};

use crate::api::{Capability, ScratchApi, Session};
use crate::config::Profile;
use crate::error::{Error, Result};
use crate::logging::Verbosity;
use crate::session::{SavedSession, SessionStore};

pub const ENV_USERNAME: &str = "SCRATCH_USERNAME";
pub const ENV_LOGIN_USERNAME: &str = "SCRATCH_LOGIN_USERNAME";
pub const ENV_LOGIN_PASSWORD: &str = "SCRATCH_LOGIN_PASSWORD";
pub const ENV_SESSION_STRING: &str = "SCRATCH_SESSION_STRING";
pub const ENV_PROFILE: &str = "SCRATCH_PROFILE";
pub const ENV_USE_KEYRING: &str = "SCRATCH_USE_KEYRING";

/// Credential-related values taken from the command line.
#[derive(Clone, Default)]
pub struct CredentialFlags {
    pub username: Option<String>,
    pub login_username: Option<String>,
    pub login_password: Option<String>,
    pub session_string: Option<String>,
    pub browser_login: bool,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Flag,
    Env,
    Profile,
    SavedSession,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Flag => "command line",
            Source::Env => "environment",
            Source::Profile => "config profile",
            Source::SavedSession => "saved session",
        };
        f.write_str(name)
    }
}

/// The single login attempt this run will make.
#[derive(Clone, PartialEq, Eq)]
pub enum LoginMethod {
    SessionString {
        value: String,
        source: Source,
    },
    SessionId {
        session_id: String,
        username: Option<String>,
    },
    Password {
        username: String,
        password: String,
        source: Source,
    },
    Browser,
    Anonymous,
}

impl LoginMethod {
    fn label(&self) -> &'static str {
        match self {
            LoginMethod::SessionString {
                source: Source::SavedSession,
                ..
            }
            | LoginMethod::SessionId { .. } => "saved session",
            LoginMethod::SessionString { .. } => "session string",
            LoginMethod::Password { .. } => "username/password",
            LoginMethod::Browser => "browser",
            LoginMethod::Anonymous => "anonymous",
        }
    }
}

impl fmt::Debug for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginMethod::SessionString { source, .. } => {
                write!(f, "SessionString(from {})", source)
            }
            LoginMethod::SessionId { username, .. } => write!(f, "SessionId({:?})", username),
            LoginMethod::Password {
                username, source, ..
            } => write!(f, "Password({}, from {})", username, source),
            LoginMethod::Browser => f.write_str("Browser"),
            LoginMethod::Anonymous => f.write_str("Anonymous"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Account to look up. May still be empty; the caller then falls back
    /// to the session's own username or asks.
    pub username: Option<String>,
    pub method: LoginMethod,
}

/// First candidate with a non-blank value, trimmed.
fn first_present<I>(candidates: I) -> Option<(String, Source)>
where
    I: IntoIterator<Item = (Source, Option<String>)>,
{
    candidates.into_iter().find_map(|(source, value)| {
        let value = value?;
        let value = value.trim();
        (!value.is_empty()).then(|| (value.to_string(), source))
    })
}

/// Truthy environment flag values.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub struct Resolver<'a> {
    flags: &'a CredentialFlags,
    env: &'a dyn Fn(&str) -> Option<String>,
    profile: Option<&'a Profile>,
    store: &'a SessionStore,
    verbosity: Verbosity,
}

impl<'a> Resolver<'a> {
    pub fn new(
        flags: &'a CredentialFlags,
        env: &'a dyn Fn(&str) -> Option<String>,
        profile: Option<&'a Profile>,
        store: &'a SessionStore,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            flags,
            env,
            profile,
            store,
            verbosity,
        }
    }

    fn from_profile(&self, pick: fn(&Profile) -> &Option<String>) -> Option<String> {
        self.profile.and_then(|p| pick(p).clone())
    }

    fn lookup(
        &self,
        flag: &Option<String>,
        env_key: &str,
        pick: fn(&Profile) -> &Option<String>,
    ) -> Option<(String, Source)> {
        first_present([
            (Source::Flag, flag.clone()),
            (Source::Env, (self.env)(env_key)),
            (Source::Profile, self.from_profile(pick)),
        ])
    }

    pub fn username(&self) -> Option<String> {
        self.lookup(&self.flags.username, ENV_USERNAME, |p| &p.username)
            .map(|(value, _)| value)
    }

    pub fn resolve(&self) -> Resolution {
        let username = self.username();
        let login_username =
            self.lookup(&self.flags.login_username, ENV_LOGIN_USERNAME, |p| {
                &p.login_username
            });
        let login_password =
            self.lookup(&self.flags.login_password, ENV_LOGIN_PASSWORD, |p| {
                &p.login_password
            });
        let session_string =
            self.lookup(&self.flags.session_string, ENV_SESSION_STRING, |p| {
                &p.session_string
            });

        let method = self.select_method(login_username, login_password, session_string);
        debug!(?method, ?username, "resolved credentials");
        Resolution { username, method }
    }

    fn select_method(
        &self,
        login_username: Option<(String, Source)>,
        login_password: Option<(String, Source)>,
        session_string: Option<(String, Source)>,
    ) -> LoginMethod {
        if let Some((value, source)) = session_string {
            return LoginMethod::SessionString { value, source };
        }

        // A saved session must not shadow an explicit request to log in
        // some other way.
        if login_username.is_none() && !self.flags.browser_login {
            match self.store.load() {
                Some(SavedSession::SessionString(value)) => {
                    return LoginMethod::SessionString {
                        value,
                        source: Source::SavedSession,
                    }
                }
                Some(SavedSession::SessionId {
                    session_id,
                    username,
                }) => {
                    return LoginMethod::SessionId {
                        session_id,
                        username,
                    }
                }
                None => {}
            }
        }

        match (login_username, login_password) {
            (Some((username, _)), Some((password, source))) => {
                if source == Source::Flag && self.verbosity.is_debug() {
                    warn!("password given on the command line may be visible to other users");
                }
                return LoginMethod::Password {
                    username,
                    password,
                    source,
                };
            }
            (Some((username, _)), None) => {
                debug!(%username, "login username given without a password");
            }
            _ => {}
        }

        if self.flags.browser_login {
            return LoginMethod::Browser;
        }
        LoginMethod::Anonymous
    }
}

/// Result of the one login attempt.
#[derive(Debug)]
pub enum LoginOutcome {
    Anonymous,
    LoggedIn { via: &'static str, session: Session },
    Failed { via: &'static str, error: Error },
}

impl LoginOutcome {
    pub fn session(&self) -> Option<&Session> {
        match self {
            LoginOutcome::LoggedIn { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            LoginOutcome::LoggedIn { session, .. } => Some(session),
            _ => None,
        }
    }
}

impl fmt::Display for LoginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginOutcome::Anonymous => f.write_str("Not logged in"),
            LoginOutcome::LoggedIn { via, session } => {
                write!(f, "Logged in via {} as: {}", via, session.username)
            }
            LoginOutcome::Failed { via, error } => {
                write!(f, "Login via {} failed: {}", via, error)
            }
        }
    }
}

/// Attempt the selected login. A failure is reported in the outcome and the
/// run continues unauthenticated. Sessions that come back without an X-Token
/// go through the backend's refresh, if it has one. `browser_session_id` runs the interactive
/// browser flow and hands back the session cookie value.
pub fn log_in(
    api: &dyn ScratchApi,
    method: &LoginMethod,
    browser_session_id: &dyn Fn() -> Result<String>,
) -> LoginOutcome {
    let via = method.label();
    let attempt = match method {
        LoginMethod::Anonymous => return LoginOutcome::Anonymous,
        LoginMethod::SessionString { value, .. } => api.login_by_session_string(value),
        LoginMethod::SessionId {
            session_id,
            username,
        } => api.login_by_session_id(session_id, username.as_deref()),
        LoginMethod::Password {
            username, password, ..
        } => api.login_with_password(username, password),
        LoginMethod::Browser => {
            browser_session_id().and_then(|id| api.login_by_session_id(id.trim(), None))
        }
    };

    match attempt {
        // A login that already handed out an X-Token has nothing to refresh.
        Ok(session) if session.xtoken.is_some() => LoginOutcome::LoggedIn { via, session },
        Ok(mut session) => {
            match api.refresh(&mut session) {
                Capability::Supported(Err(e)) => debug!(error = %e, "session refresh failed"),
                Capability::Supported(Ok(())) => debug!("session refreshed"),
                Capability::Unsupported => {}
            }
            LoginOutcome::LoggedIn { via, session }
        }
        Err(error) => LoginOutcome::Failed { via, error },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SESSION_FILE_NAME;
    use crate::test_support::FakeApi;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: SessionStore,
        env: HashMap<String, String>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = SessionStore::new(dir.path().join(SESSION_FILE_NAME));
            Self {
                _dir: dir,
                store,
                env: HashMap::new(),
            }
        }

        fn env(mut self, key: &str, value: &str) -> Self {
            self.env.insert(key.into(), value.into());
            self
        }

        fn resolve(&self, flags: &CredentialFlags, profile: Option<&Profile>) -> Resolution {
            let env = |key: &str| self.env.get(key).cloned();
            Resolver::new(flags, &env, profile, &self.store, Verbosity::Normal).resolve()
        }
    }

    fn session_string_of(method: &LoginMethod) -> (&str, Source) {
        match method {
            LoginMethod::SessionString { value, source } => (value.as_str(), *source),
            other => panic!("expected a session string, got {:?}", other),
        }
    }

    #[test]
    fn env_username_alone_is_anonymous() {
        let fx = Fixture::new().env(ENV_USERNAME, "alice");
        let res = fx.resolve(&CredentialFlags::default(), None);
        assert_eq!(res.username.as_deref(), Some("alice"));
        assert_eq!(res.method, LoginMethod::Anonymous);
    }

    #[test]
    fn username_precedence_flag_env_profile() {
        let profile = Profile {
            username: Some("from-profile".into()),
            ..Default::default()
        };
        let flags = CredentialFlags {
            username: Some("from-flag".into()),
            ..Default::default()
        };

        let fx = Fixture::new().env(ENV_USERNAME, "from-env");
        assert_eq!(
            fx.resolve(&flags, Some(&profile)).username.as_deref(),
            Some("from-flag")
        );
        assert_eq!(
            fx.resolve(&CredentialFlags::default(), Some(&profile))
                .username
                .as_deref(),
            Some("from-env")
        );

        let fx = Fixture::new();
        assert_eq!(
            fx.resolve(&CredentialFlags::default(), Some(&profile))
                .username
                .as_deref(),
            Some("from-profile")
        );
    }

    #[test]
    fn values_are_trimmed() {
        let flags = CredentialFlags {
            username: Some(" alice\t".into()),
            session_string: Some("  abc  ".into()),
            ..Default::default()
        };
        let res = Fixture::new().resolve(&flags, None);
        assert_eq!(res.username.as_deref(), Some("alice"));
        assert_eq!(session_string_of(&res.method), ("abc", Source::Flag));
    }

    #[test]
    fn blank_values_fall_through() {
        let flags = CredentialFlags {
            username: Some("   ".into()),
            ..Default::default()
        };
        let fx = Fixture::new().env(ENV_USERNAME, "alice");
        assert_eq!(fx.resolve(&flags, None).username.as_deref(), Some("alice"));
    }

    #[test]
    fn session_string_precedence_down_to_saved_session() {
        let profile = Profile {
            session_string: Some("profile-ss".into()),
            ..Default::default()
        };
        let flags = CredentialFlags {
            session_string: Some("flag-ss".into()),
            ..Default::default()
        };
        let fx = Fixture::new().env(ENV_SESSION_STRING, "env-ss");
        fx.store
            .save_record(&SavedSession::SessionString("saved-ss".into()))
            .unwrap();

        let res = fx.resolve(&flags, Some(&profile));
        assert_eq!(session_string_of(&res.method), ("flag-ss", Source::Flag));

        let res = fx.resolve(&CredentialFlags::default(), Some(&profile));
        assert_eq!(session_string_of(&res.method), ("env-ss", Source::Env));

        let fx = Fixture {
            env: HashMap::new(),
            ..fx
        };
        let res = fx.resolve(&CredentialFlags::default(), Some(&profile));
        assert_eq!(session_string_of(&res.method), ("profile-ss", Source::Profile));

        let res = fx.resolve(&CredentialFlags::default(), None);
        assert_eq!(
            session_string_of(&res.method),
            ("saved-ss", Source::SavedSession)
        );
    }

    #[test]
    fn saved_id_pair_becomes_session_id_restore() {
        let fx = Fixture::new();
        fx.store
            .save_record(&SavedSession::SessionId {
                session_id: "sid".into(),
                username: Some("bob".into()),
            })
            .unwrap();
        let res = fx.resolve(&CredentialFlags::default(), None);
        assert_eq!(
            res.method,
            LoginMethod::SessionId {
                session_id: "sid".into(),
                username: Some("bob".into()),
            }
        );
    }

    #[test]
    fn explicit_password_login_ignores_saved_session() {
        let fx = Fixture::new().env(ENV_LOGIN_PASSWORD, "hunter2");
        fx.store
            .save_record(&SavedSession::SessionString("saved-ss".into()))
            .unwrap();
        let flags = CredentialFlags {
            login_username: Some("carol".into()),
            ..Default::default()
        };
        let res = fx.resolve(&flags, None);
        assert_eq!(
            res.method,
            LoginMethod::Password {
                username: "carol".into(),
                password: "hunter2".into(),
                source: Source::Env,
            }
        );
    }

    #[test]
    fn username_without_password_is_anonymous() {
        let fx = Fixture::new();
        let flags = CredentialFlags {
            login_username: Some("carol".into()),
            ..Default::default()
        };
        assert_eq!(fx.resolve(&flags, None).method, LoginMethod::Anonymous);
    }

    #[test]
    fn browser_flag_selected_last() {
        let fx = Fixture::new();
        fx.store
            .save_record(&SavedSession::SessionString("saved-ss".into()))
            .unwrap();
        let flags = CredentialFlags {
            browser_login: true,
            ..Default::default()
        };
        assert_eq!(fx.resolve(&flags, None).method, LoginMethod::Browser);

        let flags = CredentialFlags {
            browser_login: true,
            session_string: Some("flag-ss".into()),
            ..Default::default()
        };
        assert_eq!(
            session_string_of(&fx.resolve(&flags, None).method),
            ("flag-ss", Source::Flag)
        );
    }

    #[test]
    fn truthy_values() {
        for value in ["1", "true", "YES", " on "] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["", "0", "false", "nope"] {
            assert!(!is_truthy(value), "{value}");
        }
    }

    #[test]
    fn debug_output_hides_password() {
        let method = LoginMethod::Password {
            username: "carol".into(),
            password: "hunter2".into(),
            source: Source::Flag,
        };
        assert!(!format!("{:?}", method).contains("hunter2"));
    }

    fn no_browser() -> Result<String> {
        Err(Error::Prompt("not a terminal".into()))
    }

    #[test]
    fn session_string_login_succeeds_without_refresh() {
        let api = FakeApi {
            supports_refresh: true,
            ..FakeApi::default().with_session("sid-1", "alice")
        };
        let value = Session::new("sid-1", "alice").session_string().unwrap();
        let method = LoginMethod::SessionString {
            value,
            source: Source::Flag,
        };
        let outcome = log_in(&api, &method, &no_browser);
        assert_eq!(outcome.to_string(), "Logged in via session string as: alice");
        assert_eq!(api.calls(), ["login_id:sid-1"]);
        let session = outcome.into_session().unwrap();
        assert_eq!(session.xtoken.as_deref(), Some("token-sid-1"));
    }

    #[test]
    fn tokenless_login_is_refreshed() {
        let api = FakeApi {
            supports_refresh: true,
            ..FakeApi::default().with_password("carol", "right")
        };
        let method = LoginMethod::Password {
            username: "carol".into(),
            password: "right".into(),
            source: Source::Env,
        };
        let session = log_in(&api, &method, &no_browser).into_session().unwrap();
        assert_eq!(session.xtoken.as_deref(), Some("refreshed"));
        assert_eq!(api.calls(), ["login_password:carol", "refresh:carol"]);
    }

    #[test]
    fn refresh_failure_is_swallowed() {
        let api = FakeApi {
            supports_refresh: true,
            fail_refresh: true,
            ..FakeApi::default().with_password("carol", "right")
        };
        let method = LoginMethod::Password {
            username: "carol".into(),
            password: "right".into(),
            source: Source::Flag,
        };
        let outcome = log_in(&api, &method, &no_browser);
        assert!(outcome.session().is_some());
        assert!(api.calls().contains(&"refresh:carol".to_string()));
    }

    #[test]
    fn failed_login_falls_back_to_anonymous() {
        let api = FakeApi::default().with_password("carol", "right");
        let method = LoginMethod::Password {
            username: "carol".into(),
            password: "wrong".into(),
            source: Source::Flag,
        };
        let outcome = log_in(&api, &method, &no_browser);
        assert!(outcome.session().is_none());
        assert_eq!(
            outcome.to_string(),
            "Login via username/password failed: Incorrect username or password."
        );
    }

    #[test]
    fn undecodable_session_string_fails_without_network() {
        let api = FakeApi::default();
        let method = LoginMethod::SessionString {
            value: "%%%".into(),
            source: Source::Env,
        };
        let outcome = log_in(&api, &method, &no_browser);
        assert!(matches!(
            outcome,
            LoginOutcome::Failed {
                error: Error::InvalidSessionString,
                ..
            }
        ));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn browser_login_uses_prompted_cookie() {
        let api = FakeApi::default().with_session("pasted-sid", "dana");
        let prompt = || -> Result<String> { Ok(" pasted-sid \n".to_string()) };
        let outcome = log_in(&api, &LoginMethod::Browser, &prompt);
        assert_eq!(outcome.to_string(), "Logged in via browser as: dana");

        let outcome = log_in(&api, &LoginMethod::Browser, &no_browser);
        assert!(matches!(outcome, LoginOutcome::Failed { via: "browser", .. }));
    }

    #[test]
    fn anonymous_makes_no_calls() {
        let api = FakeApi::default();
        let outcome = log_in(&api, &LoginMethod::Anonymous, &no_browser);
        assert!(matches!(outcome, LoginOutcome::Anonymous));
        assert!(api.calls().is_empty());
    }
}
