// Session persistence: a small JSON record in the user's home directory,
// optionally mirrored into the OS credential store.
//
// Everything here is best effort. A missing or malformed file reads as "no
// saved session", and callers treat a failed save as a warning.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::Session;
use crate::error::Result;

pub const SESSION_FILE_NAME: &str = ".scratchattach_session";

#[cfg(feature = "keyring")]
const KEYRING_SERVICE: &str = "scratch-cli";
#[cfg(feature = "keyring")]
const KEYRING_ACCOUNT: &str = "session";

/// What a previous run left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavedSession {
    SessionString(String),
    SessionId {
        session_id: String,
        username: Option<String>,
    },
}

impl SavedSession {
    fn from_session(session: &Session) -> Self {
        match session.session_string() {
            Some(s) => SavedSession::SessionString(s),
            None => SavedSession::SessionId {
                session_id: session.session_id.clone(),
                username: Some(session.username.clone()).filter(|u| !u.is_empty()),
            },
        }
    }
}

/// On-disk shape of the session file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

impl SessionFile {
    fn into_saved(self) -> Option<SavedSession> {
        if let Some(s) = self.session_string.filter(|s| !s.trim().is_empty()) {
            return Some(SavedSession::SessionString(s));
        }
        self.session_id
            .filter(|id| !id.trim().is_empty())
            .map(|session_id| SavedSession::SessionId {
                session_id,
                username: self.username,
            })
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    use_keyring: bool,
}

/// Default location of the session file: `~/.scratchattach_session`.
pub fn default_session_path() -> PathBuf {
    let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(SESSION_FILE_NAME)
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_keyring: false,
        }
    }

    pub fn at_default_path() -> Self {
        Self::new(default_session_path())
    }

    /// Also consult the OS credential store. Ignored when the crate is
    /// built without the `keyring` feature.
    pub fn with_keyring(mut self, enabled: bool) -> Self {
        if enabled && !cfg!(feature = "keyring") {
            warn!("SCRATCH_USE_KEYRING is set but this build has no credential store support");
        }
        self.use_keyring = enabled && cfg!(feature = "keyring");
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved session. Absent and malformed both yield `None`.
    pub fn load(&self) -> Option<SavedSession> {
        match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<SessionFile>(&text) {
                Ok(file) => file.into_saved(),
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "ignoring malformed session file");
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.load_from_keyring(),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "could not read session file");
                None
            }
        }
    }

    /// Persist `session`. Returns whether the file was written.
    pub fn save(&self, session: &Session) -> bool {
        let saved = SavedSession::from_session(session);
        match self.save_record(&saved) {
            Ok(()) => {
                if let SavedSession::SessionString(s) = &saved {
                    self.store_in_keyring(s);
                }
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not save session");
                false
            }
        }
    }

    pub fn save_record(&self, saved: &SavedSession) -> Result<()> {
        let file = match saved {
            SavedSession::SessionString(s) => SessionFile {
                session_string: Some(s.clone()),
                ..Default::default()
            },
            SavedSession::SessionId {
                session_id,
                username,
            } => SessionFile {
                session_string: None,
                session_id: Some(session_id.clone()),
                username: username.clone(),
            },
        };
        let body = serde_json::to_vec(&file)?;
        write_private(&self.path, &body)?;
        Ok(())
    }

    /// Delete the session file. `Ok(true)` when a file was actually removed.
    pub fn forget(&self) -> Result<bool> {
        self.clear_keyring();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(feature = "keyring")]
    fn entry(&self) -> Option<keyring::Entry> {
        if !self.use_keyring {
            return None;
        }
        match keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "credential store unavailable");
                None
            }
        }
    }

    #[cfg(feature = "keyring")]
    fn load_from_keyring(&self) -> Option<SavedSession> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(s) if !s.trim().is_empty() => Some(SavedSession::SessionString(s)),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "no session in credential store");
                None
            }
        }
    }

    #[cfg(feature = "keyring")]
    fn store_in_keyring(&self, session_string: &str) {
        if let Some(entry) = self.entry() {
            if let Err(e) = entry.set_password(session_string) {
                warn!(error = %e, "could not save session to credential store");
            }
        }
    }

    #[cfg(feature = "keyring")]
    fn clear_keyring(&self) {
        if let Some(entry) = self.entry() {
            if let Err(e) = entry.delete_credential() {
                debug!(error = %e, "nothing removed from credential store");
            }
        }
    }

    #[cfg(not(feature = "keyring"))]
    fn load_from_keyring(&self) -> Option<SavedSession> {
        None
    }

    #[cfg(not(feature = "keyring"))]
    fn store_in_keyring(&self, _session_string: &str) {}

    #[cfg(not(feature = "keyring"))]
    fn clear_keyring(&self) {}
}

/// Write `body` to `path`, readable and writable by the owner only.
fn write_private(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // `mode` only applies on creation. A pre-existing file is tightened
    // before the secret goes in.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(body)?;
    Ok(())
}
