// Named profiles of CLI defaults, plus `.env` loading.
//
// Profiles are stored as TOML in `<config_dir>/scratch-cli/config.toml`:
//
//   [profiles.work]
//   username = "alice"
//   session_string = "..."

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Profile picked when neither `--profile` nor `SCRATCH_PROFILE` is set.
pub const DEFAULT_PROFILE: &str = "default";

/// One named set of defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub username: Option<String>,
    pub session_string: Option<String>,
    pub login_username: Option<String>,
    pub login_password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profiles: BTreeMap<String, Profile>,
}

/// Load `.env` from the working directory. Variables already present in
/// the environment are left alone. Runs before logging is set up so that
/// `RUST_LOG` can come from the file; call [`report_dotenv`] afterwards.
pub fn load_dotenv() -> Result<bool, dotenvy::Error> {
    let dir = std::env::current_dir().map_err(dotenvy::Error::Io)?;
    match dotenvy::from_path(dir.join(".env")) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn report_dotenv(loaded: &Result<bool, dotenvy::Error>) {
    match loaded {
        Ok(true) => debug!("loaded .env"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "ignoring unreadable .env file"),
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scratch-cli").join("config.toml"))
}

impl Config {
    /// Load the config file. A missing or unreadable file is an empty
    /// config; a parse error is logged and also treated as empty.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read config file");
                return Self::default();
            }
        };
        match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed config file");
                Self::default()
            }
        }
    }

    pub fn load_default() -> Self {
        match default_config_path() {
            Some(path) => Self::load(&path),
            None => Self::default(),
        }
    }

    /// Pick the active profile. An explicitly requested profile that does
    /// not exist is reported and treated as absent.
    pub fn select(&self, requested: Option<&str>) -> Option<&Profile> {
        match requested {
            Some(name) => {
                let profile = self.profiles.get(name);
                if profile.is_none() {
                    warn!(profile = name, "profile not found in config");
                }
                profile
            }
            None => {
                let profile = self.profiles.get(DEFAULT_PROFILE);
                if profile.is_some() {
                    debug!("using the default profile");
                }
                profile
            }
        }
    }
}
