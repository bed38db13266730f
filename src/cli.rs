// Command-line front end: argument definitions and the dispatcher that runs
// resolve -> log in -> fetch -> format for one invocation.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::api::ApiClient;
use crate::config::Config;
use crate::credentials::{
    self, is_truthy, CredentialFlags, LoginOutcome, Resolver, ENV_PROFILE, ENV_USE_KEYRING,
};
use crate::error::Error;
use crate::fetch;
use crate::logging::Verbosity;
use crate::output::{self, OutputFormat, OutputTarget, Payload};
use crate::session::SessionStore;
use crate::ui;

const DEFAULT_LIMIT: u32 = 20;

#[derive(Parser, Debug)]
#[command(
    name = "scratch-cli",
    version,
    about = "Retrieve Scratch user data, projects and messages"
)]
pub struct Cli {
    /// Scratch username to fetch
    pub username: Option<String>,

    #[command(flatten)]
    pub opts: GlobalOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Username to log in with (for authenticated access)
    #[arg(long, global = true)]
    pub login_username: Option<String>,

    /// Password to log in with (not recommended on shared shells)
    #[arg(long, global = true)]
    pub login_password: Option<String>,

    /// Session string to authenticate with
    #[arg(long, global = true)]
    pub session_string: Option<String>,

    /// Log in through the website and paste the session cookie
    #[arg(long, global = true)]
    pub browser_login: bool,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format
    #[arg(long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write the result to this file instead of stdout
    #[arg(long, global = true, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Config profile supplying defaults
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Enable debug output and login-data warnings
    #[arg(long, global = true)]
    pub debug: bool,

    /// Forget the saved session and exit
    #[arg(long, global = true)]
    pub forget_session: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch a user's profile (the default)
    Fetch {
        /// Scratch username to fetch
        username: Option<String>,
    },
    /// List a user's shared projects
    Projects {
        /// Scratch username whose projects to list
        username: Option<String>,
        /// Maximum number of projects
        #[arg(long, default_value_t = DEFAULT_LIMIT, value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
    },
    /// List the logged-in user's messages
    Messages {
        /// Account whose messages to read (defaults to the logged-in user)
        username: Option<String>,
        /// Maximum number of messages
        #[arg(long, default_value_t = DEFAULT_LIMIT, value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
    },
}

impl Command {
    fn username(&self) -> Option<String> {
        match self {
            Command::Fetch { username }
            | Command::Projects { username, .. }
            | Command::Messages { username, .. } => username.clone(),
        }
    }
}

impl Cli {
    /// The subcommand to run, with a bare `scratch-cli NAME` meaning fetch.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Fetch {
            username: self.username.clone(),
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Run one CLI invocation.
pub fn run(cli: Cli) -> Result<()> {
    let opts = &cli.opts;
    let verbosity = Verbosity::from_debug_flag(opts.debug);
    let use_keyring = env_var(ENV_USE_KEYRING).is_some_and(|v| is_truthy(&v));
    let store = SessionStore::at_default_path().with_keyring(use_keyring);

    if opts.forget_session {
        match store.forget() {
            Ok(true) => println!("Removed saved session: {}", store.path().display()),
            Ok(false) => println!("No saved session found."),
            Err(e) => println!("Failed to remove saved session: {}", e),
        }
        return Ok(());
    }

    let command = cli.command();
    let config = Config::load_default();
    let profile_name = opts
        .profile
        .clone()
        .or_else(|| env_var(ENV_PROFILE))
        .filter(|name| !name.trim().is_empty());
    let profile = config.select(profile_name.as_deref());

    let flags = CredentialFlags {
        username: command.username(),
        login_username: opts.login_username.clone(),
        login_password: opts.login_password.clone(),
        session_string: opts.session_string.clone(),
        browser_login: opts.browser_login,
    };
    let resolution = Resolver::new(&flags, &env_var, profile, &store, verbosity).resolve();

    let api = ApiClient::from_env()?;
    let outcome = credentials::log_in(&api, &resolution.method, &|| {
        ui::browser_session_id(api.site_url())
    });
    if !matches!(outcome, LoginOutcome::Anonymous) {
        eprintln!("{}", outcome);
    }
    let session = outcome.into_session();

    let requested = resolution
        .username
        .or_else(|| session.as_ref().map(|s| s.username.clone()));

    let payload = match command {
        Command::Fetch { .. } => {
            let username = match requested {
                Some(username) => username,
                None => ui::prompt_username()?,
            };
            let record = ui::with_spinner("Fetching profile...", || match &session {
                Some(session) => fetch::fetch_authenticated_profile(&api, session, &username),
                None => fetch::fetch_public_profile(&api, &username),
            })?;
            Payload::Profile(record)
        }
        Command::Projects { limit, .. } => {
            let username = match requested {
                Some(username) => username,
                None => ui::prompt_username()?,
            };
            let projects = ui::with_spinner("Fetching projects...", || {
                fetch::list_projects(&api, &username, limit)
            })?;
            Payload::Projects { username, projects }
        }
        Command::Messages { limit, .. } => {
            let Some(active) = session.as_ref() else {
                return Err(Error::AuthenticationRequired.into());
            };
            let username = requested.unwrap_or_else(|| active.username.clone());
            let messages = ui::with_spinner("Fetching messages...", || {
                fetch::list_messages(&api, Some(active), &username, limit)
            })?;
            Payload::Messages { username, messages }
        }
    };

    if let Some(session) = &session {
        if store.save(session) {
            eprintln!("Saved session info to {}", store.path().display());
        }
    }

    let format = output::choose_format(
        opts.format,
        opts.json,
        opts.export.as_deref(),
        io::stdout().is_terminal(),
    );
    debug!(?format, export = ?opts.export, "rendering result");
    let rendered = output::render(&payload, format)?;
    let target = OutputTarget::from_export(opts.export.clone());
    output::deliver(rendered, &target, &mut io::stdout().lock())?;
    Ok(())
}
