// UI layer: terminal prompts and progress feedback for the CLI.
// Prompts use `dialoguer` and spinners use `indicatif`, both on stderr so
// stdout stays clean for piping. Nothing here prompts when stdin is not a
// terminal.

use std::io::{self, IsTerminal};
use std::time::Duration;

use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};

/// Whether we can talk to a human.
pub fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stderr().is_terminal()
}

/// Ask for the account to look up.
pub fn prompt_username() -> Result<String> {
    if !is_interactive() {
        return Err(Error::NoUsername);
    }
    let username: String = Input::new()
        .with_prompt("Scratch username to fetch")
        .interact_text()
        .map_err(|e| Error::Prompt(e.to_string()))?;
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::NoUsername);
    }
    Ok(username.to_string())
}

/// Browser login: the user signs in on the website and pastes the session
/// cookie back. `Password` keeps it off the screen.
pub fn browser_session_id(site_url: &str) -> Result<String> {
    if !is_interactive() {
        return Err(Error::Prompt(
            "browser login needs an interactive terminal".into(),
        ));
    }
    eprintln!("Log in at {}/login/ in your browser.", site_url.trim_end_matches('/'));
    eprintln!("Then copy the value of the `scratchsessionsid` cookie for that site.");
    let session_id = Password::new()
        .with_prompt("scratchsessionsid")
        .interact()
        .map_err(|e| Error::Prompt(e.to_string()))?;
    if session_id.trim().is_empty() {
        return Err(Error::Prompt("no session cookie entered".into()));
    }
    Ok(session_id)
}

/// Run `work` behind a spinner. The spinner is hidden when nobody is
/// watching.
pub fn with_spinner<T>(message: &str, work: impl FnOnce() -> T) -> T {
    let spinner = if is_interactive() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = work();
    spinner.finish_and_clear();
    result
}
