// Library root
// ------------
// The two binaries (`scratch-cli` and `scratch-shell`) are thin wrappers
// around these modules.
//
// Module responsibilities:
// - `api`: HTTP client for the Scratch endpoints, the `ScratchApi`
//   capability trait and the `Session` type.
// - `credentials`: picks username and login method from flags, environment,
//   config profile and saved session, then performs the one login attempt.
// - `session`: saves, loads and forgets the session between runs.
// - `config`: named profiles of defaults and `.env` loading.
// - `fetch`: profile, project and message records.
// - `output`: json / yaml / csv / human-readable rendering and export.
// - `ui`: terminal prompts and spinners for the CLI.
// - `cli`: argument definitions and the dispatcher.
// - `shell`: the interactive single-page shell and its background worker.
pub mod api;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod output;
pub mod session;
pub mod shell;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
