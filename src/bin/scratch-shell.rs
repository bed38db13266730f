// Entrypoint for the interactive shell. Sets up the terminal, runs the
// single-page shell and always restores the terminal afterwards.

use std::io;
use std::sync::Arc;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use scratch_cli::{api::ApiClient, config, shell::Shell};

fn main() -> anyhow::Result<()> {
    // No subscriber here, so there is nobody to report a bad `.env` to.
    let _ = config::load_dotenv();
    let api = ApiClient::from_env()?;
    let mut shell = Shell::new(Arc::new(api));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = shell.run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result?;
    Ok(())
}
