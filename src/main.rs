// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, set up logging and hand over to
//   the dispatcher in `cli`.
// - `.env` is read before logging starts so it can carry `RUST_LOG`.
// - Failures are printed and the process still exits normally.

use clap::Parser;
use scratch_cli::{
    cli::{self, Cli},
    config,
    logging::{self, Verbosity},
};

fn main() -> anyhow::Result<()> {
    let dotenv = config::load_dotenv();
    let args = Cli::parse();
    logging::init(Verbosity::from_debug_flag(args.opts.debug));
    config::report_dotenv(&dotenv);

    if let Err(e) = cli::run(args) {
        tracing::debug!(error = ?e, "command failed");
        println!("Error: {:#}", e);
    }
    Ok(())
}
