// Entrypoint for the CLI application.
// - Keeps `main` small: parse the command line, create an API client and
//   hand both to the dispatcher.
// - Returns `anyhow::Result` so every failure prints a message and exits 1.

use clap::Parser;
use wechat_mp_cli::{api::ApiClient, cli};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Base URL comes from `WECHAT_API_BASE` or defaults to the production
    // host. See `api::ApiClient::from_env`.
    let api = ApiClient::from_env()?;

    cli::run(api, args.command)
}
