//! docvec command line.
//!
//! ```bash
//! docvec --root ~/notes refresh
//! docvec search notes/ownership.md --threshold 0.6
//! docvec search "how do lifetimes work"
//! docvec chat "what did the design review decide?"
//! ```
//!
//! Configuration is resolved in order, later sources overriding earlier:
//! 1. Built-in defaults
//! 2. Config file (`--config`, else `<config dir>/docvec/config.toml` when present)
//! 3. `--root` and `--provider`

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_logging(&cli.log_level);
    commands::run(cli).await
}
