//! FHIRPath CLI executable
//!
//! Evaluates FHIRPath expressions against FHIR resources and applies
//! FHIRPath Patch documents. See the cli module documentation for usage.

use anyhow::Context;
use atrius_fhir_path::cli::{Cli, Command, init_logging, run_cli};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let action = match &cli.command {
        Command::Eval(args) => format!("evaluating '{}'", args.expression),
        Command::Patch(args) => format!("applying patch {}", args.patch.display()),
    };
    run_cli(cli).with_context(|| format!("failed {}", action))?;
    Ok(())
}
