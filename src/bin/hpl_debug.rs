use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hpl::document;
use hpl::evaluator::{Evaluator, StdConsole};
use hpl::modules::ModuleLoader;

/// Run an HPL script and print an error report on failure.
///
/// The report consumes only the evaluator's failure snapshot: error,
/// call-stack chain, and the scopes at the failure point.
#[derive(Parser, Debug)]
#[command(name = "hpl-debug", version, about, long_about = None)]
struct Args {
    /// Script to run.
    script: PathBuf,

    /// Include local and global scope snapshots in the report.
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    match run_script(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_script(args: &Args) -> Result<()> {
    let verbose = args.verbose || std::env::var("HPL_DEBUG").is_ok_and(|value| value == "1");

    let loader = ModuleLoader::shared();
    if let Some(dir) = args.script.parent() {
        loader.borrow_mut().set_script_dir(dir);
    }

    let search_paths = loader.borrow().search_paths();
    let document = document::load_file(&args.script, &search_paths)
        .with_context(|| format!("Loading {}", args.script.display()))?;

    let mut evaluator = Evaluator::new(document, loader, Box::new(StdConsole));
    if let Err(error) = evaluator.run() {
        match evaluator.failure() {
            Some(snapshot) => eprint!("{}", snapshot.render(verbose)),
            None => eprintln!("Error: {error}"),
        }
        return Err(error.into());
    }
    Ok(())
}
