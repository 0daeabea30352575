use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hpl::document;
use hpl::evaluator::{Evaluator, StdConsole};
use hpl::modules::ModuleLoader;

/// Interpreter for the HPL scripting language.
#[derive(Parser, Debug)]
#[command(name = "hpl", version, about, long_about = None)]
struct Args {
    /// Script to run.
    script: PathBuf,
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
    let loader = ModuleLoader::shared();
    if let Some(dir) = args.script.parent() {
        loader.borrow_mut().set_script_dir(dir);
    }

    let search_paths = loader.borrow().search_paths();
    let document = document::load_file(&args.script, &search_paths)
        .with_context(|| format!("Loading {}", args.script.display()))?;

    let mut evaluator = Evaluator::new(document, loader, Box::new(StdConsole));
    let result = evaluator.run();

    if let Err(error) = result {
        if std::env::var("HPL_DEBUG").is_ok_and(|value| value == "1") {
            if let Some(snapshot) = evaluator.failure() {
                eprint!("{}", snapshot.render(true));
            }
        }
        return Err(error.into());
    }
    Ok(())
}
