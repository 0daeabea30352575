use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use hpl::modules;

/// Manage script modules under the HPL package directory.
#[derive(Parser, Debug)]
#[command(name = "hpl-pkg", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy a .hpl module file into the package directory.
    Add { file: PathBuf },
    /// Remove an installed module by name.
    Remove { name: String },
    /// List installed modules.
    List,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn packages_dir() -> Result<PathBuf> {
    let dir = modules::packages_dir().context("Cannot determine the home directory")?;
    fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;
    Ok(dir)
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Add { file } => {
            if file.extension().and_then(|ext| ext.to_str()) != Some("hpl") {
                bail!("Only .hpl module files can be installed");
            }
            let name = file
                .file_name()
                .context("Module file has no name")?
                .to_owned();
            let target = packages_dir()?.join(&name);
            fs::copy(&file, &target)
                .with_context(|| format!("Copying {} to {}", file.display(), target.display()))?;
            println!("Installed {}", name.to_string_lossy());
            Ok(())
        }
        Command::Remove { name } => {
            let target = packages_dir()?.join(format!("{name}.hpl"));
            if !target.exists() {
                bail!("Module '{name}' is not installed");
            }
            fs::remove_file(&target).with_context(|| format!("Removing {}", target.display()))?;
            println!("Removed {name}");
            Ok(())
        }
        Command::List => {
            let dir = packages_dir()?;
            let mut names = Vec::new();
            for entry in fs::read_dir(&dir).with_context(|| format!("Reading {}", dir.display()))? {
                let path = entry?.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("hpl") {
                    if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                        names.push(stem.to_string());
                    }
                }
            }
            names.sort();
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
    }
}
