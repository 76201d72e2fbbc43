mod app;

use crate::app::{Cli, Command};
use anyhow::Context;
use clap::Parser;
use nbgrade_notebook::Notebook;
use nbgrade_util::file_util;
use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Parse { input } => {
            let notebook = Notebook::from_path(&input)
                .with_context(|| format!("error reading {}", input.display()))?;
            println!("{} cells", notebook.cells.len());
            for cell in &notebook.cells {
                println!("{}: {}", cell.cell_type.as_str(), cell.source);
                println!("--");
            }
            println!(
                "nbformat {} minor {}",
                notebook.nbformat, notebook.nbformat_minor
            );
        }
        Command::Student {
            input,
            output,
            language,
            preamble,
        } => {
            let notebook = Notebook::from_path(&input)
                .with_context(|| format!("error reading {}", input.display()))?;
            let preamble = preamble
                .map(|path| {
                    file_util::read_file_to_string(&path)
                        .with_context(|| format!("error reading preamble {}", path.display()))
                })
                .transpose()?;
            let student =
                nbgrade_markup::to_student(&notebook, language.as_deref(), preamble.as_deref())
                    .context("error extracting student notebook")?;
            let bytes = student.to_bytes();
            match output {
                Some(path) => file_util::write_to_file_with_mode(&bytes, &path, 0o775)
                    .with_context(|| format!("error writing {}", path.display()))?,
                None => std::io::stdout()
                    .write_all(&bytes)
                    .context("error writing to stdout")?,
            }
        }
        Command::Autograder { input, output } => {
            let notebook = Notebook::from_path(&input)
                .with_context(|| format!("error reading {}", input.display()))?;
            let tree = nbgrade_markup::to_autograder(&notebook)
                .context("error extracting autograder assets")?;
            match output {
                Some(path) => tree
                    .write_to(&path)
                    .with_context(|| format!("error writing to {}", path.display()))?,
                None => {
                    println!("## Dry run mode. Would generate the following files:\n");
                    for file in &tree.files {
                        println!(
                            "-- {}/{}/{}:\n{}\n",
                            tree.assignment_id, file.exercise_id, file.filename, file.contents
                        );
                    }
                }
            }
        }
    }
    Ok(())
}
