//! The authoring-time command line: derives student notebooks and autograder
//! asset trees from master notebooks.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
    name = "nbgrade",
    version,
    about = "Produce student notebooks and autograder assets from master notebooks",
    subcommand_required(true),
    arg_required_else_help(true)
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Parser)]
pub enum Command {
    /// Try parsing the input master notebook and print a cell summary
    Parse {
        /// The file name of the input master notebook.
        #[clap(long)]
        input: PathBuf,
    },
    /// Extract the student notebook
    Student {
        /// The file name of the input master notebook.
        #[clap(long)]
        input: PathBuf,
        /// The output file name. If empty, output is written to stdout.
        #[clap(long)]
        output: Option<PathBuf>,
        /// Two-letter language filter for **lang:xx** tagged cells.
        #[clap(long)]
        language: Option<String>,
        /// A file with a code cell to prepend to the student notebook.
        #[clap(long)]
        preamble: Option<PathBuf>,
    },
    /// Extract the autograder asset tree
    Autograder {
        /// The file name of the input master notebook.
        #[clap(long)]
        input: PathBuf,
        /// The output directory. If empty, a dry-run listing is printed.
        #[clap(long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_student_command() {
        let cli = Cli::parse_from([
            "nbgrade",
            "student",
            "--input",
            "master.ipynb",
            "--output",
            "student.ipynb",
            "--language",
            "en",
        ]);
        match cli.command {
            Command::Student {
                input,
                output,
                language,
                preamble,
            } => {
                assert_eq!(input, PathBuf::from("master.ipynb"));
                assert_eq!(output, Some(PathBuf::from("student.ipynb")));
                assert_eq!(language.as_deref(), Some("en"));
                assert!(preamble.is_none());
            }
            _ => panic!("wrong command"),
        }
    }
}
