//! cosim-config cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; cosim-config ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    /// Reject elements without a recognized datatype instead of reading them as null
    #[clap(long, global(true))]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a structured xml file and print it
    Parse(ParseCommand),

    /// Compile an action plan into argument vectors
    Compile(CompileCommand),

    /// Validate communication settings and print the port ranges
    #[command(alias = "comm")]
    CommSettings(CommSettingsCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ParseCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct CompileCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    /// Also resolve a services deployment file against the plan's variables
    #[clap(short = 's', long = "services-deployment")]
    pub services_deployment: Option<PathBuf>,

    /// Action plan xml
    pub plan: PathBuf,
}

#[derive(Parser, Debug)]
pub struct CommSettingsCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Registry state after loading a plan
    Variables { plan: PathBuf },
    /// Parsed tree of any structured xml file
    Tree { file: PathBuf },
}
