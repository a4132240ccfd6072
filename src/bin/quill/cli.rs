//! CLI argument handling for the `quill` driver.

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level of the toolchain.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// Only critical errors.
    #[default]
    #[value(alias("0"))]
    Error,
    #[value(alias("1"))]
    Warn,
    #[value(alias("2"))]
    Info,
    #[value(alias("3"))]
    Debug,
    /// Everything, including per-token parser traces.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile a Quill source file and run it in the JIT.
    Run(RunArgs),

    /// Compile a Quill source file to a module image.
    Build(BuildArgs),

    /// Read statements interactively, then run them.
    Repl,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// The Quill source file.
    #[arg(index = 1)]
    pub file: std::path::PathBuf,

    /// Print the parsed AST as JSON before generation.
    #[arg(long)]
    pub dump_ast: bool,

    /// Print the token stream and stop.
    #[arg(long)]
    pub dump_tokens: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// The Quill source file.
    #[arg(index = 1)]
    pub file: std::path::PathBuf,

    /// Where to write the module image.
    #[arg(short, long)]
    pub output: std::path::PathBuf,
}
