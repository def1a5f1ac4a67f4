use std::path::PathBuf;

use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};

use crate::locator::RequiredVersion;

#[derive(Parser, Debug, Clone)]
#[command(name = "pyrun", about = "Run Python build scripts with the right interpreter", version)]
pub struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve a Python interpreter and run a script with it.
    Run(RunArgs),

    /// Print the interpreter command a run would use.
    Locate {
        #[command(flatten)]
        select: SelectArgs,

        /// Print the interpreter as JSON (`{"path": ..., "dispatch_args": [...]}`).
        #[arg(long)]
        json: bool,
    },

    /// Check that a path is Python of the given major version.
    Check {
        /// Interpreter file, or a directory containing one.
        #[arg(value_name = "HOME")]
        home: String,

        /// Expected major version.
        #[arg(long = "python-version", value_name = "N")]
        python_version: RequiredVersion,
    },

    /// List configured Python installations.
    Installations,
}

#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    /// Major Python version to run (defaults to DEFAULT_PYTHON_VERSION).
    #[arg(long = "python-version", value_name = "N")]
    pub python_version: Option<RequiredVersion>,

    /// Named installation to prefer over searching the node.
    #[arg(long)]
    pub installation: Option<String>,
}

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("script").args(["command", "file"]).required(true).multiple(false)))]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Python source to run.
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// Script file to run, relative to the workspace.
    #[arg(short = 'f', long)]
    pub file: Option<String>,

    /// Interpreter options placed before the script (e.g. "-u -W error").
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub options: String,

    /// Script arguments; $VAR and ${VAR} are expanded.
    #[arg(long = "args", default_value = "", allow_hyphen_values = true)]
    pub script_args: String,

    /// Working directory for the script (defaults to the current directory).
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Build variable passed to the script environment.
    #[arg(long = "env", value_name = "KEY=VALUE", action = ArgAction::Append, value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Do not echo the command line.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Seconds before the script is killed (0 = no limit, defaults to SCRIPT_TIMEOUT).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if k.is_empty() {
        return Err(format!("empty variable name in `{s}`"));
    }
    Ok((k.to_string(), v.to_string()))
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
