use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Run the admission checks on visit records without storing them.
    Preprocess(PreprocessArgs),
    /// Store visit files and validate their participants' visits in date order.
    Coordinate(CoordinateArgs),
    /// Store one visit file and validate it in-process against the gate.
    Check(CheckArgs),
    /// Drain queued project files through the submission pipeline.
    Schedule,
    /// Inspect or reset failure gates.
    Gate {
        #[command(subcommand)]
        action: GateCommands,
    },
    /// Print JSON Schemas of stored state and reports.
    Schema(SchemaArgs),
}

#[derive(Clone, Debug, Args)]
pub struct PreprocessArgs {
    /// JSON file with one visit object or an array of them.
    pub file: PathBuf,
    /// Module settings to use instead of each record's module.
    #[arg(long)]
    pub module: Option<String>,
}

/// Dataset a stored visit belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum DatasetArg {
    Current,
    Legacy,
}

#[derive(Clone, Debug, Args)]
pub struct CoordinateArgs {
    /// Visit files (one JSON object each) to store and queue.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Re-validate earlier visits per the configured recheck policy.
    #[arg(long)]
    pub check_all: bool,
    /// Store the files only, without validation.
    #[arg(long)]
    pub store_only: bool,
    /// Dataset to store into (legacy implies --store-only).
    #[arg(long, value_enum, default_value = "current")]
    pub dataset: DatasetArg,
}

#[derive(Clone, Debug, Args)]
pub struct CheckArgs {
    /// Visit file (one JSON object).
    pub file: PathBuf,
    /// Acquisition holding the file. Defaults to the file stem.
    #[arg(long)]
    pub container: Option<String>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum GateCommands {
    /// Show the recorded failure for a participant/module.
    Show { participant: String, module: String },
    /// Remove the recorded failure for a participant/module.
    Clear { participant: String, module: String },
}

#[derive(Clone, Debug, Args)]
pub struct SchemaArgs {
    /// Schema name; lists the names when omitted.
    pub name: Option<String>,
}
