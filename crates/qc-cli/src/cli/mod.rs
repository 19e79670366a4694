use clap::Parser;

pub mod global;
pub mod root_commands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::{Commands, GateCommands};

/// Top-level CLI parser for the `qcf` binary.
#[derive(Debug, Parser)]
#[command(name = "qcf", version, about = "qcflow - ordered QC for form visit submissions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project root path (defaults to auto-detect via .qcflow)
    #[arg(short, long, global = true)]
    pub project: Option<String>,
}

impl Cli {
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            quiet: self.quiet,
            verbose: self.verbose,
            project: self.project.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use pretty_assertions::assert_eq;

    use super::{Cli, Commands, GateCommands, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["qcf", "schema", "--format", "raw", "--quiet"])
            .expect("cli should parse");
        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Schema(_)));
    }

    #[test]
    fn output_format_rejects_table() {
        assert!(Cli::try_parse_from(["qcf", "--format", "table", "schema"]).is_err());
    }

    #[test]
    fn coordinate_takes_files() {
        let cli = Cli::try_parse_from(["qcf", "coordinate", "a.json", "b.json", "--check-all"])
            .expect("cli should parse");
        let Commands::Coordinate(args) = cli.command else {
            panic!("expected coordinate");
        };
        assert_eq!(args.files.len(), 2);
        assert!(args.check_all);
    }

    #[test]
    fn gate_subcommands() {
        let cli = Cli::try_parse_from(["qcf", "gate", "clear", "P1", "uds"])
            .expect("cli should parse");
        let Commands::Gate { action } = cli.command else {
            panic!("expected gate");
        };
        assert!(matches!(
            action,
            GateCommands::Clear { ref participant, ref module } if participant == "P1" && module == "uds"
        ));
    }

    #[test]
    fn project_flag_is_copied() {
        let cli = Cli::try_parse_from(["qcf", "--project", "/tmp/demo", "schedule"])
            .expect("cli should parse");
        assert_eq!(cli.global_flags().project.as_deref(), Some("/tmp/demo"));
    }
}
