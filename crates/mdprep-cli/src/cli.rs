use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "mdprep - a pipeline driver that prepares molecular systems for simulation by \
             sequencing external structure-building, packing, and dynamics engines.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a preparation pipeline from a run configuration.
    Run(RunArgs),
    /// Validate a run configuration without launching any engine.
    Check(CheckArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the run configuration file in YAML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Working directory all artifacts are written into.
    #[arg(short, long, value_name = "PATH", default_value = ".")]
    pub workdir: PathBuf,

    /// Override the structure-building engine executable.
    #[arg(long, value_name = "PATH")]
    pub builder: Option<PathBuf>,

    /// Override the molecular dynamics engine executable.
    #[arg(long, value_name = "PATH")]
    pub dynamics: Option<PathBuf>,

    /// Override the molecular packing engine executable.
    #[arg(long, value_name = "PATH")]
    pub packer: Option<PathBuf>,

    /// Override the structure fetch command.
    #[arg(long, value_name = "PATH")]
    pub fetcher: Option<PathBuf>,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the run configuration file in YAML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_engine_overrides() {
        let cli = Cli::try_parse_from([
            "mdprep", "run", "--config", "run.yaml", "--workdir", "/tmp/w", "--builder",
            "/opt/psfgen",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("run.yaml"));
                assert_eq!(args.workdir, PathBuf::from("/tmp/w"));
                assert_eq!(args.builder, Some(PathBuf::from("/opt/psfgen")));
                assert!(args.dynamics.is_none());
            }
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn workdir_defaults_to_the_current_directory() {
        let cli = Cli::try_parse_from(["mdprep", "run", "--config", "run.yaml"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert_eq!(args.workdir, PathBuf::from(".")),
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["mdprep", "-q", "-v", "check", "--config", "x.yaml"]).is_err());
    }

    #[test]
    fn check_requires_a_config() {
        assert!(Cli::try_parse_from(["mdprep", "check"]).is_err());
    }
}
