use clap::{Parser, Subcommand, ValueEnum};

use crate::deadline::RunDuration;
use crate::input::parse_duration_arg;
use crate::profile::TestType;

#[derive(Parser, Debug)]
#[command(
    name = "stb-soak",
    about = "Long-duration soak tests for Android set-top boxes over ADB",
    version
)]
pub struct Cli {
    /// Defaults to the interactive menu
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pick profile, test, address and duration interactively
    Menu,

    /// Run one soak test without prompting
    Run {
        /// Catalog profile name (e.g., "project1")
        #[arg(long)]
        profile: String,

        #[arg(long, value_enum)]
        test: TestType,

        /// Device address, host or host:port
        #[arg(long)]
        address: String,

        /// 12h, 24h, or a number of seconds up to 432000
        #[arg(long, value_parser = parse_duration_arg)]
        duration: RunDuration,

        /// Transcript file label (defaults to log_<test>_<profile>)
        #[arg(long)]
        label: Option<String>,
    },

    /// List catalog profiles and their tests
    Profiles {
        #[arg(long)]
        json: bool,
    },

    /// List devices known to the ADB server
    Devices,

    /// Show project configuration
    Config {
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_menu() {
        let cli = Cli::try_parse_from(["stb-soak"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn run_parses_every_flag() {
        let cli = Cli::try_parse_from([
            "stb-soak",
            "-vv",
            "run",
            "--profile",
            "project2",
            "--test",
            "standby-wake",
            "--address",
            "192.168.1.50:5556",
            "--duration",
            "24h",
            "--label",
            "night shift",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Command::Run {
                profile,
                test,
                address,
                duration,
                label,
            }) => {
                assert_eq!(profile, "project2");
                assert_eq!(test, TestType::StandbyWake);
                assert_eq!(address, "192.168.1.50:5556");
                assert_eq!(duration, RunDuration::TWENTY_FOUR_HOURS);
                assert_eq!(label.as_deref(), Some("night shift"));
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn run_rejects_out_of_range_duration() {
        let err = Cli::try_parse_from([
            "stb-soak",
            "run",
            "--profile",
            "project1",
            "--test",
            "zapping",
            "--address",
            "10.0.0.2",
            "--duration",
            "432001",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn completions_accepts_supported_shells() {
        let cli = Cli::try_parse_from(["stb-soak", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Completions {
                shell: CompletionShell::Zsh
            })
        ));
        assert!(Cli::try_parse_from(["stb-soak", "completions", "tcsh"]).is_err());
    }
}
