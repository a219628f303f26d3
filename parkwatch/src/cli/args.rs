//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Parkwatch - parking gate entry/exit tracker
#[derive(Parser, Debug)]
#[command(name = "parkwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Ledger file (CSV)
    #[arg(
        long,
        env = "PARKWATCH_LEDGER",
        default_value = "parking_data.csv",
        global = true
    )]
    pub ledger: PathBuf,

    /// Number of parking slots in the lot
    #[arg(
        long,
        env = "PARKWATCH_SLOTS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    pub slots: u32,

    // === Mirror Options ===
    /// Base URL of the remote mirror (Firebase Realtime Database style)
    #[arg(long, env = "PARKWATCH_MIRROR_URL", global = true)]
    pub mirror_url: Option<String>,

    /// Auth token appended to mirror requests
    #[arg(long, env = "PARKWATCH_MIRROR_AUTH", hide_env_values = true, global = true)]
    pub mirror_auth: Option<String>,

    // === Provider Options ===
    /// Shell command that captures a frame into {output}; exit 1 to cancel
    #[arg(long, env = "PARKWATCH_CAPTURE_CMD", global = true)]
    pub capture_cmd: Option<String>,

    /// Shell command that prints the plate found in {image}
    #[arg(long, env = "PARKWATCH_RECOGNIZE_CMD", global = true)]
    pub recognize_cmd: Option<String>,

    /// Seconds a capture or recognition may take
    #[arg(
        long,
        env = "PARKWATCH_PROVIDER_TIMEOUT",
        default_value_t = 30,
        global = true
    )]
    pub provider_timeout: u64,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute (defaults to the interactive console)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the interactive gate console
    Run,

    /// Record a car arriving without the camera
    Entry {
        /// Plate number (spaces are ignored)
        #[arg(required = true, trailing_var_arg = true)]
        plate: Vec<String>,
    },

    /// Record a car leaving without the camera
    Exit {
        /// Plate number (spaces are ignored)
        #[arg(required = true, trailing_var_arg = true)]
        plate: Vec<String>,
    },

    /// Show slot occupancy
    Status,

    /// Show past and current sessions, newest first
    History {
        /// Only sessions for this plate
        #[arg(short, long)]
        plate: Option<String>,

        /// Maximum number of sessions to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plate_words_are_collected() {
        let cli = Cli::try_parse_from(["parkwatch", "entry", "AB", "123"]).unwrap();
        match cli.command {
            Some(Commands::Entry { plate }) => assert_eq!(plate, vec!["AB", "123"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["parkwatch", "status", "--slots", "4"]).unwrap();
        assert_eq!(cli.slots, 4);
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn provider_options_after_run() {
        let cli = Cli::try_parse_from([
            "parkwatch",
            "run",
            "--capture-cmd",
            "grab {output}",
            "--recognize-cmd",
            "read-plate {image}",
            "--provider-timeout",
            "5",
        ])
        .unwrap();

        assert!(matches!(cli.command, Some(Commands::Run)));
        assert_eq!(cli.capture_cmd.as_deref(), Some("grab {output}"));
        assert_eq!(cli.recognize_cmd.as_deref(), Some("read-plate {image}"));
        assert_eq!(cli.provider_timeout, 5);
    }

    #[test]
    fn no_subcommand_means_console() {
        let cli = Cli::try_parse_from(["parkwatch"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn entry_requires_plate() {
        assert!(Cli::try_parse_from(["parkwatch", "exit"]).is_err());
    }
}
