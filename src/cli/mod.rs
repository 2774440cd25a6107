//! CLI argument definitions for Faena.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Faena - construction scheduling from the command line.
///
/// Works against a local SQLite backend by default, or the hosted service
/// with `--backend remote`.
#[derive(Parser, Debug)]
#[command(name = "faena")]
#[command(author, version, long_version = long_version(), about = "Construction scheduling: month/week grid, matrix overrides, parametric sync and signed documents", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Data directory holding config.kdl, state.kdl and the local database
    #[arg(long, global = true, env = "FAENA_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Backend to use: local or remote
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Base URL of the hosted service (overrides config and FAENA_REMOTE_URL)
    #[arg(long, global = true)]
    pub remote_url: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("FAENA_GIT_COMMIT"),
        ", built ",
        env!("FAENA_BUILD_TIMESTAMP"),
        ")"
    )
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Month/week grid math
    Weeks {
        #[command(subcommand)]
        command: WeeksCommands,
    },

    /// Manual matrix overrides
    Override {
        #[command(subcommand)]
        command: OverrideCommands,
    },

    /// Timeline reference lines
    Refline {
        #[command(subcommand)]
        command: ReflineCommands,
    },

    /// Gantt activities derived from the parametric budget
    Activity {
        #[command(subcommand)]
        command: ActivityCommands,
    },

    /// Parametric budget management
    Budget {
        #[command(subcommand)]
        command: BudgetCommands,
    },

    /// Monthly matrix with overrides applied
    Matrix {
        #[command(subcommand)]
        command: MatrixCommands,
    },

    /// Issue a signed URL for a stored document
    Sign {
        /// Storage bucket
        #[arg(long)]
        bucket: String,

        /// Object path inside the bucket
        #[arg(long)]
        path: String,

        /// URL lifetime in seconds (defaults to signed-url-ttl)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Push notification payloads
    Push {
        #[command(subcommand)]
        command: PushCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Month/week positions are written MONTH/WEEK, e.g. `3/2`.
#[derive(Subcommand, Debug)]
pub enum WeeksCommands {
    /// List every month/week cell in an inclusive range
    Expand { start: String, end: String },

    /// Count the weeks in an inclusive range
    Between { start: String, end: String },

    /// Check that a range is on the grid and not inverted
    Validate { start: String, end: String },
}

#[derive(Subcommand, Debug)]
pub enum OverrideCommands {
    /// List overrides of a project
    List {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
    },

    /// Set the override of one cell
    Set {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
        /// Calendar month as YYYYMM
        #[arg(long)]
        month: String,
        /// Matrix row (usually a mayor id)
        #[arg(long)]
        concept: String,
        /// Amount, e.g. "1,250.50"
        value: String,
    },

    /// Remove the override of one cell
    Rm {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
        #[arg(long)]
        month: String,
        #[arg(long)]
        concept: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReflineCommands {
    /// List reference lines of a plan with their marker positions
    List {
        #[arg(long)]
        plan: String,
        /// Project start date (YYYY-MM-DD); defaults to the first of this month
        #[arg(long)]
        start: Option<String>,
        /// Number of month columns in the layout
        #[arg(long, default_value = "12")]
        months: u32,
    },

    /// Add a reference line
    Add {
        #[arg(long)]
        plan: String,
        /// Position as MONTH/WEEK
        #[arg(long)]
        at: String,
        #[arg(long, default_value = "")]
        label: String,
        /// CSS color
        #[arg(long)]
        color: Option<String>,
    },

    /// Move or relabel a reference line
    Update {
        id: String,
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },

    /// Remove a reference line
    Rm { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ActivityCommands {
    /// List activities of a project
    List {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BudgetCommands {
    /// Replace the parametric budget from a JSON file and resync the schedule
    Set {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
        /// JSON array of budget lines
        #[arg(long)]
        file: PathBuf,
    },

    /// Show the parametric budget of a project
    Show {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
        /// Discount subtracted from the total, e.g. "5,000"
        #[arg(long)]
        discount: Option<String>,
    },

    /// Re-derive the schedule from the current budget
    Sync {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum MatrixCommands {
    /// Show computed values with overrides applied
    Show {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: String,
        /// Project start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum PushCommands {
    /// Decode a push payload and show where a click navigates
    Decode { payload: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each came from
    Show,

    /// Set a config.kdl or state.kdl key (empty value unsets)
    Set { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_override_set() {
        let cli = Cli::try_parse_from([
            "faena", "-H", "override", "set", "--client", "c1", "--project", "p1", "--month", "202501",
            "--concept", "M1", "1,000",
        ])
        .unwrap();
        assert!(cli.human_readable);
        match cli.command {
            Commands::Override {
                command: OverrideCommands::Set { month, value, .. },
            } => {
                assert_eq!(month, "202501");
                assert_eq!(value, "1,000");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["faena", "weeks", "between", "1/1", "2/2", "--backend", "remote"]).unwrap();
        assert_eq!(cli.backend.as_deref(), Some("remote"));
    }
}
