//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DEFAULT_CONFIG_PATH, DEFAULT_DB_PATH};
use crate::source::LogSource;

#[derive(Parser)]
#[command(name = "banisher")]
#[command(author, version, about = "Bans IPv4 addresses that misbehave in your logs")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Started by systemd: omit timestamps, the journal adds them
    #[arg(long, global = true)]
    pub systemd: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon: follow logs and ban offenders
    Run {
        /// Ban database file, or ":memory:" for bans that do not survive a restart
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: PathBuf,

        /// Log source: journal, stdin, or file:<path>
        #[arg(long, default_value = "journal")]
        source: LogSource,
    },

    /// List stored bans and their remaining time
    List {
        /// Ban database file
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration file
    Check {
        /// Print a commented example configuration instead
        #[arg(long)]
        example: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["banisher", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/banisher/config.yml"));
        match cli.command {
            Commands::Run { db, source } => {
                assert_eq!(db, PathBuf::from("/var/lib/banisher/db.redb"));
                assert_eq!(source, LogSource::Journal);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_with_memory_db_and_file_source() {
        let cli = Cli::try_parse_from([
            "banisher",
            "--systemd",
            "run",
            "--db",
            ":memory:",
            "--source",
            "file:/var/log/auth.log",
        ])
        .unwrap();
        assert!(cli.systemd);
        match cli.command {
            Commands::Run { db, source } => {
                assert_eq!(db, PathBuf::from(":memory:"));
                assert_eq!(source, LogSource::File(PathBuf::from("/var/log/auth.log")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_invalid_source_rejected() {
        assert!(Cli::try_parse_from(["banisher", "run", "--source", "syslog"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["banisher", "list", "--json", "-v", "-c", "/tmp/b.yml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("/tmp/b.yml"));
        assert!(matches!(cli.command, Commands::List { json: true, .. }));
    }
}
