//! Spanvault CLI — operator front end for the backup-chain engine
//!
//! The engine core never parses arguments, walks directories or prints
//! progress; all of that lives here. Subcommands:
//!
//! - `init`: initialize (or reuse) a volume at a directory
//! - `backup`: run or resume a backup across one or more volumes
//! - `plan`: check whether attached volumes can reconstruct a chain
//! - `restore`: reconstruct a chain into an output directory
//! - `show`: list what a volume's catalog holds

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spanvault", version, about = "Spanning backup across removable volumes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a directory as a volume
    Init {
        /// Volume root directory
        dir: PathBuf,
        /// Fail if the directory already holds a catalog instead of reusing it
        #[arg(long)]
        fresh: bool,
    },

    /// Run or resume a backup
    Backup {
        /// Directory or file to back up; may be given multiple times
        #[arg(short = 'b', long = "backup", required = true)]
        backup_paths: Vec<PathBuf>,

        /// Volume root to back up onto, in order of use; may be given
        /// multiple times
        #[arg(short = 's', long = "storage")]
        volumes: Vec<PathBuf>,

        /// Resume an interrupted run from its journal
        #[arg(short = 'r', long = "resume-using")]
        resume_log: Option<PathBuf>,

        /// Directory to create the run journal in
        #[arg(long, default_value = ".")]
        journal_dir: PathBuf,

        /// Name stored with the chain
        #[arg(long)]
        name: Option<String>,

        /// Comment stored with the chain
        #[arg(long)]
        comment: Option<String>,

        /// Resume even if the journal was written by a different host
        #[arg(long)]
        allow_host_mismatch: bool,

        /// On resume, abandon the open segment's progress and restart it
        /// on a newly presented volume (the original volume is lost)
        #[arg(long)]
        force_new_volume: bool,
    },

    /// Check whether attached volumes can reconstruct a chain
    Plan {
        /// Chain uuid
        chain: String,
        /// Volume roots to consider
        #[arg(short = 's', long = "storage", required = true)]
        volumes: Vec<PathBuf>,
    },

    /// Reconstruct a chain into an output directory
    Restore {
        /// Chain uuid
        chain: String,
        /// Volume roots to restore from
        #[arg(short = 's', long = "storage", required = true)]
        volumes: Vec<PathBuf>,
        /// Directory to restore into
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// Restore whatever segments are present even if the chain is
        /// incomplete
        #[arg(long)]
        partial: bool,
    },

    /// List a volume's identity and sealed segments
    Show {
        /// Volume root directory
        volume: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Init { dir, fresh } => commands::init(&dir, fresh),
        Command::Backup {
            backup_paths,
            volumes,
            resume_log,
            journal_dir,
            name,
            comment,
            allow_host_mismatch,
            force_new_volume,
        } => commands::backup(commands::BackupArgs {
            backup_paths,
            volumes,
            resume_log,
            journal_dir,
            name,
            comment,
            allow_host_mismatch,
            force_new_volume,
        }),
        Command::Plan { chain, volumes } => commands::plan(&chain, &volumes),
        Command::Restore {
            chain,
            volumes,
            output,
            partial,
        } => commands::restore(&chain, &volumes, &output, partial),
        Command::Show { volume } => commands::show(&volume),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
