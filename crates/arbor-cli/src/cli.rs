use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: content-addressed filesystem tree repositories",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Show informational log output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init,
    /// Manage remote mirrors
    Remote(RemoteArgs),
    /// Check the repository for consistency
    Fsck(FsckArgs),
}

#[derive(Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub action: RemoteAction,
}

#[derive(Subcommand)]
pub enum RemoteAction {
    /// Add or replace a remote
    Add { name: String, url: String },
    /// List configured remotes
    List,
}

#[derive(Args)]
pub struct FsckArgs {
    /// Only print error messages
    #[arg(short, long)]
    pub quiet: bool,

    /// Remove corrupted objects
    #[arg(long)]
    pub delete: bool,

    /// Add tombstones for commits whose parent is missing
    #[arg(long)]
    pub add_tombstones: bool,

    /// Download missing or corrupted files from this remote; `-` for all
    #[arg(long = "repair-from-remote", value_name = "NAME")]
    pub repair_from_remote: Vec<String>,

    /// Per-download timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fsck_defaults() {
        let cli = Cli::try_parse_from(["arbor", "fsck"]).unwrap();
        assert_eq!(cli.repo, PathBuf::from("."));
        if let Command::Fsck(args) = cli.command {
            assert!(!args.quiet && !args.delete && !args.add_tombstones);
            assert!(args.repair_from_remote.is_empty());
            assert_eq!(args.timeout, 60);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_fsck_flags() {
        let cli = Cli::try_parse_from([
            "arbor",
            "--repo",
            "/srv/repo",
            "fsck",
            "-q",
            "--delete",
            "--add-tombstones",
            "--repair-from-remote",
            "origin",
            "--repair-from-remote",
            "backup",
        ])
        .unwrap();
        assert_eq!(cli.repo, PathBuf::from("/srv/repo"));
        if let Command::Fsck(args) = cli.command {
            assert!(args.quiet && args.delete && args.add_tombstones);
            assert_eq!(args.repair_from_remote, vec!["origin", "backup"]);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_all_remotes_dash() {
        let cli = Cli::try_parse_from(["arbor", "fsck", "--repair-from-remote", "-"]).unwrap();
        if let Command::Fsck(args) = cli.command {
            assert_eq!(args.repair_from_remote, vec!["-"]);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_remote_add() {
        let cli = Cli::try_parse_from(["arbor", "remote", "add", "origin", "http://m"]).unwrap();
        if let Command::Remote(RemoteArgs { action: RemoteAction::Add { name, url } }) = cli.command {
            assert_eq!(name, "origin");
            assert_eq!(url, "http://m");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn global_verbose_after_subcommand() {
        let cli = Cli::try_parse_from(["arbor", "fsck", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
