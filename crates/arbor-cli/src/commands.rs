use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use tracing::debug;

use arbor_fsck::{run_fsck, Cancellable, FsckOptions, FsckStatus, HttpFetcher, RepairRemotes};
use arbor_store::{FsObjectStore, ObjectStore};

use crate::cli::{Cli, Command, FsckArgs, RemoteAction, RemoteArgs};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init => cmd_init(&cli.repo),
        Command::Remote(args) => cmd_remote(&cli.repo, args),
        Command::Fsck(args) => cmd_fsck(&cli.repo, args),
    }
}

fn open(repo: &Path) -> anyhow::Result<FsObjectStore> {
    FsObjectStore::open(repo)
        .with_context(|| format!("failed to open repository at {}", repo.display()))
}

fn cmd_init(repo: &Path) -> anyhow::Result<()> {
    FsObjectStore::init(repo)
        .with_context(|| format!("failed to create repository at {}", repo.display()))?;
    println!(
        "{} Initialized Arbor repository in {}",
        "✓".green().bold(),
        repo.display().to_string().bold()
    );
    Ok(())
}

fn cmd_remote(repo: &Path, args: RemoteArgs) -> anyhow::Result<()> {
    let store = open(repo)?;
    match args.action {
        RemoteAction::Add { name, url } => {
            store.add_remote(&name, &url)?;
            println!("{} Added remote {} ({})", "✓".green(), name.bold(), url);
        }
        RemoteAction::List => {
            for name in store.remote_list()? {
                println!("{}\t{}", name, store.remote_base_url(&name)?);
            }
        }
    }
    Ok(())
}

fn cmd_fsck(repo: &Path, args: FsckArgs) -> anyhow::Result<()> {
    let store = open(repo)?;
    let options = FsckOptions {
        quiet: args.quiet,
        delete_on_corrupt: args.delete,
        add_tombstones: args.add_tombstones,
        repair_remotes: RepairRemotes::from_args(&args.repair_from_remote)?,
    };
    debug!(repo = %repo.display(), ?options, "starting fsck");
    let fetcher = HttpFetcher::new(Duration::from_secs(args.timeout))?;
    let report = run_fsck(&store, &fetcher, &options, &Cancellable::new())?;

    match report.status() {
        FsckStatus::Ok => {
            if !args.quiet {
                let repaired = report.repaired.len();
                let suffix = if repaired > 0 {
                    format!(", {} repaired", repaired.to_string().yellow())
                } else {
                    String::new()
                };
                println!(
                    "{} {} objects verified{}",
                    "✓".green().bold(),
                    report.objects_checked,
                    suffix
                );
            }
            Ok(())
        }
        FsckStatus::CorruptionFound => anyhow::bail!("Repository corruption encountered"),
    }
}
