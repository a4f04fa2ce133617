//! `gfs`: inspect and update a git-backed filesystem from the shell.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use serde::Serialize;

use gfs::{
    commit::resolve_revision, stash_push, Commit, CommitCommand, DirEntry, Error, GitFileSystem,
    GitStore, Ident, MergeCommand, OpenOptions, Outcome, ResetCommand, ResetMode, Result,
};

#[derive(Parser, Debug)]
#[command(name = "gfs")]
#[command(version)]
#[command(about = "Mutable filesystem view over a bare git repository")]
struct Cli {
    /// Path to the bare repository.
    #[arg(short, long, env = "GFS_REPO")]
    repo: PathBuf,

    /// Branch to operate on (defaults to HEAD).
    #[arg(short, long, env = "GFS_BRANCH")]
    branch: Option<String>,

    /// Create the repository if it does not exist.
    #[arg(long)]
    create: bool,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the branch, head commit and root tree
    Status,

    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },

    /// Show a commit
    Show {
        #[arg(default_value = "HEAD")]
        rev: String,
    },

    /// Write local files into the tree and commit them
    Commit {
        #[arg(short, long)]
        message: String,
        #[arg(long)]
        amend: bool,
        #[arg(long)]
        allow_empty: bool,
        /// Files to write, as `LOCAL[:PATH]`.
        files: Vec<String>,
    },

    /// Write local files into the tree and stash them
    Stash {
        #[arg(short, long)]
        message: Option<String>,
        /// Files to write, as `LOCAL[:PATH]`.
        files: Vec<String>,
    },

    /// Merge a revision into the branch
    Merge {
        source: String,
        #[arg(short, long)]
        message: Option<String>,
        #[arg(long)]
        no_ff: bool,
    },

    /// Move the branch to a revision
    Reset {
        target: String,
        /// Keep working-tree contents.
        #[arg(long)]
        soft: bool,
    },
}

#[derive(Serialize)]
struct StatusOut {
    branch: Option<String>,
    head: Option<String>,
    tree: String,
}

#[derive(Serialize)]
struct EntryOut {
    name: String,
    mode: String,
    id: Option<String>,
}

impl From<DirEntry> for EntryOut {
    fn from(entry: DirEntry) -> Self {
        Self {
            name: entry.name,
            mode: entry.mode.to_string(),
            id: entry.id.map(|id| id.to_string()),
        }
    }
}

#[derive(Serialize)]
struct CommitOut {
    id: String,
    tree: String,
    parents: Vec<String>,
    author: String,
    date: Option<DateTime<FixedOffset>>,
    message: String,
}

impl From<&Commit> for CommitOut {
    fn from(commit: &Commit) -> Self {
        let author = &commit.record.author;
        Self {
            id: commit.id.to_string(),
            tree: commit.tree().to_string(),
            parents: commit.parents().iter().map(|p| p.to_string()).collect(),
            author: format!("{} <{}>", author.name, author.email),
            date: timestamp(author),
            message: commit.message().to_string(),
        }
    }
}

#[derive(Serialize)]
struct OutcomeOut {
    result: &'static str,
    commit: Option<CommitOut>,
}

fn timestamp(ident: &Ident) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(ident.offset_minutes * 60)?;
    DateTime::from_timestamp(ident.time, 0).map(|t| t.with_timezone(&offset))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(Error::git)?;
    println!("{}", text);
    Ok(())
}

fn print_commit(commit: &Commit, json: bool) -> Result<()> {
    let out = CommitOut::from(commit);
    if json {
        return print_json(&out);
    }
    println!("commit {}", out.id);
    for parent in &out.parents {
        println!("parent {}", parent);
    }
    println!("Author: {}", out.author);
    if let Some(date) = out.date {
        println!("Date:   {}", date.format("%a %b %e %H:%M:%S %Y %z"));
    }
    println!();
    for line in out.message.lines() {
        println!("    {}", line);
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    let result = match outcome {
        Outcome::Committed(_) => "committed",
        Outcome::FastForwarded(_) => "fast-forwarded",
        Outcome::NoChange => "no change",
    };
    if json {
        return print_json(&OutcomeOut {
            result,
            commit: outcome.commit().map(CommitOut::from),
        });
    }
    match outcome.commit() {
        Some(commit) => println!("{} {} {}", result, commit.id, commit.short_message()),
        None => println!("{}", result),
    }
    Ok(())
}

/// Write `LOCAL[:PATH]` arguments into the working tree.
fn stage_files(fs: &GitFileSystem<GitStore>, files: &[String]) -> Result<()> {
    for arg in files {
        let (local, dest) = match arg.split_once(':') {
            Some((local, dest)) => (local, dest.to_string()),
            None => (
                arg.as_str(),
                PathBuf::from(arg)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| Error::invalid_path(arg.clone()))?,
            ),
        };
        let data = std::fs::read(local).map_err(|e| Error::io(local, e))?;
        fs.write(&dest, &data)?;
        log::debug!("staged {} as {}", local, dest);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let store = GitStore::open(
        &cli.repo,
        OpenOptions {
            create: cli.create,
            branch: Some(cli.branch.clone().unwrap_or_else(|| "main".into())),
            ..Default::default()
        },
    )?;
    let fs = match &cli.branch {
        Some(branch) => GitFileSystem::open_branch(store, branch)?,
        None => GitFileSystem::open(store)?,
    };
    let json = cli.json;

    match cli.command {
        Commands::Status => {
            let status = fs.status();
            let out = StatusOut {
                branch: status.branch_name().map(String::from),
                head: status.head.map(|id| id.to_string()),
                tree: status.tree.to_string(),
            };
            if json {
                print_json(&out)?;
            } else {
                println!("branch {}", out.branch.as_deref().unwrap_or("(detached)"));
                println!("head   {}", out.head.as_deref().unwrap_or("(none)"));
                println!("tree   {}", out.tree);
            }
        }

        Commands::Ls { path } => {
            let entries: Vec<EntryOut> = fs.ls(&path)?.into_iter().map(EntryOut::from).collect();
            if json {
                print_json(&entries)?;
            } else {
                for entry in entries {
                    let id = entry.id.as_deref().unwrap_or("-");
                    println!("{} {} {}", entry.mode, id, entry.name);
                }
            }
        }

        Commands::Show { rev } => {
            let commit = match (rev.as_str(), fs.status().head) {
                ("HEAD", Some(id)) => Commit::load(fs.store(), id)?,
                ("HEAD", None) => return Err(Error::NoHeadCommit),
                (rev, _) => resolve_revision(fs.store(), rev)?,
            };
            print_commit(&commit, json)?;
        }

        Commands::Commit {
            message,
            amend,
            allow_empty,
            files,
        } => {
            stage_files(&fs, &files)?;
            let command = CommitCommand::new(message).amend(amend).allow_empty(allow_empty);
            print_outcome(&fs.execute(command)?, json)?;
        }

        Commands::Stash { message, files } => {
            stage_files(&fs, &files)?;
            print_outcome(&stash_push(&fs, message.as_deref())?, json)?;
        }

        Commands::Merge {
            source,
            message,
            no_ff,
        } => {
            let mut command = MergeCommand::new(source).no_ff(no_ff);
            command.message = message;
            print_outcome(&fs.execute(command)?, json)?;
        }

        Commands::Reset { target, soft } => {
            let mode = if soft { ResetMode::Soft } else { ResetMode::Hard };
            let commit = fs.execute(ResetCommand::new(target, mode))?;
            print_commit(&commit, json)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::MergeConflict(paths)) => {
            eprintln!("gfs: merge conflict in:");
            for path in paths {
                eprintln!("  {}", path);
            }
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("gfs: {}", e);
            ExitCode::from(2)
        }
    }
}
