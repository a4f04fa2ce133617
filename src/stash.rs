use crate::command::{move_branch, Command, Outcome, ResetCommand};
use crate::commit::{CommitRecord, Ident};
use crate::error::{Error, Result};
use crate::fs::{CommandContext, GitFileSystem};
use crate::lock::GfsState;
use crate::paths::{abbreviate, shorten_ref_name};
use crate::store::ContentStore;
use crate::types::Signature;

/// Ref that [`stash_push`] points at the newest stash commit.
pub const STASH_REF: &str = "refs/stash";

/// Record the working tree as a commit on top of the head, without moving
/// anything.
///
/// Returns [`Outcome::NoChange`] and writes nothing when the working tree
/// matches the head tree. Neither the handle's status nor any ref is
/// touched; see [`stash_push`] for the full stash.
#[derive(Debug, Clone, Default)]
pub struct CreateStashCommand {
    /// Defaults to `index on <branch>: <abbrev> <subject>`.
    pub message: Option<String>,
    /// Defaults to the handle's signature.
    pub committer: Option<Signature>,
}

impl CreateStashCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }
}

impl Command for CreateStashCommand {
    type Output = Outcome;

    fn state(&self) -> GfsState {
        GfsState::CreatingStash
    }

    fn run<S: ContentStore>(self, ctx: &mut CommandContext<'_, S>) -> Result<Outcome> {
        let branch = ctx.require_branch()?;
        let parent = ctx.require_head()?;

        let tree = ctx.flush_working()?;
        if tree == parent.tree() {
            log::debug!("stash on {}: working tree clean", branch);
            return Ok(Outcome::NoChange);
        }

        let message = self.message.unwrap_or_else(|| {
            format!(
                "index on {}: {} {}",
                shorten_ref_name(&branch),
                abbreviate(parent.id, 7),
                parent.short_message()
            )
        });
        let committer = Ident::now(self.committer.as_ref().unwrap_or(ctx.signature()));
        let commit = CommitRecord {
            tree,
            parents: vec![parent.id],
            author: committer.clone(),
            committer,
            message,
        }
        .write(ctx.store())?;
        log::info!("created stash commit {} on {}", commit.id, branch);
        Ok(Outcome::Committed(commit))
    }
}

/// Stash the working tree: create the stash commit, point [`STASH_REF`] at
/// it, then hard-reset the handle to its head.
///
/// Each step runs as its own command, so another command may run in
/// between. A clean working tree returns [`Outcome::NoChange`] and moves
/// nothing.
pub fn stash_push<S: ContentStore>(fs: &GitFileSystem<S>, message: Option<&str>) -> Result<Outcome> {
    let mut command = CreateStashCommand::new();
    command.message = message.map(str::to_string);
    let outcome = fs.execute(command)?;
    let Some(stash) = outcome.commit() else {
        return Ok(outcome);
    };

    let store = fs.store();
    let previous = match store.resolve_ref(STASH_REF) {
        Ok(id) => Some(id),
        Err(Error::RefNotFound(_)) => None,
        Err(e) => return Err(e),
    };
    move_branch(
        store,
        STASH_REF,
        previous,
        stash.id,
        &format!("WIP {}", stash.short_message()),
    )?;
    fs.execute(ResetCommand::hard("HEAD"))?;
    Ok(outcome)
}
