//! Defines the [`History`] trait, which supplies the version-control facts
//! about a post source file (who wrote it and when), and [`Git`], the
//! implementation that asks `git log`.
//!
//! History is best-effort: a file that isn't committed yet, a directory that
//! isn't a repository, or a machine without `git` all degrade to
//! [`Revision::fallback`] rather than failing the build.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// The author reported for posts without any commit history.
pub const ANONYMOUS: &str = "Anonymous";

/// The version-control facts about a single source file. Timestamps are naive
/// UTC instants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    /// The author of the commit that added the file.
    pub author: String,

    /// The author date of the commit that added the file.
    pub published: NaiveDateTime,

    /// The author date of the most recent commit touching the file.
    pub modified: NaiveDateTime,
}

impl Revision {
    /// The revision reported when no history is available: an anonymous
    /// author, published and modified now.
    pub fn fallback() -> Revision {
        let now = Utc::now().naive_utc();
        Revision {
            author: ANONYMOUS.to_owned(),
            published: now,
            modified: now,
        }
    }
}

/// Looks up the [`Revision`] of a source file. Implementations never fail;
/// missing information is replaced by [`Revision::fallback`] values.
pub trait History {
    fn revision(&self, path: &Path) -> Revision;
}

/// [`History`] backed by the `git` executable. Each lookup runs `git log` in
/// the file's directory.
#[derive(Clone, Copy, Debug, Default)]
pub struct Git;

impl History for Git {
    fn revision(&self, path: &Path) -> Revision {
        let fallback = Revision::fallback();

        // `--follow` keeps the history across renames, so the last entry is
        // the commit that first added the file.
        let added = git_log(path, &["--follow", "--diff-filter=A", "--format=%aI%x09%an"])
            .and_then(|out| out.lines().last().map(str::to_owned))
            .and_then(|line| {
                let (date, author) = line.split_once('\t')?;
                Some((parse_date(date)?, author.trim().to_owned()))
            });
        let modified = git_log(path, &["-1", "--format=%aI"])
            .and_then(|out| out.lines().next().and_then(parse_date));

        if added.is_none() {
            warn!(path = %path.display(), "no commit history; using fallback author and dates");
        }

        let (published, author) = match added {
            Some((date, author)) if !author.is_empty() => (date, author),
            Some((date, _)) => (date, fallback.author),
            None => (fallback.published, fallback.author),
        };

        Revision {
            author,
            published,
            modified: modified.unwrap_or(fallback.modified),
        }
    }
}

/// Runs `git log <args> -- <file>` from the file's directory and returns its
/// trimmed stdout, or `None` if git couldn't run, exited unsuccessfully, or
/// printed nothing.
fn git_log(path: &Path, args: &[&str]) -> Option<String> {
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty())?;
    let file_name = path.file_name()?;

    let output = Command::new("git")
        .current_dir(dir)
        .arg("log")
        .args(args)
        .arg("--")
        .arg(file_name)
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            if stdout.is_empty() {
                None
            } else {
                Some(stdout)
            }
        }
        Ok(output) => {
            debug!(
                path = %path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git log failed"
            );
            None
        }
        Err(err) => {
            debug!(path = %path.display(), %err, "couldn't run git");
            None
        }
    }
}

/// Parses a strict ISO-8601 author date (`%aI`) into a naive UTC instant.
fn parse_date(s: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|date| date.naive_utc())
}
