//! Test doubles for the build pipeline's collaborators.

use crate::convert::{self, Cmark, ContentConverter};
use crate::history::{History, Revision};
use chrono::{NaiveDate, NaiveDateTime};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;

/// A [`ContentConverter`] that delegates to [`Cmark`] and counts its calls.
#[derive(Default)]
pub struct Counting {
    calls: Cell<usize>,
}

impl Counting {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ContentConverter for Counting {
    fn markdown_to_html(&self, markdown: &str) -> convert::Result<String> {
        self.calls.set(self.calls.get() + 1);
        Cmark.markdown_to_html(markdown)
    }
}

/// A [`History`] with canned revisions keyed by file name. Unknown files get
/// [`Revision::fallback`], like uncommitted files do with git.
#[derive(Default)]
pub struct Recorded {
    revisions: HashMap<String, Revision>,
    lookups: Cell<usize>,
}

impl Recorded {
    /// Records a revision published and modified on January 1st of `year`.
    pub fn with(self, file_name: &str, author: &str, year: i32) -> Recorded {
        self.with_date(file_name, author, at(year, 1, 1))
    }

    /// Records a revision published and modified at `date`.
    pub fn with_date(mut self, file_name: &str, author: &str, date: NaiveDateTime) -> Recorded {
        self.revisions.insert(
            file_name.to_owned(),
            Revision {
                author: author.to_owned(),
                published: date,
                modified: date,
            },
        );
        self
    }

    /// The number of revisions looked up so far.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }
}

impl History for Recorded {
    fn revision(&self, path: &Path) -> Revision {
        self.lookups.set(self.lookups.get() + 1);
        path.file_name()
            .and_then(|name| self.revisions.get(&*name.to_string_lossy()))
            .cloned()
            .unwrap_or_else(Revision::fallback)
    }
}

/// Midnight on the given day.
pub fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap()
}
