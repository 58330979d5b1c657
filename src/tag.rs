//! Defines the [`Tag`] type, which groups [`Post`]s. A tag is a directory in
//! the tags source directory whose files (usually symlinks into the posts
//! directory) are its members. The directory name is the tag name, with an
//! optional parenthesized long name: `python (the language)`.

use crate::index::{neighbours, Index};
use crate::post::{self, Post};
use crate::render::{date, object, optional, Output};
use crate::store::{self, PostId};
use crate::url::STATIC_PREFIX;
use chrono::NaiveDateTime;
use gtmpl::Value;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::info;

/// The sitemap priority of every tag page.
pub const PRIORITY: f64 = 0.8;

/// The name of the tag page template.
pub const TEMPLATE: &str = "tag.html";

/// A category of posts.
#[derive(Clone, Debug)]
pub struct Tag {
    /// The short name, used in URLs (slugified) and listings.
    name: String,

    /// The display name. Defaults to the short name.
    long_name: String,

    slug: String,

    /// The members, newest first. Fixed at construction.
    posts: Vec<PostId>,
}

impl Tag {
    /// Creates a tag for the directory `path` with the given members, which
    /// must already be sorted newest first.
    pub(crate) fn new(path: &Path, posts: Vec<PostId>) -> Tag {
        let dir_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (name, long_name) = parse_name(&dir_name);
        Tag {
            slug: slug::slugify(&name),
            name,
            long_name,
            posts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    /// The tag's directory name in the output.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// The tag page, relative to the site root.
    pub fn uri(&self) -> String {
        format!("{}/index.html", self.slug)
    }

    /// The members, newest first.
    pub fn posts(&self) -> &[PostId] {
        &self.posts
    }

    pub fn priority(&self) -> f64 {
        PRIORITY
    }

    /// The most recent modification of any member.
    pub fn modified(&self, store: &store::Store) -> Option<NaiveDateTime> {
        self.posts.iter().map(|id| store.post(*id).modified()).max()
    }

    /// Creates the tag's output directory and links the shared static
    /// directory into it, so pages rendered in the tag directory can use the
    /// same relative asset paths as pages at the root.
    pub(crate) fn prepare(&self, output: &Path) -> store::Result<()> {
        let dir = output.join(&self.slug);
        std::fs::create_dir_all(&dir).map_err(|err| store::Error::Prepare {
            path: dir.clone(),
            err,
        })?;

        let link = dir.join(STATIC_PREFIX.trim_end_matches('/'));
        if link.symlink_metadata().is_ok() {
            return Ok(());
        }
        let target = Path::new("..").join(STATIC_PREFIX.trim_end_matches('/'));
        symlink_dir(&target, &link).map_err(|err| store::Error::Prepare { path: link, err })
    }

    /// The template value for listings and references from posts.
    pub fn summarize(&self, out: &Output) -> Value {
        let uri = self.uri();
        object(vec![
            ("name", Value::String(self.name.clone())),
            ("long_name", Value::String(self.long_name.clone())),
            ("slug", Value::String(self.slug.clone())),
            ("url", Value::String(out.url(&uri))),
            ("uri", Value::String(uri)),
            ("count", Value::from(self.posts.len() as i64)),
            (
                "modified",
                optional(self.modified(out.store).as_ref().map(date)),
            ),
        ])
    }

    /// The template value for the tag page: the summary fields plus the
    /// member posts.
    pub fn to_value(&self, out: &Output) -> post::Result<Value> {
        let mut value = self.summarize(out);
        if let Value::Object(obj) = &mut value {
            let posts = self
                .posts
                .iter()
                .map(|id| out.store.post(*id).summarize(out))
                .collect::<post::Result<Vec<Value>>>()?;
            obj.insert("posts".to_owned(), Value::Array(posts));
        }
        Ok(value)
    }

    /// Renders the tag page (featuring the newest member) and every member
    /// post in the tag's directory, with next/previous links following the
    /// tag's own ordering.
    pub fn render(&self, out: &Output, index: &Index) -> store::Result<()> {
        let featured = self.posts.first().map(|id| out.store.post(*id));
        let document = out.render(
            TEMPLATE,
            self.to_value(out)?,
            vec![
                ("index", index.to_value(out)?),
                (
                    "post",
                    optional(match featured {
                        Some(post) => Some(post.to_value(out)?),
                        None => None,
                    }),
                ),
            ],
        )?;
        // The featured post's content carries its chart tokens.
        let document = match featured {
            Some(post) => post.restore(&document)?,
            None => document,
        };
        out.write(&Path::new(&self.slug).join("index.html"), document)?;

        for (i, id) in self.posts.iter().enumerate() {
            let (next, prev) = neighbours(&self.posts, i);
            let post: &Post = out.store.post(*id);
            post.render(
                out,
                Some(index),
                Some(self),
                next.map(|id| out.store.post(id)),
                prev.map(|id| out.store.post(id)),
            )?;
        }
        info!(tag = %self.name, posts = self.posts.len(), "rendered tag");
        Ok(())
    }
}

/// Orders tags by descending post count, then by name.
pub fn compare(a: &Tag, b: &Tag) -> Ordering {
    b.posts
        .len()
        .cmp(&a.posts.len())
        .then_with(|| a.name.cmp(&b.name))
}

/// Splits a tag directory name into its short name and long name. The long
/// name is the parenthesized suffix, if any; otherwise it's the short name.
pub fn parse_name(dir_name: &str) -> (String, String) {
    let dir_name = dir_name.trim();
    if let (Some(open), true) = (dir_name.find('('), dir_name.ends_with(')')) {
        let name = dir_name[..open].trim();
        let long_name = dir_name[open + 1..dir_name.len() - 1].trim();
        if !name.is_empty() && !long_name.is_empty() {
            return (name.to_owned(), long_name.to_owned());
        }
    }
    (dir_name.to_owned(), dir_name.to_owned())
}

/// Lists the post source files directly inside `dir`, in file-name order.
/// Subdirectories and files that aren't posts are skipped.
pub(crate) fn scan(dir: &Path) -> store::Result<Vec<PathBuf>> {
    let scan_err = |err| store::Error::Scan {
        path: dir.to_owned(),
        err,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(scan_err)? {
        let path = entry.map_err(scan_err)?.path();
        if path.is_file() && post::Format::from_path(&path).is_some() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink_dir(_target: &Path, link: &Path) -> std::io::Result<()> {
    tracing::warn!(link = %link.display(), "symlinks unsupported; tag pages won't find static assets");
    Ok(())
}
