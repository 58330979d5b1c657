//! Defines the [`Index`], the root of the site. The index discovers every
//! post and tag, fixes the global orderings, and drives the render pass:
//!
//! 1. every post, standalone, linked to its global neighbours;
//! 2. every tag page, which renders its members again in the tag directory,
//!    linked to their neighbours within the tag;
//! 3. the home page, the feed, the sitemap and the verification documents.
//!
//! A post that belongs to N tags is therefore written N+1 times.

use crate::feed;
use crate::post::{self, Format};
use crate::render::{date, object, Output};
use crate::sitemap;
use crate::store::{self, PostId, Store, TagId};
use crate::tag;
use chrono::{NaiveDateTime, Utc};
use gtmpl::Value;
use once_cell::unsync::OnceCell;
use std::path::Path;
use tracing::{info, warn};

/// The sitemap priority of the home page.
pub const PRIORITY: f64 = 1.0;

/// The name of the home page template.
pub const TEMPLATE: &str = "index.html";

/// The file name of the feed.
pub const FEED: &str = "feed.xml";

/// The file name of the sitemap.
pub const SITEMAP: &str = "sitemap.xml";

/// All posts and tags of the site, in display order.
#[derive(Debug)]
pub struct Index {
    /// Every post, newest first. Posts published at the same instant keep
    /// their discovery (file name) order.
    posts: Vec<PostId>,

    /// Every tag, largest first, then by name.
    tags: Vec<TagId>,

    value: OnceCell<Value>,
}

impl Index {
    /// Discovers the posts in `posts_directory` and the tags in
    /// `tags_directory` (each of which discovers its own members), and
    /// sorts everything. Tag output directories are prepared under
    /// `output`.
    pub fn load(
        store: &mut Store,
        posts_directory: &Path,
        tags_directory: &Path,
        output: &Path,
    ) -> store::Result<Index> {
        let mut posts = Vec::new();
        for path in tag::scan(posts_directory)? {
            let id = store.load_post(&path)?;
            if !posts.contains(&id) {
                posts.push(id);
            }
        }

        let mut tags = Vec::new();
        if tags_directory.is_dir() {
            for dir in subdirectories(tags_directory)? {
                tags.push(store.load_tag(&dir, output)?);
            }
        } else {
            warn!(path = %tags_directory.display(), "no tags directory; the site has no tags");
        }

        store.sort_post_tags();
        tags.sort_by(|a, b| tag::compare(store.tag(*a), store.tag(*b)));
        posts.sort_by(|a, b| store.post(*b).published().cmp(&store.post(*a).published()));

        info!(posts = posts.len(), tags = tags.len(), "discovered site");
        Ok(Index {
            posts,
            tags,
            value: OnceCell::new(),
        })
    }

    /// Every post, newest first.
    pub fn posts(&self) -> &[PostId] {
        &self.posts
    }

    /// Every tag, largest first.
    pub fn tags(&self) -> &[TagId] {
        &self.tags
    }

    pub fn priority(&self) -> f64 {
        PRIORITY
    }

    /// The most recent modification of any post, or now for an empty site.
    pub fn modified(&self, store: &Store) -> NaiveDateTime {
        self.posts
            .iter()
            .map(|id| store.post(*id).modified())
            .max()
            .unwrap_or_else(|| Utc::now().naive_utc())
    }

    /// The template value for the index: post and tag listings. Computed
    /// once and reused by every page that refers to the index.
    pub fn to_value(&self, out: &Output) -> post::Result<Value> {
        self.value
            .get_or_try_init(|| {
                let posts = self
                    .posts
                    .iter()
                    .map(|id| out.store.post(*id).summarize(out))
                    .collect::<post::Result<Vec<Value>>>()?;
                let tags = self
                    .tags
                    .iter()
                    .map(|id| out.store.tag(*id).summarize(out))
                    .collect();
                Ok(object(vec![
                    ("posts", Value::Array(posts)),
                    ("tags", Value::Array(tags)),
                    ("modified", date(&self.modified(out.store))),
                    ("url", Value::String(out.url(""))),
                ]))
            })
            .map(Value::clone)
    }

    /// Renders the whole site. `verification` names the documents passed
    /// through from the theme directory.
    pub fn render(&self, out: &Output, verification: &[String]) -> store::Result<()> {
        for (i, id) in self.posts.iter().enumerate() {
            let (next, prev) = neighbours(&self.posts, i);
            out.store.post(*id).render(
                out,
                Some(self),
                None,
                next.map(|id| out.store.post(id)),
                prev.map(|id| out.store.post(id)),
            )?;
        }
        info!(posts = self.posts.len(), "rendered posts");

        for id in &self.tags {
            out.store.tag(*id).render(out, self)?;
        }

        let value = self.to_value(out)?;
        let home = out.render(TEMPLATE, value.clone(), vec![("index", value)])?;
        out.write(Path::new(TEMPLATE), home)?;

        out.write(Path::new(FEED), feed::feed(out, self)?)?;
        out.write(Path::new(SITEMAP), sitemap::sitemap(out, self))?;
        info!("rendered home page, feed and sitemap");

        for name in verification {
            let document = out.renderer.render(name, Value::Nil)?;
            if document.is_empty() {
                warn!(document = %name, "verification document missing; writing an empty file");
            }
            out.write(Path::new(name), document)?;
        }
        Ok(())
    }
}

/// The neighbours of `items[i]` in a newest-first list: `next` is the newer
/// one (before it), `prev` the older one (after it).
pub fn neighbours<T: Copy>(items: &[T], i: usize) -> (Option<T>, Option<T>) {
    let next = if i > 0 { items.get(i - 1).copied() } else { None };
    let prev = items.get(i + 1).copied();
    (next, prev)
}

/// The subdirectories of `dir`, in name order.
fn subdirectories(dir: &Path) -> store::Result<Vec<std::path::PathBuf>> {
    let scan_err = |err| store::Error::Scan {
        path: dir.to_owned(),
        err,
    };

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(scan_err)? {
        let path = entry.map_err(scan_err)?.path();
        if path.is_dir() {
            dirs.push(path);
        } else if Format::from_path(&path).is_some() {
            warn!(path = %path.display(), "post outside of a tag directory; skipping");
        }
    }
    dirs.sort();
    Ok(dirs)
}
