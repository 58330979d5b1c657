//! Defines the [`Store`], the registry that owns every [`Post`] and [`Tag`]
//! of a build. Entities are keyed by their canonical source path, so asking
//! for the same path twice (for example, a post file and a tag directory's
//! symlink to it) yields the same entity. Everything else refers to entities
//! by [`PostId`] and [`TagId`].

use crate::convert::ContentConverter;
use crate::history::History;
use crate::post::{self, Post};
use crate::render;
use crate::tag::{self, Tag};
use crate::feed;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// Identifies a [`Post`] within its [`Store`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostId(usize);

/// Identifies a [`Tag`] within its [`Store`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(usize);

/// Owns the posts and tags of one build.
pub struct Store {
    converter: Rc<dyn ContentConverter>,
    history: Rc<dyn History>,
    posts: Vec<Post>,
    post_ids: HashMap<PathBuf, PostId>,
    tags: Vec<Tag>,
    tag_ids: HashMap<PathBuf, TagId>,
}

impl Store {
    /// Creates an empty store whose posts convert content with `converter`
    /// and look up authorship in `history`.
    pub fn new(converter: Rc<dyn ContentConverter>, history: Rc<dyn History>) -> Store {
        Store {
            converter,
            history,
            posts: Vec::new(),
            post_ids: HashMap::new(),
            tags: Vec::new(),
            tag_ids: HashMap::new(),
        }
    }

    /// Returns the post for `path`, loading it on first reference.
    pub fn load_post(&mut self, path: &Path) -> Result<PostId> {
        let key = canonical(path)?;
        if let Some(id) = self.post_ids.get(&key) {
            return Ok(*id);
        }

        let post = Post::load(&key, self.converter.clone(), self.history.clone())?;
        let id = PostId(self.posts.len());
        self.posts.push(post);
        self.post_ids.insert(key, id);
        Ok(id)
    }

    /// Returns the tag for the directory `dir`, loading it on first
    /// reference. Loading a tag discovers its member posts, links them back
    /// to the tag, and prepares the tag's directory under `output`.
    pub fn load_tag(&mut self, dir: &Path, output: &Path) -> Result<TagId> {
        let key = canonical(dir)?;
        if let Some(id) = self.tag_ids.get(&key) {
            return Ok(*id);
        }

        let mut members = Vec::new();
        for path in tag::scan(&key)? {
            let post = self.load_post(&path)?;
            if !members.contains(&post) {
                members.push(post);
            }
        }
        members.sort_by(|a, b| self.post(*b).published().cmp(&self.post(*a).published()));

        let tag = Tag::new(&key, members);
        tag.prepare(output)?;
        debug!(tag = tag.name(), posts = tag.posts().len(), "loaded tag");

        let id = TagId(self.tags.len());
        for post in tag.posts() {
            self.posts[post.0].tags.push(id);
        }
        self.tags.push(tag);
        self.tag_ids.insert(key, id);
        self.sort_post_tags();
        Ok(id)
    }

    /// Sorts every post's tags by descending post count, then name. The
    /// order depends on the sizes of all tags, so it's only final once every
    /// tag has been loaded.
    pub fn sort_post_tags(&mut self) {
        let tags = &self.tags;
        for post in &mut self.posts {
            post.tags
                .sort_by(|a, b| tag::compare(&tags[a.0], &tags[b.0]));
        }
    }

    pub fn post(&self, id: PostId) -> &Post {
        &self.posts[id.0]
    }

    pub fn tag(&self, id: TagId) -> &Tag {
        &self.tags[id.0]
    }

    /// The number of posts loaded so far.
    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    /// The number of tags loaded so far.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|err| Error::Scan {
        path: path.to_owned(),
        err,
    })
}

/// The result of a fallible operation on the entity graph.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error discovering, linking, or rendering posts and tags.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a post fails to load or render.
    #[error(transparent)]
    Post(#[from] post::Error),

    /// Returned for I/O problems reading source directories.
    #[error("scanning `{}`: {err}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned for I/O problems preparing output directories.
    #[error("preparing output directory `{}`: {err}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a page, listing, or passthrough document fails to
    /// render or write.
    #[error(transparent)]
    Render(#[from] render::Error),

    /// Returned when the feed can't be built.
    #[error(transparent)]
    Feed(#[from] feed::Error),
}
