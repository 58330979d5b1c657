//! The library code for the `scriptorium` static site generator. A site is
//! a graph of three kinds of entities:
//!
//! 1. Posts ([`crate::post`]), one per Markdown, notebook, or HTML source
//!    file
//! 2. Tags ([`crate::tag`]), one per directory of the tags source directory,
//!    whose files link to their member posts
//! 3. The index ([`crate::index`]), which holds every post and tag in
//!    display order
//!
//! Posts and tags live in a [`store::Store`], which guarantees that each
//! source path maps to exactly one entity no matter how many times it's
//! referenced. Posts are cheap to construct: everything beyond the title
//! (history, summaries, rendered content) is computed on first use and
//! cached, because a post that belongs to N tags is rendered N+1 times.
//!
//! Rendering is driven by the index: every post at the site root, then every
//! tag page along with the tag's own copy of each member post, then the home
//! page, the feed, the sitemap, and the verification documents. See
//! [`build::build_site`] for the whole pipeline.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod charts;
pub mod config;
pub mod convert;
pub mod feed;
pub mod history;
pub mod index;
pub mod notebook;
pub mod post;
pub mod render;
pub mod sitemap;
pub mod store;
pub mod tag;
pub mod url;

#[cfg(test)]
mod testing;
