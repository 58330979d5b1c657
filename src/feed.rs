//! Support for creating the site's RSS feed from the [`Index`].

use crate::config::Author;
use crate::index::Index;
use crate::post::{self, Post};
use crate::render::Output;
use chrono::{NaiveDateTime, TimeZone, Utc};
use rss::{CategoryBuilder, ChannelBuilder, GuidBuilder, Item, ItemBuilder};
use thiserror::Error;

/// Builds the feed for every post in the index, newest first, and serializes
/// it.
pub fn feed(out: &Output, index: &Index) -> Result<Vec<u8>> {
    let mut items = Vec::with_capacity(index.posts().len());
    for id in index.posts() {
        items.push(item(out, out.store.post(*id))?);
    }

    let channel = ChannelBuilder::default()
        .title(out.site.title.clone())
        .link(out.url(""))
        .description(out.site.title.clone())
        .last_build_date(Some(rfc2822(&index.modified(out.store))))
        .generator(Some(env!("CARGO_PKG_NAME").to_owned()))
        .items(items)
        .build();

    Ok(channel.write_to(Vec::new())?)
}

fn item(out: &Output, post: &Post) -> Result<Item> {
    let url = out.url(post.uri());
    let categories = post
        .tags()
        .iter()
        .map(|id| {
            CategoryBuilder::default()
                .name(out.store.tag(*id).name().to_owned())
                .build()
        })
        .collect::<Vec<_>>();

    // Feed readers get the finished charts, not their tokens.
    let content = post.restore(post.content()?)?;

    Ok(ItemBuilder::default()
        .title(Some(post.title().to_owned()))
        .link(Some(url.clone()))
        .guid(Some(GuidBuilder::default().permalink(true).value(url).build()))
        .description(Some(post.summary_html()?.to_owned()))
        .content(Some(content))
        .pub_date(Some(rfc2822(&post.published())))
        .author(author(out.site.author.as_ref(), post.author()))
        .categories(categories)
        .build())
}

/// RSS wants `email (Name)`; without a site email there's no valid author.
fn author(site: Option<&Author>, name: &str) -> Option<String> {
    let email = site?.email.as_deref()?;
    Some(format!("{} ({})", email, name))
}

/// Timestamps are naive UTC throughout the build.
fn rfc2822(naive: &NaiveDateTime) -> String {
    Utc.from_utc_datetime(naive).to_rfc2822()
}

/// The result of building a feed.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating the feed.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a post's summary or content can't be rendered.
    #[error(transparent)]
    Post(#[from] post::Error),

    /// Returned when the feed can't be serialized.
    #[error("writing feed: {0}")]
    Rss(#[from] rss::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::convert::Cmark;
    use crate::render::{Renderer, Site};
    use crate::store::Store;
    use crate::testing::Recorded;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;

    #[test]
    fn test_author() {
        let site = Author {
            name: "Sam".to_owned(),
            email: Some("sam@example.com".to_owned()),
        };
        assert_eq!(
            Some("sam@example.com (Robin)".to_owned()),
            author(Some(&site), "Robin")
        );
        let anonymous = Author {
            name: "Sam".to_owned(),
            email: None,
        };
        assert_eq!(None, author(Some(&anonymous), "Robin"));
        assert_eq!(None, author(None, "Robin"));
    }

    #[test]
    fn test_feed_lists_posts_newest_first() -> Result<()> {
        let src = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let posts = src.path().join("posts");
        fs::create_dir(&posts).unwrap();
        fs::write(posts.join("old.md"), "# Old & dusty\n\nFirst words.\n").unwrap();
        fs::write(
            posts.join("new.md"),
            "# New\n\nLatest words.\n\n<script>Plotly.newPlot('n', [], {})</script>\n",
        )
        .unwrap();

        let history = Recorded::default()
            .with("old.md", "Sam", 2019)
            .with("new.md", "Sam", 2022);
        let mut store = Store::new(Rc::new(Cmark), Rc::new(history));
        let index = Index::load(&mut store, &posts, &src.path().join("tags"), out_dir.path())
            .unwrap();

        let renderer = Renderer::new(out_dir.path(), std::iter::empty::<&Path>()).unwrap();
        let site = Site {
            title: "Notes".to_owned(),
            root: url::Url::parse("https://example.com/blog/").unwrap(),
            author: Some(Author {
                name: "Sam".to_owned(),
                email: Some("sam@example.com".to_owned()),
            }),
        };
        let out = Output {
            store: &store,
            renderer: &renderer,
            site: &site,
            directory: out_dir.path(),
        };

        let xml = String::from_utf8(feed(&out, &index)?).unwrap();
        let new = xml.find("https://example.com/blog/new.html").unwrap();
        let old = xml.find("https://example.com/blog/old.html").unwrap();
        assert!(new < old);
        assert!(xml.contains("<rss"));
        assert!(xml.contains("<title>Notes</title>"));
        assert!(xml.contains("Old &amp; dusty"));
        assert!(xml.contains("sam@example.com (Sam)"));
        assert!(xml.contains("Sat, 01 Jan 2022 00:00:00 +0000"));
        assert!(xml.contains("plotly.js | MIT License"));
        assert!(!xml.contains("chart-placeholder"));
        Ok(())
    }
}
