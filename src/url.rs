//! Rewrites internal links in Markdown sources. Posts link to each other by
//! their source names (`[see also](other-post)` or `[see also](other-post.md)`)
//! and those links need to point at the rendered, root-relative output
//! (`/other-post.html`) before the Markdown is handed to a converter.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use url::Url;

const HTML_EXTENSION: &str = ".html";

/// The namespace shared static assets live under, both in the source links
/// and in the output directory.
pub const STATIC_PREFIX: &str = "static/";

/// Extensions of post sources. A link to any of these is a link to a post.
const POST_EXTENSIONS: &[&str] = &[".md", ".markdown", ".ipynb", ".html", ".htm"];

/// Matches the target of an inline Markdown link, `](target)` or
/// `](target "title")`.
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\]\(([^)\s]+)(\s+"[^"]*")?\)"#).unwrap());

/// Rewrites every inline link target in `markdown` with [`convert`].
pub fn rewrite_links(markdown: &str) -> Cow<'_, str> {
    LINK.replace_all(markdown, |caps: &Captures| {
        format!(
            "]({}{})",
            convert(&caps[1]),
            caps.get(2).map_or("", |title| title.as_str())
        )
    })
}

/// Converts a single link target. Absolute URLs (anything with a scheme),
/// fragment-only links, root-relative links and links into the static
/// namespace are returned unchanged. Anything else is taken to be relative to
/// the site root: post links get the `.html` extension, other assets keep
/// their own.
pub fn convert(target: &str) -> String {
    if is_absolute(target)
        || target.starts_with('#')
        || target.starts_with('/')
        || target.starts_with(STATIC_PREFIX)
    {
        return target.to_owned();
    }

    let (path, fragment) = match target.find('#') {
        Some(i) => target.split_at(i),
        None => (target, ""),
    };

    let mut path = path;
    while let Some(rest) = path.strip_prefix("./").or_else(|| path.strip_prefix("../")) {
        path = rest;
    }
    if path.starts_with(STATIC_PREFIX) {
        return format!("/{}{}", path, fragment);
    }

    match POST_EXTENSIONS.iter().find(|ext| path.ends_with(*ext)) {
        Some(ext) => format!(
            "/{}{}{}",
            &path[..path.len() - ext.len()],
            HTML_EXTENSION,
            fragment
        ),
        None if has_extension(path) => format!("/{}{}", path, fragment),
        None => format!("/{}{}{}", path, HTML_EXTENSION, fragment),
    }
}

fn is_absolute(target: &str) -> bool {
    Url::parse(target).is_ok()
}

fn has_extension(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    matches!(name.rfind('.'), Some(i) if i > 0)
}
