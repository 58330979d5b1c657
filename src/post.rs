//! Defines the [`Post`] entity and its [`Format`]s. A post is constructed
//! cheaply from its source file (only the title is extracted eagerly, so a
//! post without a title fails fast); every other derived value is computed on
//! first access and cached for the life of the post. See [`Post::to_value`]
//! and [`Post::summarize`] for how posts are converted into template values.

use crate::charts::Charts;
use crate::convert::{self, ContentConverter};
use crate::history::{History, Revision};
use crate::index::Index;
use crate::notebook::{self, Notebook};
use crate::render::{self, date, object, optional, Output};
use crate::store::TagId;
use crate::tag::Tag;
use crate::url::rewrite_links;
use chrono::NaiveDateTime;
use gtmpl::Value;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// The sitemap priority of every post.
pub const PRIORITY: f64 = 0.5;

/// The name of the post template.
pub const TEMPLATE: &str = "post.html";

/// Matches a leading heading element in an HTML post.
static HTML_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*<h[1-6][^>]*>(.*?)</h[1-6]>").unwrap());

/// Matches any tag, for the plain-text summary.
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// The source formats a post can be written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Markdown,
    Notebook,
    Html,
}

impl Format {
    /// Maps a source path to its format by extension. Returns `None` for
    /// files that aren't posts.
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(Format::Markdown),
            "ipynb" => Some(Format::Notebook),
            "html" | "htm" => Some(Format::Html),
            _ => None,
        }
    }
}

/// The format-specific part of a post: its body, with the title removed.
enum Source {
    Markdown(String),
    Notebook(Notebook),
    Html(String),
}

/// The rendered body of a post and what rendering it revealed.
struct Body {
    html: String,
    charts: Charts,
    needs_math: bool,
}

struct Summary {
    html: String,
    text: String,
}

/// One article, backed by one source file.
pub struct Post {
    path: PathBuf,
    slug: String,
    uri: String,
    title: String,
    source: Source,

    /// The post's tags, sorted by descending size and then name once every
    /// tag is known.
    pub(crate) tags: Vec<TagId>,

    converter: Rc<dyn ContentConverter>,
    history: Rc<dyn History>,

    revision: OnceCell<Revision>,
    summary: OnceCell<Summary>,
    body: OnceCell<Body>,
}

impl fmt::Debug for Post {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Post")
            .field("path", &self.path)
            .field("title", &self.title)
            .field("tags", &self.tags)
            .finish()
    }
}

impl Post {
    /// Reads the post at `path` and extracts its title. Everything else is
    /// deferred until first use.
    pub fn load(
        path: &Path,
        converter: Rc<dyn ContentConverter>,
        history: Rc<dyn History>,
    ) -> Result<Post> {
        let format = Format::from_path(path).ok_or_else(|| Error::UnknownFormat(path.to_owned()))?;
        let text = std::fs::read_to_string(path).map_err(|err| Error::Read {
            path: path.to_owned(),
            err,
        })?;

        let (title, source) = match format {
            Format::Markdown => {
                let title = text
                    .lines()
                    .find(|line| !line.trim().is_empty())
                    .and_then(notebook::heading)
                    .ok_or_else(|| Error::MissingTitle(path.to_owned()))?;
                (title, Source::Markdown(notebook::strip_title(&text)))
            }
            Format::Notebook => {
                let nb = Notebook::parse(&text).map_err(|err| Error::Notebook {
                    path: path.to_owned(),
                    err,
                })?;
                let title = nb.title().ok_or_else(|| Error::MissingTitle(path.to_owned()))?;
                (title, Source::Notebook(nb.body()))
            }
            Format::Html => match HTML_TITLE.captures(&text) {
                Some(caps) => (
                    strip_tags(&caps[1]).trim().to_owned(),
                    Source::Html(text[caps[0].len()..].to_owned()),
                ),
                None => (stem(path), Source::Html(text.clone())),
            },
        };

        let slug = slug::slugify(stem(path));
        debug!(path = %path.display(), %slug, "loaded post");
        Ok(Post {
            path: path.to_owned(),
            uri: format!("{}.html", slug),
            slug,
            title,
            source,
            tags: Vec::new(),
            converter,
            history,
            revision: OnceCell::new(),
            summary: OnceCell::new(),
            body: OnceCell::new(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The stable, filename-derived identifier.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// The output file name, relative to the site root or a tag directory.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn priority(&self) -> f64 {
        PRIORITY
    }

    /// The post's tags, most popular first.
    pub fn tags(&self) -> &[TagId] {
        &self.tags
    }

    fn revision(&self) -> &Revision {
        self.revision
            .get_or_init(|| self.history.revision(&self.path))
    }

    pub fn author(&self) -> &str {
        &self.revision().author
    }

    pub fn published(&self) -> NaiveDateTime {
        self.revision().published
    }

    pub fn modified(&self) -> NaiveDateTime {
        self.revision().modified
    }

    /// The first paragraph after the title, as HTML.
    pub fn summary_html(&self) -> Result<&str> {
        Ok(&self.summary()?.html)
    }

    /// The first paragraph after the title with the markup stripped.
    pub fn summary_text(&self) -> Result<&str> {
        Ok(&self.summary()?.text)
    }

    /// The full rendered body. Chart payloads are still tokens here; they're
    /// restored when the page is rendered.
    pub fn content(&self) -> Result<&str> {
        Ok(&self.body()?.html)
    }

    /// Returns `true` if the post contains math that needs a typesetting
    /// library.
    pub fn needs_math(&self) -> Result<bool> {
        Ok(self.body()?.needs_math)
    }

    /// Returns `true` if the post embeds interactive charts.
    pub fn has_charts(&self) -> Result<bool> {
        Ok(!self.body()?.charts.is_empty())
    }

    fn summary(&self) -> Result<&Summary> {
        self.summary.get_or_try_init(|| {
            let html = match &self.source {
                Source::Markdown(body) => self.convert(&first_paragraph(body))?,
                Source::Notebook(nb) => self.convert(&first_paragraph(&nb.markdown()))?,
                Source::Html(body) => first_paragraph(body),
            };
            let text = strip_tags(&html).trim().to_owned();
            Ok(Summary { html, text })
        })
    }

    fn body(&self) -> Result<&Body> {
        self.body.get_or_try_init(|| {
            debug!(path = %self.path.display(), "rendering content");
            let mut charts = Charts::default();
            let (html, needs_math) = match &self.source {
                // Scripts are pulled out of the converted HTML, so a script
                // shown in a code block stays escaped text.
                Source::Markdown(body) => {
                    let html = charts.extract_scripts(&self.convert(body)?);
                    (html, notebook::has_math(body))
                }
                Source::Notebook(nb) => {
                    let html = nb
                        .to_html(self.converter.as_ref(), &mut charts)
                        .map_err(|err| Error::Notebook {
                            path: self.path.clone(),
                            err,
                        })?;
                    (html, nb.needs_math())
                }
                Source::Html(body) => (body.clone(), notebook::has_math(body)),
            };
            Ok(Body {
                html,
                charts,
                needs_math,
            })
        })
    }

    fn convert(&self, markdown: &str) -> Result<String> {
        self.converter
            .markdown_to_html(&rewrite_links(markdown))
            .map_err(|err| Error::Convert {
                path: self.path.clone(),
                err,
            })
    }

    /// Substitutes this post's chart tokens in `document` (any page or feed
    /// entry that embeds the post's content) with the finished payloads.
    pub fn restore(&self, document: &str) -> Result<String> {
        Ok(self.body()?.charts.restore(document))
    }

    /// The template value for listings: enough to link to the post and
    /// describe it, without the full content.
    pub fn summarize(&self, out: &Output) -> Result<Value> {
        Ok(object(vec![
            ("title", Value::String(self.title.clone())),
            ("slug", Value::String(self.slug.clone())),
            ("uri", Value::String(self.uri.clone())),
            ("url", Value::String(out.url(&self.uri))),
            ("author", Value::String(self.author().to_owned())),
            ("published", date(&self.published())),
            ("modified", date(&self.modified())),
            ("summary", Value::String(self.summary_html()?.to_owned())),
            ("summary_text", Value::String(self.summary_text()?.to_owned())),
            (
                "tags",
                Value::Array(
                    self.tags
                        .iter()
                        .map(|id| out.store.tag(*id).summarize(out))
                        .collect(),
                ),
            ),
        ]))
    }

    /// The template value for the post page: the summary fields plus the
    /// content and rendering flags.
    pub fn to_value(&self, out: &Output) -> Result<Value> {
        let mut value = self.summarize(out)?;
        if let Value::Object(obj) = &mut value {
            obj.insert("content".to_owned(), Value::String(self.content()?.to_owned()));
            obj.insert("needs_math".to_owned(), Value::Bool(self.needs_math()?));
            obj.insert("has_charts".to_owned(), Value::Bool(self.has_charts()?));
            obj.insert("priority".to_owned(), Value::from(PRIORITY));
        }
        Ok(value)
    }

    /// Renders the post page and writes it to `{uri}`, or to `{tag}/{uri}`
    /// when rendered in the context of a tag. `next` is the newer and `prev`
    /// the older neighbour in whichever ordering the page belongs to.
    pub fn render(
        &self,
        out: &Output,
        index: Option<&Index>,
        tag: Option<&Tag>,
        next: Option<&Post>,
        prev: Option<&Post>,
    ) -> Result<()> {
        let sibling = |post: Option<&Post>| -> Result<Value> {
            Ok(optional(match post {
                Some(post) => Some(post.summarize(out)?),
                None => None,
            }))
        };

        let document = out.render(
            TEMPLATE,
            self.to_value(out)?,
            vec![
                (
                    "index",
                    optional(match index {
                        Some(index) => Some(index.to_value(out)?),
                        None => None,
                    }),
                ),
                ("tag", optional(tag.map(|tag| tag.summarize(out)))),
                ("next", sibling(next)?),
                ("prev", sibling(prev)?),
                ("needs_math", Value::Bool(self.needs_math()?)),
                ("has_charts", Value::Bool(self.has_charts()?)),
            ],
        )?;
        let document = self.restore(&document)?;

        let relative = match tag {
            Some(tag) => Path::new(tag.slug()).join(&self.uri),
            None => PathBuf::from(&self.uri),
        };
        out.write(&relative, document)?;
        Ok(())
    }
}

/// The first paragraph (run of non-blank lines) of `text`.
fn first_paragraph(text: &str) -> String {
    text.lines()
        .skip_while(|line| line.trim().is_empty())
        .take_while(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Removes anything that looks like a tag. This is not an HTML parser:
/// markup with `>` inside attribute values comes out mangled.
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Represents the result of a [`Post`] operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading, converting, or rendering a [`Post`].
#[derive(Debug, Error)]
pub enum Error {
    /// Returned for files whose extension isn't a post format.
    #[error("`{}` is not a post (unrecognized extension)", .0.display())]
    UnknownFormat(PathBuf),

    /// Returned when the source file can't be read.
    #[error("reading post `{}`: {err}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a Markdown or notebook post doesn't start with a
    /// heading line.
    #[error("post `{}` has no title: its first line must be a `#` heading", .0.display())]
    MissingTitle(PathBuf),

    /// Returned when a notebook is malformed or can't be rendered.
    #[error("notebook `{}`: {err}", .path.display())]
    Notebook {
        path: PathBuf,
        #[source]
        err: notebook::Error,
    },

    /// Returned when the content converter fails.
    #[error("converting post `{}`: {err}", .path.display())]
    Convert {
        path: PathBuf,
        #[source]
        err: convert::Error,
    },

    /// Returned when templating or writing the page fails.
    #[error(transparent)]
    Render(#[from] render::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::convert::Cmark;
    use crate::history::ANONYMOUS;
    use crate::testing::{Counting, Recorded};
    use std::fs;

    fn load(dir: &Path, name: &str, contents: &str) -> Result<Post> {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        Post::load(&path, Rc::new(Cmark), Rc::new(Recorded::default()))
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(Some(Format::Markdown), Format::from_path(Path::new("a/b.md")));
        assert_eq!(Some(Format::Notebook), Format::from_path(Path::new("b.IPYNB")));
        assert_eq!(Some(Format::Html), Format::from_path(Path::new("b.htm")));
        assert_eq!(None, Format::from_path(Path::new("b.txt")));
        assert_eq!(None, Format::from_path(Path::new("README")));
    }

    #[test]
    fn test_markdown_post() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(
            dir.path(),
            "Hello World.md",
            "\n# Hello, world!\n\nThe *first* paragraph\ncontinues here.\n\nThe second.\n",
        )?;
        assert_eq!("Hello, world!", post.title());
        assert_eq!("hello-world", post.slug());
        assert_eq!("hello-world.html", post.uri());
        assert_eq!(
            "<p>The <em>first</em> paragraph\ncontinues here.</p>\n",
            post.summary_html()?
        );
        assert_eq!("The first paragraph\ncontinues here.", post.summary_text()?);
        assert!(post.content()?.contains("<p>The second.</p>"));
        assert!(!post.content()?.contains("Hello, world!"));
        Ok(())
    }

    #[test]
    fn test_missing_title_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        match load(dir.path(), "untitled.md", "No heading here.\n") {
            Err(Error::MissingTitle(path)) => assert!(path.ends_with("untitled.md")),
            other => panic!("wanted MissingTitle, got {:?}", other),
        }
    }

    #[test]
    fn test_markdown_links_are_rewritten() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(
            dir.path(),
            "links.md",
            "# Links\n\nSee [x](other-post) and [y](https://example.com).\n",
        )?;
        let content = post.content()?;
        assert!(content.contains(r#"<a href="/other-post.html">x</a>"#));
        assert!(content.contains(r#"<a href="https://example.com">y</a>"#));
        Ok(())
    }

    #[test]
    fn test_content_is_converted_once() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cached.md");
        fs::write(&path, "# Cached\n\nBody.\n").unwrap();
        let converter = Rc::new(Counting::default());
        let post = Post::load(&path, converter.clone(), Rc::new(Recorded::default()))?;

        assert_eq!(0, converter.calls());
        let first = post.content()?.as_ptr();
        assert_eq!(1, converter.calls());
        let second = post.content()?.as_ptr();
        assert_eq!(1, converter.calls());
        assert_eq!(first, second);

        let title = post.title().as_ptr();
        assert_eq!(title, post.title().as_ptr());
        assert_eq!(1, converter.calls());
        Ok(())
    }

    #[test]
    fn test_history_is_queried_once() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dated.md");
        fs::write(&path, "# Dated\n").unwrap();
        let history = Rc::new(Recorded::default().with("dated.md", "Robin", 2020));
        let post = Post::load(&path, Rc::new(Cmark), history.clone())?;

        assert_eq!("Robin", post.author());
        assert_eq!(2020, chrono::Datelike::year(&post.published()));
        let _ = post.modified();
        assert_eq!(1, history.lookups());
        Ok(())
    }

    #[test]
    fn test_unknown_history_falls_back() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(dir.path(), "new.md", "# New\n")?;
        assert_eq!(ANONYMOUS, post.author());
        Ok(())
    }

    #[test]
    fn test_markdown_scripts_become_charts() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(
            dir.path(),
            "chart.md",
            "# Chart\n\nIntro.\n\n<script>Plotly.newPlot('a', [], {})</script>\n\nwhere $x_1$ grows\n",
        )?;
        assert!(post.has_charts()?);
        assert!(post.needs_math()?);
        assert!(post.content()?.contains("<!--chart-placeholder-0-->"));
        assert!(!post.content()?.contains("Plotly.newPlot"));
        Ok(())
    }

    #[test]
    fn test_script_in_code_block_stays_text() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(
            dir.path(),
            "js.md",
            "# JS\n\nIntro.\n\n```html\n<script>alert(1)</script>\n```\n",
        )?;
        assert!(!post.has_charts()?);
        let content = post.content()?;
        assert!(content.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!content.contains("chart-placeholder"));
        assert_eq!(content, post.restore(content)?);
        Ok(())
    }

    #[test]
    fn test_restore_finishes_chart_payloads() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(
            dir.path(),
            "plot.md",
            "# Plot\n\nIntro.\n\n<script>Plotly.newPlot('a', [], {\"paper_bgcolor\": \"white\"})</script>\n",
        )?;
        let page = post.restore(&format!("<main>{}</main>", post.content()?))?;
        assert!(page.contains("<!-- plotly.js | MIT License"));
        assert!(page.contains("Plotly.newPlot('a'"));
        assert!(page.contains("\"paper_bgcolor\":\"rgba(0,0,0,0)\""));
        assert!(!page.contains("chart-placeholder"));
        Ok(())
    }

    #[test]
    fn test_notebook_post() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(
            dir.path(),
            "analysis.ipynb",
            r##"{"cells": [
                {"cell_type": "markdown", "source": ["# Analysis\n", "\n", "Looking at data."]},
                {"cell_type": "code", "source": "1 + 1", "outputs": [
                    {"output_type": "execute_result", "data": {"text/plain": "2"}}
                ]}
            ], "metadata": {}}"##,
        )?;
        assert_eq!("Analysis", post.title());
        assert_eq!("<p>Looking at data.</p>\n", post.summary_html()?);
        assert!(post.content()?.contains("<pre class=\"output\">2</pre>"));
        assert!(!post.content()?.contains("Analysis"));
        assert!(!post.needs_math()?);
        Ok(())
    }

    #[test]
    fn test_malformed_notebook_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path(), "broken.ipynb", r#"{"metadata": {}}"#),
            Err(Error::Notebook { .. })
        ));
    }

    #[test]
    fn test_html_post() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(
            dir.path(),
            "page.html",
            "<h1 class=\"title\">About <em>me</em></h1>\n\n<p>I write things.</p>\n\n<p>More.</p>\n",
        )?;
        assert_eq!("About me", post.title());
        assert_eq!("<p>I write things.</p>", post.summary_html()?);
        assert_eq!("I write things.", post.summary_text()?);
        assert!(post.content()?.contains("<p>More.</p>"));
        assert!(!post.content()?.contains("<h1"));
        Ok(())
    }

    #[test]
    fn test_html_post_without_heading_uses_file_name() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let post = load(dir.path(), "colophon.html", "<p>Made by hand.</p>\n")?;
        assert_eq!("colophon", post.title());
        Ok(())
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!("a b", strip_tags("<p>a <a href=\"x\">b</a></p>"));
    }
}
