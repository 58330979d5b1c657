//! Templating and output. The [`Renderer`] loads named templates from the
//! theme directory on first use and applies them to [`Value`]s; [`Output`]
//! bundles the renderer with everything an entity needs to render itself
//! (the [`Store`], the site-wide values, the output directory) and writes the
//! results to disk.

use crate::config::Author;
use crate::store::Store;
use chrono::NaiveDateTime;
use gtmpl::{Context, Template, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Loads and applies named templates. Each template file is prefixed with
/// the theme's shared partials (files that `{{define}}` reusable blocks), so
/// every template can `{{template}}` them.
pub struct Renderer {
    /// The theme directory. Template names are file names within it.
    directory: PathBuf,

    /// The concatenated contents of the partial files.
    partials: String,

    /// Parsed templates by name. `None` marks a name whose file is missing.
    templates: RefCell<HashMap<String, Option<Rc<Template>>>>,
}

impl Renderer {
    /// Creates a renderer for the templates in `directory`, reading the
    /// `partials` up front.
    pub fn new<P: AsRef<Path>>(
        directory: &Path,
        partials: impl Iterator<Item = P>,
    ) -> Result<Renderer> {
        let mut contents = String::new();
        for partial in partials {
            let partial = directory.join(partial.as_ref());
            File::open(&partial)
                .and_then(|mut file| file.read_to_string(&mut contents))
                .map_err(|err| Error::Read {
                    path: partial.to_owned(),
                    err,
                })?;
            contents.push(' ');
        }

        Ok(Renderer {
            directory: directory.to_owned(),
            partials: contents,
            templates: RefCell::new(HashMap::new()),
        })
    }

    /// Renders the template called `name` with `context` as its dot. A
    /// template whose file doesn't exist renders to the empty string.
    pub fn render(&self, name: &str, context: Value) -> Result<String> {
        let template = match self.template(name)? {
            Some(template) => template,
            None => return Ok(String::new()),
        };

        let mut out: Vec<u8> = Vec::new();
        template
            .execute(&mut out, &Context::from(context).map_err(Error::Template)?)
            .map_err(|err| Error::Execute {
                name: name.to_owned(),
                err,
            })?;
        String::from_utf8(out).map_err(|_| Error::Utf8(name.to_owned()))
    }

    fn template(&self, name: &str) -> Result<Option<Rc<Template>>> {
        if let Some(cached) = self.templates.borrow().get(name) {
            return Ok(cached.clone());
        }

        let path = self.directory.join(name);
        let parsed = match std::fs::read_to_string(&path) {
            Ok(source) => {
                let mut template = Template::default();
                template
                    .parse(&format!("{}{}", self.partials, source))
                    .map_err(|err| Error::Parse {
                        path: path.clone(),
                        err,
                    })?;
                Some(Rc::new(template))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(template = name, "template not found; rendering nothing");
                None
            }
            Err(err) => return Err(Error::Read { path, err }),
        };

        self.templates
            .borrow_mut()
            .insert(name.to_owned(), parsed.clone());
        Ok(parsed)
    }
}

/// Site-wide values available to every template as `site`.
#[derive(Clone, Debug)]
pub struct Site {
    pub title: String,
    pub root: Url,
    pub author: Option<Author>,
}

impl Site {
    fn to_value(&self) -> Value {
        object(vec![
            ("title", Value::String(self.title.clone())),
            ("url", Value::String(self.root.to_string())),
            (
                "author",
                match &self.author {
                    Some(author) => Value::String(author.name.clone()),
                    None => Value::Nil,
                },
            ),
        ])
    }
}

/// Everything an entity needs to render itself to disk.
pub struct Output<'a> {
    pub store: &'a Store,
    pub renderer: &'a Renderer,
    pub site: &'a Site,

    /// The root of the rendered site.
    pub directory: &'a Path,
}

impl Output<'_> {
    /// Renders the template `name` with `page` and the keyword `context`.
    /// The site-wide values are added as `site`.
    pub fn render(&self, name: &str, page: Value, context: Vec<(&str, Value)>) -> Result<String> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("page".to_owned(), page);
        m.insert("site".to_owned(), self.site.to_value());
        for (key, value) in context {
            m.insert(key.to_owned(), value);
        }
        self.renderer.render(name, Value::Object(m))
    }

    /// Writes `contents` to `relative` (a path within the output directory),
    /// creating parent directories as needed.
    pub fn write(&self, relative: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.directory.join(relative);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|err| Error::Write {
                path: path.clone(),
                err,
            })?;
        }
        debug!(path = %path.display(), "writing");
        std::fs::write(&path, contents).map_err(|err| Error::Write { path, err })
    }

    /// The absolute URL for a root-relative `uri`.
    pub fn url(&self, uri: &str) -> String {
        match self.site.root.join(uri.trim_start_matches('/')) {
            Ok(url) => url.to_string(),
            Err(_) => uri.to_owned(),
        }
    }
}

/// Builds a [`Value::Object`] from key-value pairs.
pub fn object(fields: Vec<(&str, Value)>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value))
            .collect(),
    )
}

/// Converts an optional value, mapping `None` to [`Value::Nil`].
pub fn optional(value: Option<Value>) -> Value {
    value.unwrap_or(Value::Nil)
}

/// Formats a timestamp the way templates and the sitemap expect it.
pub fn date(timestamp: &NaiveDateTime) -> Value {
    Value::String(timestamp.format("%Y-%m-%d").to_string())
}

/// The result of a fallible rendering operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading templates, templating, or writing output.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned for I/O problems reading template files.
    #[error("reading template file `{}`: {err}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned for errors parsing template files.
    #[error("parsing template file `{}`: {err}", .path.display())]
    Parse { path: PathBuf, err: String },

    /// Returned when the template context can't be built.
    #[error("building template context: {0}")]
    Template(String),

    /// Returned for errors while applying a template.
    #[error("executing template `{name}`: {err}")]
    Execute { name: String, err: String },

    /// Returned when a template produces invalid UTF-8.
    #[error("template `{0}` produced invalid UTF-8")]
    Utf8(String),

    /// Returned for I/O problems writing output files.
    #[error("writing `{}`: {err}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    fn renderer(files: &[(&str, &str)], partials: &[&str]) -> (tempfile::TempDir, Renderer) {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents).unwrap();
        }
        let renderer = Renderer::new(dir.path(), partials.iter()).unwrap();
        (dir, renderer)
    }

    #[test]
    fn test_render_named_template() -> Result<()> {
        let (_dir, renderer) = renderer(&[("post.html", "<h1>{{.title}}</h1>")], &[]);
        let html = renderer.render(
            "post.html",
            object(vec![("title", Value::String("Hello".to_owned()))]),
        )?;
        assert_eq!("<h1>Hello</h1>", html);
        Ok(())
    }

    #[test]
    fn test_missing_template_renders_empty() -> Result<()> {
        let (_dir, renderer) = renderer(&[], &[]);
        assert_eq!("", renderer.render("BingSiteAuth.xml", Value::Nil)?);
        Ok(())
    }

    #[test]
    fn test_partials_are_available() -> Result<()> {
        let (_dir, renderer) = renderer(
            &[
                ("base.html", r#"{{define "header"}}<header>{{.}}</header>{{end}}"#),
                ("index.html", r#"{{template "header" .title}}"#),
            ],
            &["base.html"],
        );
        let html = renderer.render(
            "index.html",
            object(vec![("title", Value::String("Blog".to_owned()))]),
        )?;
        assert_eq!("<header>Blog</header>", html.trim());
        Ok(())
    }

    #[test]
    fn test_missing_partial_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Renderer::new(dir.path(), ["nope.html"].iter()),
            Err(Error::Read { .. })
        ));
    }

    #[test]
    fn test_passthrough_document() -> Result<()> {
        let (_dir, renderer) = renderer(
            &[("keybase.txt", "==== BEGIN KEYBASE PROOF ====\n")],
            &[],
        );
        assert_eq!(
            "==== BEGIN KEYBASE PROOF ====\n",
            renderer.render("keybase.txt", Value::Nil)?
        );
        Ok(())
    }
}
