//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: cleaning the output directory,
//! copying the static assets, loading every post and tag into a [`Store`]
//! ([`Index::load`]), and rendering the site ([`Index::render`]).

use crate::config::Config;
use crate::convert::{Cmark, ContentConverter, External};
use crate::history::Git;
use crate::index::Index;
use crate::render::{self, Output, Renderer, Site};
use crate::store::{self, Store};
use crate::url::STATIC_PREFIX;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Builds the site from a [`Config`]. The output directory is deleted and
/// recreated, so a build never leaves stale pages behind. The first error
/// stops the build.
pub fn build_site(config: Config) -> Result<()> {
    let converter: Rc<dyn ContentConverter> = match config
        .markdown_command
        .as_deref()
        .and_then(External::from_argv)
    {
        Some(external) => Rc::new(external),
        None => Rc::new(Cmark),
    };
    build_with(config, converter)
}

fn build_with(config: Config, converter: Rc<dyn ContentConverter>) -> Result<()> {
    let output = &config.output_directory;
    info!(output = %output.display(), "building site");

    rmdir(output)?;
    std::fs::create_dir_all(output).map_err(|err| Error::Clean {
        path: output.clone(),
        err,
    })?;
    copy_static(
        &config.static_source_directory,
        &output.join(STATIC_PREFIX.trim_end_matches('/')),
    )?;

    let renderer = Renderer::new(&config.theme_directory, config.partials.iter())?;
    let site = Site {
        title: config.title.clone(),
        root: config.site_root.clone(),
        author: config.author.clone(),
    };

    let mut store = Store::new(converter, Rc::new(Git));
    let index = Index::load(
        &mut store,
        &config.posts_source_directory,
        &config.tags_source_directory,
        output,
    )?;

    let out = Output {
        store: &store,
        renderer: &renderer,
        site: &site,
        directory: output,
    };
    index.render(&out, &config.verification)?;

    info!(
        posts = store.post_count(),
        tags = store.tag_count(),
        "site built"
    );
    Ok(())
}

/// Copies the static assets into `dst`, preserving the directory structure.
/// A missing source directory isn't an error; the site simply has no assets.
fn copy_static(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        warn!(path = %src.display(), "static directory not found; skipping");
        return Ok(());
    }

    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|err| Error::Walk {
            path: src.to_owned(),
            err,
        })?;
        let relative = match entry.path().strip_prefix(src) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = dst.join(relative);
        let copy_err = |err| Error::Copy {
            path: entry.path().to_owned(),
            err,
        };
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(copy_err)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(copy_err)?;
            copied += 1;
        }
    }
    info!(files = copied, "copied static assets");
    Ok(())
}

fn rmdir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

/// The result of building a site.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can come from loading or
/// rendering posts and tags, loading templates, cleaning the output
/// directory, or copying static assets.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned for errors loading, linking, or rendering the site.
    #[error(transparent)]
    Site(#[from] store::Error),

    /// Returned for errors loading the theme's partials.
    #[error(transparent)]
    Theme(#[from] render::Error),

    /// Returned for I/O problems while cleaning the output directory.
    #[error("cleaning directory `{}`: {err}", .path.display())]
    Clean {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned for problems traversing the static directory.
    #[error("walking `{}`: {err}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        err: walkdir::Error,
    },

    /// Returned for I/O problems copying a static asset.
    #[error("copying `{}`: {err}", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn project(root: &Path) {
        fs::write(
            root.join(crate::config::PROJECT_FILE),
            "title: Notes\nsite_root: https://example.com/\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("posts")).unwrap();
        fs::write(root.join("posts").join("hello.md"), "# Hello\n\nFirst post.\n").unwrap();
        fs::create_dir_all(root.join("tags").join("intro")).unwrap();
        fs::write(
            root.join("tags").join("intro").join("hello.md"),
            "# Hello\n\nFirst post.\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("static").join("css")).unwrap();
        fs::write(root.join("static").join("css").join("site.css"), "body {}").unwrap();
        fs::create_dir_all(root.join("theme")).unwrap();
        fs::write(root.join("theme").join("post.html"), "<h1>{{.page.title}}</h1>").unwrap();
        fs::write(root.join("theme").join("index.html"), "{{range .page.posts}}{{.title}};{{end}}").unwrap();
    }

    #[test]
    fn test_build_site() -> Result<()> {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let output = out.path().join("_site");
        project(src.path());
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("stale.html"), "old").unwrap();

        let config = Config::from_directory(src.path(), &output).unwrap();
        build_site(config)?;

        assert!(!output.join("stale.html").exists());
        assert_eq!("<h1>Hello</h1>", fs::read_to_string(output.join("hello.html")).unwrap());
        assert!(output.join("intro").join("hello.html").is_file());
        assert!(output.join("intro").join("index.html").is_file());
        assert!(output.join("index.html").is_file());
        assert!(output.join("feed.xml").is_file());
        assert!(output.join("sitemap.xml").is_file());
        assert!(output.join("keybase.txt").is_file());
        assert!(output.join("static").join("css").join("site.css").is_file());
        Ok(())
    }

    #[test]
    fn test_missing_static_directory_is_skipped() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        copy_static(&dir.path().join("nope"), &dir.path().join("out"))?;
        assert!(!dir.path().join("out").exists());
        Ok(())
    }

    #[test]
    fn test_bad_post_fails_the_build() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        project(src.path());
        fs::write(src.path().join("posts").join("broken.md"), "no title\n").unwrap();

        let config = Config::from_directory(src.path(), out.path()).unwrap();
        let err = build_with(config, Rc::new(Cmark)).unwrap_err();
        assert!(err.to_string().contains("broken.md"));
    }
}
