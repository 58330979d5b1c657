//! Project configuration. A project is a directory containing a
//! `scriptorium.yaml` project file and a theme directory with a `theme.yaml`.
//! [`Config::from_directory`] finds the project file by walking up from a
//! starting directory and resolves every path against the project root.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// The name of the project file.
pub const PROJECT_FILE: &str = "scriptorium.yaml";

/// The name of the theme file inside the theme directory.
pub const THEME_FILE: &str = "theme.yaml";

/// The author of the site, used for the feed and made available to
/// templates.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

fn default_posts() -> PathBuf {
    PathBuf::from("posts")
}

fn default_tags() -> PathBuf {
    PathBuf::from("tags")
}

fn default_static() -> PathBuf {
    PathBuf::from("static")
}

fn default_theme() -> PathBuf {
    PathBuf::from("theme")
}

fn default_verification() -> Vec<String> {
    vec![
        "google-site-verification.html".to_owned(),
        "BingSiteAuth.xml".to_owned(),
        "keybase.txt".to_owned(),
    ]
}

#[derive(Deserialize)]
struct Project {
    title: String,
    site_root: Url,

    #[serde(default)]
    author: Option<Author>,

    #[serde(default = "default_posts")]
    posts_directory: PathBuf,

    #[serde(default = "default_tags")]
    tags_directory: PathBuf,

    #[serde(default = "default_static")]
    static_directory: PathBuf,

    #[serde(default = "default_theme")]
    theme_directory: PathBuf,

    #[serde(default = "default_verification")]
    verification: Vec<String>,

    #[serde(default)]
    markdown_command: Option<Vec<String>>,
}

#[derive(Default, Deserialize)]
struct Theme {
    #[serde(default)]
    partials: Vec<PathBuf>,
}

/// The resolved configuration for a build.
#[derive(Clone, Debug)]
pub struct Config {
    /// The site title, for templates and the feed.
    pub title: String,

    /// The absolute URL the site will be served from. Always ends in `/`.
    pub site_root: Url,

    /// The site author, if configured.
    pub author: Option<Author>,

    /// The directory containing every post source file.
    pub posts_source_directory: PathBuf,

    /// The directory containing one subdirectory per tag.
    pub tags_source_directory: PathBuf,

    /// The directory of shared static assets, copied to `static/` in the
    /// output.
    pub static_source_directory: PathBuf,

    /// The directory containing the templates.
    pub theme_directory: PathBuf,

    /// Partial template files, relative to the theme directory.
    pub partials: Vec<PathBuf>,

    /// The names of the site verification documents passed through from the
    /// theme directory.
    pub verification: Vec<String>,

    /// The argv of an external Markdown converter, if one is configured.
    pub markdown_command: Option<Vec<String>>,

    /// The directory the site is rendered into.
    pub output_directory: PathBuf,
}

impl Config {
    /// Searches `dir` and its ancestors for a project file and loads it.
    pub fn from_directory(dir: &Path, output_directory: &Path) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            Config::from_project_file(&path, output_directory)
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent, output_directory),
                None => Err(Error::NotFound),
            }
        }
    }

    /// Loads the project file at `path` and the theme file it refers to.
    pub fn from_project_file(path: &Path, output_directory: &Path) -> Result<Config> {
        let project: Project = serde_yaml::from_str(&read(path)?).map_err(|err| Error::Yaml {
            path: path.to_owned(),
            err,
        })?;
        let root = path
            .parent()
            .ok_or_else(|| Error::NoParent(path.to_owned()))?;

        let theme_directory = root.join(&project.theme_directory);
        let theme_path = theme_directory.join(THEME_FILE);
        let theme: Theme = if theme_path.exists() {
            serde_yaml::from_str(&read(&theme_path)?).map_err(|err| Error::Yaml {
                path: theme_path.clone(),
                err,
            })?
        } else {
            Theme::default()
        };

        let mut site_root = project.site_root;
        if !site_root.path().ends_with('/') {
            let path = format!("{}/", site_root.path());
            site_root.set_path(&path);
        }

        Ok(Config {
            title: project.title,
            site_root,
            author: project.author,
            posts_source_directory: root.join(&project.posts_directory),
            tags_source_directory: root.join(&project.tags_directory),
            static_source_directory: root.join(&project.static_directory),
            theme_directory,
            partials: theme.partials,
            verification: project.verification,
            markdown_command: project.markdown_command.filter(|argv| !argv.is_empty()),
            output_directory: output_directory.to_owned(),
        })
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| Error::Open {
        path: path.to_owned(),
        err,
    })
}

/// The result of loading configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when no project file exists in the directory or its
    /// ancestors.
    #[error("could not find `{}` in any parent directory", PROJECT_FILE)]
    NotFound,

    /// Returned when a configuration file can't be read.
    #[error("opening `{}`: {err}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned when a configuration file isn't valid.
    #[error("loading `{}`: {err}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },

    /// Returned when the project file path has no parent directory.
    #[error("can't get parent directory for project file `{}`", .0.display())]
    NoParent(PathBuf),
}
