//! The content conversion contract. A [`ContentConverter`] turns Markdown
//! text into an HTML fragment; the post pipeline uses it for Markdown posts,
//! post summaries and the Markdown cells of notebooks.
//!
//! Two implementations are provided: [`Cmark`], which converts in-process
//! with [`pulldown_cmark`], and [`External`], which pipes the Markdown through
//! an external program (e.g., `pandoc -f markdown -t html`).

use pulldown_cmark::{html, Event, Options, Parser, Tag};
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Converts Markdown source text into an HTML fragment.
pub trait ContentConverter {
    fn markdown_to_html(&self, markdown: &str) -> Result<String>;
}

/// In-process CommonMark conversion.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cmark;

impl ContentConverter for Cmark {
    fn markdown_to_html(&self, markdown: &str) -> Result<String> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, Parser::new_ext(markdown, options).map(demote));
        Ok(out)
    }
}

/// The headings in a post body need to be subordinate to the post title,
/// which the template renders as `h1`. So `#` becomes `h2`, and so on.
fn demote(ev: Event<'_>) -> Event<'_> {
    match ev {
        Event::Start(Tag::Heading(level)) => Event::Start(Tag::Heading((level + 1).min(6))),
        Event::End(Tag::Heading(level)) => Event::End(Tag::Heading((level + 1).min(6))),
        _ => ev,
    }
}

/// Converts Markdown by running an external program with the Markdown on
/// stdin and reading HTML from stdout.
#[derive(Clone, Debug)]
pub struct External {
    program: String,
    args: Vec<String>,
}

impl External {
    /// Builds a converter from an argv-style command line. Returns `None` for
    /// an empty command.
    pub fn from_argv(argv: &[String]) -> Option<External> {
        let (program, args) = argv.split_first()?;
        Some(External {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl ContentConverter for External {
    fn markdown_to_html(&self, markdown: &str) -> Result<String> {
        debug!(program = %self.program, "converting via external program");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::Spawn {
                program: self.program.clone(),
                err,
            })?;

        // Feed stdin from its own thread so a converter that streams its
        // output can't block on a full stdout pipe while we're still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = markdown.to_owned();
            std::thread::spawn(move || match stdin.write_all(input.as_bytes()) {
                Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => Err(err),
                _ => Ok(()),
            })
        });

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            writer
                .join()
                .unwrap_or_else(|_| Err(std::io::ErrorKind::BrokenPipe.into()))?;
        }
        if !output.status.success() {
            return Err(Error::Failed {
                program: self.program.clone(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| Error::Utf8(self.program.clone()))
    }
}

/// The result of a fallible conversion.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error converting content to HTML.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the external converter couldn't be started.
    #[error("starting converter `{program}`: {err}")]
    Spawn {
        program: String,
        #[source]
        err: std::io::Error,
    },

    /// Returned when the external converter exits unsuccessfully.
    #[error("converter `{program}` exited with status {status:?}: {stderr}")]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    /// Returned when the external converter's output isn't UTF-8.
    #[error("converter `{0}` produced invalid UTF-8")]
    Utf8(String),

    /// Returned for other I/O errors talking to the converter.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
