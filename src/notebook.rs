//! Notebook documents (`.ipynb`). Defines the [`Notebook`] model, the
//! preprocessing steps the blog applies before rendering (title extraction,
//! raw-cell fencing, excluded cells), and the HTML rendering of cells and
//! their outputs.

use crate::charts::Charts;
use crate::convert::{self, ContentConverter};
use crate::url::rewrite_links;
use once_cell::sync::Lazy;
use pulldown_cmark::escape::escape_html;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use thiserror::Error;

/// The first line of a code cell that should be left out of the post.
pub const EXCLUDE_MARKER: &str = "# hide";

/// LaTeX-like markup: display math, `\(`/`\[` delimiters, environments, and
/// inline `$...$` spans.
static MATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$|\\\(|\\\[|\\begin\{|\$[^$\s][^$\n]*\$").unwrap()
});

/// A parsed notebook. Only the parts the blog cares about are modeled.
#[derive(Clone, Debug, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,

    #[serde(default)]
    pub metadata: Json,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Cell {
    pub cell_type: CellType,

    #[serde(deserialize_with = "multiline")]
    pub source: String,

    #[serde(default)]
    pub outputs: Vec<Output>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Markdown,
    Code,
    Raw,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Output {
    pub output_type: String,

    /// Stream text (`stream` outputs).
    #[serde(default, deserialize_with = "optional_multiline")]
    pub text: Option<String>,

    /// MIME bundle (`execute_result` and `display_data` outputs).
    #[serde(default)]
    pub data: BTreeMap<String, Json>,

    #[serde(default)]
    pub ename: Option<String>,

    #[serde(default)]
    pub evalue: Option<String>,
}

/// Notebook text fields are either a single string or a list of lines.
fn multiline<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Text::deserialize(deserializer)? {
        Text::One(s) => s,
        Text::Many(lines) => lines.concat(),
    })
}

fn optional_multiline<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    multiline(deserializer).map(Some)
}

impl Notebook {
    /// Parses a notebook from its JSON source.
    pub fn parse(source: &str) -> Result<Notebook> {
        Ok(serde_json::from_str(source)?)
    }

    /// The title line: the first non-blank line of the first cell, if it's a
    /// heading.
    pub fn title(&self) -> Option<String> {
        let first = self.cells.first()?;
        heading(first.source.lines().find(|line| !line.trim().is_empty())?)
    }

    /// Returns a copy of the notebook prepared for rendering: the title line
    /// is stripped from the first cell (and the cell dropped if nothing else
    /// is left), excluded code cells are removed, and raw cells become fenced
    /// code blocks.
    pub fn body(&self) -> Notebook {
        let mut cells = self.cells.clone();
        if let Some(first) = cells.first_mut() {
            first.source = strip_title(&first.source);
            if first.source.trim().is_empty() {
                cells.remove(0);
            }
        }

        let cells = cells
            .into_iter()
            .filter(|cell| !cell.is_excluded())
            .map(|cell| match cell.cell_type {
                CellType::Raw => Cell {
                    cell_type: CellType::Markdown,
                    source: format!("```\n{}\n```\n", cell.source.trim_end()),
                    outputs: Vec::new(),
                },
                _ => cell,
            })
            .collect();

        Notebook {
            cells,
            metadata: self.metadata.clone(),
        }
    }

    /// The concatenated source of every Markdown cell.
    pub fn markdown(&self) -> String {
        self.cells
            .iter()
            .filter(|cell| cell.cell_type == CellType::Markdown)
            .map(|cell| cell.source.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Returns `true` if any Markdown cell contains math that needs a
    /// typesetting library.
    pub fn needs_math(&self) -> bool {
        self.cells
            .iter()
            .filter(|cell| cell.cell_type == CellType::Markdown)
            .any(|cell| has_math(&cell.source))
    }

    /// The language of the code cells, for syntax-highlighting classes.
    fn language(&self) -> &str {
        self.metadata
            .pointer("/language_info/name")
            .or_else(|| self.metadata.pointer("/kernelspec/language"))
            .and_then(Json::as_str)
            .unwrap_or("python")
    }

    /// Renders every cell to HTML. Chart payloads found in outputs are moved
    /// into `charts` and replaced by tokens.
    pub fn to_html(&self, converter: &dyn ContentConverter, charts: &mut Charts) -> Result<String> {
        let language = self.language();
        let mut html = String::new();
        for cell in &self.cells {
            match cell.cell_type {
                CellType::Markdown => {
                    let rendered = converter.markdown_to_html(&rewrite_links(&cell.source))?;
                    html.push_str("<div class=\"cell markdown\">\n");
                    html.push_str(&charts.extract_scripts(&rendered));
                    html.push_str("</div>\n");
                }
                CellType::Code => {
                    html.push_str(&format!(
                        "<div class=\"cell code\">\n<pre><code class=\"language-{}\">{}</code></pre>\n",
                        language,
                        escape(cell.source.trim_end()),
                    ));
                    for output in &cell.outputs {
                        html.push_str(&output.to_html(charts));
                    }
                    html.push_str("</div>\n");
                }
                // `body()` turns raw cells into Markdown; a raw cell here
                // was never prepared and is shown as-is.
                CellType::Raw => {
                    html.push_str(&format!("<pre>{}</pre>\n", escape(&cell.source)));
                }
            }
        }
        Ok(html)
    }
}

impl Cell {
    fn is_excluded(&self) -> bool {
        self.cell_type == CellType::Code
            && self
                .source
                .lines()
                .next()
                .map_or(false, |line| line.trim() == EXCLUDE_MARKER)
    }
}

impl Output {
    /// Renders a single output, preferring chart payloads, then HTML, then
    /// images, then plain text.
    fn to_html(&self, charts: &mut Charts) -> String {
        if self.output_type == "stream" {
            return match &self.text {
                Some(text) => format!("<pre class=\"output stream\">{}</pre>\n", escape(text)),
                None => String::new(),
            };
        }
        if self.output_type == "error" {
            return format!(
                "<pre class=\"output error\">{}: {}</pre>\n",
                escape(self.ename.as_deref().unwrap_or("Error")),
                escape(self.evalue.as_deref().unwrap_or("")),
            );
        }

        for (mime, value) in &self.data {
            if mime.starts_with("application/vnd.vegalite.") || mime.starts_with("application/vnd.vega.") {
                return wrap(&charts.insert_vega(value));
            }
            if mime.starts_with("application/vnd.plotly.") {
                return wrap(&charts.insert_plotly(value));
            }
        }
        if let Some(html) = self.text("text/html") {
            return wrap(&charts.extract_scripts(&html));
        }
        for mime in &["image/png", "image/jpeg"] {
            if let Some(data) = self.text(mime) {
                let data: String = data.split_whitespace().collect();
                return wrap(&format!("<img src=\"data:{};base64,{}\" alt=\"\">", mime, data));
            }
        }
        if let Some(svg) = self.text("image/svg+xml") {
            return wrap(&svg);
        }
        if let Some(text) = self.text("text/plain") {
            return format!("<pre class=\"output\">{}</pre>\n", escape(&text));
        }
        String::new()
    }

    fn text(&self, mime: &str) -> Option<String> {
        match self.data.get(mime)? {
            Json::String(s) => Some(s.clone()),
            Json::Array(lines) => Some(lines.iter().filter_map(Json::as_str).collect()),
            _ => None,
        }
    }
}

fn wrap(html: &str) -> String {
    format!("<div class=\"output\">\n{}\n</div>\n", html)
}

/// Parses a Markdown heading line (`# Title`) into its text.
pub fn heading(line: &str) -> Option<String> {
    let line = line.trim();
    if !line.starts_with('#') {
        return None;
    }
    Some(line.trim_start_matches('#').trim().to_owned())
}

/// Removes everything up to and including the first non-blank line.
pub fn strip_title(source: &str) -> String {
    let mut lines = source.lines().skip_while(|line| line.trim().is_empty());
    lines.next();
    lines.collect::<Vec<_>>().join("\n")
}

/// Returns `true` if `text` contains LaTeX-like math markup.
pub fn has_math(text: &str) -> bool {
    MATH.is_match(text)
}

/// Escapes text for inclusion in HTML.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a `String` can't fail.
    escape_html(&mut out, text).ok();
    out
}

/// The result of a fallible notebook operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing or rendering a notebook.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the notebook JSON is malformed or missing required keys.
    #[error("malformed notebook: {0}")]
    Json(#[from] serde_json::Error),

    /// Returned when a Markdown cell couldn't be converted.
    #[error(transparent)]
    Convert(#[from] convert::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::convert::Cmark;
    use serde_json::json;

    fn notebook(cells: Json) -> Notebook {
        Notebook::parse(&json!({ "cells": cells, "metadata": {}, "nbformat": 4 }).to_string())
            .unwrap()
    }

    #[test]
    fn test_title_from_first_cell() {
        let nb = notebook(json!([
            {"cell_type": "markdown", "source": ["\n", "# Fitting Curves\n", "Intro."]},
        ]));
        assert_eq!(Some("Fitting Curves".to_owned()), nb.title());
    }

    #[test]
    fn test_missing_title() {
        let nb = notebook(json!([
            {"cell_type": "code", "source": "import numpy", "outputs": []},
        ]));
        assert_eq!(None, nb.title());
    }

    #[test]
    fn test_malformed_notebook() {
        assert!(matches!(
            Notebook::parse(r#"{"cells": [{"source": "x"}]}"#),
            Err(Error::Json(_))
        ));
        assert!(Notebook::parse(r#"{"metadata": {}}"#).is_err());
    }

    #[test]
    fn test_body_strips_title_cell_and_excluded_cells() {
        let nb = notebook(json!([
            {"cell_type": "markdown", "source": "# Title"},
            {"cell_type": "code", "source": "# hide\nsecret()", "outputs": []},
            {"cell_type": "code", "source": "shown()", "outputs": []},
            {"cell_type": "raw", "source": "verbatim"},
        ]));
        let body = nb.body();
        assert_eq!(2, body.cells.len());
        assert_eq!("shown()", body.cells[0].source);
        assert_eq!(CellType::Markdown, body.cells[1].cell_type);
        assert_eq!("```\nverbatim\n```\n", body.cells[1].source);
    }

    #[test]
    fn test_body_keeps_rest_of_title_cell() {
        let nb = notebook(json!([
            {"cell_type": "markdown", "source": "# Title\n\nFirst paragraph."},
        ]));
        let body = nb.body();
        assert_eq!(1, body.cells.len());
        assert_eq!("\nFirst paragraph.", body.cells[0].source);
    }

    #[test]
    fn test_needs_math() {
        let math = notebook(json!([
            {"cell_type": "markdown", "source": "where $x^2$ is"},
        ]));
        let prices = notebook(json!([
            {"cell_type": "markdown", "source": "costs $ 5 or $ 6"},
            {"cell_type": "code", "source": "'$x$'", "outputs": []},
        ]));
        assert!(math.needs_math());
        assert!(!prices.needs_math());
    }

    #[test]
    fn test_to_html_extracts_charts() -> Result<()> {
        let nb = notebook(json!([
            {"cell_type": "code", "source": "chart", "outputs": [
                {"output_type": "display_data", "data": {
                    "application/vnd.vegalite.v4+json": {"mark": "bar"},
                    "text/plain": "<VegaLite 4 object>",
                }},
            ]},
            {"cell_type": "code", "source": "print('hi')", "outputs": [
                {"output_type": "stream", "name": "stdout", "text": ["hi\n"]},
            ]},
        ]));
        let mut charts = Charts::default();
        let html = nb.to_html(&Cmark, &mut charts)?;
        assert_eq!(1, charts.len());
        assert!(html.contains("<!--chart-placeholder-0-->"));
        assert!(!html.contains("vegaEmbed"));
        assert!(html.contains("<pre class=\"output stream\">hi\n</pre>"));
        Ok(())
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&lt;/a&gt;",
            escape("<a href=\"x\">Tom & Jerry</a>")
        );
        assert_eq!("plain", escape("plain"));
    }

    #[test]
    fn test_to_html_escapes_code() -> Result<()> {
        let nb = notebook(json!([
            {"cell_type": "code", "source": "a < b && c", "outputs": []},
        ]));
        let html = nb.to_html(&Cmark, &mut Charts::default())?;
        assert!(html.contains("a &lt; b &amp;&amp; c"));
        Ok(())
    }
}
