//! Interactive chart payloads. Charts are script blocks (and the JSON specs
//! inside them) that the template engine and the Markdown converter must not
//! touch, so the post pipeline pulls them out of the content and leaves an
//! opaque token in their place. After the page template has been rendered,
//! [`Charts::restore`] puts the payloads back, patching known third-party
//! boilerplate and wrapping each payload with its library's license notice.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;

/// Matches a complete `<script>` element.
static SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap());

/// Matches Plotly's hardcoded white backgrounds.
static PLOTLY_BACKGROUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(paper_bgcolor|plot_bgcolor)":\s*"(?:white|#fff|#ffffff|#E5ECF6)""#).unwrap()
});

/// Matches Plotly's default template font color.
static PLOTLY_FONT_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r##""color":\s*"#2a3f5f""##).unwrap());

const TRANSPARENT: &str = "rgba(0,0,0,0)";

/// The third-party charting libraries whose payloads we recognize.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Library {
    /// Vega and Vega-Lite, rendered with `vega-embed`.
    Vega,

    /// Plotly.
    Plotly,
}

impl Library {
    /// Detects the library a script payload belongs to by its well-known
    /// entry points.
    pub fn detect(html: &str) -> Option<Library> {
        if html.contains("Plotly.") || html.contains("plotly") {
            Some(Library::Plotly)
        } else if html.contains("vegaEmbed") || html.contains("vega-embed") {
            Some(Library::Vega)
        } else {
            None
        }
    }

    fn license(self) -> (&'static str, &'static str) {
        match self {
            Library::Vega => (
                "<!-- Vega, Vega-Lite and vega-embed | BSD-3-Clause License | \
                 Copyright (c) University of Washington Interactive Data Lab -->",
                "<!-- end of Vega content -->",
            ),
            Library::Plotly => (
                "<!-- plotly.js | MIT License | Copyright (c) Plotly, Inc -->",
                "<!-- end of plotly.js content -->",
            ),
        }
    }
}

/// A single extracted payload.
#[derive(Clone, Debug, PartialEq)]
struct Payload {
    token: String,
    library: Option<Library>,
    html: String,
}

/// The token map for one post: every payload pulled out of its content.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Charts {
    payloads: Vec<Payload>,
}

impl Charts {
    /// Returns `true` if no payloads were extracted.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Returns the number of extracted payloads.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Stores `html` and returns the token that stands in for it.
    pub fn insert(&mut self, library: Option<Library>, html: String) -> String {
        let token = format!("<!--chart-placeholder-{}-->", self.payloads.len());
        self.payloads.push(Payload {
            token: token.clone(),
            library,
            html,
        });
        token
    }

    /// Replaces every `<script>` element in `html` with a token.
    pub fn extract_scripts(&mut self, html: &str) -> String {
        SCRIPT
            .replace_all(html, |caps: &regex::Captures| {
                let script = caps[0].to_owned();
                self.insert(Library::detect(&script), script)
            })
            .into_owned()
    }

    /// Stores a Vega or Vega-Lite JSON spec as an embedded chart and returns
    /// its token.
    pub fn insert_vega(&mut self, spec: &Json) -> String {
        let id = format!("chart-{}", self.payloads.len());
        let html = format!(
            "<div id=\"{id}\" class=\"vega-chart\"></div>\n\
             <script type=\"text/javascript\">vegaEmbed(\"#{id}\", {spec});</script>",
            id = id,
            spec = spec,
        );
        self.insert(Some(Library::Vega), html)
    }

    /// Stores a Plotly figure (`{"data": ..., "layout": ...}`) as an embedded
    /// chart and returns its token.
    pub fn insert_plotly(&mut self, figure: &Json) -> String {
        let id = format!("chart-{}", self.payloads.len());
        let html = format!(
            "<div id=\"{id}\" class=\"plotly-graph-div\"></div>\n\
             <script type=\"text/javascript\">Plotly.newPlot(\"{id}\", {data}, {layout});</script>",
            id = id,
            data = figure.get("data").unwrap_or(&Json::Array(Vec::new())),
            layout = figure.get("layout").unwrap_or(&Json::Object(Default::default())),
        );
        self.insert(Some(Library::Plotly), html)
    }

    /// Substitutes every token in `document` with its finished payload.
    pub fn restore(&self, document: &str) -> String {
        let mut out = document.to_owned();
        for payload in &self.payloads {
            out = out.replace(&payload.token, &payload.finish());
        }
        out
    }
}

impl Payload {
    /// The payload as it should appear in the final document: third-party
    /// boilerplate patched and wrapped in the library's license notice.
    fn finish(&self) -> String {
        match self.library {
            None => self.html.clone(),
            Some(library) => {
                let html = match library {
                    Library::Plotly => patch_plotly(&self.html),
                    Library::Vega => self.html.clone(),
                };
                let (header, footer) = library.license();
                format!("{}\n{}\n{}", header, html, footer)
            }
        }
    }
}

/// Makes Plotly figures follow the page's colors instead of Plotly's
/// defaults.
fn patch_plotly(html: &str) -> String {
    let html = PLOTLY_BACKGROUND.replace_all(html, |caps: &regex::Captures| {
        format!("\"{}\":\"{}\"", &caps[1], TRANSPARENT)
    });
    PLOTLY_FONT_COLOR
        .replace_all(&html, "\"color\":\"inherit\"")
        .into_owned()
}
