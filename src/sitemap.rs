//! Sitemap generation. Lists the home page, every post and every tag page
//! with its last modification date and priority:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/</loc>
//!     <lastmod>2021-01-01</lastmod>
//!     <priority>1.0</priority>
//!   </url>
//! </urlset>
//! ```

use crate::index::Index;
use crate::render::Output;
use chrono::NaiveDateTime;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

struct UrlEntry {
    loc: String,
    lastmod: Option<NaiveDateTime>,
    priority: f64,
}

/// Builds the sitemap XML for the site rooted at `index`.
pub fn sitemap(out: &Output, index: &Index) -> String {
    let mut urls = vec![UrlEntry {
        loc: out.url(""),
        lastmod: Some(index.modified(out.store)),
        priority: index.priority(),
    }];
    urls.extend(index.posts().iter().map(|id| {
        let post = out.store.post(*id);
        UrlEntry {
            loc: out.url(post.uri()),
            lastmod: Some(post.modified()),
            priority: post.priority(),
        }
    }));
    urls.extend(index.tags().iter().map(|id| {
        let tag = out.store.tag(*id);
        UrlEntry {
            loc: out.url(&tag.uri()),
            lastmod: tag.modified(out.store),
            priority: tag.priority(),
        }
    }));
    into_xml(&urls)
}

fn into_xml(urls: &[UrlEntry]) -> String {
    let mut xml = String::with_capacity(128 * (urls.len() + 1));
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(r#"<urlset xmlns="{}">"#, SITEMAP_NS));
    xml.push('\n');
    for entry in urls {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&entry.loc)));
        if let Some(lastmod) = entry.lastmod {
            xml.push_str(&format!("    <lastmod>{}</lastmod>\n", lastmod.format("%Y-%m-%d")));
        }
        xml.push_str(&format!("    <priority>{:.1}</priority>\n", entry.priority));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
