//! Static "hero" banner for the catalog landing page.
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "Stormwater Heatmap";
pub const DEFAULT_SUBTITLE: &str = "Open geospatial data for the Puget Sound region";
pub const DEFAULT_BACKGROUND: &str = "images/hero-background.jpg";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Hero {
    pub title: String,
    pub subtitle: String,
    pub background_image: String,
}

impl Default for Hero {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            subtitle: DEFAULT_SUBTITLE.to_string(),
            background_image: DEFAULT_BACKGROUND.to_string(),
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escapes a value for a single-quoted CSS string.
fn escape_css_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\a "),
            '\r' => escaped.push_str("\\d "),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl Hero {
    pub fn new(title: Option<String>, subtitle: Option<String>, background_image: Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            title: title.unwrap_or(defaults.title),
            subtitle: subtitle.unwrap_or(defaults.subtitle),
            background_image: background_image.unwrap_or(defaults.background_image),
        }
    }

    pub fn render(&self) -> String {
        let background = escape_html(&escape_css_string(&self.background_image));
        format!(
            concat!(
                "<section class=\"hero\" style=\"background-image: url('{background}')\">\n",
                "  <div class=\"hero-overlay\">\n",
                "    <h1 class=\"hero-title\">{title}</h1>\n",
                "    <p class=\"hero-subtitle\">{subtitle}</p>\n",
                "  </div>\n",
                "</section>\n"
            ),
            background = background,
            title = escape_html(&self.title),
            subtitle = escape_html(&self.subtitle),
        )
    }

    /// A standalone landing page: the banner plus a link to the root catalog.
    pub fn render_page(&self, catalog_href: &str) -> String {
        format!(
            concat!(
                "<!DOCTYPE html>\n",
                "<html lang=\"en\">\n",
                "<head>\n",
                "  <meta charset=\"utf-8\">\n",
                "  <title>{title}</title>\n",
                "  <style>\n",
                "    .hero {{ background-size: cover; background-position: center; min-height: 40vh; display: flex; align-items: center; }}\n",
                "    .hero-overlay {{ width: 100%; padding: 2rem; color: #fff; background: rgba(0, 0, 0, 0.4); }}\n",
                "  </style>\n",
                "</head>\n",
                "<body>\n",
                "{hero}",
                "  <main><a href=\"{catalog}\">Browse the catalog</a></main>\n",
                "</body>\n",
                "</html>\n"
            ),
            title = escape_html(&self.title),
            hero = self.render(),
            catalog = escape_html(catalog_href),
        )
    }
}
