//! HTML to markdown

use super::normalize_whitespace;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

/// Wide enough that html2text never wraps prose
const RENDER_WIDTH: usize = 10_000;

/// `[1]: https://...` lines that html2text appends for links
fn link_footnote_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\[\d+\]:\s.*$").ok())
        .as_ref()
}

/// `[text][1]` reference markers left inline for those footnotes
fn link_marker_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\]\[\d+\]").ok()).as_ref()
}

/// Convert an HTML page into markdown-flavoured text
pub fn html_to_markdown(content: &str) -> String {
    let text = match html2text::from_read(content.as_bytes(), RENDER_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("html2text failed, falling back to raw text: {}", e);
            Html::parse_document(content)
                .root_element()
                .text()
                .collect::<Vec<_>>()
                .join(" ")
        }
    };

    let text = match link_footnote_re() {
        Some(re) => re.replace_all(&text, "").into_owned(),
        None => text,
    };
    let text = match link_marker_re() {
        Some(re) => re.replace_all(&text, "]").into_owned(),
        None => text,
    };

    normalize_whitespace(&text)
}

/// The document's `<title>`, trimmed. Empty titles count as missing.
pub fn extract_title(content: &str) -> Option<String> {
    let document = Html::parse_document(content);
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();

    (!title.is_empty()).then_some(title)
}
