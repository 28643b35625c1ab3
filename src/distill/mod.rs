//! Turning fetched bodies into searchable text
//!
//! Pages are stored as markdown-flavoured text, hashed for dedup, and
//! stripped down to plaintext right before indexing.

mod html;
mod markdown;

pub use html::*;
pub use markdown::*;

/// Content types we can distill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Html,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from MIME type
    pub fn from_mime(mime: &str) -> Self {
        let mime_lower = mime.to_lowercase();
        if mime_lower.contains("text/html") || mime_lower.contains("application/xhtml") {
            ContentType::Html
        } else if mime_lower.starts_with("text/") {
            ContentType::PlainText
        } else {
            ContentType::Unknown
        }
    }

    /// MIME first, then a look at the body itself
    pub fn detect(mime: Option<&str>, body: &str) -> Self {
        if let Some(m) = mime {
            let detected = Self::from_mime(m);
            if detected != ContentType::Unknown {
                return detected;
            }
        }

        let head: String = body
            .trim_start()
            .chars()
            .take(64)
            .collect::<String>()
            .to_lowercase();
        if head.starts_with("<!doctype html") || head.starts_with("<html") {
            ContentType::Html
        } else {
            ContentType::Unknown
        }
    }
}

/// A fetched body reduced to what gets stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distilled {
    /// Markdown-flavoured text. Its hash is the document identity.
    pub markdown: String,
    /// Page title, when the body had one
    pub title: Option<String>,
}

/// Distill a fetched body. HTML becomes markdown, other text passes through
/// normalized, and anything else (images, archives) is dropped.
pub fn distill(body: &str, mime: Option<&str>) -> Distilled {
    match ContentType::detect(mime, body) {
        ContentType::Html => Distilled {
            markdown: html_to_markdown(body),
            title: extract_title(body),
        },
        ContentType::PlainText => Distilled {
            markdown: normalize_whitespace(body),
            title: None,
        },
        ContentType::Unknown => Distilled {
            markdown: String::new(),
            title: None,
        },
    }
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_whitespace = true;
    let mut newline_count = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                newline_count += 1;
            }
            last_was_whitespace = true;
        } else {
            if last_was_whitespace && !result.is_empty() {
                match newline_count {
                    0 => result.push(' '),
                    1 => result.push('\n'),
                    _ => result.push_str("\n\n"),
                }
            }
            newline_count = 0;
            result.push(c);
            last_was_whitespace = false;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(
            ContentType::detect(Some("text/html; charset=utf-8"), ""),
            ContentType::Html
        );
        assert_eq!(
            ContentType::detect(Some("text/plain"), "<html>"),
            ContentType::PlainText
        );
        assert_eq!(
            ContentType::detect(None, "  <!DOCTYPE html><html></html>"),
            ContentType::Html
        );
        assert_eq!(
            ContentType::detect(Some("image/png"), "\u{89}PNG"),
            ContentType::Unknown
        );
    }

    #[test]
    fn test_normalize_whitespace() {
        let input = "  Hello   world\n\n\n\ntest\n";
        assert_eq!(normalize_whitespace(input), "Hello world\n\ntest");
    }

    #[test]
    fn test_distill_html() {
        let html = "<html><head><title>Greeting</title></head><body><h1>Hello</h1><p>World</p></body></html>";
        let distilled = distill(html, Some("text/html"));
        assert_eq!(distilled.title.as_deref(), Some("Greeting"));
        assert!(distilled.markdown.contains("Hello"));
        assert!(distilled.markdown.contains("World"));
        assert!(!distilled.markdown.contains("<p>"));
    }

    #[test]
    fn test_distill_binary_is_empty() {
        let distilled = distill("GIF89a....", Some("image/gif"));
        assert!(distilled.markdown.is_empty());
    }
}
