//! Markdown to plaintext

use super::normalize_whitespace;
use pulldown_cmark::{Event, Parser, TagEnd};

/// Drop markdown syntax, keeping the readable text
pub fn strip_markdown(content: &str) -> String {
    let mut text = String::with_capacity(content.len());

    for event in Parser::new(content) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak => text.push(' '),
            Event::HardBreak => text.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::TableRow) => text.push_str("\n\n"),
            Event::End(TagEnd::TableCell) => text.push(' '),
            _ => {}
        }
    }

    normalize_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown() {
        let md = "# Title\n\nSome **bold** and `code`.\n\n* one\n* two\n\n[link](https://example.com)";
        let text = strip_markdown(md);
        assert_eq!(text, "Title\n\nSome bold and code.\n\none\n\ntwo\n\nlink");
    }

    #[test]
    fn test_strip_plain_text_is_stable() {
        assert_eq!(strip_markdown("just words"), "just words");
    }
}
