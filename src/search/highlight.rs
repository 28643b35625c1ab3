//! Rendering matched spans inside a field's text

use crate::models::Location;
use tracing::debug;

/// Render every matched span of `text` with `render`, leaving the rest as is.
///
/// Spans are visited in ascending start order. A span that starts inside an
/// already rendered one is skipped rather than merged. If any span falls
/// outside `text` or splits a character, `text` comes back unchanged.
pub fn highlight_all<F>(locations: &[Location], text: &str, render: F) -> String
where
    F: Fn(&str) -> String,
{
    if locations.is_empty() {
        return text.to_string();
    }

    if let Some(bad) = locations.iter().find(|l| !is_valid_span(l, text)) {
        debug!(
            start = bad.start,
            end = bad.end,
            len = text.len(),
            "Match location out of bounds, not highlighting"
        );
        return text.to_string();
    }

    let mut spans = locations.to_vec();
    spans.sort_by_key(|l| (l.start, l.end));

    let mut out = String::with_capacity(text.len() + spans.len() * 8);
    let mut cursor = 0;

    for span in spans {
        if span.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..span.start]);
        out.push_str(&render(&text[span.start..span.end]));
        cursor = span.end;
    }

    out.push_str(&text[cursor..]);
    out
}

fn is_valid_span(span: &Location, text: &str) -> bool {
    span.start <= span.end
        && span.end <= text.len()
        && text.is_char_boundary(span.start)
        && text.is_char_boundary(span.end)
}
