//! Text normalization for extracted page text and search snippets.

use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::LazyLock;

static ELLIPSIS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\.{3,}|…").ok());

static HORIZONTAL_SPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").ok());

static BLANK_LINES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n(?:[ ]*\n)+").ok());

static CITATION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[\^?\d+\^?\]").ok());

static NUMERIC_ENTITY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").ok());

fn replace_all(pattern: &LazyLock<Option<Regex>>, text: &str, replacement: &str) -> String {
    match pattern.as_ref() {
        Some(re) => re.replace_all(text, replacement).into_owned(),
        None => text.to_string(),
    }
}

/// Decodes the named entities that survive HTML parsing plus numeric
/// character references.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let named = text
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&apos;", "'");

    let numeric = match NUMERIC_ENTITY.as_ref() {
        Some(re) => re
            .replace_all(&named, |caps: &regex::Captures<'_>| {
                let code = caps
                    .get(1)
                    .and_then(|hex| u32::from_str_radix(hex.as_str(), 16).ok())
                    .or_else(|| caps.get(2).and_then(|dec| dec.as_str().parse().ok()));
                code.and_then(char::from_u32)
                    .map_or_else(|| caps[0].to_string(), String::from)
            })
            .into_owned(),
        None => named,
    };
    // Last so "&amp;lt;" decodes to "&lt;" and not "<".
    numeric.replace("&amp;", "&")
}

/// Collapses horizontal whitespace, trims every line and keeps at most one
/// blank line between paragraphs.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    let spaced = replace_all(&HORIZONTAL_SPACE, text, " ");
    let lines: Vec<&str> = spaced.split('\n').map(str::trim).collect();
    replace_all(&BLANK_LINES, &lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Normalizes raw extracted text.
///
/// URL-unescapes, decodes entities, turns tabs, carriage returns,
/// non-breaking spaces and backslashes into spaces, strips ellipses and
/// citation markers, then collapses whitespace. Line breaks survive.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let unescaped = percent_decode_str(text).decode_utf8_lossy();
    let decoded = decode_entities(&unescaped);
    let spaced: String = decoded
        .chars()
        .map(|c| match c {
            '\t' | '\r' | '\u{a0}' | '\\' => ' ',
            other => other,
        })
        .collect();
    let without_ellipsis = replace_all(&ELLIPSIS, &spaced, "");
    let without_citations = replace_all(&CITATION, &without_ellipsis, "");
    collapse_whitespace(&without_citations)
}

/// Normalizes a search snippet to a single clean line.
///
/// Middle dots become commas, and a numbered definition prefix
/// (`"2 — ..."`) is dropped.
#[must_use]
pub fn normalize_snippet(snippet: &str) -> String {
    let joined = snippet.replace(" · ", ", ");
    let body = if joined.starts_with(|c: char| c.is_ascii_digit()) {
        joined
            .split_once(" — ")
            .map_or(joined.as_str(), |(_, rest)| rest)
    } else {
        joined.as_str()
    };
    normalize_text(body).replace('\n', " ")
}

/// Removes citation markers such as `[1]` or `[^2^]`.
#[must_use]
pub fn strip_citations(text: &str) -> String {
    replace_all(&CITATION, text, "")
}

/// Removes the first match of `pattern`, if any.
#[must_use]
pub fn remove_first(pattern: &Regex, text: &str) -> String {
    pattern.replacen(text, 1, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("A &amp; B &lt;3&gt; &quot;x&quot;"), "A & B <3> \"x\"");
        assert_eq!(decode_entities("Nguy&#7877;n &#x110;"), "Nguyễn Đ");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("&#xD800;"), "&#xD800;");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace("  Một   hai \n\n\n  ba\tbốn \n năm  "),
            "Một hai\n\nba bốn\nnăm"
        );
    }

    #[test]
    fn test_normalize_text() {
        let raw = "Bom%20nguy%C3%AAn t\u{1eed}\\ l\u{e0}\u{a0}v\u{169} kh\u{ed}...[1] m\u{1ea1}nh\u{2026}";
        assert_eq!(normalize_text(raw), "Bom nguy\u{ea}n t\u{1eed} l\u{e0} v\u{169} kh\u{ed} m\u{1ea1}nh");
    }

    #[test]
    fn test_normalize_text_keeps_paragraphs() {
        assert_eq!(normalize_text("A.\n \n\nB.\nC."), "A.\n\nB.\nC.");
    }

    #[test]
    fn test_normalize_snippet() {
        assert_eq!(
            normalize_snippet("12 thg 5, 2023 — Robert Oppenheimer · nhà vật lý"),
            "Robert Oppenheimer, nhà vật lý"
        );
        assert_eq!(normalize_snippet("Bom &amp; đạn\ndược"), "Bom & đạn dược");
    }

    #[test]
    fn test_remove_first_only_once() {
        let re = Regex::new("Hãy.*?[.]").unwrap();
        assert_eq!(remove_first(&re, "Hãy đọc. Hãy xem. Nội dung."), " Hãy xem. Nội dung.");
    }
}
