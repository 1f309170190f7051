//! Tokenizer and sentence joiner for Vietnamese prose.
//!
//! Tokenization works on whitespace-delimited words. A word is decomposed into
//! strictly shorter pieces until every piece is either protected (abbreviation,
//! exception term, lexical class) or indivisible. Decomposition uses an
//! explicit work stack so adversarial input cannot exhaust the call stack.
//!
//! Tokens remember whether whitespace preceded them in the source, which lets
//! the joiner rebuild sentences without inserting spaces that were never
//! there (`"tử?"` stays `"tử?"`, not `"tử ?"`).

use super::lexicon::{find_protected, is_abbreviation, is_exception};
use super::patterns::{contains_short_name, is_end_of_sentence, SplitAction, LEXICAL_PATTERNS};

const COMMA: &str = ",";
const STOP: &str = ".";
const COLON: &str = ":";

/// Words longer than this are emitted as one token without decomposition.
const MAX_WORD_BYTES: usize = 1024;

/// A token and whether whitespace preceded it in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub(crate) text: &'a str,
    pub(crate) spaced: bool,
}

/// How one word is broken down.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decomposition<'a> {
    /// The word is a single token.
    Keep,
    /// The word is made of these pieces, in order. Each is strictly shorter.
    Pieces(Vec<&'a str>),
}

fn has_non_alphabetic(word: &str) -> bool {
    word.chars().any(|c| !c.is_alphabetic())
}

fn split_around(word: &str, start: usize, end: usize) -> Option<Decomposition<'_>> {
    if start >= end || (start == 0 && end == word.len()) {
        return None;
    }
    let pieces = [&word[..start], &word[start..end], &word[end..]]
        .into_iter()
        .filter(|piece| !piece.is_empty())
        .collect();
    Some(Decomposition::Pieces(pieces))
}

/// Dotted segments that are a lone capital or carry non-ASCII text mark a
/// proper-noun sequence ("Ông.A.Nguyễn"), not a URL.
fn looks_like_url(word: &str) -> bool {
    word.split('.').all(|segment| {
        let mut chars = segment.chars();
        let lone_capital = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase());
        !lone_capital && segment.is_ascii()
    })
}

/// Decomposes one whitespace-free word.
pub(crate) fn decompose(word: &str) -> Decomposition<'_> {
    let char_count = word.chars().count();
    if char_count <= 1 || !has_non_alphabetic(word) {
        return Decomposition::Keep;
    }

    if let Some(rest) = word.strip_suffix(',') {
        return Decomposition::Pieces(vec![rest, &word[rest.len()..]]);
    }

    if is_abbreviation(word) || is_exception(word) {
        return Decomposition::Keep;
    }

    if let Some(rest) = word.strip_suffix('.') {
        if rest.chars().next_back().is_some_and(char::is_alphabetic) {
            let initial = char_count == 2 && rest.chars().all(char::is_uppercase);
            if initial || contains_short_name(word) {
                return Decomposition::Keep;
            }
            return Decomposition::Pieces(vec![rest, &word[rest.len()..]]);
        }
    }

    if let Some((start, end)) = find_protected(word) {
        if let Some(split) = split_around(word, start, end) {
            return split;
        }
    }

    if LEXICAL_PATTERNS.iter().any(|p| p.matches_whole(word)) {
        return Decomposition::Keep;
    }

    for pattern in LEXICAL_PATTERNS.iter() {
        let Some((start, end)) = pattern.find(word) else {
            continue;
        };
        match pattern.action {
            SplitAction::SplitIfUrl if !looks_like_url(word) => continue,
            SplitAction::SplitIfLettered if !word[..start].chars().any(char::is_alphabetic) => {
                return Decomposition::Keep;
            }
            _ => {}
        }
        return split_around(word, start, end).unwrap_or(Decomposition::Keep);
    }

    Decomposition::Keep
}

/// Splits text into tokens.
pub(crate) fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut stack: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        if word.len() > MAX_WORD_BYTES {
            tokens.push(Token { text: word, spaced: true });
            continue;
        }
        let mut first = true;
        stack.push(word);
        while let Some(piece) = stack.pop() {
            match decompose(piece) {
                Decomposition::Keep => {
                    tokens.push(Token { text: piece, spaced: first });
                    first = false;
                }
                Decomposition::Pieces(pieces) => stack.extend(pieces.into_iter().rev()),
            }
        }
    }

    tokens
}

fn starts_with(token: &str, predicate: impl Fn(char) -> bool) -> bool {
    token.chars().next().is_some_and(predicate)
}

fn is_closing_brace(token: &str) -> bool {
    matches!(token, "”" | "\u{FFFD}" | "'" | ")" | "}" | "]")
}

fn is_quote(token: &str) -> bool {
    matches!(token, "\"" | "''" | "“" | "”")
}

fn quote_count(buffer: &[Token<'_>]) -> usize {
    buffer.iter().filter(|t| is_quote(t.text)).count()
}

fn is_initial(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(c), Some('.'), None) if c.is_uppercase()
    )
}

/// Whether the sentence should close after `tokens[i]`, given the buffer
/// accumulated so far (which already includes `tokens[i]`).
fn closes_sentence(tokens: &[Token<'_>], i: usize, buffer: &[Token<'_>]) -> bool {
    let token = tokens[i].text;
    let Some(next) = tokens.get(i + 1).map(|t| t.text) else {
        return true;
    };

    if token == COLON {
        if let Some(after) = tokens.get(i + 2).map(|t| t.text) {
            if starts_with(next, |c| c.is_ascii_digit()) && (is_end_of_sentence(after) || after == COMMA) {
                return true;
            }
        }
    }

    if !is_end_of_sentence(token) {
        return false;
    }

    if is_quote(next) && quote_count(buffer) % 2 == 1 {
        return false;
    }

    if is_closing_brace(next)
        || next.is_empty()
        || next == COMMA
        || starts_with(next, char::is_lowercase)
        || starts_with(next, |c| c.is_ascii_digit())
    {
        return false;
    }

    if buffer.len() == 2 && token == STOP {
        let before = buffer[0].text;
        let lone_capital = before.chars().count() == 1 && starts_with(before, char::is_uppercase);
        if starts_with(before, |c| c.is_ascii_digit())
            || starts_with(before, char::is_lowercase)
            || lone_capital
        {
            return false;
        }
    }

    true
}

/// Byte offsets where a run-on sentence should break: whitespace preceded by
/// `.?!:` and followed by an upper-case letter, unless the preceding word is a
/// known abbreviation or an initial.
fn residual_breaks(sentence: &str) -> Vec<(usize, usize)> {
    let mut breaks = Vec::new();
    let mut iter = sentence.char_indices().peekable();
    let mut word_start = 0;

    while let Some((i, c)) = iter.next() {
        if !c.is_whitespace() {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, w)) = iter.peek() {
            if !w.is_whitespace() {
                break;
            }
            end = j + w.len_utf8();
            iter.next();
        }

        let previous_word = &sentence[word_start..i];
        let terminated = previous_word
            .chars()
            .next_back()
            .is_some_and(|p| matches!(p, '.' | '?' | '!' | ':'));
        let upper_follows = sentence[end..].chars().next().is_some_and(char::is_uppercase);
        if terminated && upper_follows && !is_abbreviation(previous_word) && !is_initial(previous_word) {
            breaks.push((i, end));
        }
        word_start = end;
    }

    breaks
}

fn flush(buffer: &mut Vec<Token<'_>>, sentences: &mut Vec<String>) {
    let mut joined = String::new();
    for token in buffer.drain(..) {
        if token.text.is_empty() {
            continue;
        }
        if token.spaced && !joined.is_empty() {
            joined.push(' ');
        }
        joined.push_str(token.text);
    }

    let joined = joined.trim();
    let mut start = 0;
    for (break_start, break_end) in residual_breaks(joined) {
        sentences.push(joined[start..break_start].to_string());
        start = break_end;
    }
    let tail = &joined[start..];
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
}

/// Joins tokens into sentences.
pub(crate) fn join_sentences(tokens: &[Token<'_>]) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut buffer: Vec<Token<'_>> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        buffer.push(*token);
        if closes_sentence(tokens, i, &buffer) {
            flush(&mut buffer, &mut sentences);
        }
    }

    sentences
}

/// Splits text into sentences.
///
/// Pure and deterministic. Every non-whitespace character of the input
/// appears in the output, in order; runs of whitespace become single spaces.
#[must_use]
pub fn segment(text: &str) -> Vec<String> {
    join_sentences(&tokenize(text))
}

/// Stateless sentence segmenter, for callers that want a value to hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceSegmenter;

impl SentenceSegmenter {
    /// Creates a segmenter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Splits text into sentences.
    #[must_use]
    pub fn segment(&self, text: &str) -> Vec<String> {
        segment(text)
    }
}
