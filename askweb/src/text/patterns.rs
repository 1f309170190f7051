//! Lexical classes recognised by the tokenizer, in dispatch order.

use regex::Regex;
use std::sync::LazyLock;

/// A lexical class the tokenizer knows how to keep intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexicalClass {
    /// Two or more dots.
    Ellipsis,
    /// An email address.
    Email,
    /// A URL or bare domain.
    Url,
    /// Day, month and year.
    FullDate,
    /// Month and year.
    Month,
    /// Day and month.
    Date,
    /// Clock time, including the Vietnamese `9h30` form.
    Time,
    /// An amount with a currency symbol.
    Money,
    /// A phone number.
    Phone,
    /// Initials or names joined by dots or hyphens.
    ShortName,
    /// Arithmetic over numbers.
    NumbersExpression,
    /// A single number.
    Number,
    /// A hyphenated word.
    WordWithHyphen,
    /// One punctuation mark.
    Punctuation,
    /// One special character.
    SpecialChar,
    /// Dotted upper-case abbreviation such as `U.N`.
    AllCap,
}

/// What the tokenizer does when a class matches only part of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAction {
    /// Split around the matched span.
    Split,
    /// Split only if the token does not look like a dotted proper noun.
    SplitIfUrl,
    /// Split only if a letter precedes the match, otherwise keep the token whole.
    SplitIfLettered,
}

/// A compiled lexical class.
#[derive(Debug)]
pub struct LexicalPattern {
    /// The class.
    pub class: LexicalClass,
    /// Partial-match action.
    pub action: SplitAction,
    partial: Regex,
    whole: Regex,
}

impl LexicalPattern {
    fn new(class: LexicalClass, action: SplitAction, source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            class,
            action,
            partial: Regex::new(source)?,
            whole: Regex::new(&format!("^(?:{source})$"))?,
        })
    }

    /// Whether the whole token belongs to the class.
    #[must_use]
    pub fn matches_whole(&self, token: &str) -> bool {
        self.whole.is_match(token)
    }

    /// Byte span of the first non-empty match inside the token.
    #[must_use]
    pub fn find(&self, token: &str) -> Option<(usize, usize)> {
        self.partial
            .find_iter(token)
            .find(|m| !m.is_empty())
            .map(|m| (m.start(), m.end()))
    }
}

const NUMBER: &str = r"[-+]?\d+(?:[.,]\d+)*%?\p{Sc}?";

const SHORT_NAME: &str = r"(?:\p{L}+(?:[.\-]\p{L}+)+)|(?:\p{L}+-\d+)";

fn sources() -> Vec<(LexicalClass, SplitAction, String)> {
    use LexicalClass as C;
    use SplitAction as A;

    vec![
        (C::Ellipsis, A::Split, r"\.{2,}".to_string()),
        (C::Email, A::Split, r"(?:[\w.\-]+)@(?:(?:[\w\-]+)\.)*(?:[\w\-]+)".to_string()),
        (
            C::Url,
            A::SplitIfUrl,
            r"(?:(?:(?:https?|ftp)://|www\.)[^\s/$.?#].[^\s]*)|(?:(?:https?://)?(?:www\.)?[-a-zA-Z0-9@:%._+~#=]{2,256}\.[a-z]{2,6}\b[-a-zA-Z0-9@:%_+.~#?&/=]*)"
                .to_string(),
        ),
        (
            C::FullDate,
            A::Split,
            r"(?:0?[1-9]|[12][0-9]|3[01])[/.\-](?:1[0-2]|0?[1-9])[/.\-]\d{4}".to_string(),
        ),
        (C::Month, A::SplitIfLettered, r"(?:1[0-2]|0?[1-9])/\d{4}".to_string()),
        (C::Date, A::Split, r"(?:0?[1-9]|[12][0-9]|3[01])/(?:1[0-2]|0?[1-9])".to_string()),
        (
            C::Time,
            A::Split,
            r"(?:\d\d:\d\d:\d\d)|(?:(?:0?\d|1\d|2[0-3])[:h](?:0?\d|[1-5]\d)(?:’|'|p|ph)?)".to_string(),
        ),
        (C::Money, A::Split, r"\p{Sc}\d+(?:[.,]\d+)*|\d+(?:[.,]\d+)*\p{Sc}".to_string()),
        (
            C::Phone,
            A::Split,
            r"(?:\(?\+\d{1,2}\)?[\s.\-]?)?\d{2,}[\s.\-]?\d{3,}[\s.\-]?\d{3,}".to_string(),
        ),
        (C::ShortName, A::Split, SHORT_NAME.to_string()),
        (C::NumbersExpression, A::Split, format!(r"{NUMBER}(?:[+\-*/]{NUMBER})*")),
        (C::Number, A::Split, NUMBER.to_string()),
        (C::WordWithHyphen, A::Split, r"\p{L}+-\p{L}+(?:-\p{L}+)*".to_string()),
        (
            C::Punctuation,
            A::Split,
            r#",|\.|:|\?|!|;|-|_|"|'|“|”|\||\(|\)|\[|\]|\{|\}|⟨|⟩|«|»|\\|/|‘|’|…|·"#.to_string(),
        ),
        (C::SpecialChar, A::Split, r"~|@|#|\^|&|\*|\+|-|–|<|>|\|".to_string()),
        (C::AllCap, A::Split, r"[A-Z]+\.[A-Z]+".to_string()),
    ]
}

/// The lexical classes in dispatch order.
pub static LEXICAL_PATTERNS: LazyLock<Vec<LexicalPattern>> = LazyLock::new(|| {
    sources()
        .into_iter()
        .filter_map(|(class, action, source)| match LexicalPattern::new(class, action, &source) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::error!(?class, error = %e, "lexical pattern failed to compile");
                None
            }
        })
        .collect()
});

/// Matches a short name anywhere in a token.
pub static SHORT_NAME_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(SHORT_NAME).ok());

/// A token made only of end-of-sentence punctuation.
pub static END_OF_SENTENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:\.+|\?|!|…)$").ok());

/// Whether the token is end-of-sentence punctuation.
#[must_use]
pub fn is_end_of_sentence(token: &str) -> bool {
    END_OF_SENTENCE
        .as_ref()
        .is_some_and(|re| re.is_match(token))
}

/// Whether a short name occurs anywhere in the token.
#[must_use]
pub fn contains_short_name(token: &str) -> bool {
    SHORT_NAME_RE.as_ref().is_some_and(|re| re.is_match(token))
}
