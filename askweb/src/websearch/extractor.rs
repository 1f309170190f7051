//! Content extraction: focus-area selection, normalization and sentence
//! filtering for one fetched page.
//!
//! A page moves through `Fetched → FocusAreaSelected → Normalized →
//! Segmented`. Failing at any state yields an [`ExtractError`] carrying the
//! last state reached; the orchestrator treats that as "no content from
//! this page".

use regex::{Regex, RegexBuilder};
use scraper::{CaseSensitivity, ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use tracing::debug;

use super::config::ExtractionConfig;
use super::normalize::{collapse_whitespace, normalize_text, remove_first};
use super::run_utils::source_domain;
use crate::errors::{ConfigError, ExtractError, ExtractionStage};
use crate::ranking::CandidateSentence;
use crate::text::SentenceSegmenter;

static BODY_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("body").ok());

static DIV_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("div").ok());

static PARAGRAPH_BREAK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n\s*\n").ok());

fn compile(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

fn answer_marker_regex(markers: &[String]) -> Result<Option<Regex>, ConfigError> {
    let alternatives: Vec<String> = markers
        .iter()
        .filter(|m| !m.trim().is_empty())
        .map(|m| regex::escape(m.trim()))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&format!("({}).*?:", alternatives.join("|")))
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map(Some)
        .map_err(|e| ConfigError::invalid("answer_markers", e.to_string()))
}

/// A candidate focus area and its score.
struct Area {
    text: String,
    letters: usize,
}

impl Area {
    fn new(text: String) -> Self {
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        Self { text, letters }
    }

    fn mentions(&self, topic: &str) -> bool {
        collapse_whitespace(&self.text).replace('\n', " ").contains(topic)
    }
}

/// Keeps the area with the most letters; ties keep the earlier one.
fn best_area(areas: impl IntoIterator<Item = Area>) -> Option<Area> {
    areas.into_iter().fold(None, |best: Option<Area>, area| match best {
        Some(current) if area.letters <= current.letters => Some(current),
        _ => Some(area),
    })
}

/// Extracts candidate sentences from page HTML.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    config: ExtractionConfig,
    ad: Regex,
    command: Regex,
    answer_marker: Option<Regex>,
    segmenter: SentenceSegmenter,
}

impl ContentExtractor {
    /// Creates an extractor, compiling the configured patterns.
    pub fn new(config: ExtractionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            ad: compile("ad_pattern", &config.ad_pattern)?,
            command: compile("command_pattern", &config.command_pattern)?,
            answer_marker: answer_marker_regex(&config.answer_markers)?,
            segmenter: SentenceSegmenter::new(),
            config,
        })
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    fn is_noise(&self, element: &scraper::node::Element) -> bool {
        self.config.noise_tags.iter().any(|t| t == element.name())
            || self
                .config
                .noise_classes
                .iter()
                .any(|c| element.has_class(c, CaseSensitivity::CaseSensitive))
    }

    fn is_answer_like(&self, element: &scraper::node::Element) -> bool {
        self.config.answer_classes.iter().any(|class| {
            if class.contains(' ') {
                element.attr("class").map(str::trim) == Some(class.as_str())
            } else {
                element.has_class(class, CaseSensitivity::CaseSensitive)
            }
        })
    }

    fn collect_text(&self, node: &ElementRef<'_>, buf: &mut String) {
        for child in node.children() {
            match child.value() {
                Node::Text(text) => buf.push_str(text),
                Node::Element(el) => {
                    if self.is_noise(el) {
                        continue;
                    }
                    let name = el.name();
                    let block = self.config.block_tags.iter().any(|t| t == name);
                    if name == "br" {
                        buf.push('\n');
                    } else if block {
                        buf.push_str("\n\n");
                    } else {
                        buf.push(' ');
                    }
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        self.collect_text(&child_ref, buf);
                    }
                    if block {
                        buf.push_str("\n\n");
                    } else if name != "br" {
                        buf.push(' ');
                    }
                }
                _ => {}
            }
        }
    }

    fn area(&self, element: &ElementRef<'_>) -> Area {
        let mut buf = String::new();
        self.collect_text(element, &mut buf);
        Area::new(buf)
    }

    /// Chooses the focus area and returns its raw text, paragraphs separated
    /// by blank lines.
    ///
    /// Answer-like containers win when present; with a topic, those not
    /// containing it are skipped first. Otherwise the direct children of
    /// `body` compete, noise removed. The area with the most letters wins.
    pub fn focus_text(&self, html: &str, topic: Option<&str>) -> Result<String, ExtractError> {
        if html.trim().is_empty() {
            return Err(ExtractError::new(ExtractionStage::Fetched, "empty page"));
        }
        let (Some(body_selector), Some(div_selector)) = (BODY_SELECTOR.as_ref(), DIV_SELECTOR.as_ref()) else {
            return Err(ExtractError::new(ExtractionStage::Fetched, "selectors failed to compile"));
        };

        let document = Html::parse_document(html);
        let Some(body) = document.select(body_selector).next() else {
            return Err(ExtractError::new(ExtractionStage::Fetched, "page has no body"));
        };

        let topic = topic.map(str::trim).filter(|t| !t.is_empty());
        let prioritized: Vec<Area> = body
            .select(div_selector)
            .filter(|div| self.is_answer_like(div.value()))
            .map(|div| self.area(&div))
            .collect();
        // When no container mentions the topic, the containers still beat the
        // generic body children.
        let prioritized = match topic {
            Some(t) if prioritized.iter().any(|area| area.mentions(t)) => {
                prioritized.into_iter().filter(|area| area.mentions(t)).collect()
            }
            _ => prioritized,
        };

        let chosen = match best_area(prioritized) {
            Some(area) => {
                debug!(letters = area.letters, "focus area from answer-like container");
                area
            }
            None => {
                let children = body
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| {
                        let value = el.value();
                        self.config.candidate_tags.iter().any(|t| t == value.name()) && !self.is_noise(value)
                    })
                    .map(|el| self.area(&el));
                best_area(children)
                    .filter(|area| area.letters > 0)
                    .unwrap_or_else(|| self.area(&body))
            }
        };

        if chosen.letters == 0 {
            return Err(ExtractError::new(ExtractionStage::FocusAreaSelected, "focus area has no text"));
        }
        Ok(chosen.text)
    }

    /// Normalizes focus-area text and removes the first ad and the first
    /// call-to-action match.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        let text = normalize_text(raw);
        let text = remove_first(&self.ad, &text);
        let text = remove_first(&self.command, &text);
        collapse_whitespace(&text)
    }

    /// Drops everything before the first answer marker. Pages with
    /// reference brackets or table pipes are left alone.
    #[must_use]
    pub fn anchor<'t>(&self, text: &'t str) -> &'t str {
        if text.contains(['[', ']', '|']) {
            return text;
        }
        match self.answer_marker.as_ref().and_then(|re| re.find(text)) {
            Some(found) => &text[found.start()..],
            None => text,
        }
    }

    /// Whether a segmented sentence is well-formed prose worth ranking.
    #[must_use]
    pub fn keep_sentence(&self, sentence: &str) -> bool {
        let sentence = sentence.trim();
        if sentence.chars().count() <= self.config.min_sentence_length {
            return false;
        }
        if sentence.ends_with(':') || sentence.ends_with('?') {
            return false;
        }
        if self.config.reject_substrings.iter().any(|s| sentence.contains(s.as_str())) {
            return false;
        }
        if self.config.navigation_prefixes.iter().any(|p| sentence.starts_with(p.as_str())) {
            return false;
        }
        sentence.ends_with('.')
            || sentence.ends_with('!')
            || sentence.chars().next().is_some_and(char::is_uppercase)
    }

    /// Splits normalized text into candidate strings paired with the
    /// paragraph or line they came from.
    ///
    /// With a topic and several paragraphs, the paragraphs containing the
    /// topic are the candidates. Otherwise text before the topic is cut
    /// and each line is segmented into sentences.
    #[must_use]
    pub fn split_candidates(&self, text: &str, topic: Option<&str>) -> Vec<(String, String)> {
        let topic = topic.map(str::trim).filter(|t| !t.is_empty());
        let paragraphs: Vec<&str> = match PARAGRAPH_BREAK.as_ref() {
            Some(re) => re.split(text).map(str::trim).filter(|p| !p.is_empty()).collect(),
            None => vec![text],
        };

        if let Some(topic) = topic {
            if paragraphs.len() > 1 {
                let matching: Vec<(String, String)> = paragraphs
                    .iter()
                    .filter(|p| p.contains(topic))
                    .map(|p| {
                        let joined = p.split('\n').map(str::trim).collect::<Vec<_>>().join(" ");
                        (joined, (*p).to_string())
                    })
                    .collect();
                return matching;
            }
        }

        let text = match topic.and_then(|t| text.find(t)) {
            Some(index) => &text[index..],
            None => text,
        };
        text.split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .flat_map(|line| {
                self.segmenter
                    .segment(line)
                    .into_iter()
                    .map(move |sentence| (sentence, line.to_string()))
            })
            .collect()
    }

    /// Extracts candidate sentences from a page.
    pub fn extract(
        &self,
        html: &str,
        topic: Option<&str>,
        url: &str,
    ) -> Result<Vec<CandidateSentence>, ExtractError> {
        let raw = self.focus_text(html, topic)?;

        let normalized = self.normalize(&raw);
        if normalized.is_empty() {
            return Err(ExtractError::new(
                ExtractionStage::FocusAreaSelected,
                "nothing left after normalization",
            ));
        }
        let anchored = if topic.is_some_and(|t| !t.trim().is_empty()) {
            self.anchor(&normalized)
        } else {
            normalized.as_str()
        };

        let domain = source_domain(url);
        let sentences: Vec<CandidateSentence> = self
            .split_candidates(anchored, topic)
            .into_iter()
            .filter(|(sentence, _)| self.keep_sentence(sentence))
            .map(|(sentence, doc)| CandidateSentence::new(sentence.trim(), domain.as_str()).with_doc(doc))
            .collect();

        if sentences.is_empty() {
            return Err(ExtractError::new(ExtractionStage::Normalized, "no sentence survived filtering"));
        }
        debug!(url, domain = %domain, sentences = sentences.len(), "extracted page");
        Ok(sentences)
    }
}
