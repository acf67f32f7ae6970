//! Main-content and metadata extraction for academic web pages.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

const CONTAINER_MARKERS: [&str; 8] = [
    "article", "content", "paper", "research", "abstract", "body", "text", "main",
];

const SECTION_KEYWORDS: [&str; 8] = [
    "abstract",
    "introduction",
    "method",
    "methodology",
    "result",
    "discussion",
    "conclusion",
    "reference",
];

const AUTHOR_CLASS_MARKERS: [&str; 3] = ["author", "creator", "contributor"];
const AUTHOR_META_NAMES: [&str; 2] = ["author", "citation_author"];
const DATE_META_NAMES: [&str; 3] = ["date", "pubdate", "publication_date"];

const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

static CONTAINERS: LazyLock<Selector> = LazyLock::new(|| selector("article, main, div"));
static SECTIONS: LazyLock<Selector> = LazyLock::new(|| selector("section, div, h1, h2, h3"));
static PARAGRAPHS: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static DATES: LazyLock<Selector> = LazyLock::new(|| selector("time, meta"));
static AUTHORS: LazyLock<Selector> = LazyLock::new(|| selector("meta, a, span, div"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
}

/// Which rule produced the main content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Container,
    Sections,
    Paragraphs,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub content: String,
    pub source: ContentSource,
    pub metadata: PageMetadata,
}

pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);
    let (content, source) = extract_main_content(&document);
    let metadata = extract_metadata(&document);
    ExtractedPage {
        content,
        source,
        metadata,
    }
}

pub fn extract_main_content(document: &Html) -> (String, ContentSource) {
    if let Some(container) = largest_content_container(document) {
        return (visible_text(container, " "), ContentSource::Container);
    }

    let sections = paper_sections(document);
    if !sections.is_empty() {
        return (sections.join("\n"), ContentSource::Sections);
    }

    let paragraphs = document
        .select(&PARAGRAPHS)
        .map(|p| visible_text(p, ""))
        .collect::<Vec<_>>();
    let paragraphs = paragraphs.join("\n");
    if !paragraphs.trim().is_empty() {
        return (paragraphs, ContentSource::Paragraphs);
    }

    (
        visible_text(document.root_element(), " "),
        ContentSource::Document,
    )
}

fn largest_content_container(document: &Html) -> Option<ElementRef<'_>> {
    let mut best: Option<(usize, ElementRef<'_>)> = None;

    for element in document.select(&CONTAINERS) {
        let attrs = element.value();
        let is_candidate = [attrs.attr("class"), attrs.attr("id")]
            .into_iter()
            .flatten()
            .any(|value| CONTAINER_MARKERS.iter().any(|m| value.contains(m)));
        if !is_candidate {
            continue;
        }

        // Scored in characters; ties keep the earliest element in document order.
        let len = element.html().chars().count();
        if best.is_none_or(|(best_len, _)| len > best_len) {
            best = Some((len, element));
        }
    }

    best.map(|(_, element)| element)
}

fn paper_sections(document: &Html) -> Vec<String> {
    let mut sections = Vec::new();

    for element in document.select(&SECTIONS) {
        let heading = visible_text(element, " ").to_lowercase();
        if !SECTION_KEYWORDS.iter().any(|k| heading.contains(k)) {
            continue;
        }

        sections.push(format!("\n\n{}", visible_text(element, "")));
        if let Some(next) = element.next_siblings().find_map(ElementRef::wrap) {
            sections.push(visible_text(next, " "));
        }
    }

    sections
}

pub fn extract_metadata(document: &Html) -> PageMetadata {
    let title = document
        .select(&TITLE)
        .next()
        .map(|el| visible_text(el, ""))
        .filter(|t| !t.is_empty());

    let publication_date = document.select(&DATES).find_map(|el| {
        let attrs = el.value();
        match attrs.name() {
            "meta" if attrs.attr("name").is_some_and(|n| named(n, &DATE_META_NAMES)) => {
                attrs.attr("content").map(str::to_owned)
            }
            "time" => attrs.attr("datetime").map(str::to_owned),
            _ => None,
        }
    });

    let mut seen = HashSet::new();
    let mut authors = Vec::new();
    for el in document.select(&AUTHORS) {
        let attrs = el.value();
        let author = match attrs.name() {
            "meta" if attrs.attr("name").is_some_and(|n| named(n, &AUTHOR_META_NAMES)) => {
                attrs.attr("content").map(|c| c.trim().to_owned())
            }
            "a" | "span" | "div"
                if attrs
                    .attr("class")
                    .is_some_and(|c| AUTHOR_CLASS_MARKERS.iter().any(|m| c.contains(m))) =>
            {
                Some(visible_text(el, " "))
            }
            _ => None,
        };
        if let Some(author) = author
            && !author.is_empty()
            && seen.insert(author.clone())
        {
            authors.push(author);
        }
    }

    PageMetadata {
        title,
        authors: (!authors.is_empty()).then(|| authors.join(", ")),
        publication_date,
    }
}

fn named(name: &str, accepted: &[&str]) -> bool {
    accepted.iter().any(|a| a.eq_ignore_ascii_case(name))
}

/// Trimmed text nodes under `element` joined by `separator`, skipping script-like elements.
fn visible_text(element: ElementRef<'_>, separator: &str) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(separator)
}
