//! HTML content extraction
//!
//! This module turns the raw markup of one documentation page into a
//! [`ContentRecord`]:
//! - the primary content region, boilerplate removed, as normalized body text
//! - code blocks with a best-effort language tag
//! - word/character counts, keywords and topic tags
//!
//! Extraction is pure and never fails: markup without a content region yields
//! an empty body.

use crate::config::ExtractConfig;
use crate::crawler::dedup::fingerprint;
use crate::crawler::WorkItem;
use crate::ConfigError;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Elements whose text never belongs to the page body
const BOILERPLATE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "template",
];

/// Elements that separate words when their text is flattened
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption", "figure",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "section", "table", "td",
    "th", "tr", "ul",
];

/// A code sample found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Extracted result of one work item attempt
#[derive(Debug, Clone)]
pub struct ContentRecord {
    /// URL the page was fetched from; the content store key
    pub url: String,
    pub target: String,
    pub path: String,
    pub title: String,
    /// Normalized text of the content region, code blocks excluded
    pub body: String,
    pub code_blocks: Vec<CodeBlock>,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub word_count: usize,
    pub char_count: usize,
    /// SHA-256 of `body`
    pub fingerprint: String,
    pub success: bool,
    pub error: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Record of an attempt that produced no markup
    pub fn failed(url: &str, target: &str, item: &WorkItem, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            target: target.to_string(),
            path: item.path.clone(),
            title: item.name.clone(),
            body: String::new(),
            code_blocks: Vec::new(),
            keywords: Vec::new(),
            topics: Vec::new(),
            word_count: 0,
            char_count: 0,
            fingerprint: fingerprint(""),
            success: false,
            error: Some(error.into()),
            extracted_at: Utc::now(),
        }
    }
}

/// Pre-parsed extraction settings shared by every worker of a run
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    content_selectors: Vec<Selector>,
    keyword_count: usize,
    min_keyword_length: usize,
    topic_path_segments: usize,
}

impl ExtractOptions {
    pub fn from_config(config: &ExtractConfig) -> Result<Self, ConfigError> {
        let content_selectors = config
            .content_selectors
            .iter()
            .map(|s| {
                Selector::parse(s)
                    .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", s, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            content_selectors,
            keyword_count: config.keyword_count,
            min_keyword_length: config.min_keyword_length,
            topic_path_segments: config.topic_path_segments,
        })
    }
}

/// Extracts a content record from raw page markup
///
/// # Arguments
///
/// * `markup` - The raw HTML of the page
/// * `item` - The work item the page belongs to
/// * `url` - The URL the page was fetched from
/// * `target` - The documentation slug
/// * `options` - Selectors and keyword/topic tuning
///
/// # Example
///
/// ```
/// use devdocs_ingest::config::ExtractConfig;
/// use devdocs_ingest::crawler::{extract, ExtractOptions, WorkItem};
///
/// let options = ExtractOptions::from_config(&ExtractConfig::default()).unwrap();
/// let item = WorkItem { path: "std/vec".into(), name: "Vec".into(), kind: "Structs".into() };
/// let html = "<main><h1>Vec</h1><p>A contiguous growable array type.</p></main>";
/// let record = extract(html, &item, "https://docs.example/rust/std/vec", "rust", &options);
/// assert_eq!(record.title, "Vec");
/// assert_eq!(record.word_count, 6);
/// ```
pub fn extract(
    markup: &str,
    item: &WorkItem,
    url: &str,
    target: &str,
    options: &ExtractOptions,
) -> ContentRecord {
    let document = Html::parse_document(markup);
    let region = options
        .content_selectors
        .iter()
        .find_map(|selector| document.select(selector).next());

    let (body, code_blocks, heading) = match region {
        Some(region) => {
            let mut raw = String::new();
            collect_text(region, &mut raw);
            (
                normalize_whitespace(&raw),
                extract_code_blocks(region),
                first_heading(region),
            )
        }
        None => {
            tracing::debug!(url, "no content region found");
            (String::new(), Vec::new(), None)
        }
    };

    let title = heading
        .or_else(|| document_title(&document))
        .unwrap_or_else(|| item.name.clone());

    ContentRecord {
        url: url.to_string(),
        target: target.to_string(),
        path: item.path.clone(),
        title,
        word_count: body.split_whitespace().count(),
        char_count: body.chars().count(),
        keywords: keywords(&body, options.keyword_count, options.min_keyword_length),
        topics: topics(target, item, options.topic_path_segments),
        fingerprint: fingerprint(&body),
        body,
        code_blocks,
        success: true,
        error: None,
        extracted_at: Utc::now(),
    }
}

/// Flattens the text of `element`, skipping boilerplate and `pre` blocks
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if name == "pre" || BOILERPLATE_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    let block = BLOCK_TAGS.contains(&name);
                    if block {
                        out.push(' ');
                    }
                    collect_text(child_element, out);
                    if block {
                        out.push(' ');
                    }
                }
            }
            _ => {}
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_inside_boilerplate(element: ElementRef<'_>, region: ElementRef<'_>) -> bool {
    for ancestor in element.ancestors() {
        if ancestor.id() == region.id() {
            return false;
        }
        if let Some(el) = ancestor.value().as_element() {
            if BOILERPLATE_TAGS.contains(&el.name()) {
                return true;
            }
        }
    }
    false
}

fn extract_code_blocks(region: ElementRef<'_>) -> Vec<CodeBlock> {
    let Ok(pre_selector) = Selector::parse("pre") else {
        return Vec::new();
    };

    region
        .select(&pre_selector)
        .filter(|pre| !is_inside_boilerplate(*pre, region))
        .filter_map(|pre| {
            let code: String = pre.text().collect();
            let code = code.trim_end_matches(['\n', '\r']).to_string();
            if code.trim().is_empty() {
                return None;
            }
            Some(CodeBlock {
                language: code_language(pre),
                code,
            })
        })
        .collect()
}

/// Best-effort language of a `pre` block
///
/// `data-language` on the `pre` wins, then a `language-*` / `lang-*` class on
/// the `pre` or its first `code` child.
fn code_language(pre: ElementRef<'_>) -> String {
    if let Some(lang) = pre.value().attr("data-language") {
        let lang = lang.trim();
        if !lang.is_empty() {
            return lang.to_lowercase();
        }
    }

    let code_child = pre
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "code");

    for element in std::iter::once(pre).chain(code_child) {
        for class in element.value().classes() {
            if let Some(lang) = class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
            {
                if !lang.is_empty() {
                    return lang.to_lowercase();
                }
            }
        }
    }

    "text".to_string()
}

fn first_heading(region: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("h1").ok()?;
    region
        .select(&selector)
        .map(|h1| normalize_whitespace(&h1.text().collect::<String>()))
        .find(|s| !s.is_empty())
}

fn document_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Top `count` tokens longer than `min_len` characters
///
/// Sorted by descending frequency; ties keep first-seen order.
pub fn keywords(body: &str, count: usize, min_len: usize) -> Vec<String> {
    let mut stats: HashMap<String, (usize, usize)> = HashMap::new();

    for (position, token) in body
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > min_len)
        .enumerate()
    {
        let entry = stats.entry(token.to_lowercase()).or_insert((0, position));
        entry.0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = stats
        .into_iter()
        .map(|(token, (freq, first))| (token, freq, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(count)
        .map(|(token, _, _)| token)
        .collect()
}

/// Topic tags: target slug, item kind, leading segments of the item name
pub fn topics(target: &str, item: &WorkItem, segments: usize) -> Vec<String> {
    let name = item.name.replace("::", "/");
    let name_segments = name
        .split(|c: char| c == '/' || c == '.' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .take(segments)
        .map(str::to_string);

    let mut tags: Vec<String> = Vec::new();
    for tag in [target.to_string(), item.kind.clone()]
        .into_iter()
        .chain(name_segments)
    {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ExtractOptions {
        ExtractOptions::from_config(&ExtractConfig::default()).unwrap()
    }

    fn item(name: &str, kind: &str) -> WorkItem {
        WorkItem {
            path: "std/vec/struct.vec".to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }

    const PAGE: &str = r#"<html><head><title>Vec - Rust</title></head><body>
        <nav><a href="/">Home</a> Navigation links</nav>
        <main>
          <header>Skip this header</header>
          <h1>Vec</h1>
          <p>A contiguous growable array type.</p>
          <pre data-language="rust">let v = vec![1, 2, 3];
</pre>
          <p>Vectors grow <b>dynamically</b>.</p>
          <pre><code class="language-Shell">cargo build</code></pre>
          <footer>Footer text</footer>
        </main>
        </body></html>"#;

    #[test]
    fn test_extract_body_skips_boilerplate_and_code() {
        let record = extract(PAGE, &item("Vec", "Structs"), "https://x/rust/vec", "rust", &options());

        assert_eq!(
            record.body,
            "Vec A contiguous growable array type. Vectors grow dynamically."
        );
        assert_eq!(record.word_count, 9);
        assert_eq!(record.char_count, record.body.chars().count());
        assert!(record.success);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_extract_code_blocks_with_language() {
        let record = extract(PAGE, &item("Vec", "Structs"), "https://x/rust/vec", "rust", &options());

        assert_eq!(
            record.code_blocks,
            vec![
                CodeBlock {
                    language: "rust".to_string(),
                    code: "let v = vec![1, 2, 3];".to_string(),
                },
                CodeBlock {
                    language: "shell".to_string(),
                    code: "cargo build".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_code_without_annotation_is_text() {
        let html = "<main><pre>plain</pre></main>";
        let record = extract(html, &item("a", "b"), "u", "t", &options());
        assert_eq!(record.code_blocks[0].language, "text");
    }

    #[test]
    fn test_title_fallbacks() {
        let record = extract(PAGE, &item("Vec", "Structs"), "u", "rust", &options());
        assert_eq!(record.title, "Vec");

        let no_h1 = "<html><head><title>Doc Title</title></head><body><main><p>x</p></main></body></html>";
        let record = extract(no_h1, &item("Name", "K"), "u", "rust", &options());
        assert_eq!(record.title, "Doc Title");

        let bare = "<main><p>x</p></main>";
        let record = extract(bare, &item("Name", "K"), "u", "rust", &options());
        assert_eq!(record.title, "Name");
    }

    #[test]
    fn test_missing_region_yields_empty_body() {
        let html = "<html><body><div>Only a div</div></body></html>";
        let record = extract(html, &item("a", "b"), "u", "t", &options());

        assert!(record.success);
        assert_eq!(record.body, "");
        assert_eq!(record.word_count, 0);
        assert!(record.code_blocks.is_empty());
    }

    #[test]
    fn test_malformed_markup_does_not_fail() {
        let html = "<main><p>unclosed <b>tags <div></main></p>";
        let record = extract(html, &item("a", "b"), "u", "t", &options());
        assert!(record.success);
        assert!(record.body.contains("unclosed"));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let a = extract(PAGE, &item("Vec", "Structs"), "u", "rust", &options());
        let b = extract(PAGE, &item("Vec", "Structs"), "u", "rust", &options());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.body, b.body);
        assert_eq!(a.keywords, b.keywords);
    }

    #[test]
    fn test_keywords_by_frequency_then_first_seen() {
        let body = "alpha beta gamma beta delta gamma beta the and";
        let kw = keywords(body, 3, 3);
        assert_eq!(kw, vec!["beta", "gamma", "alpha"]);
    }

    #[test]
    fn test_keywords_are_case_insensitive_and_length_filtered() {
        let kw = keywords("Rust rust RUST is fun and fast", 10, 3);
        assert_eq!(kw, vec!["rust", "fast"]);
    }

    #[test]
    fn test_topics() {
        let tags = topics("rust", &item("std::vec::Vec", "Structs"), 2);
        assert_eq!(tags, vec!["rust", "structs", "std", "vec"]);

        let tags = topics("node", &item("fs/promises.readFile", "File System"), 3);
        assert_eq!(tags, vec!["node", "file system", "fs", "promises", "readfile"]);
    }

    #[test]
    fn test_topics_dedup_and_skip_empty() {
        let tags = topics("rust", &item("rust", ""), 2);
        assert_eq!(tags, vec!["rust"]);
    }

    #[test]
    fn test_failed_record() {
        let record = ContentRecord::failed("u", "rust", &item("Vec", "Structs"), "HTTP 500");
        assert!(!record.success);
        assert_eq!(record.error.as_deref(), Some("HTTP 500"));
        assert_eq!(record.body, "");
    }
}
