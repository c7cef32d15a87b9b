//! Structural selector map
//!
//! Every element with non-empty text contributes its text to:
//! - its own selector (`#id`, else `.a.b`, else the tag name)
//! - `"<ancestor> <tag>"` for each ancestor selector
//! - `"<ancestor> <own>"` for each ancestor selector, when own is an id or class compound
//!
//! Ancestor selectors are collected nearest-first: the id, the full class
//! compound and, with more than one class, the first class alone.

use std::collections::BTreeMap;
use std::path::Path;

use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

use super::CssQuery;
use crate::error::EngineError;

/// Selector -> text occurrences in document order, pages concatenated.
///
/// Structural selectors only ever hold text. Query members hold one slot per
/// matched element, `None` where the requested attribute is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SelectorMap {
    entries: BTreeMap<String, Vec<Option<String>>>,
}

impl SelectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, selector: &str) -> Option<&[Option<String>]> {
        self.entries.get(selector).map(Vec::as_slice)
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.entries.contains_key(selector)
    }

    pub fn push(&mut self, selector: impl Into<String>, text: impl Into<String>) {
        self.push_slot(selector, Some(text.into()));
    }

    /// Append one occurrence that may carry no value
    pub fn push_slot(&mut self, selector: impl Into<String>, value: Option<String>) {
        self.entries.entry(selector.into()).or_default().push(value);
    }

    /// Append `other` after this map's values, selector by selector
    pub fn extend(&mut self, other: SelectorMap) {
        for (selector, values) in other.entries {
            self.entries.entry(selector).or_default().extend(values);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<String>])> {
        self.entries
            .iter()
            .map(|(selector, values)| (selector.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Dump the map for debugging selector choices
    pub fn write_debug_artifact(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let path = path.as_ref();
        let json = self.to_json_pretty()?;
        std::fs::write(path, json).map_err(|source| EngineError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), selectors = self.len(), "wrote selector map");
        Ok(())
    }
}

/// Builds a [`SelectorMap`] from rendered pages
#[derive(Debug, Clone, Default)]
pub struct SelectorMapBuilder {
    queries: Vec<CssQuery>,
}

impl SelectorMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also answer these CSS query members on every page
    pub fn with_queries(mut self, queries: Vec<CssQuery>) -> Self {
        self.queries = queries;
        self
    }

    /// Index every page, concatenating results in page order
    pub fn build<S: AsRef<str>>(&self, pages: &[S]) -> SelectorMap {
        let mut map = SelectorMap::new();
        for (index, page) in pages.iter().enumerate() {
            let page_map = self.build_page(page.as_ref());
            debug!(page = index, selectors = page_map.len(), "indexed page");
            map.extend(page_map);
        }
        map
    }

    pub fn build_page(&self, html: &str) -> SelectorMap {
        let document = Html::parse_document(html);
        let mut map = SelectorMap::new();

        let every_element = match Selector::parse("*") {
            Ok(s) => s,
            Err(_) => return map,
        };

        for element in document.select(&every_element) {
            if let Some(text) = element_text(&element) {
                record_element(&mut map, &element, &text);
            }
        }

        for query in &self.queries {
            for value in query.extract(&document) {
                map.push_slot(query.key.as_str(), value);
            }
        }

        map
    }
}

/// Collapse whitespace runs to single spaces and trim the ends
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: &ElementRef<'_>) -> Option<String> {
    let text = normalize_text(&element.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn record_element(map: &mut SelectorMap, element: &ElementRef<'_>, text: &str) {
    let tag = element.value().name();
    let own = own_selector(element.value());
    let qualified = own.starts_with('.') || own.starts_with('#');

    for ancestor in ancestor_selectors(element) {
        map.push(format!("{ancestor} {tag}"), text);
        if qualified {
            map.push(format!("{ancestor} {own}"), text);
        }
    }
    map.push(own, text);
}

/// `#id`, else the full class compound, else the tag name
pub fn own_selector(element: &Element) -> String {
    if let Some(id) = element_id(element) {
        return format!("#{id}");
    }

    let classes = class_list(element);
    if !classes.is_empty() {
        return class_compound(&classes);
    }

    element.name().to_string()
}

fn ancestor_selectors(element: &ElementRef<'_>) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    for ancestor in element.ancestors().filter_map(ElementRef::wrap) {
        let el = ancestor.value();
        let mut candidates = Vec::with_capacity(3);

        if let Some(id) = element_id(el) {
            candidates.push(format!("#{id}"));
        }

        let classes = class_list(el);
        if !classes.is_empty() {
            candidates.push(class_compound(&classes));
            if classes.len() > 1 {
                candidates.push(format!(".{}", classes[0]));
            }
        }

        for candidate in candidates {
            if !found.contains(&candidate) {
                found.push(candidate);
            }
        }
    }

    found
}

fn element_id(element: &Element) -> Option<&str> {
    element.attr("id").map(str::trim).filter(|id| !id.is_empty())
}

/// Class names in attribute order, duplicates dropped
fn class_list(element: &Element) -> Vec<&str> {
    let mut classes: Vec<&str> = Vec::new();
    for class in element.attr("class").unwrap_or("").split_whitespace() {
        if !classes.contains(&class) {
            classes.push(class);
        }
    }
    classes
}

fn class_compound(classes: &[&str]) -> String {
    classes.iter().map(|class| format!(".{class}")).collect()
}
