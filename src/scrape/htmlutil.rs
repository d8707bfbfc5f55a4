// src/scrape/htmlutil.rs
// =============================================================================
// Small helpers for pulling text and numbers out of parsed HTML.
//
// Site scrapers share a few recurring moves: take the text directly inside
// an element (ignoring nested markup), take all text under an element, and
// read a number out of markup like "1,234명". They live here so every site
// module extracts the same way.
//
// Rust concepts:
// - ElementRef: A borrowed view into scraper's parsed DOM tree
// - Iterator adapters: find_map/filter do the tree walking declaratively
// =============================================================================

use scraper::{ElementRef, Html, Selector};

// Returns the first immediate text child of el, trimmed
//
// Nested elements are not entered: for <a><span>x</span>y</a> this is "y".
// None when the element has no direct text child at all.
pub fn first_text(el: ElementRef) -> Option<String> {
    el.children()
        .find_map(|child| child.value().as_text())
        .map(|text| text.trim().to_string())
}

// Returns all text under el, concatenated in document order
pub fn tree_text(el: ElementRef) -> String {
    el.text().collect()
}

// Returns the element matching selector, provided it is the only one
//
// Page fields are read off single nav or price elements; a selector that
// matches twice is ambiguous and yields nothing.
pub fn select_only<'a>(doc: &'a Html, selector: &Selector) -> Option<ElementRef<'a>> {
    let mut matches = doc.select(selector);
    let only = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(only)
}

// Reads an integer from the single element matching selector
//
// Thousands separators and unit suffixes are stripped before parsing.
pub fn extract_integer(doc: &Html, selector: &Selector) -> Option<i64> {
    let only = select_only(doc, selector)?;
    remove_non_digits(&tree_text(only)).parse().ok()
}

// Keeps only ASCII digits
pub fn remove_non_digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}
