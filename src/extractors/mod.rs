//! Page-facing extraction
//!
//! Turns rendered pages into a flat [`SelectorMap`]: structural selectors
//! derived from every text-bearing element, plus the results of any
//! `selector:` CSS query members declared in the schema.

mod css_extractor;
mod selector_map;

pub use css_extractor::*;
pub use selector_map::*;
