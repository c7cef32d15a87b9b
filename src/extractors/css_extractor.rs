//! CSS query members
//!
//! A member whose source starts with `selector:` is answered by running the
//! CSS query on each page with the scraper crate instead of by structural
//! lookup. Results land in the selector map under the member's source key.

use scraper::{Html, Selector};

use super::normalize_text;
use crate::error::ConfigError;
use crate::schema::GroupSchema;

pub const QUERY_PREFIX: &str = "selector:";

/// A compiled `selector:` member
#[derive(Debug, Clone)]
pub struct CssQuery {
    /// Selector map key the matches are stored under
    pub key: String,
    pub selector: Selector,
    /// Read this attribute instead of the element text
    pub attribute: Option<String>,
}

impl CssQuery {
    /// Compile a query; `None` when the CSS does not parse
    pub fn parse(key: impl Into<String>, css: &str, attribute: Option<String>) -> Option<Self> {
        let selector = Selector::parse(css.trim()).ok()?;
        Some(Self {
            key: key.into(),
            selector,
            attribute,
        })
    }

    /// One slot per match in document order; `None` when the attribute is absent.
    ///
    /// Blank text is kept so sibling queries stay aligned; member rules decide
    /// whether to drop it.
    pub fn extract(&self, document: &Html) -> Vec<Option<String>> {
        document
            .select(&self.selector)
            .map(|el| match &self.attribute {
                Some(attr) => el.value().attr(attr).map(str::to_string),
                None => Some(normalize_text(&el.text().collect::<String>())),
            })
            .collect()
    }
}

/// Compile every query member in the schema, one query per distinct source key
pub fn compile_queries(schema: &GroupSchema) -> Result<Vec<CssQuery>, ConfigError> {
    let mut queries: Vec<CssQuery> = Vec::new();

    for (member, rule) in schema.members()? {
        let Some(css) = rule.source(member).strip_prefix(QUERY_PREFIX) else {
            continue;
        };

        let key = rule.source_key(member);
        if queries.iter().any(|q| q.key == key) {
            continue;
        }

        let query = CssQuery::parse(key, css, rule.attribute.clone()).ok_or_else(|| {
            ConfigError::InvalidQuery {
                member: member.to_string(),
                query: css.to_string(),
            }
        })?;
        queries.push(query);
    }

    Ok(queries)
}
