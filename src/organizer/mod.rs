//! Schema-driven organization of extracted text
//!
//! Pipeline: validate the schema, index the pages into a [`SelectorMap`],
//! apply member rules, resolve the group tree, then materialize it.

mod hierarchy;
mod materialize;
mod preprocess;

pub use hierarchy::*;
pub use materialize::*;
pub use preprocess::*;

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, EngineError};
use crate::extractors::{compile_queries, SelectorMap, SelectorMapBuilder};
use crate::schema::GroupSchema;

/// Payload accepted by [`organize_request`] and the FFI entry point
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizeRequest {
    /// Rendered HTML, one entry per page, in page order
    pub pages: Vec<String>,
    pub groups: GroupSchema,
    /// Source URL, only used for logging
    #[serde(default)]
    pub url: Option<String>,
    /// Write the raw selector map here before preprocessing
    #[serde(default)]
    pub debug_selector_map: Option<PathBuf>,
}

/// Organize `pages` according to `schema`
pub fn organize<S: AsRef<str>>(
    pages: &[S],
    schema: &GroupSchema,
) -> Result<OrganizedResult, ConfigError> {
    let map = index_pages(pages, schema)?;
    finish(&map, schema)
}

/// Like [`organize`], with the request's side options applied
pub fn organize_request(request: &OrganizeRequest) -> Result<OrganizedResult, EngineError> {
    let map = index_pages(&request.pages, &request.groups)?;

    if let Some(path) = &request.debug_selector_map {
        map.write_debug_artifact(path)?;
    }

    let result = finish(&map, &request.groups)?;
    if let Some(url) = &request.url {
        info!(url = %url, "organized site");
    }
    Ok(result)
}

fn index_pages<S: AsRef<str>>(
    pages: &[S],
    schema: &GroupSchema,
) -> Result<SelectorMap, ConfigError> {
    schema.validate()?;
    let queries = compile_queries(schema)?;
    Ok(SelectorMapBuilder::new().with_queries(queries).build(pages))
}

fn finish(map: &SelectorMap, schema: &GroupSchema) -> Result<OrganizedResult, ConfigError> {
    let processed = preprocess(map, schema)?;
    let tree = build_hierarchy(schema)?;
    let result = materialize(&tree, &processed);

    info!(
        selectors = map.len(),
        groups = schema.len(),
        missing = processed.missing_selectors().len(),
        "organized pages"
    );
    Ok(result)
}
