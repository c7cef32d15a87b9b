//! Hierarchical text extraction from rendered HTML
//!
//! Turns a set of pages plus a declarative group schema into nested JSON:
//! - structural selector map (id, class and ancestor-qualified selectors)
//! - CSS query members (`selector:<css>`)
//! - per-member cleanup rules (dedup, trimming, substring subtraction, cyclic blocks)
//! - group materialization (`single`, `all`, `multiple`)
//!
//! Exposed to C through [`ffi`].

pub mod config;
pub mod error;
pub mod extractors;
pub mod ffi;
pub mod logging;
pub mod organizer;
pub mod schema;

pub use config::{SiteConfig, SitesConfig};
pub use error::{ConfigError, EngineError};
pub use extractors::*;
pub use ffi::*;
pub use logging::{init_logging, LoggingConfig};
pub use organizer::{organize, organize_request, OrganizeRequest, OrganizedResult};
pub use schema::*;
