//! Error types
//!
//! `ConfigError` covers everything that is wrong with a group schema and is
//! raised before any page is parsed. `EngineError` wraps it together with the
//! side-channel failures (serialization, debug artifacts, logging setup).

use std::path::PathBuf;
use thiserror::Error;

/// Malformed or inconsistent group schema
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("group '{group}' references unknown parent '{parent}'")]
    UnknownParent { group: String, parent: String },

    #[error("group '{group}' is part of a parent cycle")]
    ParentCycle { group: String },

    #[error("group '{group}' has multiple count 0, expected a positive integer")]
    InvalidMultiple { group: String },

    #[error("member '{member}' has cyclic_block_size 0, expected a positive integer")]
    InvalidBlockSize { member: String },

    #[error("member '{member}' in group '{group}' conflicts with an earlier declaration")]
    ConflictingMember { member: String, group: String },

    #[error("member '{member}' has a circular not/not_reorder reference")]
    MemberCycle { member: String },

    #[error("member '{member}' in group '{group}' shadows the child group of the same name")]
    MemberShadowsGroup { member: String, group: String },

    #[error("member '{member}' sets an attribute but its source is not a selector: query")]
    AttributeWithoutQuery { member: String },

    #[error("invalid css query '{query}' for member '{member}'")]
    InvalidQuery { member: String, query: String },
}

/// Top-level error for an organize request
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}
