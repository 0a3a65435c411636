//! Orbweaver: a resumable crawling engine
//!
//! This crate implements the scheduling core of a web crawler: a durable
//! priority frontier with crash recovery, a URL-deduplication registry, and a
//! pool of worker tasks whose fetch/parse/visit behavior is injected through
//! a handler trait.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod robots;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Orbweaver operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] storage::RegistryError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] crawler::PageParseError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Seed rejected: {0}")]
    SeedRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Orbweaver operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlEngine, CrawlHandler, CrawlStats, EngineState, HandlerFactory, Page};
pub use frontier::Frontier;
pub use storage::{DocId, StorageEnv};
pub use url::{canonicalize, TldList, WebUrl};
