//! Crawl engine module
//!
//! This module contains the crawling machinery:
//! - HTTP fetching with politeness and download limits
//! - Content parsing and link extraction
//! - The worker run loop and its page state machine
//! - The engine that owns the session: storage, workers, and the monitor
//!
//! Behavior is customized through a [`CrawlHandler`] built per worker by a
//! [`HandlerFactory`]; the engine itself stays policy-free.

mod engine;
mod fetcher;
mod handler;
mod page;
mod parser;
mod worker;

pub use engine::{CrawlEngine, CrawlStats, EngineState};
pub use fetcher::{FetchError, FetchedPage, PageFetcher};
pub use handler::{CrawlHandler, HandlerFactory, LogHandler};
pub use page::Page;
pub use parser::{parse_content, parse_html, ExtractedLink, PageParseError, ParseData};
