use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Orbweaver
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Seeds the binary schedules before starting the workers
    #[serde(default)]
    pub seeds: Vec<SeedEntry>,

    /// Optional public-suffix file overriding the embedded list
    #[serde(rename = "tld-file", default)]
    pub tld_file: Option<PathBuf>,
}

/// Storage environment configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the session's storage environment
    pub root: PathBuf,

    /// Keep durable state across sessions and recover in-flight work on
    /// startup. Off means the environment is wiped every start.
    pub resumable: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("crawl-data"),
            resumable: false,
        }
    }
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Maximum link depth from the seeds. Unset means unlimited.
    #[serde(rename = "max-depth")]
    pub max_depth: Option<i16>,

    /// Cap on the number of pages ever admitted. Unset means unlimited.
    #[serde(rename = "max-pages")]
    pub max_pages: Option<u64>,

    /// Schedule redirect targets instead of dropping 3xx responses
    #[serde(rename = "follow-redirects")]
    pub follow_redirects: bool,

    /// Pass binary content through to visit instead of rejecting it
    #[serde(rename = "include-binary-content")]
    pub include_binary_content: bool,

    /// Most links extracted from a single page
    #[serde(rename = "max-outgoing-links")]
    pub max_outgoing_links: usize,

    /// Consult robots.txt before admitting URLs
    #[serde(rename = "respect-robots")]
    pub respect_robots: bool,

    /// Let the monitor end the session once all workers idle on an empty
    /// queue
    #[serde(rename = "shutdown-on-empty-queue")]
    pub shutdown_on_empty_queue: bool,

    /// Minimum spacing between request dispatches (milliseconds)
    #[serde(rename = "politeness-delay-ms")]
    pub politeness_delay_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_pages: None,
            follow_redirects: true,
            include_binary_content: false,
            max_outgoing_links: 5000,
            respect_robots: true,
            shutdown_on_empty_queue: true,
            politeness_delay_ms: 200,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User agent sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whole-request timeout (milliseconds)
    #[serde(rename = "socket-timeout-ms")]
    pub socket_timeout_ms: u64,

    /// Connection establishment timeout (milliseconds)
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Largest response body fetched, in bytes
    #[serde(rename = "max-download-size")]
    pub max_download_size: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "orbweaver/1.0".to_string(),
            socket_timeout_ms: 20_000,
            connect_timeout_ms: 30_000,
            max_download_size: 1_048_576,
        }
    }
}

/// Worker pool and monitor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of crawl workers
    pub workers: usize,

    /// Monitor poll interval, also used for the termination grace waits
    /// (milliseconds)
    #[serde(rename = "monitor-interval-ms")]
    pub monitor_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            monitor_interval_ms: 10_000,
        }
    }
}

/// One seed URL, optionally pinned to an explicit document id
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    pub url: String,

    /// Explicit document id; entries with ids must come in increasing order
    #[serde(rename = "doc-id", default)]
    pub doc_id: Option<u32>,
}
