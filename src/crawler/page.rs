//! Fetched page container

use crate::crawler::ParseData;
use crate::url::WebUrl;

/// One fetched page, as handed to [`CrawlHandler::visit`].
///
/// `record` is the queue record the page was fetched for. When the fetch
/// resolved to a different final URL, the record is already rebound to it.
///
/// [`CrawlHandler::visit`]: crate::crawler::CrawlHandler::visit
#[derive(Debug, Clone)]
pub struct Page {
    /// The (possibly rebound) frontier record this page belongs to
    pub record: WebUrl,

    /// HTTP status of the fetch
    pub status: u16,

    /// Content-Type header, if the server sent one
    pub content_type: Option<String>,

    /// Canonicalized redirect target for 3xx responses
    pub redirect_target: Option<String>,

    /// Raw response body
    pub content: Vec<u8>,

    /// Parser output, present only for visited 2xx pages
    pub parse_data: Option<ParseData>,
}

impl Page {
    pub fn new(record: WebUrl) -> Self {
        Self {
            record,
            status: 0,
            content_type: None,
            redirect_target: None,
            content: Vec::new(),
            parse_data: None,
        }
    }

    /// Title extracted by the parser, if any.
    pub fn title(&self) -> Option<&str> {
        self.parse_data.as_ref().and_then(|data| data.title.as_deref())
    }
}
