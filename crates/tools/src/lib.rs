//! Tool implementations for the turn engine: document access, full-text
//! search, and web search, dispatched by name from the turn executor's tool
//! loop.

pub mod dispatch;
pub mod documents;
pub mod paths;
pub mod search;
pub mod web_search;

pub use dispatch::ToolDispatcher;
pub use documents::{DocumentService, FsDocumentService};
pub use search::{FsSearchService, SearchService};
pub use web_search::{build_client as build_web_search_client, WebSearchClient};
