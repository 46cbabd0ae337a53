//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SiteState`: lifecycle of one seller crawl (queued, running, completed, aborted, failed)
//! - `CrawlState`: frontier, visited set and buyer bookkeeping of one seller crawl
//! - `Blacklist`: shared, read-mostly set of domains that must never be crawled

mod blacklist;
mod crawl_state;
mod site_state;

// Re-export main types
pub use blacklist::{parse_domain_list, Blacklist};
pub use crawl_state::CrawlState;
pub use site_state::SiteState;
