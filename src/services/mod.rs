//! Catalog services
//!
//! - **Fetching**: HTTP download and `#EXTM3U` tokenizing
//! - **Classification**: raw entries to typed channel records
//! - **Watch progress**: per-title seen/resume table
//! - **Cache**: JSON snapshots of the installed list on disk
//! - **Refresh**: the fetch/classify/install cycle and its timeout guard

pub mod cache;
pub mod classifier;
pub mod events;
pub mod m3u_parser;
pub(crate) mod refresh;
pub mod watch_history;

// Re-exports for convenience
pub use cache::CacheStore;
pub use classifier::ContentClassifier;
pub use events::{RefreshEvent, RefreshEvents, SubscriptionId};
pub use m3u_parser::{HttpPlaylistFetcher, PlaylistFetcher};
pub use watch_history::{WatchHistory, WatchProgressRecord};
