//! IPTV playlist catalog
//!
//! Fetches an M3U playlist, classifies its entries into live channels,
//! movies and show episodes, tracks per-title watch progress and caches the
//! classified list on disk between runs.

pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{CacheError, Error, FetchError, Result};
pub use models::{
    ChannelKind, ChannelRecord, PlaylistSource, PlaylistStats, RawEntry, RefreshStatus,
    WatchProgress,
};
pub use services::{RefreshEvent, SubscriptionId, WatchProgressRecord};
