use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// Group assigned to entries that carry no `group-title`
pub const NOT_GROUP: &str = "NOT_GROUP";

/// Media type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Live,
    Movie,
    Show,
}

impl ChannelKind {
    /// Anything that is not a live stream
    pub fn is_vod(self) -> bool {
        self != ChannelKind::Live
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Live => write!(f, "live"),
            ChannelKind::Movie => write!(f, "movie"),
            ChannelKind::Show => write!(f, "show"),
        }
    }
}

/// Seen/resume state attached to a VOD channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchProgress {
    pub seen: bool,
    pub position: f64,
    pub updated_at: DateTime<Utc>,
}

impl WatchProgress {
    pub fn new(seen: bool, position: f64, updated_at: DateTime<Utc>) -> Self {
        Self {
            seen,
            position,
            updated_at,
        }
    }
}

/// Single classified playlist entry (channel/movie/show episode)
///
/// Equality and hashing use `(title, group, tvg_id)` only, so two refreshes
/// of the same playlist produce records that compare equal even though
/// their sequence numbers may differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub title: String,
    pub group: String,
    pub logo: String,
    pub url: String,
    /// Position in fetch order, starting at 0
    pub number: usize,
    kind: ChannelKind,
    #[serde(default)]
    tvg_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_progress: Option<WatchProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
}

impl ChannelRecord {
    pub fn new(
        number: usize,
        title: impl Into<String>,
        group: impl Into<String>,
        logo: impl Into<String>,
        url: impl Into<String>,
        kind: ChannelKind,
    ) -> Self {
        Self {
            title: title.into(),
            group: group.into(),
            logo: logo.into(),
            url: url.into(),
            number,
            kind,
            tvg_id: String::new(),
            watch_progress: None,
            total_duration: None,
        }
    }

    pub(crate) fn with_tvg_id(mut self, tvg_id: impl Into<String>) -> Self {
        self.tvg_id = tvg_id.into();
        self
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Known duration in seconds, or -1 when unknown
    pub fn duration_or_unknown(&self) -> f64 {
        self.total_duration.unwrap_or(-1.0)
    }
}

impl PartialEq for ChannelRecord {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title && self.group == other.group && self.tvg_id == other.tvg_id
    }
}

impl Eq for ChannelRecord {}

impl Hash for ChannelRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.hash(state);
        self.tvg_id.hash(state);
        self.group.hash(state);
    }
}

/// Tokenized playlist entry, before classification
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub url: String,
    /// `key="value"` pairs from the `#EXTINF` line (tvg-id, tvg-name, ...)
    pub attributes: HashMap<String, String>,
    /// Raw `#EXTINF:` payload, including the `,`-trailing free-text title
    pub description: String,
}

impl RawEntry {
    /// Entries without an `#EXTINF` line are not catalogued
    pub fn has_metadata(&self) -> bool {
        !self.description.is_empty() || !self.attributes.is_empty()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }
}

/// Where a playlist comes from; `name` keys the cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSource {
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_list_url: Option<String>,
}

impl PlaylistSource {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            logo_list_url: None,
        }
    }

    pub fn with_logo_list(mut self, logo_list_url: impl Into<String>) -> Self {
        self.logo_list_url = Some(logo_list_url.into());
        self
    }
}

/// Lifecycle status of a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshStatus {
    #[default]
    Uninitialized,
    Refreshing,
    Ready,
    TimedOut,
    Failed,
}

impl std::fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshStatus::Uninitialized => write!(f, "uninitialized"),
            RefreshStatus::Refreshing => write!(f, "refreshing"),
            RefreshStatus::Ready => write!(f, "ready"),
            RefreshStatus::TimedOut => write!(f, "timed_out"),
            RefreshStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Playlist statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistStats {
    pub total_items: usize,
    pub live_count: usize,
    pub movie_count: usize,
    pub show_count: usize,
    pub group_count: usize,
}

impl PlaylistStats {
    pub fn from_channels(channels: &[ChannelRecord]) -> Self {
        let mut stats = Self::default();
        let mut groups = HashSet::new();
        for channel in channels {
            stats.total_items += 1;
            match channel.kind() {
                ChannelKind::Live => stats.live_count += 1,
                ChannelKind::Movie => stats.movie_count += 1,
                ChannelKind::Show => stats.show_count += 1,
            }
            groups.insert(channel.group.as_str());
        }
        stats.group_count = groups.len();
        stats
    }
}
