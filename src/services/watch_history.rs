//! Watch progress ("seen/resume") table
//!
//! Keyed by title rather than by playlist entry, so progress survives
//! playlist refreshes that renumber or reorder entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChannelRecord, WatchProgress};

/// Last known viewing state for one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchProgressRecord {
    pub title: String,
    /// Resume position in seconds, -1 when not resumable
    pub position: f64,
    /// Total duration in seconds, -1 when unknown
    pub total_duration: f64,
    pub seen: bool,
    pub updated_at: DateTime<Utc>,
}

impl WatchProgressRecord {
    fn from_channel(channel: &ChannelRecord, progress: &WatchProgress) -> Self {
        Self {
            title: channel.title.clone(),
            position: progress.position,
            total_duration: channel.duration_or_unknown(),
            seen: progress.seen,
            updated_at: progress.updated_at,
        }
    }
}

/// At most one record per title, in insertion order
#[derive(Debug, Clone, Default)]
pub struct WatchHistory {
    records: Vec<WatchProgressRecord>,
}

impl WatchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, title: &str) -> Option<&WatchProgressRecord> {
        self.records.iter().find(|r| r.title == title)
    }

    pub fn records(&self) -> &[WatchProgressRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record a new resume position for `channel`'s title
    ///
    /// An existing record keeps its `seen` flag: only position and
    /// timestamp move. New records take `seen` as given.
    pub fn upsert(&mut self, channel: &ChannelRecord, seen: bool, position: f64, now: DateTime<Utc>) {
        if let Some(record) = self.records.iter_mut().find(|r| r.title == channel.title) {
            record.position = position;
            record.updated_at = now;
            return;
        }

        self.records.push(WatchProgressRecord {
            title: channel.title.clone(),
            position,
            total_duration: channel.duration_or_unknown(),
            seen,
            updated_at: now,
        });
    }

    /// Replace the table with the progress attached to `channels`
    ///
    /// Duplicate titles keep the most recently updated progress.
    pub fn rebuild_from(&mut self, channels: &[ChannelRecord]) {
        self.records.clear();

        for channel in channels {
            let Some(progress) = channel.watch_progress.as_ref() else {
                continue;
            };
            let record = WatchProgressRecord::from_channel(channel, progress);

            match self.records.iter_mut().find(|r| r.title == record.title) {
                Some(existing) if existing.updated_at < record.updated_at => *existing = record,
                Some(_) => {}
                None => self.records.push(record),
            }
        }
    }

    /// Attach recorded progress to a freshly classified VOD channel
    ///
    /// Live channels and untitled entries are never merged.
    pub fn merge_into(&self, channel: &mut ChannelRecord) -> bool {
        if !channel.kind().is_vod() || channel.title.is_empty() {
            return false;
        }

        match self.lookup(&channel.title) {
            Some(record) => {
                channel.watch_progress = Some(WatchProgress::new(record.seen, record.position, record.updated_at));
                true
            }
            None => false,
        }
    }
}

/// Move `channel`'s attached progress to `position`
///
/// A channel with no progress yet gets one with `seen == false`; the flag is
/// never changed here.
pub fn touch_channel(channel: &mut ChannelRecord, position: f64, now: DateTime<Utc>) {
    let progress = channel
        .watch_progress
        .get_or_insert_with(|| WatchProgress::new(false, position, now));
    progress.position = position;
    progress.updated_at = now;
}
