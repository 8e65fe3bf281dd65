//! Playlist catalog context object
//!
//! A `Catalog` owns one playlist's installed channel list, its watch
//! progress table, refresh lifecycle status and notification handlers.
//! It is cheap to clone; clones share state.

use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ChannelKind, ChannelRecord, PlaylistSource, PlaylistStats, RefreshStatus};
use crate::services::cache::CacheStore;
use crate::services::events::{RefreshEvent, RefreshEvents, SubscriptionId};
use crate::services::m3u_parser::{HttpPlaylistFetcher, PlaylistFetcher};
use crate::services::refresh;
use crate::services::watch_history::{touch_channel, WatchHistory, WatchProgressRecord};

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the catalog handle and its refresh tasks
///
/// Lock order: `status`, `history`, `source`, `channels`.
pub(crate) struct CatalogState {
    pub(crate) source: RwLock<Option<PlaylistSource>>,
    pub(crate) status: RwLock<RefreshStatus>,
    pub(crate) channels: RwLock<Arc<Vec<ChannelRecord>>>,
    pub(crate) history: RwLock<Arc<WatchHistory>>,
    pub(crate) events: RefreshEvents,
    pub(crate) fetcher: Arc<dyn PlaylistFetcher>,
    pub(crate) cache: CacheStore,
    pub(crate) refresh_timeout: Duration,
}

#[derive(Clone)]
pub struct Catalog {
    state: Arc<CatalogState>,
}

impl Catalog {
    /// Catalog fetching over HTTP with the configured client settings
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher = HttpPlaylistFetcher::from_config(config)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn PlaylistFetcher>) -> Self {
        Self {
            state: Arc::new(CatalogState {
                source: RwLock::new(None),
                status: RwLock::new(RefreshStatus::Uninitialized),
                channels: RwLock::new(Arc::new(Vec::new())),
                history: RwLock::new(Arc::new(WatchHistory::new())),
                events: RefreshEvents::new(),
                fetcher,
                cache: CacheStore::new(&config.data_dir),
                refresh_timeout: config.refresh_timeout(),
            }),
        }
    }

    /// Set (or replace) the playlist source
    ///
    /// Clears the installed list and resets status to `Uninitialized`. Watch
    /// progress is kept when `source.name` is unchanged and merged back by
    /// the next refresh. With `load_cache`, a readable cache file for
    /// `source.name` is installed immediately and status becomes `Ready`
    /// without notifications. A missing or malformed cache is skipped.
    pub async fn initialize(&self, source: PlaylistSource, load_cache: bool) -> Result<()> {
        {
            let mut status = write_lock(&self.state.status);
            if *status == RefreshStatus::Refreshing {
                return Err(Error::RefreshInProgress);
            }

            let mut history = write_lock(&self.state.history);
            let mut current = write_lock(&self.state.source);
            let renamed = current.as_ref().is_some_and(|s| s.name != source.name);

            *write_lock(&self.state.channels) = Arc::new(Vec::new());
            if renamed {
                *history = Arc::new(WatchHistory::new());
            }
            *current = Some(source.clone());
            *status = RefreshStatus::Uninitialized;
        }

        tracing::info!(playlist = %source.name, url = %source.url, "Catalog initialized");

        if load_cache {
            self.preload_cache(&source.name).await;
        }
        Ok(())
    }

    async fn preload_cache(&self, name: &str) {
        let channels = match self.state.cache.load(name).await {
            Ok(Some(channels)) => channels,
            Ok(None) => {
                tracing::debug!(playlist = %name, "No channel cache found");
                return;
            }
            Err(e) => {
                let err = Error::from(e);
                tracing::warn!(playlist = %name, error = %err, "Ignoring unreadable channel cache");
                return;
            }
        };

        let mut status = write_lock(&self.state.status);
        if *status != RefreshStatus::Uninitialized {
            return;
        }

        let mut rebuilt = WatchHistory::new();
        rebuilt.rebuild_from(&channels);
        if !rebuilt.is_empty() {
            tracing::debug!(playlist = %name, records = rebuilt.len(), "Restored watch progress from cache");
        }
        let count = channels.len();

        let mut history = write_lock(&self.state.history);
        *write_lock(&self.state.channels) = Arc::new(channels);
        *history = Arc::new(rebuilt);
        *status = RefreshStatus::Ready;

        tracing::info!(playlist = %name, items = count, "Loaded channel list from cache");
    }

    fn ensure_initialized(&self) -> Result<()> {
        if read_lock(&self.state.source).is_none() {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Arc<Vec<ChannelRecord>>> {
        self.ensure_initialized()?;
        Ok(Arc::clone(&read_lock(&self.state.channels)))
    }

    fn filtered<F>(&self, predicate: F) -> Result<Vec<ChannelRecord>>
    where
        F: Fn(&ChannelRecord) -> bool,
    {
        Ok(self.snapshot()?.iter().filter(|c| predicate(*c)).cloned().collect())
    }

    // ============ Refresh ============

    /// Run one refresh cycle and wait for its terminal status
    ///
    /// Returns `Ok(Ready)` or `Ok(TimedOut)`; a failed fetch is returned as
    /// `Err(Error::Fetch)` with the previous list left installed.
    pub async fn refresh(&self) -> Result<RefreshStatus> {
        let rx = refresh::start(&self.state)?;
        rx.await.unwrap_or_else(|_| Err(worker_lost()))
    }

    /// Start a refresh cycle without waiting
    ///
    /// Rejections (`NotInitialized`, `RefreshInProgress`, `NoRuntime`) are
    /// returned immediately. The handle resolves to the same outcome as [`refresh`].
    ///
    /// [`refresh`]: Catalog::refresh
    pub fn spawn_refresh(&self) -> Result<JoinHandle<Result<RefreshStatus>>> {
        let rx = refresh::start(&self.state)?;
        Ok(tokio::spawn(async move {
            rx.await.unwrap_or_else(|_| Err(worker_lost()))
        }))
    }

    // ============ Queries ============

    pub fn status(&self) -> Result<RefreshStatus> {
        self.ensure_initialized()?;
        Ok(*read_lock(&self.state.status))
    }

    pub fn source(&self) -> Result<PlaylistSource> {
        read_lock(&self.state.source).clone().ok_or(Error::NotInitialized)
    }

    pub fn channels(&self) -> Result<Vec<ChannelRecord>> {
        Ok(self.snapshot()?.to_vec())
    }

    pub fn live_channels(&self) -> Result<Vec<ChannelRecord>> {
        self.filtered(|c| c.kind() == ChannelKind::Live)
    }

    /// Movies and shows
    pub fn vod_channels(&self) -> Result<Vec<ChannelRecord>> {
        self.filtered(|c| c.kind().is_vod())
    }

    pub fn movies(&self) -> Result<Vec<ChannelRecord>> {
        self.filtered(|c| c.kind() == ChannelKind::Movie)
    }

    pub fn shows(&self) -> Result<Vec<ChannelRecord>> {
        self.filtered(|c| c.kind() == ChannelKind::Show)
    }

    pub fn channels_by_group(&self, group: &str) -> Result<Vec<ChannelRecord>> {
        self.filtered(|c| c.group == group)
    }

    /// Distinct groups in first-seen order
    pub fn groups(&self) -> Result<Vec<String>> {
        Ok(distinct_groups(self.snapshot()?.iter()))
    }

    /// Distinct groups containing at least one show
    pub fn show_groups(&self) -> Result<Vec<String>> {
        let channels = self.snapshot()?;
        Ok(distinct_groups(channels.iter().filter(|c| c.kind() == ChannelKind::Show)))
    }

    pub fn channel(&self, number: usize) -> Result<ChannelRecord> {
        self.snapshot()?
            .iter()
            .find(|c| c.number == number)
            .cloned()
            .ok_or(Error::ChannelNotFound(number))
    }

    pub fn history(&self) -> Result<Vec<WatchProgressRecord>> {
        self.ensure_initialized()?;
        Ok(read_lock(&self.state.history).records().to_vec())
    }

    /// History records marked as seen
    pub fn seen_history(&self) -> Result<Vec<WatchProgressRecord>> {
        Ok(self.history()?.into_iter().filter(|r| r.seen).collect())
    }

    pub fn history_entry(&self, title: &str) -> Result<Option<WatchProgressRecord>> {
        self.ensure_initialized()?;
        Ok(read_lock(&self.state.history).lookup(title).cloned())
    }

    pub fn stats(&self) -> Result<PlaylistStats> {
        Ok(PlaylistStats::from_channels(&self.snapshot()?))
    }

    // ============ Watch progress ============

    /// Record a resume position for the channel numbered `number`
    ///
    /// The channel's own progress and an existing history record keep their
    /// `seen` flag; `seen` only applies when the history record is new.
    pub fn set_watch_progress(&self, number: usize, seen: bool, position: f64) -> Result<()> {
        self.ensure_initialized()?;
        let now = Utc::now();

        let mut history = write_lock(&self.state.history);
        let mut channels = write_lock(&self.state.channels);

        let index = channels
            .iter()
            .position(|c| c.number == number)
            .ok_or(Error::ChannelNotFound(number))?;

        let list = Arc::make_mut(&mut channels);
        touch_channel(&mut list[index], position, now);
        Arc::make_mut(&mut history).upsert(&list[index], seen, position, now);

        tracing::debug!(number = number, position = position, "Watch progress updated");
        Ok(())
    }

    // ============ Notifications ============

    pub fn subscribe_started<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ensure_initialized()?;
        Ok(self.state.events.subscribe_started(handler))
    }

    pub fn subscribe_ended<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(RefreshStatus) + Send + Sync + 'static,
    {
        self.ensure_initialized()?;
        Ok(self.state.events.subscribe_ended(handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.ensure_initialized()?;
        Ok(self.state.events.unsubscribe(id))
    }

    pub fn events(&self) -> Result<broadcast::Receiver<RefreshEvent>> {
        self.ensure_initialized()?;
        Ok(self.state.events.subscribe_channel())
    }
}

fn distinct_groups<'a>(channels: impl Iterator<Item = &'a ChannelRecord>) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for channel in channels {
        if !groups.iter().any(|g| *g == channel.group) {
            groups.push(channel.group.clone());
        }
    }
    groups
}

fn worker_lost() -> Error {
    Error::Internal("Refresh worker stopped without reporting a result".to_string())
}
