//! Refresh pipeline and its timeout guard
//!
//! A cycle runs on its own worker task while a timer task sleeps for the
//! configured window. Whichever of the two claims the cycle first decides
//! the terminal status; the loser stops without touching shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::catalog::{read_lock, write_lock, CatalogState};
use crate::error::{Error, FetchError, Result};
use crate::models::{ChannelRecord, RawEntry, RefreshStatus};
use crate::services::classifier::ContentClassifier;
use crate::services::watch_history::WatchHistory;

pub(crate) type Outcome = Result<RefreshStatus>;

/// One refresh attempt
struct RefreshCycle {
    id: Uuid,
    finished: AtomicBool,
    outcome: Mutex<Option<oneshot::Sender<Outcome>>>,
    timer: Mutex<Option<AbortHandle>>,
    worker: Mutex<Option<AbortHandle>>,
}

impl RefreshCycle {
    fn new(outcome: oneshot::Sender<Outcome>) -> Self {
        Self {
            id: Uuid::new_v4(),
            finished: AtomicBool::new(false),
            outcome: Mutex::new(Some(outcome)),
            timer: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// True for the first caller only
    fn claim(&self) -> bool {
        self.finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn report(&self, outcome: Outcome) {
        let tx = self.outcome.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = tx {
            // Receiver is gone for fire-and-forget callers that dropped the handle
            let _ = tx.send(outcome);
        }
    }

    fn set_timer(&self, handle: AbortHandle) {
        *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn set_worker(&self, handle: AbortHandle) {
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn stop_timer(&self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    fn stop_worker(&self) {
        if let Some(handle) = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

/// Enter `Refreshing` and launch the worker and timer tasks
///
/// The receiver resolves once the cycle reaches a terminal status. Without a
/// current tokio runtime nothing changes and `Error::NoRuntime` is returned.
pub(crate) fn start(state: &Arc<CatalogState>) -> Result<oneshot::Receiver<Outcome>> {
    let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

    let (url, name) = {
        let mut status = write_lock(&state.status);
        let source = read_lock(&state.source).clone().ok_or(Error::NotInitialized)?;
        if *status == RefreshStatus::Refreshing {
            return Err(Error::RefreshInProgress);
        }
        *status = RefreshStatus::Refreshing;
        (source.url, source.name)
    };

    let (tx, rx) = oneshot::channel();
    let cycle = Arc::new(RefreshCycle::new(tx));

    tracing::info!(cycle = %cycle.id, playlist = %name, "Refresh started");
    state.events.emit_started();

    let timer = runtime.spawn(run_timer(Arc::clone(state), Arc::clone(&cycle)));
    cycle.set_timer(timer.abort_handle());

    let worker = runtime.spawn(run_worker(Arc::clone(state), Arc::clone(&cycle), url));
    cycle.set_worker(worker.abort_handle());

    Ok(rx)
}

async fn run_timer(state: Arc<CatalogState>, cycle: Arc<RefreshCycle>) {
    tokio::time::sleep(state.refresh_timeout).await;

    if !cycle.claim() {
        return;
    }
    cycle.stop_worker();

    tracing::warn!(
        cycle = %cycle.id,
        timeout_ms = state.refresh_timeout.as_millis() as u64,
        "Refresh timed out, keeping previous channel list"
    );
    finish(&state, &cycle, Ok(RefreshStatus::TimedOut));
}

async fn run_worker(state: Arc<CatalogState>, cycle: Arc<RefreshCycle>, url: String) {
    let channels = state.fetcher.fetch(&url).await.and_then(classify_entries);

    if !cycle.claim() {
        tracing::warn!(cycle = %cycle.id, "Discarding refresh result that arrived after timeout");
        return;
    }
    cycle.stop_timer();

    match channels {
        Ok(channels) => {
            let count = channels.len();
            install(&state, channels);
            persist(&state).await;
            tracing::info!(cycle = %cycle.id, items = count, "Refresh complete");
            finish(&state, &cycle, Ok(RefreshStatus::Ready));
        }
        Err(e) => {
            tracing::error!(cycle = %cycle.id, error = %e, "Refresh failed, keeping previous channel list");
            finish(&state, &cycle, Err(Error::Fetch(e)));
        }
    }
}

/// Classify entries in fetch order; sequence numbers skip entries without metadata
fn classify_entries(entries: Vec<RawEntry>) -> std::result::Result<Vec<ChannelRecord>, FetchError> {
    let channels: Vec<ChannelRecord> = entries
        .iter()
        .filter(|entry| entry.has_metadata())
        .enumerate()
        .map(|(number, entry)| ContentClassifier::classify(entry, number))
        .collect();

    if channels.is_empty() {
        return Err(FetchError::Empty);
    }
    Ok(channels)
}

/// Merge recorded progress, then swap in the new list and rebuilt table
///
/// Runs under the history write lock so an upsert racing the refresh is
/// either merged or applied after the swap, never lost.
fn install(state: &CatalogState, mut channels: Vec<ChannelRecord>) {
    let mut history = write_lock(&state.history);

    let mut merged = 0usize;
    for channel in channels.iter_mut() {
        if history.merge_into(channel) {
            merged += 1;
        }
    }

    let mut rebuilt = WatchHistory::new();
    rebuilt.rebuild_from(&channels);

    *write_lock(&state.channels) = Arc::new(channels);
    *history = Arc::new(rebuilt);

    tracing::debug!(merged = merged, "Watch progress merged into refreshed list");
}

/// Write the installed list to the cache file of the current source
///
/// Runs before the end notification so observers of `Ready` find the cache
/// on disk. Failures are logged and never fail the cycle.
async fn persist(state: &CatalogState) {
    let Some(name) = read_lock(&state.source).as_ref().map(|s| s.name.clone()) else {
        return;
    };
    let channels = Arc::clone(&read_lock(&state.channels));

    match state.cache.save(&name, &channels).await {
        Ok(()) => tracing::info!(playlist = %name, items = channels.len(), "Channel list cached"),
        Err(e) => tracing::warn!(playlist = %name, error = %e, "Failed to write channel cache"),
    }
}

/// Terminal transition: status first, then notifications, then the waiting caller
fn finish(state: &CatalogState, cycle: &RefreshCycle, outcome: Outcome) {
    let status = match &outcome {
        Ok(status) => *status,
        Err(_) => RefreshStatus::Failed,
    };

    *write_lock(&state.status) = status;
    state.events.emit_ended(status);
    cycle.report(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn raw(url: &str, title: &str) -> RawEntry {
        RawEntry {
            url: url.to_string(),
            attributes: HashMap::from([("tvg-name".to_string(), title.to_string())]),
            description: format!("-1 tvg-name=\"{title}\",{title}"),
        }
    }

    #[test]
    fn test_classify_entries_numbers_in_fetch_order() {
        let entries = vec![
            raw("http://x/1.ts", "Canal1"),
            RawEntry {
                url: "http://x/bare.ts".to_string(),
                ..Default::default()
            },
            raw("http://x/2.mp4", "Matrix"),
        ];

        let channels = classify_entries(entries).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].number, 0);
        assert_eq!(channels[1].number, 1);
        assert_eq!(channels[1].title, "Matrix");
    }

    #[test]
    fn test_classify_entries_empty_is_error() {
        assert!(matches!(classify_entries(Vec::new()), Err(FetchError::Empty)));

        let bare = vec![RawEntry {
            url: "http://x/bare.ts".to_string(),
            ..Default::default()
        }];
        assert!(matches!(classify_entries(bare), Err(FetchError::Empty)));
    }

    #[test]
    fn test_cycle_claim_is_first_wins() {
        let (tx, _rx) = oneshot::channel();
        let cycle = RefreshCycle::new(tx);
        assert!(cycle.claim());
        assert!(!cycle.claim());
    }

    #[tokio::test]
    async fn test_cycle_reports_once() {
        let (tx, rx) = oneshot::channel();
        let cycle = RefreshCycle::new(tx);
        cycle.report(Ok(RefreshStatus::Ready));
        cycle.report(Ok(RefreshStatus::TimedOut));
        assert_eq!(rx.await.unwrap().unwrap(), RefreshStatus::Ready);
    }
}
