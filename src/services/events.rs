//! Refresh lifecycle notifications
//!
//! Handlers are called synchronously, in registration order, after the
//! corresponding state transition. Async observers can use the broadcast
//! receiver from [`RefreshEvents::subscribe_channel`] instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::models::RefreshStatus;

type StartedHandler = Arc<dyn Fn() + Send + Sync>;
type EndedHandler = Arc<dyn Fn(RefreshStatus) + Send + Sync>;

/// Handle returned by a subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshEvent {
    Started,
    Ended(RefreshStatus),
}

pub struct RefreshEvents {
    next_id: AtomicU64,
    started: Mutex<Vec<(SubscriptionId, StartedHandler)>>,
    ended: Mutex<Vec<(SubscriptionId, EndedHandler)>>,
    tx: broadcast::Sender<RefreshEvent>,
}

impl RefreshEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            next_id: AtomicU64::new(1),
            started: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
            tx,
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe_started<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    pub fn subscribe_ended<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(RefreshStatus) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.ended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove the handler registered under `id`; false if there was none
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = started.iter().position(|(sid, _)| *sid == id) {
            started.remove(pos);
            return true;
        }
        drop(started);

        let mut ended = self.ended.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = ended.iter().position(|(sid, _)| *sid == id) {
            ended.remove(pos);
            return true;
        }
        false
    }

    pub fn subscribe_channel(&self) -> broadcast::Receiver<RefreshEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit_started(&self) {
        // Snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<StartedHandler> = self
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            handler();
        }
        let _ = self.tx.send(RefreshEvent::Started);
    }

    pub(crate) fn emit_ended(&self, status: RefreshStatus) {
        let handlers: Vec<EndedHandler> = self
            .ended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            handler(status);
        }
        let _ = self.tx.send(RefreshEvent::Ended(status));
    }
}

impl Default for RefreshEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let events = RefreshEvents::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            events.subscribe_ended(move |status| log.lock().unwrap().push(format!("{name}:{status}")));
        }

        events.emit_ended(RefreshStatus::Ready);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:ready", "second:ready", "third:ready"]
        );
    }

    #[test]
    fn test_unsubscribe_removes_only_matching_handler() {
        let events = RefreshEvents::new();
        let count = Arc::new(AtomicU64::new(0));

        let c1 = Arc::clone(&count);
        let keep = events.subscribe_started(move || {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&count);
        let drop_me = events.subscribe_started(move || {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        assert!(events.unsubscribe(drop_me));
        assert!(!events.unsubscribe(drop_me));
        events.emit_started();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(events.unsubscribe(keep));
        events.emit_started();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let events = Arc::new(RefreshEvents::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let ev = Arc::clone(&events);
        let s = Arc::clone(&slot);
        let id = events.subscribe_ended(move |_| {
            if let Some(id) = s.lock().unwrap().take() {
                ev.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        events.emit_ended(RefreshStatus::Failed);
        assert!(!events.unsubscribe(id));
    }

    #[tokio::test]
    async fn test_broadcast_receives_events() {
        let events = RefreshEvents::new();
        let mut rx = events.subscribe_channel();

        events.emit_started();
        events.emit_ended(RefreshStatus::TimedOut);

        assert_eq!(rx.recv().await.unwrap(), RefreshEvent::Started);
        assert_eq!(rx.recv().await.unwrap(), RefreshEvent::Ended(RefreshStatus::TimedOut));
    }
}
