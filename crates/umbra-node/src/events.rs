//! Event bus.
//!
//! The pool publishes committed events to the bus as an observer;
//! subscribers each get an independent buffer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};
use umbra_ledger::PoolObserver;
use umbra_types::events::PoolEvent;

/// Broadcasts pool events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: PoolEvent) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl PoolObserver for EventBus {
    fn notify(&self, event: &PoolEvent) {
        self.emit(event.clone());
    }
}

/// Category filter for subscriptions.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    categories: Vec<String>,
}

impl EventFilter {
    /// Filter passing only `categories`; empty passes everything.
    pub fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    /// Check if an event matches this filter.
    pub fn matches(&self, event: &PoolEvent) -> bool {
        self.categories.is_empty() || self.categories.iter().any(|c| c == event.category())
    }
}

/// Log every matching event until the bus closes. Returns the number logged.
pub async fn log_events(mut rx: broadcast::Receiver<PoolEvent>, filter: EventFilter) -> u64 {
    let mut logged = 0;
    loop {
        match rx.recv().await {
            Ok(event) if filter.matches(&event) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                info!(category = event.category(), %payload, "pool event");
                logged += 1;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    logged
}
