// Per-session outbound event queue

use crate::error::{McpError, McpResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Event kind of the bootstrap event carrying the request address
pub const ENDPOINT_EVENT: &str = "endpoint";

/// Event kind of JSON-RPC response events
pub const MESSAGE_EVENT: &str = "message";

/// A unit of push-channel delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub payload: String,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    pub fn message(payload: impl Into<String>) -> Self {
        Self::new(MESSAGE_EVENT, payload)
    }
}

/// Ordered FIFO queue of events owned by one session.
///
/// `put` never waits. `get` suspends until an event is queued or the channel
/// is closed. With a capacity set, a full queue evicts its oldest event.
pub struct EventChannel {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: Option<usize>,
}

impl EventChannel {
    /// Create an unbounded channel
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a channel, optionally bounded to `capacity` queued events
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity: capacity.filter(|c| *c > 0),
        }
    }

    /// Enqueue an event
    pub fn put(&self, event: Event) -> McpResult<()> {
        if self.is_closed() {
            return Err(McpError::ChannelClosed);
        }

        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(capacity) = self.capacity {
                while queue.len() >= capacity {
                    if let Some(dropped) = queue.pop_front() {
                        tracing::warn!(
                            "Event channel full ({} events), dropping oldest {} event",
                            capacity,
                            dropped.kind
                        );
                    }
                }
            }
            queue.push_back(event);
        }

        self.notify.notify_one();
        Ok(())
    }

    /// Dequeue the next event, waiting while the queue is empty.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub async fn get(&self) -> Option<Event> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.try_get() {
                return Some(event);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }

    /// Dequeue the next event without waiting
    pub fn try_get(&self) -> Option<Event> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the channel and wake every waiting reader
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}
