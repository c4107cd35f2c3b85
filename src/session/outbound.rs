//! Bounded hand-off between the capture path and the socket writer.
//!
//! Pushing never waits. When the queue is full the oldest frame is discarded
//! to make room, so after a stall the relay hears the most recent speech
//! rather than a backlog.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// What happened to a pushed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued, but the oldest waiting item was discarded for it
    DisplacedOldest,
    /// The queue is closed; the item was discarded
    Closed,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Single-consumer, drop-oldest queue.
///
/// ## Rust Concepts:
/// - **Generic `T`**: Holds socket messages in the session, plain values in tests
/// - **parking_lot::Mutex**: Short synchronous critical sections, never held across `.await`
/// - **Notify**: Wakes the waiting `pop()` without a busy loop
pub struct OutboundQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> OutboundQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, item: T) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            let outcome = if state.items.len() >= self.capacity {
                state.items.pop_front();
                PushOutcome::DisplacedOldest
            } else {
                PushOutcome::Queued
            };
            state.items.push_back(item);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Refuse further pushes. Items already queued are still handed out.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Next item in push order, or `None` once closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }
}
