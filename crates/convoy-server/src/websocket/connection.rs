//! Per-channel state for a connected WebSocket client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use convoy_core::{ConvoyId, MemberId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a channel. Moves forward only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Accepted, not yet registered with the hub.
    Connecting,
    /// Registered and receiving pushes.
    Open,
    /// Torn down. Terminal.
    Closed,
}

/// A connected client subscribed to one convoy.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Convoy this channel follows.
    pub convoy_id: ConvoyId,
    /// Member this channel reports for. `None` for observers.
    pub member_id: Option<MemberId>,
    tx: mpsc::Sender<Arc<String>>,
    state: Mutex<ChannelState>,
    cancel: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    /// Pushes that could not be queued.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a channel in the `Connecting` state. Cancelling `cancel`
    /// stops the channel's socket tasks.
    pub fn new(
        id: String,
        convoy_id: ConvoyId,
        member_id: Option<MemberId>,
        tx: mpsc::Sender<Arc<String>>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            convoy_id,
            member_id,
            tx,
            state: Mutex::new(ChannelState::Connecting),
            cancel,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Move `Connecting` to `Open`. Returns `false` if the channel was
    /// already closed.
    pub fn open(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ChannelState::Connecting => {
                *state = ChannelState::Open;
                true
            }
            ChannelState::Open => true,
            ChannelState::Closed => false,
        }
    }

    /// Close the channel and stop its tasks. Returns `true` on the first
    /// call only.
    pub fn close(&self) -> bool {
        let first = {
            let mut state = self.state.lock();
            let first = *state != ChannelState::Closed;
            *state = ChannelState::Closed;
            first
        };
        self.cancel.cancel();
        first
    }

    /// Whether the channel is registered and live.
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Whether this channel only observes.
    pub fn is_observer(&self) -> bool {
        self.member_id.is_none()
    }

    /// Token cancelled when the channel closes.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the channel is closed, its queue is full, or the
    /// writer has gone; the dropped counter is bumped in each case.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.state() != ChannelState::Closed && self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound traffic of any kind.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag. Returns `true` if the client was
    /// heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since inbound traffic (or connection establishment).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
