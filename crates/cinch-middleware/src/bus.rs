//! Headless, typed, topic-based publish/subscribe bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Each [`Topic`] is its own channel, which gives ordered
//! delivery within a topic and no ordering guarantee across topics.
//!
//! # Topics
//!
//! | Topic | Id | Typical traffic |
//! |---|---|---|
//! | [`Topic::KernelLifecycle`] | 500 | `register`, `plugin_list`, `ping`/`pong`, soft reset |
//! | [`Topic::Auth`] | 700 | `acl_query` / `acl_result` |
//! | [`Topic::Settings`] | 800 | `settings_get`, `settings_sync`, mutations |
//! | [`Topic::Ui`] | 900 | `plugin_start` / `plugin_return` |
//!
//! Host events (attach, region change, teleport) travel on a separate lane
//! that is not addressable by topic id.

use cinch_types::{CinchError, Envelope, HostEvent, Topic};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered envelopes before old ones
/// are dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Shared bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    kernel_lifecycle: broadcast::Sender<Envelope>,
    auth: broadcast::Sender<Envelope>,
    settings: broadcast::Sender<Envelope>,
    ui: broadcast::Sender<Envelope>,
    host: broadcast::Sender<HostEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (kernel_lifecycle, _) = broadcast::channel(capacity);
        let (auth, _) = broadcast::channel(capacity);
        let (settings, _) = broadcast::channel(capacity);
        let (ui, _) = broadcast::channel(capacity);
        let (host, _) = broadcast::channel(capacity);
        Self {
            kernel_lifecycle,
            auth,
            settings,
            ui,
            host,
        }
    }

    // -----------------------------------------------------------------------
    // Topic lanes
    // -----------------------------------------------------------------------

    /// Publish `envelope` on the lane its message belongs to.
    ///
    /// Returns the number of active receivers that were handed the envelope.
    /// Returns [`CinchError::Channel`] when nobody is listening on the lane.
    pub fn publish(&self, envelope: Envelope) -> Result<usize, CinchError> {
        self.publish_to(envelope.topic(), envelope)
    }

    /// Publish `envelope` on an explicit [`Topic`].
    pub fn publish_to(&self, topic: Topic, envelope: Envelope) -> Result<usize, CinchError> {
        self.topic_sender(topic)
            .send(envelope)
            .map_err(|_| CinchError::Channel(format!("no subscribers for topic {topic}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    // -----------------------------------------------------------------------
    // Host lane
    // -----------------------------------------------------------------------

    /// Raise a host event.  Having no listeners is not an error here: host
    /// events are fire-and-forget.
    pub fn publish_host(&self, event: HostEvent) -> usize {
        self.host.send(event).unwrap_or(0)
    }

    /// Receive host events published after this call.
    pub fn subscribe_host(&self) -> broadcast::Receiver<HostEvent> {
        self.host.subscribe()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Envelope> {
        match topic {
            Topic::KernelLifecycle => &self.kernel_lifecycle,
            Topic::Auth => &self.auth,
            Topic::Settings => &self.settings,
            Topic::Ui => &self.ui,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Envelope>,
}

impl TopicReceiver {
    /// Wait for the next envelope on this topic.
    ///
    /// Returns:
    /// * `Ok(envelope)` – a successfully received envelope.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` envelopes were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Envelope, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`recv`](Self::recv) but logs and skips over lag.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
