//! # Event Bus System
//!
//! Broadcast channel through which the session engine reports everything the
//! host UI needs to render: cookie changes, player state transitions, lyric
//! cursor movement, queue updates and cache maintenance.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies per domain
//! - **EventBus**: Central `tokio::sync::broadcast` channel
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐    emit     ┌───────────┐
//! │ API client    ├────────────>│           │
//! └───────────────┘             │           │    subscribe   ┌──────────┐
//!                               │ EventBus  ├───────────────>│ Host IPC │
//! ┌───────────────┐    emit     │           │                └──────────┘
//! │ Player actor  ├────────────>│           │
//! └───────────────┘             │           │    subscribe   ┌──────────┐
//! ┌───────────────┐    emit     │           ├───────────────>│ Tests    │
//! │ Track cache   ├────────────>│           │                └──────────┘
//! └───────────────┘             └───────────┘
//! ```
//!
//! ## Ordering
//!
//! Every playback and lyric event for a track is emitted by the single player
//! actor, so subscribers observe `Loaded` → `Playing` → `Ended` in causal
//! order for any one track.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Playback(PlaybackEvent::VolumeChanged { level: 85 }))
//!     .ok();
//!
//! let received = stream.recv().await.unwrap();
//! assert!(matches!(received, CoreEvent::Playback(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Lyric index updates are frequent; a lagging UI should simply continue.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.

use bridge_traits::music::{LyricData, TrackItem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Cookie jar and login state
    Session(SessionEvent),
    /// Player state machine transitions
    Playback(PlaybackEvent),
    /// Lyric tables and cursor movement
    Lyric(LyricEvent),
    /// FM mode and next-track bookkeeping
    Queue(QueueEvent),
    /// Track and lyric cache maintenance
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Lyric(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Ended { reason, .. }) if reason.is_failure() => {
                EventSeverity::Warning
            }
            CoreEvent::Playback(PlaybackEvent::Loaded { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::LoggedOut) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::Cleared { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Session Events
// ============================================================================

/// Events related to the cookie jar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// The jar changed; carries the complete new jar so the host can persist it.
    CookieChanged {
        cookie: BTreeMap<String, String>,
    },
    /// The jar was cleared by a logout.
    LoggedOut,
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::CookieChanged { .. } => "Session cookie updated",
            SessionEvent::LoggedOut => "Session logged out",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Why a track stopped producing audio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The device ran out of audio.
    Natural,
    /// URL resolution, download or device load failed.
    Failed,
    /// A newer load started before this one resolved.
    Superseded,
}

impl EndReason {
    pub fn is_failure(&self) -> bool {
        !matches!(self, EndReason::Natural)
    }
}

/// Events emitted by the player actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A load was accepted and is resolving.
    Loading {
        track_id: u64,
        generation: u64,
    },
    /// The device accepted the track.
    Loaded {
        track: TrackItem,
        /// Served from a local file or the track cache.
        local: bool,
    },
    Playing {
        track_id: u64,
    },
    Paused {
        track_id: u64,
    },
    Stopped,
    /// Playback of `track_id` ended.
    Ended {
        track_id: Option<u64>,
        reason: EndReason,
    },
    VolumeChanged {
        level: u8,
    },
    SpeedChanged {
        speed: f32,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Loading { .. } => "Track loading",
            PlaybackEvent::Loaded { .. } => "Track loaded",
            PlaybackEvent::Playing { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Stopped => "Playback stopped",
            PlaybackEvent::Ended { .. } => "Track ended",
            PlaybackEvent::VolumeChanged { .. } => "Volume changed",
            PlaybackEvent::SpeedChanged { .. } => "Speed changed",
        }
    }
}

// ============================================================================
// Lyric Events
// ============================================================================

/// Events describing lyric state for the current track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum LyricEvent {
    /// New lyric tables; both cursors restart at zero.
    Updated {
        track_id: u64,
        lyric: LyricData,
    },
    /// Index of the line currently being sung in each table.
    Index {
        original: usize,
        translation: usize,
    },
    DelayChanged {
        delay_secs: f64,
    },
}

impl LyricEvent {
    fn description(&self) -> &str {
        match self {
            LyricEvent::Updated { .. } => "Lyric loaded",
            LyricEvent::Index { .. } => "Lyric line advanced",
            LyricEvent::DelayChanged { .. } => "Lyric delay changed",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Identifier of a queue entry as the UI assigns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum QueueItemId {
    Num(u64),
    Str(String),
}

/// Events about what plays next.
///
/// The edit variants mirror queue changes made by one UI window so every
/// other window can apply the same edit. Entries are opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    FmModeChanged {
        enabled: bool,
    },
    /// The track queued after the current one changed.
    NextChanged {
        track: Option<TrackItem>,
    },
    /// Entries inserted at `index`, or appended when absent.
    Added {
        items: Vec<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    Cleared,
    Deleted {
        id: QueueItemId,
    },
    /// The whole queue was replaced; `id` is the entry to start from.
    Replaced {
        items: Vec<serde_json::Value>,
        id: u64,
    },
    Played {
        id: QueueItemId,
    },
    /// Cursor moved by `index` entries relative to the current one.
    Shifted {
        index: i64,
    },
    Sorted {
        items: Vec<serde_json::Value>,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::FmModeChanged { .. } => "Personal FM toggled",
            QueueEvent::NextChanged { .. } => "Next track changed",
            QueueEvent::Added { .. } => "Queue entries added",
            QueueEvent::Cleared => "Queue cleared",
            QueueEvent::Deleted { .. } => "Queue entry removed",
            QueueEvent::Replaced { .. } => "Queue replaced",
            QueueEvent::Played { .. } => "Queue entry selected",
            QueueEvent::Shifted { .. } => "Queue cursor moved",
            QueueEvent::Sorted { .. } => "Queue reordered",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Which cache a maintenance event refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Music,
    Lyric,
    All,
}

/// Events emitted by the disk caches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    TrackCached {
        key: String,
        size: u64,
    },
    TrackEvicted {
        key: String,
    },
    Cleared {
        kind: CacheKind,
    },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::TrackCached { .. } => "Track cached",
            CacheEvent::TrackEvicted { .. } => "Track evicted from cache",
            CacheEvent::Cleared { .. } => "Cache cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers; emitters treat
    /// that as a no-op.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let lyric_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Lyric(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ended(reason: EndReason) -> CoreEvent {
        CoreEvent::Playback(PlaybackEvent::Ended {
            track_id: Some(7),
            reason,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(CoreEvent::Playback(PlaybackEvent::Stopped)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Session(SessionEvent::CookieChanged {
            cookie: BTreeMap::from([("MUSIC_U".to_string(), "abc".to_string())]),
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Lyric(_)));

        bus.emit(CoreEvent::Playback(PlaybackEvent::Playing { track_id: 1 }))
            .ok();
        let index = CoreEvent::Lyric(LyricEvent::Index {
            original: 3,
            translation: 2,
        });
        bus.emit(index.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), index);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(CoreEvent::Lyric(LyricEvent::Index {
                original: i,
                translation: 0,
            }))
            .ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(ended(EndReason::Failed).severity(), EventSeverity::Warning);
        assert_eq!(
            ended(EndReason::Superseded).severity(),
            EventSeverity::Warning
        );
        assert_eq!(ended(EndReason::Natural).severity(), EventSeverity::Debug);
        assert_eq!(
            CoreEvent::Cache(CacheEvent::Cleared {
                kind: CacheKind::Music
            })
            .severity(),
            EventSeverity::Info
        );
    }

    #[test]
    fn test_event_description() {
        assert_eq!(ended(EndReason::Natural).description(), "Track ended");
        assert_eq!(
            CoreEvent::Session(SessionEvent::LoggedOut).description(),
            "Session logged out"
        );
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(ended(EndReason::Superseded)).unwrap();
        assert_eq!(json["type"], "Playback");
        assert_eq!(json["payload"]["event"], "Ended");
        assert_eq!(json["payload"]["reason"], "superseded");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ended(EndReason::Superseded));
    }

    #[test]
    fn test_queue_edit_wire_shape() {
        let event = CoreEvent::Queue(QueueEvent::Deleted {
            id: QueueItemId::Str("347230-1".into()),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["event"], "Deleted");
        assert_eq!(json["payload"]["id"], "347230-1");

        let added: QueueEvent = serde_json::from_value(serde_json::json!({
            "event": "Added",
            "items": [{ "id": 1 }, { "id": 2 }]
        }))
        .unwrap();
        assert_eq!(
            added,
            QueueEvent::Added {
                items: vec![serde_json::json!({ "id": 1 }), serde_json::json!({ "id": 2 })],
                index: None,
            }
        );

        let played: QueueEvent =
            serde_json::from_value(serde_json::json!({ "event": "Played", "id": 7 })).unwrap();
        assert_eq!(played, QueueEvent::Played { id: QueueItemId::Num(7) });
        assert_eq!(
            CoreEvent::Queue(QueueEvent::Cleared).description(),
            "Queue cleared"
        );
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        let event = CoreEvent::Queue(QueueEvent::FmModeChanged { enabled: true });
        bus.emit(event.clone()).ok();

        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, event);
    }
}
