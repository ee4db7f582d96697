//! Event types for the dashkit event system
//!
//! Provides the shared event definitions and the EventBus used to tell
//! observers (cache invalidation, UI push) that a dashboard changed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// dashkit event types
///
/// Events are broadcast via EventBus and can be serialized for transmission
/// to UI clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashEvent {
    /// A dashboard layout was committed with a new version
    ///
    /// Triggers:
    /// - Cache: Invalidate cached tile data of the dashboard
    /// - UI: Reload the dashboard layout
    LayoutModified {
        /// What caused the modification (e.g. "tpcreator")
        reason: String,
        /// Owner of the dashboard
        owner_id: Uuid,
        /// Modified dashboard
        dashboard_id: Uuid,
        /// Layout version before the modification (None for a first layout)
        old_layout_id: Option<Uuid>,
        /// Layout version after the modification
        new_layout_id: Option<Uuid>,
        /// Tiles placed by the modification
        new_tile_ids: Vec<Uuid>,
        /// Replaced tile id to replacement tile id (None when detached)
        tile_replacement: BTreeMap<Uuid, Option<Uuid>>,
        /// When the modification was committed
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl DashEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            DashEvent::LayoutModified { .. } => "LayoutModified",
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use dashkit_common::events::EventBus;
///
/// let event_bus = EventBus::new(100);
/// let _rx = event_bus.subscribe();
/// assert!(event_bus.emit(dashkit_common::events::DashEvent::LayoutModified {
///     reason: "tpcreator".to_string(),
///     owner_id: uuid::Uuid::new_v4(),
///     dashboard_id: uuid::Uuid::new_v4(),
///     old_layout_id: None,
///     new_layout_id: None,
///     new_tile_ids: vec![],
///     tile_replacement: Default::default(),
///     timestamp: chrono::Utc::now(),
/// }).is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DashEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DashEvent,
    ) -> Result<usize, broadcast::error::SendError<DashEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DashEvent) {
        let _ = self.tx.send(event);
    }
}
