//! Activity events consumed from the external feed
//!
//! The engine does not parse transport payloads; the feed collaborator hands
//! it already-shaped `ActivityEvent` values.

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of activity a user performed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Reaction,
    Checkin,
    Referral,
    /// Platform-specific activity the core does not enumerate.
    Custom(String),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Reaction => write!(f, "reaction"),
            Self::Checkin => write!(f, "checkin"),
            Self::Referral => write!(f, "referral"),
            Self::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// One qualifying user activity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Stable deduplication id for this event. The feed supplies one; if it
    /// cannot, `ActivityEvent::new` generates it.
    pub event_id: String,
    pub user: UserId,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(user: UserId, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            user,
            kind,
            subtype: None,
            timestamp,
        }
    }

    pub fn with_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Whether this event matches an optional kind/subtype restriction.
    pub fn matches(&self, kind: &EventKind, subtype: Option<&str>) -> bool {
        if self.kind != *kind {
            return false;
        }
        match subtype {
            None => true,
            Some(wanted) => self.subtype.as_deref() == Some(wanted),
        }
    }
}
