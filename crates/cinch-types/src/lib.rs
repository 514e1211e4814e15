//! `cinch-types` – the shared wire vocabulary of the control plane.
//!
//! Every component talks to every other component exclusively through typed
//! [`Envelope`]s published on a numbered [`Topic`].  This crate owns those
//! types so that the kernel, the settings authority, the authorization
//! resolver and the bootstrap supervisor agree on a single contract.
//!
//! # Modules
//!
//! - [`message`] – [`Message`], [`Envelope`], [`WireFrame`], [`PluginInfo`]
//!   and [`HostEvent`].
//! - [`acl`] – the [`AclLevel`] ladder and the [`PolicyFlags`] that explain it.
//! - [`snapshot`] – the flat [`Snapshot`] key/value map broadcast by the
//!   settings authority.

pub mod acl;
pub mod message;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use acl::{AclLevel, PolicyFlags};
pub use message::{Envelope, HostEvent, Message, PluginInfo, WireFrame};
pub use snapshot::{SettingValue, Snapshot};

/// Numbered fan-out lanes of the bus.
///
/// The numeric ids are stable and appear on the wire (see [`WireFrame`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Topic {
    /// Registration, de-registration, soft reset, plugin lists and pings.
    KernelLifecycle,
    /// Authorization queries and results.
    Auth,
    /// Settings requests, snapshots and mutations.
    Settings,
    /// Plugin start / return hand-offs.
    Ui,
}

impl Topic {
    /// Every topic, in id order.
    pub const ALL: [Topic; 4] = [Topic::KernelLifecycle, Topic::Auth, Topic::Settings, Topic::Ui];

    /// The stable numeric id of this topic.
    pub fn id(self) -> i32 {
        match self {
            Topic::KernelLifecycle => 500,
            Topic::Auth => 700,
            Topic::Settings => 800,
            Topic::Ui => 900,
        }
    }

    /// Look a topic up by its numeric id.
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }
}

impl From<Topic> for i32 {
    fn from(topic: Topic) -> Self {
        topic.id()
    }
}

impl TryFrom<i32> for Topic {
    type Error = CinchError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        Topic::from_id(id).ok_or(CinchError::UnknownTopic(id))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Errors raised at the bus boundary.
///
/// None of these ever travel between components: a malformed envelope is
/// dropped where it is decoded.
#[derive(Error, Debug)]
pub enum CinchError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Unknown topic id {0}")]
    UnknownTopic(i32),

    #[error("Envelope decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Bus channel error: {0}")]
    Channel(String),
}
