//! Typed bus messages and the envelope that carries them.
//!
//! Messages are an internally tagged enum: the JSON `type` field selects the
//! variant, so unknown or missing discriminants fail at decode time rather
//! than deep inside a component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AclLevel, CinchError, PolicyFlags, Snapshot, Topic};

/// One row of a `plugin_list` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub context: String,
    pub instance_serial: u64,
    pub component_serial: i64,
    pub label: String,
    pub min_acl: i32,
}

/// Every message the core components publish or consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // ── kernel lifecycle ────────────────────────────────────────────────
    Register {
        context: String,
        #[serde(default)]
        component_serial: i64,
        #[serde(default)]
        label: String,
        #[serde(default)]
        min_acl: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presence_id: Option<String>,
    },
    Deregister {
        context: String,
    },
    /// Published by the kernel just before an entry is deleted.
    DeregisterNotice {
        context: String,
    },
    /// Kernel solicitation: every live component should `register`.
    RegisterNow,
    KernelSoftReset,
    /// `plugins: None` is a request, `Some` is the kernel's broadcast.
    PluginList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plugins: Option<Vec<PluginInfo>>,
    },
    Ping {
        context: String,
    },
    Pong {
        context: String,
    },

    // ── settings ────────────────────────────────────────────────────────
    SettingsGet,
    SettingsSync {
        kv: Snapshot,
    },
    Set {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Vec<String>>,
    },
    ListAdd {
        key: String,
        elem: String,
    },
    ListRemove {
        key: String,
        elem: String,
    },
    SettingsRejected {
        key: String,
        reason: String,
        requester: String,
    },

    // ── authorization ───────────────────────────────────────────────────
    AclQuery {
        avatar: String,
    },
    AclResult {
        avatar: String,
        level: AclLevel,
        flags: PolicyFlags,
    },

    // ── ui hand-off ─────────────────────────────────────────────────────
    PluginStart {
        context: String,
    },
    PluginReturn {
        context: String,
    },
}

impl Message {
    /// The lane this message travels on.
    pub fn topic(&self) -> Topic {
        match self {
            Message::Register { .. }
            | Message::Deregister { .. }
            | Message::DeregisterNotice { .. }
            | Message::RegisterNow
            | Message::KernelSoftReset
            | Message::PluginList { .. }
            | Message::Ping { .. }
            | Message::Pong { .. } => Topic::KernelLifecycle,
            Message::SettingsGet
            | Message::SettingsSync { .. }
            | Message::Set { .. }
            | Message::ListAdd { .. }
            | Message::ListRemove { .. }
            | Message::SettingsRejected { .. } => Topic::Settings,
            Message::AclQuery { .. } | Message::AclResult { .. } => Topic::Auth,
            Message::PluginStart { .. } | Message::PluginReturn { .. } => Topic::Ui,
        }
    }

    /// Short discriminant name, as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Register { .. } => "register",
            Message::Deregister { .. } => "deregister",
            Message::DeregisterNotice { .. } => "deregister_notice",
            Message::RegisterNow => "register_now",
            Message::KernelSoftReset => "kernel_soft_reset",
            Message::PluginList { .. } => "plugin_list",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::SettingsGet => "settings_get",
            Message::SettingsSync { .. } => "settings_sync",
            Message::Set { .. } => "set",
            Message::ListAdd { .. } => "list_add",
            Message::ListRemove { .. } => "list_remove",
            Message::SettingsRejected { .. } => "settings_rejected",
            Message::AclQuery { .. } => "acl_query",
            Message::AclResult { .. } => "acl_result",
            Message::PluginStart { .. } => "plugin_start",
            Message::PluginReturn { .. } => "plugin_return",
        }
    }

    /// Check the required fields serde cannot express (non-empty ids, a
    /// `set` carrying a payload).
    ///
    /// # Errors
    ///
    /// [`CinchError::Malformed`] naming the offending field.
    pub fn validate(&self) -> Result<(), CinchError> {
        let require = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(CinchError::Malformed(format!("{}: empty `{field}`", self.kind())))
            } else {
                Ok(())
            }
        };
        match self {
            Message::Register { context, .. }
            | Message::Deregister { context }
            | Message::DeregisterNotice { context }
            | Message::Ping { context }
            | Message::Pong { context }
            | Message::PluginStart { context }
            | Message::PluginReturn { context } => require("context", context),
            Message::Set { key, value, values } => {
                require("key", key)?;
                if value.is_none() && values.is_none() {
                    return Err(CinchError::Malformed("set: neither `value` nor `values`".into()));
                }
                Ok(())
            }
            Message::ListAdd { key, elem } | Message::ListRemove { key, elem } => {
                require("key", key)?;
                require("elem", elem)
            }
            Message::AclQuery { avatar } | Message::AclResult { avatar, .. } => {
                require("avatar", avatar)
            }
            Message::SettingsRejected { key, .. } => require("key", key),
            Message::RegisterNow
            | Message::KernelSoftReset
            | Message::PluginList { .. }
            | Message::SettingsGet
            | Message::SettingsSync { .. } => Ok(()),
        }
    }
}

/// Bus wrapper around a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Name of the publishing component, e.g. `"cinch-kernel"`.
    pub source: String,
    pub message: Message,
}

impl Envelope {
    /// Wrap `message` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            message,
        }
    }

    /// The lane this envelope travels on.
    pub fn topic(&self) -> Topic {
        self.message.topic()
    }

    /// Encode the envelope as JSON.
    pub fn to_json(&self) -> Result<String, CinchError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate an envelope.
    pub fn from_json(raw: &str) -> Result<Self, CinchError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        envelope.message.validate()?;
        Ok(envelope)
    }
}

/// The external injection format: a message with its topic id inline.
///
/// ```json
/// {"topic": 800, "type": "set", "key": "owner", "value": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub topic: Topic,
    #[serde(flatten)]
    pub message: Message,
}

impl WireFrame {
    /// Parse a frame, rejecting messages sent on the wrong lane.
    pub fn parse(raw: &str) -> Result<Self, CinchError> {
        let frame: WireFrame = serde_json::from_str(raw)?;
        frame.message.validate()?;
        if frame.message.topic() != frame.topic {
            return Err(CinchError::Malformed(format!(
                "{} does not travel on topic {}",
                frame.message.kind(),
                frame.topic
            )));
        }
        Ok(frame)
    }
}

/// Events raised by the host device itself rather than by a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// The device was put on (or transferred to) `wearer`.
    Attached { wearer: String },
    RegionChanged,
    Teleported,
}
