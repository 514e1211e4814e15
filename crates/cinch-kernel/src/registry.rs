//! [`Registry`] – the kernel's table of registered components, and the
//! [`IntentQueue`] that feeds it.
//!
//! Registrations and removals are never applied on arrival.  They are
//! recorded as per-context intents and drained one per scheduler tick, which
//! fixes `instance_serial` assignment to arrival order.
//!
//! # Intent semantics
//!
//! The queue holds at most one intent per context, last writer wins:
//!
//! | Pending | Incoming | Result |
//! |---|---|---|
//! | – | add / remove | appended |
//! | add | add | payload replaced, position kept |
//! | remove | remove | unchanged |
//! | remove | add | remove cancelled, add appended |
//! | add | remove | add cancelled, remove appended |

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use cinch_types::{Message, PluginInfo};

use crate::presence::Presence;

/// A validated registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub context: String,
    pub component_serial: i64,
    pub label: String,
    pub min_acl: i32,
    /// Falls back to `context` when the component did not send one.
    pub presence_id: String,
}

impl Registration {
    /// Extract a registration from a `register` message.
    ///
    /// Returns `None` for any other message or for an empty context.
    pub fn from_message(message: &Message) -> Option<Self> {
        let Message::Register {
            context,
            component_serial,
            label,
            min_acl,
            presence_id,
        } = message
        else {
            return None;
        };
        if context.trim().is_empty() {
            return None;
        }
        let presence_id = presence_id
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(context)
            .to_string();
        Some(Self {
            context: context.clone(),
            component_serial: *component_serial,
            label: label.clone(),
            min_acl: *min_acl,
            presence_id,
        })
    }
}

/// A pending change for one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Add(Registration),
    Remove,
}

impl Intent {
    fn same_kind(&self, other: &Intent) -> bool {
        matches!(
            (self, other),
            (Intent::Add(_), Intent::Add(_)) | (Intent::Remove, Intent::Remove)
        )
    }
}

/// FIFO of per-context intents with last-writer-wins replacement.
#[derive(Debug, Default)]
pub struct IntentQueue {
    order: VecDeque<String>,
    intents: HashMap<String, Intent>,
}

impl IntentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a registration for its context.
    pub fn push_add(&mut self, registration: Registration) {
        let context = registration.context.clone();
        self.push(context, Intent::Add(registration));
    }

    /// Queue a removal for `context`.
    pub fn push_remove(&mut self, context: &str) {
        self.push(context.to_string(), Intent::Remove);
    }

    fn push(&mut self, context: String, intent: Intent) {
        match self.intents.get(&context) {
            Some(pending) if pending.same_kind(&intent) => {
                self.intents.insert(context, intent);
            }
            Some(_) => {
                self.order.retain(|c| c != &context);
                self.order.push_back(context.clone());
                self.intents.insert(context, intent);
            }
            None => {
                self.order.push_back(context.clone());
                self.intents.insert(context, intent);
            }
        }
    }

    /// Take the oldest pending intent.
    pub fn pop(&mut self) -> Option<(String, Intent)> {
        while let Some(context) = self.order.pop_front() {
            if let Some(intent) = self.intents.remove(&context) {
                return Some((context, intent));
            }
        }
        None
    }

    /// The intent waiting for `context`, if any.
    pub fn pending(&self, context: &str) -> Option<&Intent> {
        self.intents.get(context)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.intents.clear();
    }
}

/// One registered component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub context: String,
    pub instance_serial: u64,
    pub component_serial: i64,
    pub label: String,
    pub min_acl: i32,
    pub presence_id: String,
    pub last_seen: Instant,
}

impl RegistryEntry {
    /// The wire view of this entry.
    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            context: self.context.clone(),
            instance_serial: self.instance_serial,
            component_serial: self.component_serial,
            label: self.label.clone(),
            min_acl: self.min_acl,
        }
    }
}

/// Outcome of [`Registry::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new entry was created with this serial.
    Inserted(u64),
    /// An existing entry was refreshed; its serial is unchanged.
    Refreshed(u64),
}

/// The registry itself: at most one entry per context.
#[derive(Debug)]
pub struct Registry {
    entries: HashMap<String, RegistryEntry>,
    next_serial: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_serial: 1,
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh the entry for `registration.context`.
    pub fn apply(&mut self, registration: Registration, now: Instant) -> Applied {
        if let Some(entry) = self.entries.get_mut(&registration.context) {
            entry.component_serial = registration.component_serial;
            entry.label = registration.label;
            entry.min_acl = registration.min_acl;
            entry.presence_id = registration.presence_id;
            entry.last_seen = now;
            return Applied::Refreshed(entry.instance_serial);
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        self.entries.insert(
            registration.context.clone(),
            RegistryEntry {
                context: registration.context,
                instance_serial: serial,
                component_serial: registration.component_serial,
                label: registration.label,
                min_acl: registration.min_acl,
                presence_id: registration.presence_id,
                last_seen: now,
            },
        );
        Applied::Inserted(serial)
    }

    /// Drop `context`, returning its entry if it was registered.
    pub fn remove(&mut self, context: &str) -> Option<RegistryEntry> {
        self.entries.remove(context)
    }

    /// Record a liveness ack.  Returns `false` for unknown contexts.
    pub fn touch(&mut self, context: &str, now: Instant) -> bool {
        match self.entries.get_mut(context) {
            Some(entry) => {
                entry.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Look up a registered context.
    pub fn get(&self, context: &str) -> Option<&RegistryEntry> {
        self.entries.get(context)
    }

    /// Entries that are both absent from `presence` and silent for longer
    /// than `timeout`, in serial order.
    pub fn prunable(&self, now: Instant, timeout: Duration, presence: &dyn Presence) -> Vec<String> {
        self.ordered()
            .into_iter()
            .filter(|e| {
                now.saturating_duration_since(e.last_seen) > timeout
                    && !presence.is_present(&e.presence_id)
            })
            .map(|e| e.context.clone())
            .collect()
    }

    /// Contexts in serial order.
    pub fn contexts(&self) -> Vec<String> {
        self.ordered().into_iter().map(|e| e.context.clone()).collect()
    }

    /// Every entry as [`PluginInfo`], in serial order.
    pub fn plugin_list(&self) -> Vec<PluginInfo> {
        self.ordered().into_iter().map(RegistryEntry::info).collect()
    }

    /// Drop every entry and restart serial numbering: a new epoch.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_serial = 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ordered(&self) -> Vec<&RegistryEntry> {
        let mut entries: Vec<&RegistryEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.instance_serial);
        entries
    }
}
