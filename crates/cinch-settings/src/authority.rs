//! [`Authority`] – the bus face of the [`SettingsStore`].
//!
//! * `settings_get` → one `settings_sync`, throttled so a burst of requests
//!   inside one throttle window costs a single broadcast.
//! * `set` / `list_add` / `list_remove` → mutate, then broadcast only when
//!   the stored snapshot changed.
//! * Policy violations answer with `settings_rejected` addressed to the
//!   sender.  Keys outside the allow-list are dropped without any broadcast.

use std::time::{Duration, Instant};

use cinch_middleware::Component;
use cinch_types::{Envelope, Message, Topic};
use tracing::{debug, info, warn};

use crate::store::{SettingsError, SettingsStore};

/// Limits for the [`Authority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityConfig {
    /// Maximum entries per list key.
    pub max_list_len: usize,
    /// Minimum spacing between request-driven snapshot broadcasts.
    pub sync_throttle: Duration,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            max_list_len: 32,
            sync_throttle: Duration::from_secs(1),
        }
    }
}

/// Bus source name of the authority.
pub const AUTHORITY_NAME: &str = "cinch-settings";

/// Owns the settings store and speaks for it on the settings lane.
pub struct Authority {
    config: AuthorityConfig,
    store: SettingsStore,
    last_requested_sync: Option<Instant>,
}

impl Authority {
    /// An authority over an empty store.
    pub fn new(config: AuthorityConfig) -> Self {
        Self {
            config,
            store: SettingsStore::new(config.max_list_len),
            last_requested_sync: None,
        }
    }

    /// Read-only view of the store.
    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// Handle one inbound envelope; mutations are attributed to its source.
    pub fn handle(&mut self, envelope: &Envelope, now: Instant) -> Vec<Message> {
        match &envelope.message {
            Message::SettingsGet => self.answer_get(now),
            mutation @ (Message::Set { .. } | Message::ListAdd { .. } | Message::ListRemove { .. }) => {
                if mutation.validate().is_err() {
                    debug!(source = %envelope.source, "malformed settings mutation dropped");
                    return Vec::new();
                }
                self.mutate(mutation, &envelope.source)
            }
            _ => Vec::new(),
        }
    }

    fn answer_get(&mut self, now: Instant) -> Vec<Message> {
        if let Some(last) = self.last_requested_sync
            && now.saturating_duration_since(last) < self.config.sync_throttle
        {
            debug!("settings_get absorbed by throttle");
            return Vec::new();
        }
        self.last_requested_sync = Some(now);
        vec![self.sync()]
    }

    fn mutate(&mut self, mutation: &Message, requester: &str) -> Vec<Message> {
        match self.store.apply(mutation) {
            Ok(true) => {
                info!(kind = mutation.kind(), %requester, "settings changed");
                vec![self.sync()]
            }
            Ok(false) => {
                debug!(kind = mutation.kind(), %requester, "settings write was a no-op");
                Vec::new()
            }
            Err(SettingsError::UnknownKey(key)) => {
                debug!(%key, %requester, "write outside allow-list dropped");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, %requester, "settings mutation rejected");
                vec![Message::SettingsRejected {
                    key: mutation_key(mutation).to_string(),
                    reason: e.to_string(),
                    requester: requester.to_string(),
                }]
            }
        }
    }

    fn sync(&self) -> Message {
        Message::SettingsSync {
            kv: self.store.snapshot().clone(),
        }
    }
}

fn mutation_key(message: &Message) -> &str {
    match message {
        Message::Set { key, .. } | Message::ListAdd { key, .. } | Message::ListRemove { key, .. } => key,
        _ => "",
    }
}

impl Component for Authority {
    fn name(&self) -> &str {
        AUTHORITY_NAME
    }

    fn topics(&self) -> &[Topic] {
        &[Topic::Settings]
    }

    fn tick_interval(&self) -> Duration {
        // Nothing is timer driven here.
        Duration::from_secs(60)
    }

    /// A restart announces the (empty) snapshot so caches start fresh.
    fn on_start(&mut self, _now: Instant) -> Vec<Message> {
        vec![self.sync()]
    }

    fn on_message(&mut self, envelope: &Envelope, now: Instant) -> Vec<Message> {
        self.handle(envelope, now)
    }

    fn on_tick(&mut self, _now: Instant) -> Vec<Message> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from(source: &str, message: Message) -> Envelope {
        Envelope::new(source, message)
    }

    fn set(key: &str, value: &str) -> Message {
        Message::Set {
            key: key.into(),
            value: Some(value.into()),
            values: None,
        }
    }

    fn syncs(out: &[Message]) -> usize {
        out.iter()
            .filter(|m| matches!(m, Message::SettingsSync { .. }))
            .count()
    }

    #[test]
    fn repeated_identical_set_broadcasts_once() {
        let now = Instant::now();
        let mut a = Authority::new(AuthorityConfig::default());
        assert_eq!(syncs(&a.handle(&from("menu", set("owner", "alice")), now)), 1);
        assert!(a.handle(&from("menu", set("owner", "alice")), now).is_empty());
    }

    #[test]
    fn sync_carries_the_mutated_snapshot() {
        let now = Instant::now();
        let mut a = Authority::new(AuthorityConfig::default());
        let out = a.handle(&from("menu", set("public_mode", "yes")), now);
        let Some(Message::SettingsSync { kv }) = out.first() else {
            panic!("expected settings_sync, got {out:?}");
        };
        assert!(kv.flag("public_mode"));
    }

    #[test]
    fn get_is_throttled_within_window() {
        let t0 = Instant::now();
        let mut a = Authority::new(AuthorityConfig::default());
        assert_eq!(syncs(&a.handle(&from("x", Message::SettingsGet), t0)), 1);
        assert!(a.handle(&from("y", Message::SettingsGet), t0).is_empty());
        assert!(
            a.handle(&from("y", Message::SettingsGet), t0 + Duration::from_millis(999))
                .is_empty()
        );
        let later = t0 + Duration::from_secs(1);
        assert_eq!(syncs(&a.handle(&from("y", Message::SettingsGet), later)), 1);
    }

    #[test]
    fn unknown_key_is_dropped_silently() {
        let now = Instant::now();
        let mut a = Authority::new(AuthorityConfig::default());
        assert!(a.handle(&from("menu", set("self_destruct", "1")), now).is_empty());
        assert!(a.store().snapshot().is_empty());
    }

    #[test]
    fn policy_violation_is_reported_to_sender() {
        let now = Instant::now();
        let mut a = Authority::new(AuthorityConfig::default());
        a.handle(&from("menu", set("owner", "alice")), now);
        let out = a.handle(
            &from(
                "chat",
                Message::ListAdd {
                    key: "trustees".into(),
                    elem: "alice".into(),
                },
            ),
            now,
        );
        assert_eq!(out.len(), 1);
        match &out[0] {
            Message::SettingsRejected { key, requester, reason } => {
                assert_eq!(key, "trustees");
                assert_eq!(requester, "chat");
                assert!(reason.contains("owner"));
            }
            other => panic!("expected settings_rejected, got {other:?}"),
        }
        assert!(a.store().list(crate::SettingKey::Trustees).is_empty());
    }

    #[test]
    fn malformed_mutation_is_dropped() {
        let now = Instant::now();
        let mut a = Authority::new(AuthorityConfig::default());
        let bad = Message::Set {
            key: "owner".into(),
            value: None,
            values: None,
        };
        assert!(a.handle(&from("menu", bad), now).is_empty());
    }

    #[test]
    fn start_announces_empty_snapshot() {
        let mut a = Authority::new(AuthorityConfig::default());
        let out = a.on_start(Instant::now());
        assert_eq!(out, [Message::SettingsSync { kv: Default::default() }]);
    }
}
