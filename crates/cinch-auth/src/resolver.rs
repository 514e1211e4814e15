//! [`Resolver`] – answers `acl_query` from the last settings snapshot.
//!
//! Until the first `settings_sync` arrives the resolver cannot know anyone's
//! level, so it refuses to guess: queries are parked in arrival order, a
//! `settings_get` goes out (and is repeated every `retry_interval`), and the
//! parked avatars are answered the moment a snapshot lands.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use cinch_middleware::Component;
use cinch_types::{Envelope, HostEvent, Message, Topic};
use tracing::{debug, info};

use crate::policy::{AuthPolicy, resolve};

/// Timers for the [`Resolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    pub tick_interval: Duration,
    /// Spacing of repeated `settings_get` while queries are parked.
    pub retry_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            retry_interval: Duration::from_secs(2),
        }
    }
}

/// Bus source name of the resolver.
pub const RESOLVER_NAME: &str = "cinch-auth";

/// Answers `acl_query` from the latest settings snapshot, parking queries until one arrives.
pub struct Resolver {
    config: ResolverConfig,
    wearer: Option<String>,
    policy: Option<AuthPolicy>,
    parked: VecDeque<String>,
    last_request: Option<Instant>,
}

impl Resolver {
    /// A resolver that has not seen any settings yet.
    pub fn new(config: ResolverConfig, wearer: Option<String>) -> Self {
        Self {
            config,
            wearer,
            policy: None,
            parked: VecDeque::new(),
            last_request: None,
        }
    }

    /// Whether a settings snapshot has been received.
    pub fn is_ready(&self) -> bool {
        self.policy.is_some()
    }

    /// Number of queries waiting for the first snapshot.
    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    /// Follow a change of wearer. Later queries resolve against it.
    pub fn set_wearer(&mut self, wearer: Option<String>) {
        self.wearer = wearer;
    }

    /// Handle one inbound message, returning results and any `settings_get` request.
    pub fn handle(&mut self, message: &Message, now: Instant) -> Vec<Message> {
        match message {
            Message::SettingsSync { kv } => {
                self.policy = Some(AuthPolicy::from_snapshot(kv));
                self.last_request = None;
                if !self.parked.is_empty() {
                    info!(parked = self.parked.len(), "snapshot arrived, answering parked queries");
                }
                let parked: Vec<String> = self.parked.drain(..).collect();
                parked.iter().filter_map(|avatar| self.answer(avatar)).collect()
            }
            Message::AclQuery { avatar } if !avatar.trim().is_empty() => match self.answer(avatar) {
                Some(result) => vec![result],
                None => {
                    debug!(%avatar, "no snapshot yet, query parked");
                    self.parked.push_back(avatar.clone());
                    self.last_request = Some(now);
                    vec![Message::SettingsGet]
                }
            },
            _ => Vec::new(),
        }
    }

    /// Re-request settings while queries are parked and the retry interval has passed.
    pub fn tick(&mut self, now: Instant) -> Vec<Message> {
        if self.policy.is_some() || self.parked.is_empty() {
            return Vec::new();
        }
        match self.last_request {
            Some(at) if now.saturating_duration_since(at) < self.config.retry_interval => Vec::new(),
            _ => {
                self.last_request = Some(now);
                vec![Message::SettingsGet]
            }
        }
    }

    fn answer(&self, avatar: &str) -> Option<Message> {
        let policy = self.policy.as_ref()?;
        let (level, flags) = resolve(policy, self.wearer.as_deref(), avatar);
        debug!(%avatar, level = level.as_i32(), "acl resolved");
        Some(Message::AclResult {
            avatar: avatar.to_string(),
            level,
            flags,
        })
    }
}

impl Component for Resolver {
    fn name(&self) -> &str {
        RESOLVER_NAME
    }

    fn topics(&self) -> &[Topic] {
        &[Topic::Auth, Topic::Settings]
    }

    fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    fn on_start(&mut self, now: Instant) -> Vec<Message> {
        self.last_request = Some(now);
        vec![Message::SettingsGet]
    }

    fn on_message(&mut self, envelope: &Envelope, now: Instant) -> Vec<Message> {
        self.handle(&envelope.message, now)
    }

    fn on_tick(&mut self, now: Instant) -> Vec<Message> {
        self.tick(now)
    }

    fn on_host_event(&mut self, event: &HostEvent, _now: Instant) -> Vec<Message> {
        if let HostEvent::Attached { wearer } = event {
            info!(%wearer, "wearer changed");
            self.set_wearer(Some(wearer.clone()));
        }
        Vec::new()
    }
}
