//! [`Supervisor`] – the bootstrap state machine.
//!
//! ```text
//!            start / region / teleport / attach
//!   Idle ───────────────────────────────────────▶ Waiting{plugins, settings, acl}
//!                                                   │          │
//!                                   all bits clear  │          │ deadline, attempts exhausted
//!                                                   ▼          ▼
//!                                               Complete     Aborted
//! ```
//!
//! Entering `Waiting` fires four requests at once: `kernel_soft_reset`, a
//! `plugin_list` request, `settings_get` and, when the wearer is known,
//! `acl_query{wearer}`.  Each acknowledgement clears one bit.  A single
//! deadline re-fires all four until `max_attempts` deadlines have passed,
//! after which the session aborts and stays silent until a host event
//! restarts it.
//!
//! Independently, a liveness watchdog restarts the session when nothing has
//! been heard from the kernel for `watchdog_timeout`.

use std::time::{Duration, Instant};

use cinch_kernel::KERNEL_NAME;
use cinch_middleware::Component;
use cinch_types::{Envelope, HostEvent, Message, Topic};
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Retry policy and entry point for the [`Supervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub tick_interval: Duration,
    /// Spacing between request re-fires while waiting.
    pub retry_interval: Duration,
    /// Number of deadlines a session may miss before it aborts.
    pub max_attempts: u32,
    /// Kernel silence longer than this forces a new session.
    pub watchdog_timeout: Duration,
    /// Context announced with `plugin_start` once bootstrap completes.
    pub entry_context: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            retry_interval: Duration::from_secs(5),
            max_attempts: 3,
            watchdog_timeout: Duration::from_secs(120),
            entry_context: "main_menu".to_string(),
        }
    }
}

/// Bus source name of the supervisor.
pub const SUPERVISOR_NAME: &str = "cinch-bootstrap";

/// The context the supervisor registers under with the kernel.
pub const SUPERVISOR_CONTEXT: &str = "core_bootstrap";

// ─────────────────────────────────────────────────────────────────────────────
// Session state
// ─────────────────────────────────────────────────────────────────────────────

/// Where the current bootstrap session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Waiting,
    Complete,
    /// Attempts exhausted; only a host event starts a new session.
    Aborted,
}

/// Acknowledgements still outstanding in the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pending {
    pub plugins: bool,
    pub settings: bool,
    pub acl: bool,
}

impl Pending {
    /// True once every outstanding request has been answered.
    pub fn is_clear(&self) -> bool {
        !(self.plugins || self.settings || self.acl)
    }
}

/// Drives the bootstrap handshake and hands control to the entry component.
pub struct Supervisor {
    config: SupervisorConfig,
    wearer: Option<String>,
    phase: Phase,
    pending: Pending,
    attempts: u32,
    deadline: Option<Instant>,
    last_kernel_traffic: Option<Instant>,
}

impl Supervisor {
    /// An idle supervisor; nothing is sent until [`start`](Self::start).
    pub fn new(config: SupervisorConfig, wearer: Option<String>) -> Self {
        Self {
            config,
            wearer,
            phase: Phase::Idle,
            pending: Pending::default(),
            attempts: 0,
            deadline: None,
            last_kernel_traffic: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending(&self) -> Pending {
        self.pending
    }

    /// Attempts made in the current session, 0 when idle or complete.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Begin a fresh session, discarding whatever the previous one tracked.
    pub fn start(&mut self, now: Instant) -> Vec<Message> {
        info!(previous = ?self.phase, wearer = ?self.wearer, "bootstrap session started");
        self.phase = Phase::Waiting;
        self.pending = Pending {
            plugins: true,
            settings: true,
            acl: self.wearer.is_some(),
        };
        self.attempts = 1;
        self.deadline = Some(now + self.config.retry_interval);
        self.requests()
    }

    /// Handle one envelope from another component.
    pub fn handle(&mut self, envelope: &Envelope, now: Instant) -> Vec<Message> {
        if envelope.source == KERNEL_NAME {
            self.last_kernel_traffic = Some(now);
        }
        match &envelope.message {
            Message::RegisterNow => vec![registration()],
            Message::Ping { context } if context == SUPERVISOR_CONTEXT => vec![Message::Pong {
                context: SUPERVISOR_CONTEXT.to_string(),
            }],
            Message::PluginList { plugins: Some(_) } => self.acknowledge(|p| &mut p.plugins),
            Message::SettingsSync { .. } => self.acknowledge(|p| &mut p.settings),
            Message::AclResult { avatar, .. } if self.wearer.as_deref() == Some(avatar.as_str()) => {
                self.acknowledge(|p| &mut p.acl)
            }
            Message::PluginReturn { context }
                if self.phase == Phase::Complete && *context != self.config.entry_context =>
            {
                debug!(%context, "plugin returned, re-announcing entry");
                vec![self.entry()]
            }
            _ => Vec::new(),
        }
    }

    /// Deadline and watchdog checks.
    pub fn tick(&mut self, now: Instant) -> Vec<Message> {
        if matches!(self.phase, Phase::Waiting | Phase::Complete)
            && let Some(seen) = self.last_kernel_traffic
            && now.saturating_duration_since(seen) >= self.config.watchdog_timeout
        {
            warn!(silent_for = ?now.saturating_duration_since(seen), "kernel silent, restarting bootstrap");
            self.last_kernel_traffic = Some(now);
            return self.start(now);
        }

        match self.deadline {
            Some(at) if self.phase == Phase::Waiting && now >= at => {}
            _ => return Vec::new(),
        }
        if self.attempts >= self.config.max_attempts {
            warn!(attempts = self.attempts, pending = ?self.pending, "bootstrap aborted");
            self.phase = Phase::Aborted;
            self.deadline = None;
            return Vec::new();
        }
        self.attempts += 1;
        self.deadline = Some(now + self.config.retry_interval);
        info!(attempt = self.attempts, pending = ?self.pending, "bootstrap retry");
        self.requests()
    }

    /// Restart bootstrap on any host event, whatever the phase.
    pub fn on_host(&mut self, event: &HostEvent, now: Instant) -> Vec<Message> {
        match event {
            HostEvent::Attached { wearer } => {
                self.wearer = Some(wearer.clone());
                self.start(now)
            }
            HostEvent::RegionChanged | HostEvent::Teleported => self.start(now),
        }
    }

    fn acknowledge(&mut self, bit: impl FnOnce(&mut Pending) -> &mut bool) -> Vec<Message> {
        if self.phase != Phase::Waiting {
            return Vec::new();
        }
        *bit(&mut self.pending) = false;
        if !self.pending.is_clear() {
            return Vec::new();
        }
        info!(attempts = self.attempts, entry = %self.config.entry_context, "bootstrap complete");
        self.phase = Phase::Complete;
        self.deadline = None;
        self.attempts = 0;
        vec![self.entry()]
    }

    fn requests(&self) -> Vec<Message> {
        let mut out = vec![
            Message::KernelSoftReset,
            Message::PluginList { plugins: None },
            Message::SettingsGet,
        ];
        if let Some(wearer) = &self.wearer {
            out.push(Message::AclQuery { avatar: wearer.clone() });
        }
        out
    }

    fn entry(&self) -> Message {
        Message::PluginStart {
            context: self.config.entry_context.clone(),
        }
    }
}

fn registration() -> Message {
    Message::Register {
        context: SUPERVISOR_CONTEXT.to_string(),
        component_serial: 0,
        label: "Bootstrap".to_string(),
        min_acl: 0,
        presence_id: None,
    }
}

impl Component for Supervisor {
    fn name(&self) -> &str {
        SUPERVISOR_NAME
    }

    fn topics(&self) -> &[Topic] {
        &[Topic::KernelLifecycle, Topic::Settings, Topic::Auth, Topic::Ui]
    }

    fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    fn on_start(&mut self, now: Instant) -> Vec<Message> {
        self.last_kernel_traffic = Some(now);
        let mut out = self.start(now);
        out.push(registration());
        out
    }

    fn on_message(&mut self, envelope: &Envelope, now: Instant) -> Vec<Message> {
        self.handle(envelope, now)
    }

    fn on_tick(&mut self, now: Instant) -> Vec<Message> {
        self.tick(now)
    }

    fn on_host_event(&mut self, event: &HostEvent, now: Instant) -> Vec<Message> {
        self.on_host(event, now)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use cinch_types::{AclLevel, PolicyFlags, Snapshot};

    const RETRY: Duration = Duration::from_secs(5);

    fn supervisor(wearer: Option<&str>) -> Supervisor {
        Supervisor::new(SupervisorConfig::default(), wearer.map(str::to_string))
    }

    fn kernel(message: Message) -> Envelope {
        Envelope::new(KERNEL_NAME, message)
    }

    fn other(message: Message) -> Envelope {
        Envelope::new("someone", message)
    }

    fn plugin_list() -> Envelope {
        kernel(Message::PluginList { plugins: Some(Vec::new()) })
    }

    fn sync() -> Envelope {
        other(Message::SettingsSync { kv: Snapshot::new() })
    }

    fn acl(avatar: &str) -> Envelope {
        other(Message::AclResult {
            avatar: avatar.into(),
            level: AclLevel::Unowned,
            flags: PolicyFlags {
                wearer_unowned: true,
                ..PolicyFlags::default()
            },
        })
    }

    fn entry() -> Message {
        Message::PluginStart { context: "main_menu".into() }
    }

    #[test]
    fn start_fires_four_requests_with_known_wearer() {
        let mut s = supervisor(Some("w"));
        let out = s.start(Instant::now());
        assert_eq!(
            out,
            [
                Message::KernelSoftReset,
                Message::PluginList { plugins: None },
                Message::SettingsGet,
                Message::AclQuery { avatar: "w".into() },
            ]
        );
        assert_eq!(s.phase(), Phase::Waiting);
        assert_eq!(s.attempts(), 1);
    }

    #[test]
    fn unknown_wearer_skips_acl() {
        let mut s = supervisor(None);
        assert_eq!(s.start(Instant::now()).len(), 3);
        assert!(!s.pending().acl);
    }

    #[test]
    fn acknowledgements_in_any_order_complete_once() {
        let now = Instant::now();
        let mut s = supervisor(Some("w"));
        s.start(now);
        assert!(s.handle(&acl("w"), now).is_empty());
        assert!(s.handle(&sync(), now).is_empty());
        assert_eq!(s.handle(&plugin_list(), now), [entry()]);
        assert_eq!(s.phase(), Phase::Complete);
        assert_eq!(s.attempts(), 0);
        // Late duplicates do nothing.
        assert!(s.handle(&sync(), now).is_empty());
    }

    #[test]
    fn acl_result_for_someone_else_is_not_an_ack() {
        let now = Instant::now();
        let mut s = supervisor(Some("w"));
        s.start(now);
        s.handle(&acl("stranger"), now);
        assert!(s.pending().acl);
    }

    #[test]
    fn missing_acl_aborts_at_three_retry_intervals() {
        let t0 = Instant::now();
        let mut s = supervisor(Some("w"));
        s.start(t0);
        s.handle(&plugin_list(), t0);
        s.handle(&sync(), t0);

        assert!(s.tick(t0 + RETRY - Duration::from_millis(1)).is_empty());
        assert_eq!(s.tick(t0 + RETRY).len(), 4);
        assert_eq!(s.attempts(), 2);
        assert_eq!(s.tick(t0 + RETRY * 2).len(), 4);
        assert_eq!(s.attempts(), 3);
        assert_eq!(s.phase(), Phase::Waiting);

        assert!(s.tick(t0 + RETRY * 3).is_empty());
        assert_eq!(s.phase(), Phase::Aborted);

        // No further requests, not even from the watchdog.
        for n in 4..40 {
            assert!(s.tick(t0 + RETRY * n).is_empty());
        }
    }

    #[test]
    fn retry_keeps_earlier_acknowledgements() {
        let t0 = Instant::now();
        let mut s = supervisor(Some("w"));
        s.start(t0);
        s.handle(&plugin_list(), t0);
        s.tick(t0 + RETRY);
        assert!(!s.pending().plugins);
        assert!(s.pending().settings);
    }

    #[test]
    fn region_change_restarts_completed_session() {
        let now = Instant::now();
        let mut s = supervisor(None);
        s.start(now);
        s.handle(&plugin_list(), now);
        s.handle(&sync(), now);
        assert_eq!(s.phase(), Phase::Complete);

        let out = s.on_host(&HostEvent::RegionChanged, now);
        assert_eq!(out[0], Message::KernelSoftReset);
        assert_eq!(s.phase(), Phase::Waiting);
        assert_eq!(s.attempts(), 1);
    }

    #[test]
    fn teleport_revives_aborted_session() {
        let t0 = Instant::now();
        let mut s = supervisor(None);
        s.start(t0);
        for n in 1..=3 {
            s.tick(t0 + RETRY * n);
        }
        assert_eq!(s.phase(), Phase::Aborted);
        assert!(!s.on_host(&HostEvent::Teleported, t0 + RETRY * 4).is_empty());
        assert_eq!(s.phase(), Phase::Waiting);
    }

    #[test]
    fn attach_sets_wearer_and_queries_it() {
        let now = Instant::now();
        let mut s = supervisor(None);
        let out = s.on_host(&HostEvent::Attached { wearer: "new".into() }, now);
        assert!(out.contains(&Message::AclQuery { avatar: "new".into() }));
        assert!(s.pending().acl);
    }

    #[test]
    fn kernel_silence_restarts_complete_session() {
        let t0 = Instant::now();
        let mut s = supervisor(None);
        s.on_start(t0);
        s.handle(&plugin_list(), t0);
        s.handle(&sync(), t0);
        assert_eq!(s.phase(), Phase::Complete);

        let timeout = SupervisorConfig::default().watchdog_timeout;
        assert!(s.tick(t0 + timeout - Duration::from_secs(1)).is_empty());
        let out = s.tick(t0 + timeout);
        assert_eq!(out[0], Message::KernelSoftReset);
        assert_eq!(s.phase(), Phase::Waiting);
    }

    #[test]
    fn kernel_traffic_feeds_watchdog() {
        let t0 = Instant::now();
        let mut s = supervisor(None);
        s.on_start(t0);
        s.handle(&plugin_list(), t0);
        s.handle(&sync(), t0);

        let timeout = SupervisorConfig::default().watchdog_timeout;
        let ping = kernel(Message::Ping { context: "bell".into() });
        s.handle(&ping, t0 + timeout / 2);
        assert!(s.tick(t0 + timeout).is_empty());
        assert_eq!(s.phase(), Phase::Complete);
    }

    #[test]
    fn answers_own_ping_and_register_now() {
        let now = Instant::now();
        let mut s = supervisor(None);
        let ping = kernel(Message::Ping { context: SUPERVISOR_CONTEXT.into() });
        assert_eq!(
            s.handle(&ping, now),
            [Message::Pong { context: SUPERVISOR_CONTEXT.into() }]
        );
        let other_ping = kernel(Message::Ping { context: "bell".into() });
        assert!(s.handle(&other_ping, now).is_empty());
        let out = s.handle(&kernel(Message::RegisterNow), now);
        assert!(matches!(&out[..], [Message::Register { context, .. }] if context == SUPERVISOR_CONTEXT));
    }

    #[test]
    fn plugin_return_reannounces_entry_only_when_complete() {
        let now = Instant::now();
        let mut s = supervisor(None);
        let back = other(Message::PluginReturn { context: "bell".into() });
        assert!(s.handle(&back, now).is_empty());
        s.start(now);
        s.handle(&plugin_list(), now);
        s.handle(&sync(), now);
        assert_eq!(s.handle(&back, now), [entry()]);
        let entry_back = other(Message::PluginReturn { context: "main_menu".into() });
        assert!(s.handle(&entry_back, now).is_empty());
    }
}
