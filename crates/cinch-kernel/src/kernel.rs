//! [`Kernel`] – registration, liveness and plugin-list broadcasting.
//!
//! # Scheduling
//!
//! Every tick the kernel
//!
//! 1. applies at most **one** pending intent from the [`IntentQueue`], and
//!    publishes a single `plugin_list` when the queue has just drained after
//!    a change;
//! 2. every `ping_interval`, publishes one `ping` per registered context;
//! 3. every `sweep_interval`, prunes entries that are absent from
//!    [`Presence`] **and** have not answered a ping within
//!    `liveness_timeout`, followed by one `plugin_list` for the whole sweep.
//!
//! A `kernel_soft_reset` wipes the registry, the intents and the serial
//! counter and broadcasts `register_now` so that live components register
//! again.

use std::time::{Duration, Instant};

use cinch_middleware::Component;
use cinch_types::{Envelope, Message, Topic};
use tracing::{debug, info};

use crate::presence::Presence;
use crate::registry::{Applied, Intent, IntentQueue, Registration, Registry};

/// Timing knobs for the [`Kernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Scheduler tick: one intent is applied per tick.
    pub tick_interval: Duration,
    pub ping_interval: Duration,
    pub sweep_interval: Duration,
    /// How long an entry may go without a `pong` before it becomes prunable.
    pub liveness_timeout: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            ping_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(3),
            liveness_timeout: Duration::from_secs(15),
        }
    }
}

/// The registry/heartbeat kernel component.
pub struct Kernel {
    config: KernelConfig,
    registry: Registry,
    intents: IntentQueue,
    presence: Box<dyn Presence>,
    /// A broadcast is owed once the intent queue drains.
    dirty: bool,
    next_ping: Option<Instant>,
    next_sweep: Option<Instant>,
}

/// Bus source name of the kernel.
pub const KERNEL_NAME: &str = "cinch-kernel";

impl Kernel {
    /// An empty kernel checking liveness against `presence`.
    pub fn new(config: KernelConfig, presence: Box<dyn Presence>) -> Self {
        Self {
            config,
            registry: Registry::new(),
            intents: IntentQueue::new(),
            presence,
            dirty: false,
            next_ping: None,
            next_sweep: None,
        }
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registrations and removals not yet applied.
    pub fn pending_intents(&self) -> usize {
        self.intents.len()
    }

    /// Handle one inbound message.
    pub fn handle(&mut self, message: &Message, now: Instant) -> Vec<Message> {
        match message {
            Message::Register { .. } => {
                match Registration::from_message(message) {
                    Some(registration) => {
                        debug!(context = %registration.context, "registration queued");
                        self.intents.push_add(registration);
                    }
                    None => debug!("malformed registration dropped"),
                }
                Vec::new()
            }
            Message::Deregister { context } if !context.trim().is_empty() => {
                debug!(%context, "de-registration queued");
                self.intents.push_remove(context);
                Vec::new()
            }
            Message::Pong { context } => {
                if !self.registry.touch(context, now) {
                    debug!(%context, "pong from unregistered context ignored");
                }
                Vec::new()
            }
            Message::PluginList { plugins: None } => {
                if self.intents.is_empty() {
                    vec![self.plugin_list()]
                } else {
                    // The drain broadcast will answer the request.
                    self.dirty = true;
                    Vec::new()
                }
            }
            Message::KernelSoftReset => self.soft_reset(),
            _ => Vec::new(),
        }
    }

    /// Advance the scheduler.
    pub fn tick(&mut self, now: Instant) -> Vec<Message> {
        let mut out = self.apply_one(now);
        if due(&mut self.next_ping, now, self.config.ping_interval) {
            out.extend(
                self.registry
                    .contexts()
                    .into_iter()
                    .map(|context| Message::Ping { context }),
            );
        }
        if due(&mut self.next_sweep, now, self.config.sweep_interval) {
            out.extend(self.sweep(now));
        }
        out
    }

    fn apply_one(&mut self, now: Instant) -> Vec<Message> {
        let mut out = Vec::new();
        match self.intents.pop() {
            Some((_, Intent::Add(registration))) => {
                let context = registration.context.clone();
                match self.registry.apply(registration, now) {
                    Applied::Inserted(serial) => info!(%context, serial, "component registered"),
                    Applied::Refreshed(serial) => debug!(%context, serial, "registration refreshed"),
                }
                self.dirty = true;
            }
            Some((context, Intent::Remove)) => {
                if self.registry.get(&context).is_some() {
                    out.push(Message::DeregisterNotice { context: context.clone() });
                    self.registry.remove(&context);
                    info!(%context, "component de-registered");
                    self.dirty = true;
                }
            }
            None => return out,
        }
        if self.intents.is_empty() && self.dirty {
            self.dirty = false;
            out.push(self.plugin_list());
        }
        out
    }

    fn sweep(&mut self, now: Instant) -> Vec<Message> {
        let doomed = self
            .registry
            .prunable(now, self.config.liveness_timeout, self.presence.as_ref());
        if doomed.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(doomed.len() + 1);
        for context in doomed {
            info!(%context, "pruning silent, absent component");
            out.push(Message::DeregisterNotice { context: context.clone() });
            self.registry.remove(&context);
        }
        out.push(self.plugin_list());
        out
    }

    fn soft_reset(&mut self) -> Vec<Message> {
        info!(entries = self.registry.len(), "kernel soft reset");
        self.registry.clear();
        self.intents.clear();
        self.dirty = false;
        vec![Message::RegisterNow]
    }

    fn plugin_list(&self) -> Message {
        Message::PluginList {
            plugins: Some(self.registry.plugin_list()),
        }
    }
}

/// Returns `true` when the timer in `slot` has fired, re-arming it.  An
/// unarmed slot is armed without firing.
fn due(slot: &mut Option<Instant>, now: Instant, interval: Duration) -> bool {
    match *slot {
        Some(at) if now >= at => {
            *slot = Some(now + interval);
            true
        }
        Some(_) => false,
        None => {
            *slot = Some(now + interval);
            false
        }
    }
}

impl Component for Kernel {
    fn name(&self) -> &str {
        KERNEL_NAME
    }

    fn topics(&self) -> &[Topic] {
        &[Topic::KernelLifecycle]
    }

    fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    fn on_start(&mut self, now: Instant) -> Vec<Message> {
        self.next_ping = Some(now + self.config.ping_interval);
        self.next_sweep = Some(now + self.config.sweep_interval);
        vec![Message::RegisterNow]
    }

    fn on_message(&mut self, envelope: &Envelope, now: Instant) -> Vec<Message> {
        self.handle(&envelope.message, now)
    }

    fn on_tick(&mut self, now: Instant) -> Vec<Message> {
        self.tick(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::SharedPresence;

    fn register(context: &str) -> Message {
        Message::Register {
            context: context.into(),
            component_serial: 1,
            label: context.into(),
            min_acl: 1,
            presence_id: None,
        }
    }

    fn kernel(presence: SharedPresence) -> Kernel {
        Kernel::new(KernelConfig::default(), Box::new(presence))
    }

    fn plugin_lists(out: &[Message]) -> usize {
        out.iter()
            .filter(|m| matches!(m, Message::PluginList { plugins: Some(_) }))
            .count()
    }

    /// Tick until the intent queue drains, collecting everything published.
    fn drain(k: &mut Kernel, now: Instant) -> Vec<Message> {
        let mut out = Vec::new();
        while k.pending_intents() > 0 {
            out.extend(k.apply_one(now));
        }
        out
    }

    #[test]
    fn registrations_are_applied_one_per_tick() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&register("a"), now);
        k.handle(&register("b"), now);
        assert!(k.registry().is_empty(), "register must be queued, not applied");

        k.tick(now);
        assert_eq!(k.registry().len(), 1);
        k.tick(now);
        assert_eq!(k.registry().len(), 2);
    }

    #[test]
    fn burst_of_registrations_yields_one_plugin_list_in_enqueue_order() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        for name in ["charm", "alpha", "bell", "alpha"] {
            k.handle(&register(name), now);
        }
        let out = drain(&mut k, now);
        assert_eq!(plugin_lists(&out), 1);

        let Some(Message::PluginList { plugins: Some(list) }) = out.last() else {
            panic!("drain must end with a plugin_list");
        };
        let names: Vec<&str> = list.iter().map(|p| p.context.as_str()).collect();
        assert_eq!(names, ["charm", "alpha", "bell"]);
        let serials: Vec<u64> = list.iter().map(|p| p.instance_serial).collect();
        assert_eq!(serials, [1, 2, 3]);
    }

    #[test]
    fn reregistration_preserves_instance_serial() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&register("a"), now);
        drain(&mut k, now);
        k.handle(
            &Message::Register {
                context: "a".into(),
                component_serial: 42,
                label: "A2".into(),
                min_acl: 3,
                presence_id: Some("prim-7".into()),
            },
            now,
        );
        drain(&mut k, now);
        let entry = k.registry().get("a").unwrap();
        assert_eq!(entry.instance_serial, 1);
        assert_eq!(entry.component_serial, 42);
        assert_eq!(entry.presence_id, "prim-7");
    }

    #[test]
    fn malformed_registration_is_dropped() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        let out = k.handle(&register(" "), now);
        assert!(out.is_empty());
        assert_eq!(k.pending_intents(), 0);
    }

    #[test]
    fn deregister_publishes_notice_then_one_list() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&register("a"), now);
        k.handle(&register("b"), now);
        drain(&mut k, now);

        k.handle(&Message::Deregister { context: "a".into() }, now);
        k.handle(&Message::Deregister { context: "b".into() }, now);
        let out = drain(&mut k, now);
        assert_eq!(
            out[..2],
            [
                Message::DeregisterNotice { context: "a".into() },
                Message::DeregisterNotice { context: "b".into() },
            ]
        );
        assert_eq!(plugin_lists(&out), 1);
        assert!(k.registry().is_empty());
    }

    #[test]
    fn deregister_of_unknown_context_is_silent() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&Message::Deregister { context: "ghost".into() }, now);
        assert!(drain(&mut k, now).is_empty());
    }

    #[test]
    fn register_after_deregister_wins() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&register("a"), now);
        drain(&mut k, now);
        k.handle(&Message::Deregister { context: "a".into() }, now);
        k.handle(&register("a"), now);
        let out = drain(&mut k, now);
        assert!(!out.iter().any(|m| matches!(m, Message::DeregisterNotice { .. })));
        assert_eq!(k.registry().get("a").unwrap().instance_serial, 1);
    }

    #[test]
    fn plugin_list_request_answers_immediately_when_idle() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        let out = k.handle(&Message::PluginList { plugins: None }, now);
        assert_eq!(out, [Message::PluginList { plugins: Some(Vec::new()) }]);
    }

    #[test]
    fn plugin_list_request_defers_while_intents_pending() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&register("a"), now);
        assert!(k.handle(&Message::PluginList { plugins: None }, now).is_empty());
        let out = drain(&mut k, now);
        assert_eq!(plugin_lists(&out), 1);
    }

    #[test]
    fn pings_every_interval_and_pong_refreshes_last_seen() {
        let t0 = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.on_start(t0);
        k.handle(&register("a"), t0);
        k.tick(t0);

        let t1 = t0 + Duration::from_secs(5);
        let out = k.tick(t1);
        assert!(out.contains(&Message::Ping { context: "a".into() }));

        let t2 = t1 + Duration::from_secs(1);
        k.handle(&Message::Pong { context: "a".into() }, t2);
        assert_eq!(k.registry().get("a").unwrap().last_seen, t2);

        // No second ping until the interval elapses again.
        let out = k.tick(t2);
        assert!(!out.iter().any(|m| matches!(m, Message::Ping { .. })));
    }

    #[test]
    fn unrelated_traffic_is_not_liveness() {
        let t0 = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&register("a"), t0);
        k.tick(t0);
        let later = t0 + Duration::from_secs(30);
        k.handle(&Message::Deregister { context: "zzz".into() }, later);
        k.handle(&Message::PluginList { plugins: None }, later);
        assert_eq!(k.registry().get("a").unwrap().last_seen, t0);
    }

    #[test]
    fn sweep_prunes_many_with_a_single_broadcast() {
        let t0 = Instant::now();
        let presence = SharedPresence::new();
        presence.insert("kept_present");
        let mut k = kernel(presence);
        k.on_start(t0);
        for name in ["lost_1", "kept_present", "lost_2"] {
            k.handle(&register(name), t0);
        }
        drain(&mut k, t0);

        // Well past the 15s timeout, on a sweep boundary.
        let mut out = Vec::new();
        let mut now = t0;
        while now < t0 + Duration::from_secs(18) {
            now += Duration::from_secs(1);
            out = k.tick(now);
            if out.iter().any(|m| matches!(m, Message::DeregisterNotice { .. })) {
                break;
            }
        }
        assert_eq!(plugin_lists(&out), 1);
        assert_eq!(k.registry().contexts(), ["kept_present"]);
    }

    #[test]
    fn sweep_spares_absent_but_recently_acked() {
        let t0 = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&register("slow"), t0);
        k.tick(t0);
        let t1 = t0 + Duration::from_secs(14);
        k.handle(&Message::Pong { context: "slow".into() }, t1);
        let out = k.sweep(t0 + Duration::from_secs(20));
        assert!(out.is_empty());
        assert_eq!(k.registry().len(), 1);
    }

    #[test]
    fn soft_reset_clears_everything_and_solicits() {
        let now = Instant::now();
        let mut k = kernel(SharedPresence::new());
        k.handle(&register("a"), now);
        k.handle(&register("b"), now);
        k.tick(now);
        let out = k.handle(&Message::KernelSoftReset, now);
        assert_eq!(out, [Message::RegisterNow]);
        assert!(k.registry().is_empty());
        assert_eq!(k.pending_intents(), 0);

        k.handle(&register("b"), now);
        drain(&mut k, now);
        assert_eq!(k.registry().get("b").unwrap().instance_serial, 1);
    }
}
