//! [`SimPlugin`] – a stand-in feature plugin.
//!
//! Registers with the kernel, answers its pings, and re-registers whenever
//! the kernel solicits.  `plugin_start` addressed to it is logged and, when
//! `auto_return` is set, answered with `plugin_return` so the supervisor
//! re-announces its entry component.

use std::time::{Duration, Instant};

use cinch_middleware::Component;
use cinch_types::{Envelope, Message, Topic};
use tracing::{debug, info};

/// How a simulated plugin registers and behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPluginSpec {
    pub context: String,
    pub label: String,
    pub component_serial: i64,
    pub min_acl: i32,
    pub auto_return: bool,
}

impl SimPluginSpec {
    /// Defaults for `context`: public access, no auto-return.
    pub fn new(context: impl Into<String>) -> Self {
        let context = context.into();
        Self {
            label: context.clone(),
            context,
            component_serial: 1,
            min_acl: 1,
            auto_return: false,
        }
    }
}

/// A stand-in plugin for exercising the kernel and the supervisor.
pub struct SimPlugin {
    spec: SimPluginSpec,
    name: String,
    starts: u32,
}

impl SimPlugin {
    /// A plugin built from `spec`.
    pub fn new(spec: SimPluginSpec) -> Self {
        let name = format!("plugin:{}", spec.context);
        Self { spec, name, starts: 0 }
    }

    /// The context this plugin registers under.
    pub fn context(&self) -> &str {
        &self.spec.context
    }

    /// How many `plugin_start` hand-offs this plugin has received.
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// Handle one inbound message.
    pub fn handle(&mut self, message: &Message) -> Vec<Message> {
        match message {
            Message::RegisterNow => vec![self.registration()],
            Message::Ping { context } if *context == self.spec.context => vec![Message::Pong {
                context: context.clone(),
            }],
            Message::PluginStart { context } if *context == self.spec.context => {
                self.starts += 1;
                info!(context = %self.spec.context, starts = self.starts, "plugin started");
                if self.spec.auto_return {
                    vec![Message::PluginReturn { context: context.clone() }]
                } else {
                    Vec::new()
                }
            }
            Message::DeregisterNotice { context } if *context == self.spec.context => {
                debug!(%context, "kernel dropped this plugin");
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn registration(&self) -> Message {
        Message::Register {
            context: self.spec.context.clone(),
            component_serial: self.spec.component_serial,
            label: self.spec.label.clone(),
            min_acl: self.spec.min_acl,
            presence_id: None,
        }
    }
}

impl Component for SimPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn topics(&self) -> &[Topic] {
        &[Topic::KernelLifecycle, Topic::Ui]
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn on_start(&mut self, _now: Instant) -> Vec<Message> {
        vec![self.registration()]
    }

    fn on_message(&mut self, envelope: &Envelope, _now: Instant) -> Vec<Message> {
        self.handle(&envelope.message)
    }

    fn on_tick(&mut self, _now: Instant) -> Vec<Message> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_on_start_and_on_solicitation() {
        let mut p = SimPlugin::new(SimPluginSpec::new("bell"));
        let start = p.on_start(Instant::now());
        assert!(matches!(&start[..], [Message::Register { context, .. }] if context == "bell"));
        assert_eq!(p.handle(&Message::RegisterNow), start);
    }

    #[test]
    fn answers_only_its_own_ping() {
        let mut p = SimPlugin::new(SimPluginSpec::new("bell"));
        assert_eq!(
            p.handle(&Message::Ping { context: "bell".into() }),
            [Message::Pong { context: "bell".into() }]
        );
        assert!(p.handle(&Message::Ping { context: "leash".into() }).is_empty());
    }

    #[test]
    fn auto_return_hands_control_back() {
        let mut spec = SimPluginSpec::new("bell");
        spec.auto_return = true;
        let mut p = SimPlugin::new(spec);
        let out = p.handle(&Message::PluginStart { context: "bell".into() });
        assert_eq!(out, [Message::PluginReturn { context: "bell".into() }]);
        assert_eq!(p.starts(), 1);
        assert!(p.handle(&Message::PluginStart { context: "leash".into() }).is_empty());
    }
}
