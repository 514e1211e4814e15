//! The [`Component`] contract and its cooperative event loop.
//!
//! A component is a plain state machine: it is handed one envelope, one
//! timer tick or one host event at a time and answers with the messages it
//! wants published.  [`ComponentRunner`] owns the component, feeds it from
//! the bus and publishes its output, so no component ever touches another
//! component's state.

use std::time::{Duration, Instant};

use cinch_types::{Envelope, HostEvent, Message, Topic};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{EventBus, TopicReceiver};

/// A bus participant driven by [`ComponentRunner`].
///
/// Every handler runs to completion before the next event is considered.
/// `now` comes from the runner so handlers stay deterministic under test.
pub trait Component: Send + 'static {
    /// Stable name, stamped as the `source` of every published envelope.
    fn name(&self) -> &str;

    /// The lanes this component listens on.
    fn topics(&self) -> &[Topic];

    /// How often [`on_tick`](Self::on_tick) fires.
    fn tick_interval(&self) -> Duration;

    fn on_start(&mut self, _now: Instant) -> Vec<Message> {
        Vec::new()
    }

    /// Handle an envelope published by some *other* component.
    fn on_message(&mut self, envelope: &Envelope, now: Instant) -> Vec<Message>;

    fn on_tick(&mut self, now: Instant) -> Vec<Message>;

    fn on_host_event(&mut self, _event: &HostEvent, _now: Instant) -> Vec<Message> {
        Vec::new()
    }
}

/// Owns one [`Component`] and runs its single-threaded event loop.
///
/// Subscriptions are taken in [`ComponentRunner::new`], so anything
/// published after construction reaches the component even if its task has
/// not been scheduled yet.
pub struct ComponentRunner<C: Component> {
    component: C,
    bus: EventBus,
    receivers: Vec<TopicReceiver>,
    host: broadcast::Receiver<HostEvent>,
}

impl<C: Component> ComponentRunner<C> {
    /// Subscribe `component` to its topics now, so nothing published before [`spawn`](Self::spawn) is missed.
    pub fn new(component: C, bus: EventBus) -> Self {
        let receivers = component
            .topics()
            .iter()
            .map(|topic| bus.subscribe_to(*topic))
            .collect();
        let host = bus.subscribe_host();
        Self {
            component,
            bus,
            receivers,
            host,
        }
    }

    /// Spawn the event loop on the current Tokio runtime.
    pub fn spawn(self) -> ComponentHandle {
        let name = self.component.name().to_string();
        let task = tokio::spawn(self.run());
        ComponentHandle { name, task }
    }

    /// Run until the bus closes.
    pub async fn run(self) {
        let Self {
            mut component,
            bus,
            receivers,
            mut host,
        } = self;
        let name = component.name().to_string();

        // One forwarder per lane funnels into a single inbox.  Order is kept
        // within a lane; nothing is promised across lanes.
        let (inbox_tx, mut inbox) = mpsc::unbounded_channel::<Envelope>();
        for mut receiver in receivers {
            let tx = inbox_tx.clone();
            tokio::spawn(async move {
                while let Some(envelope) = receiver.next().await {
                    if tx.send(envelope).is_err() {
                        break;
                    }
                }
            });
        }
        drop(inbox_tx);

        let mut ticker = tokio::time::interval(component.tick_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let out = component.on_start(now());
        publish_all(&bus, &name, out);

        loop {
            let out = tokio::select! {
                maybe = inbox.recv() => match maybe {
                    Some(envelope) if envelope.source == name => continue,
                    Some(envelope) => component.on_message(&envelope, now()),
                    None => break,
                },
                _ = ticker.tick() => component.on_tick(now()),
                event = host.recv() => match event {
                    Ok(event) => component.on_host_event(&event, now()),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(component = %name, lagged_by = n, "host lane lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            publish_all(&bus, &name, out);
        }
        debug!(component = %name, "component loop exited");
    }
}

/// Handle to a spawned component task.
pub struct ComponentHandle {
    name: String,
    task: JoinHandle<()>,
}

impl ComponentHandle {
    /// Name of the component behind this handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the component.  Its lane forwarders wind down on their next
    /// delivery.
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Virtual-time aware clock: follows Tokio's paused clock in tests.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn publish_all(bus: &EventBus, source: &str, messages: Vec<Message>) {
    for message in messages {
        let kind = message.kind();
        let envelope = Envelope::new(source, message);
        match bus.publish(envelope) {
            Ok(receivers) => debug!(%source, kind, receivers, "published"),
            Err(e) => debug!(%source, kind, error = %e, "published with no listeners"),
        }
    }
}
