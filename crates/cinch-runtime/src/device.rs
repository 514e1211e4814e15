//! [`Device`] – wires the four core components and any simulated plugins
//! onto one [`EventBus`].
//!
//! Every runner is constructed (and therefore subscribed) before any of them
//! is spawned, so the first `on_start` broadcasts reach all components.

use std::collections::BTreeMap;

use cinch_auth::{Resolver, ResolverConfig};
use cinch_kernel::{Kernel, KernelConfig, SharedPresence};
use cinch_middleware::{ComponentHandle, ComponentRunner, EventBus, bus::DEFAULT_CAPACITY};
use cinch_settings::{Authority, AuthorityConfig};
use cinch_types::HostEvent;
use tracing::{info, warn};

use crate::bootstrap::{SUPERVISOR_CONTEXT, Supervisor, SupervisorConfig};
use crate::sim::{SimPlugin, SimPluginSpec};

/// Everything needed to bring a device up.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub bus_capacity: usize,
    /// Initial wearer identity, if already known.
    pub wearer: Option<String>,
    pub kernel: KernelConfig,
    pub authority: AuthorityConfig,
    pub resolver: ResolverConfig,
    pub supervisor: SupervisorConfig,
    pub plugins: Vec<SimPluginSpec>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            bus_capacity: DEFAULT_CAPACITY,
            wearer: None,
            kernel: KernelConfig::default(),
            authority: AuthorityConfig::default(),
            resolver: ResolverConfig::default(),
            supervisor: SupervisorConfig::default(),
            plugins: Vec::new(),
        }
    }
}

/// A running device.  Dropping it leaves the component tasks running; call
/// [`Device::shutdown`] to stop them.
pub struct Device {
    bus: EventBus,
    presence: SharedPresence,
    core: Vec<ComponentHandle>,
    plugins: BTreeMap<String, ComponentHandle>,
}

impl Device {
    /// Start a device on a fresh bus.  Must be called inside a Tokio runtime.
    pub fn start(config: DeviceConfig) -> Self {
        let bus = EventBus::new(config.bus_capacity);
        Self::start_on(bus, config)
    }

    /// Start a device on an existing bus, so that callers can subscribe
    /// before the first broadcast.
    pub fn start_on(bus: EventBus, config: DeviceConfig) -> Self {
        let presence = SharedPresence::new();
        presence.insert(SUPERVISOR_CONTEXT);

        let kernel = ComponentRunner::new(Kernel::new(config.kernel, Box::new(presence.clone())), bus.clone());
        let authority = ComponentRunner::new(Authority::new(config.authority), bus.clone());
        let resolver = ComponentRunner::new(Resolver::new(config.resolver, config.wearer.clone()), bus.clone());
        let supervisor = ComponentRunner::new(
            Supervisor::new(config.supervisor, config.wearer.clone()),
            bus.clone(),
        );
        let plugins: Vec<_> = config
            .plugins
            .into_iter()
            .map(|spec| {
                presence.insert(spec.context.clone());
                (spec.context.clone(), ComponentRunner::new(SimPlugin::new(spec), bus.clone()))
            })
            .collect();

        let core = vec![kernel.spawn(), authority.spawn(), resolver.spawn(), supervisor.spawn()];
        let plugins = plugins
            .into_iter()
            .map(|(context, runner)| (context, runner.spawn()))
            .collect::<BTreeMap<_, _>>();
        info!(plugins = plugins.len(), "device started");

        Self {
            bus,
            presence,
            core,
            plugins,
        }
    }

    /// The bus every component is wired to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The presence set the kernel prunes against.
    pub fn presence(&self) -> &SharedPresence {
        &self.presence
    }

    /// Contexts of the plugins currently running.
    pub fn plugins(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Spawn another simulated plugin.  A plugin already running under the
    /// same context is stopped first.
    pub fn spawn_plugin(&mut self, spec: SimPluginSpec) {
        let context = spec.context.clone();
        if let Some(old) = self.plugins.remove(&context) {
            old.stop();
        }
        self.presence.insert(context.clone());
        let handle = ComponentRunner::new(SimPlugin::new(spec), self.bus.clone()).spawn();
        info!(%context, "plugin spawned");
        self.plugins.insert(context, handle);
    }

    /// Stop a plugin without telling the kernel.  It disappears from
    /// presence immediately and is pruned by the kernel's next sweep once
    /// its liveness window has passed.
    pub fn stop_plugin(&mut self, context: &str) -> bool {
        match self.plugins.remove(context) {
            Some(handle) => {
                handle.stop();
                self.presence.remove(context);
                info!(%context, "plugin stopped");
                true
            }
            None => {
                warn!(%context, "no such plugin");
                false
            }
        }
    }

    /// Deliver a host event to every component.
    pub fn host_event(&self, event: HostEvent) {
        if self.bus.publish_host(event) == 0 {
            warn!("host event had no listeners");
        }
    }

    /// Stop every plugin and core component.
    pub fn shutdown(self) {
        for handle in self.core.into_iter().chain(self.plugins.into_values()) {
            handle.stop();
        }
        info!("device stopped");
    }
}
