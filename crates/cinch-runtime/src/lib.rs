//! `cinch-runtime` – Bootstrap & Device Wiring
//!
//! Brings the control plane up in the right order and keeps it there.
//!
//! # Modules
//!
//! - [`bootstrap`] – [`Supervisor`]: the `Idle → Waiting → Complete`
//!   state machine with bounded retry, abort and a kernel-liveness watchdog.
//! - [`device`] – [`Device`]: spawns the kernel, settings authority,
//!   authorization resolver, supervisor and simulated plugins on one bus.
//! - [`sim`] – [`SimPlugin`]: a minimal feature plugin that registers and
//!   answers pings.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP export via
//!   `OTEL_EXPORTER_OTLP_ENDPOINT`.

pub mod bootstrap;
pub mod device;
pub mod sim;
pub mod telemetry;

pub use bootstrap::{Pending, Phase, SUPERVISOR_CONTEXT, SUPERVISOR_NAME, Supervisor, SupervisorConfig};
pub use device::{Device, DeviceConfig};
pub use sim::{SimPlugin, SimPluginSpec};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
