//! `cinch-kernel` – Registry & Heartbeat
//!
//! Tracks which components exist.  It does not know what they do; it only
//! hands out instance serials, keeps the list current and forgets components
//! that have gone both silent and absent.
//!
//! # Modules
//!
//! - [`registry`] – [`Registry`] and the last-writer-wins [`IntentQueue`]
//!   that serialises registrations and removals.
//! - [`presence`] – the [`Presence`] trait (the host's live-component
//!   enumeration) and the shared [`SharedPresence`] set.
//! - [`kernel`] – [`Kernel`]: the bus component that drains intents one per
//!   tick, pings, sweeps and handles soft resets.

pub mod kernel;
pub mod presence;
pub mod registry;

pub use kernel::{KERNEL_NAME, Kernel, KernelConfig};
pub use presence::{Presence, SharedPresence};
pub use registry::{Applied, Intent, IntentQueue, Registration, Registry, RegistryEntry};
