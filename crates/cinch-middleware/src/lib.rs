//! `cinch-middleware` – the broadcast bus and the component event loop.
//!
//! Routes envelopes between components without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – [`EventBus`]: typed, topic-based publish/subscribe built on
//!   Tokio broadcast channels, plus a host-event lane.
//! - [`component`] – the [`Component`] trait and [`ComponentRunner`], the
//!   cooperative single-threaded loop every component runs in.

pub mod bus;
pub mod component;

pub use bus::{EventBus, TopicReceiver};
pub use component::{Component, ComponentHandle, ComponentRunner};
pub use cinch_types::Topic;
