//! `cinch-settings` – Configuration Authority
//!
//! The single owner of the device's key/value configuration.  Everyone else
//! holds a read-only copy taken from the last `settings_sync` broadcast.
//!
//! # Modules
//!
//! - [`keys`] – the [`SettingKey`] allow-list and each key's storage kind.
//! - [`store`] – [`SettingsStore`]: guarded mutations that keep `owner`,
//!   `trustees` and `blacklist` mutually exclusive.
//! - [`authority`] – [`Authority`]: the bus component answering
//!   `settings_get` and applying mutations.

pub mod authority;
pub mod keys;
pub mod store;

pub use authority::{AUTHORITY_NAME, Authority, AuthorityConfig};
pub use keys::{KeyKind, SettingKey};
pub use store::{SettingsError, SettingsStore, normalize_flag};
