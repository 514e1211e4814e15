//! `cinch-auth` – Authorization Resolver
//!
//! Turns "who is asking?" into an [`AclLevel`][cinch_types::AclLevel] using
//! nothing but the last settings snapshot and the current wearer.
//!
//! # Modules
//!
//! - [`policy`] – [`AuthPolicy`] (the role view of a snapshot) and the pure
//!   [`resolve`] function.
//! - [`resolver`] – [`Resolver`]: the bus component that answers
//!   `acl_query`, parking queries until the first snapshot arrives.

pub mod policy;
pub mod resolver;

pub use policy::{AuthPolicy, resolve};
pub use resolver::{RESOLVER_NAME, Resolver, ResolverConfig};
