//! [`AuthPolicy`] and the pure [`resolve`] function.
//!
//! # Precedence
//!
//! Evaluated top-down, first match wins:
//!
//! | # | Condition | Level |
//! |---|---|---|
//! | 1 | principal is the owner | `PrimaryOwner` |
//! | 2 | principal is the wearer, restricted mode on | `NoAccess` |
//! | 2 | principal is the wearer, owner configured | `Owned` |
//! | 2 | principal is the wearer, no owner | `Unowned` |
//! | 3 | principal is a trustee | `Trustee` |
//! | 4 | principal is blacklisted | `Blacklist` |
//! | 5 | public mode on | `Public` |
//! | 6 | anyone else | `Blacklist` |
//!
//! Row 6 denies with `Blacklist`, not `NoAccess`.
//!
//! # Example
//!
//! ```
//! use cinch_auth::{AuthPolicy, resolve};
//! use cinch_types::AclLevel;
//!
//! let mut policy = AuthPolicy::default();
//! let (level, _) = resolve(&policy, Some("wearer"), "wearer");
//! assert_eq!(level, AclLevel::Unowned);
//!
//! policy.owner = Some("alice".into());
//! let (level, flags) = resolve(&policy, Some("wearer"), "wearer");
//! assert_eq!(level, AclLevel::Owned);
//! assert!(flags.owned_only);
//! ```

use std::collections::BTreeSet;

use cinch_settings::SettingKey;
use cinch_types::{AclLevel, PolicyFlags, Snapshot};

/// The subset of the settings snapshot that authorization reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthPolicy {
    pub owner: Option<String>,
    pub trustees: BTreeSet<String>,
    pub blacklist: BTreeSet<String>,
    pub public: bool,
    pub restricted: bool,
}

impl AuthPolicy {
    /// Read the authorization keys out of a settings snapshot. A blank owner counts as none.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            owner: snapshot
                .scalar(SettingKey::Owner.as_str())
                .filter(|o| !o.is_empty())
                .map(str::to_string),
            trustees: snapshot.list(SettingKey::Trustees.as_str()).iter().cloned().collect(),
            blacklist: snapshot.list(SettingKey::Blacklist.as_str()).iter().cloned().collect(),
            public: snapshot.flag(SettingKey::PublicMode.as_str()),
            restricted: snapshot.flag(SettingKey::RestrictedMode.as_str()),
        }
    }
}

/// Compute the level of `principal` and the flags explaining it.
///
/// Pure: identical inputs always produce identical output. The wearer flags
/// describe the device even when a higher rule decided the level, so an
/// owner who is also the wearer still sees `restricted_mode` and
/// `owned_only`.
pub fn resolve(policy: &AuthPolicy, wearer: Option<&str>, principal: &str) -> (AclLevel, PolicyFlags) {
    let level = resolve_level(policy, wearer, principal);
    let is_wearer = wearer == Some(principal);
    let flags = PolicyFlags {
        restricted_mode: policy.restricted,
        public_only: level == AclLevel::Public,
        owned_only: is_wearer && policy.owner.is_some(),
        trustee_access: level >= AclLevel::Trustee,
        wearer_unowned: is_wearer && policy.owner.is_none(),
        primary_owner: level == AclLevel::PrimaryOwner,
    };
    (level, flags)
}

fn resolve_level(policy: &AuthPolicy, wearer: Option<&str>, principal: &str) -> AclLevel {
    if policy.owner.as_deref() == Some(principal) {
        return AclLevel::PrimaryOwner;
    }
    if wearer == Some(principal) {
        return if policy.restricted {
            AclLevel::NoAccess
        } else if policy.owner.is_some() {
            AclLevel::Owned
        } else {
            AclLevel::Unowned
        };
    }
    if policy.trustees.contains(principal) {
        return AclLevel::Trustee;
    }
    if policy.blacklist.contains(principal) {
        return AclLevel::Blacklist;
    }
    if policy.public {
        return AclLevel::Public;
    }
    AclLevel::Blacklist
}
