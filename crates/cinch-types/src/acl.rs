//! Authorization levels and the policy flags derived from them.

use serde::{Deserialize, Serialize};

use crate::CinchError;

/// The authorization ladder, lowest to highest.
///
/// Variants are declared in ascending rank so the derived [`Ord`] agrees
/// with the numeric wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum AclLevel {
    /// Explicitly or implicitly denied.
    Blacklist,
    /// The wearer while restricted mode is active.
    NoAccess,
    /// Anyone, when public access is enabled.
    Public,
    /// The wearer of a device that has an owner.
    Owned,
    /// A trusted principal.
    Trustee,
    /// The wearer of a device with no owner.
    Unowned,
    /// The configured owner.
    PrimaryOwner,
}

impl AclLevel {
    /// The wire value, -1 to 5.
    pub fn as_i32(self) -> i32 {
        match self {
            AclLevel::Blacklist => -1,
            AclLevel::NoAccess => 0,
            AclLevel::Public => 1,
            AclLevel::Owned => 2,
            AclLevel::Trustee => 3,
            AclLevel::Unowned => 4,
            AclLevel::PrimaryOwner => 5,
        }
    }

    /// `true` for the two deny levels.
    pub fn is_denied(self) -> bool {
        matches!(self, AclLevel::Blacklist | AclLevel::NoAccess)
    }
}

impl From<AclLevel> for i32 {
    fn from(level: AclLevel) -> Self {
        level.as_i32()
    }
}

impl TryFrom<i32> for AclLevel {
    type Error = CinchError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            -1 => AclLevel::Blacklist,
            0 => AclLevel::NoAccess,
            1 => AclLevel::Public,
            2 => AclLevel::Owned,
            3 => AclLevel::Trustee,
            4 => AclLevel::Unowned,
            5 => AclLevel::PrimaryOwner,
            other => return Err(CinchError::Malformed(format!("acl level {other} out of range"))),
        })
    }
}

/// Booleans explaining *why* a level was granted.
///
/// Computed by the resolver from the policy and the principal alongside the
/// level; never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFlags {
    /// Restricted mode is on for this device.
    pub restricted_mode: bool,
    /// Access exists only because public access is on.
    pub public_only: bool,
    /// The principal is the wearer of an owned device.
    pub owned_only: bool,
    /// Trustee-grade features are allowed.
    pub trustee_access: bool,
    /// The principal is the wearer of an unowned device.
    pub wearer_unowned: bool,
    /// The principal is the owner.
    pub primary_owner: bool,
}
