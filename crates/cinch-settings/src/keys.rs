//! The allow-list of configuration keys.
//!
//! Anything not named here is rejected before it can touch the snapshot.

use std::str::FromStr;

use crate::store::SettingsError;

/// Storage shape of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Free-form string.
    Scalar,
    /// Boolean stored as `"0"` / `"1"`.
    Flag,
    /// Ordered set of strings.
    List,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Scalar => "scalar",
            KeyKind::Flag => "flag",
            KeyKind::List => "list",
        }
    }
}

/// Every key the authority accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Owner,
    Trustees,
    Blacklist,
    PublicMode,
    RestrictedMode,
    Locked,
    ChatPrefix,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::Owner,
        SettingKey::Trustees,
        SettingKey::Blacklist,
        SettingKey::PublicMode,
        SettingKey::RestrictedMode,
        SettingKey::Locked,
        SettingKey::ChatPrefix,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::Owner => "owner",
            SettingKey::Trustees => "trustees",
            SettingKey::Blacklist => "blacklist",
            SettingKey::PublicMode => "public_mode",
            SettingKey::RestrictedMode => "restricted_mode",
            SettingKey::Locked => "locked",
            SettingKey::ChatPrefix => "chat_prefix",
        }
    }

    /// How values for this key are stored.
    pub fn kind(self) -> KeyKind {
        match self {
            SettingKey::Owner | SettingKey::ChatPrefix => KeyKind::Scalar,
            SettingKey::Trustees | SettingKey::Blacklist => KeyKind::List,
            SettingKey::PublicMode | SettingKey::RestrictedMode | SettingKey::Locked => KeyKind::Flag,
        }
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_parses_back() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().unwrap(), key);
        }
    }

    #[test]
    fn unlisted_key_is_rejected() {
        assert!(matches!(
            "favourite_colour".parse::<SettingKey>(),
            Err(SettingsError::UnknownKey(_))
        ));
        // Matching is exact.
        assert!("Owner".parse::<SettingKey>().is_err());
    }

    #[test]
    fn role_keys_have_expected_kinds() {
        assert_eq!(SettingKey::Owner.kind(), KeyKind::Scalar);
        assert_eq!(SettingKey::Trustees.kind(), KeyKind::List);
        assert_eq!(SettingKey::RestrictedMode.kind(), KeyKind::Flag);
    }
}
