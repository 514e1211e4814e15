//! The flat configuration map broadcast by the settings authority.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single stored value: either a scalar string or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Scalar(String),
    List(Vec<String>),
}

/// Full key/value state, broadcast wholesale rather than diffed.
///
/// Consumers treat a snapshot as read-only; only the settings authority
/// mutates its own copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, SettingValue>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    /// Scalar value of `key`, or `None` when absent or a list.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(SettingValue::Scalar(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// List value of `key`; an absent key reads as the empty list.
    pub fn list(&self, key: &str) -> &[String] {
        match self.0.get(key) {
            Some(SettingValue::List(items)) => items.as_slice(),
            _ => &[],
        }
    }

    /// Boolean view of a scalar: anything other than `"1"` is false.
    pub fn flag(&self, key: &str) -> bool {
        self.scalar(key) == Some("1")
    }

    /// Store `value`, replacing any previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: SettingValue) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_json_shape() {
        let mut snap = Snapshot::new();
        snap.insert("owner", SettingValue::Scalar("abc".into()));
        snap.insert("trustees", SettingValue::List(vec!["t1".into(), "t2".into()]));
        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(json, r#"{"owner":"abc","trustees":["t1","t2"]}"#);
    }

    #[test]
    fn accessors_tolerate_missing_and_mistyped_keys() {
        let mut snap = Snapshot::new();
        snap.insert("public_mode", SettingValue::Scalar("1".into()));
        snap.insert("blacklist", SettingValue::List(vec!["x".into()]));

        assert!(snap.flag("public_mode"));
        assert!(!snap.flag("restricted_mode"));
        assert!(snap.list("trustees").is_empty());
        assert_eq!(snap.scalar("blacklist"), None);
        assert_eq!(snap.list("blacklist"), ["x".to_string()]);
    }
}
