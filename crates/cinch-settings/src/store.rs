//! [`SettingsStore`] – the canonical snapshot and its guard rules.
//!
//! Every mutation goes through one of four entry points, each of which
//! applies its role guard and then re-normalizes, so the snapshot satisfies
//! the role invariant whenever control leaves the store:
//!
//! * `owner ∉ trustees`
//! * `owner ∉ blacklist`
//! * `trustees ∩ blacklist = ∅`
//!
//! Each entry point reports whether the stored snapshot actually changed;
//! callers broadcast only on `Ok(true)`.

use cinch_types::{Message, SettingValue, Snapshot};
use thiserror::Error;

use crate::keys::{KeyKind, SettingKey};

/// Why a mutation was refused.  The snapshot is untouched in every case.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("key `{0}` is not on the allow-list")]
    UnknownKey(String),

    #[error("key `{key}` is a {expected} key")]
    WrongKind { key: String, expected: &'static str },

    #[error("the owner cannot also be a trustee")]
    OwnerAsTrustee,

    #[error("list `{key}` is full ({cap} entries)")]
    ListFull { key: String, cap: usize },

    #[error("not a settings mutation: {0}")]
    NotAMutation(&'static str),
}

/// Owns the canonical [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    snapshot: Snapshot,
    max_list_len: usize,
}

impl SettingsStore {
    /// An empty store whose lists hold at most `max_list_len` entries.
    pub fn new(max_list_len: usize) -> Self {
        Self {
            snapshot: Snapshot::new(),
            max_list_len,
        }
    }

    /// The current key/value view.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The configured owner, if any.
    pub fn owner(&self) -> Option<&str> {
        self.snapshot.scalar(SettingKey::Owner.as_str())
    }

    /// Elements of a list key, empty when unset.
    pub fn list(&self, key: SettingKey) -> &[String] {
        self.snapshot.list(key.as_str())
    }

    /// Apply a `set` / `list_add` / `list_remove` message.
    ///
    /// # Errors
    ///
    /// See [`SettingsError`].  An error always leaves the snapshot unchanged.
    pub fn apply(&mut self, message: &Message) -> Result<bool, SettingsError> {
        match message {
            Message::Set { key, values: Some(values), .. } => self.set_list(key.parse()?, values),
            Message::Set { key, value: Some(value), .. } => self.set_scalar(key.parse()?, value),
            Message::ListAdd { key, elem } => self.list_add(key.parse()?, elem),
            Message::ListRemove { key, elem } => self.list_remove(key.parse()?, elem),
            other => Err(SettingsError::NotAMutation(other.kind())),
        }
    }

    /// Write a scalar or flag key.  An empty value clears a scalar key.
    pub fn set_scalar(&mut self, key: SettingKey, value: &str) -> Result<bool, SettingsError> {
        let value = value.trim();
        let before = self.snapshot.clone();
        match key.kind() {
            KeyKind::List => return Err(wrong_kind(key)),
            KeyKind::Flag => {
                self.snapshot
                    .insert(key.as_str(), SettingValue::Scalar(normalize_flag(value).into()));
            }
            KeyKind::Scalar if value.is_empty() => {
                self.snapshot.remove(key.as_str());
            }
            KeyKind::Scalar => {
                self.snapshot
                    .insert(key.as_str(), SettingValue::Scalar(value.to_string()));
                if key == SettingKey::Owner {
                    self.strip(SettingKey::Trustees, &[value]);
                    self.strip(SettingKey::Blacklist, &[value]);
                }
            }
        }
        Ok(self.finish(before))
    }

    /// Replace a whole list.  Duplicates are collapsed and anything beyond
    /// the cap is dropped, oldest kept.
    pub fn set_list(&mut self, key: SettingKey, values: &[String]) -> Result<bool, SettingsError> {
        if key.kind() != KeyKind::List {
            return Err(wrong_kind(key));
        }
        let before = self.snapshot.clone();
        let mut items = dedupe(values);
        // The owner never counts against the trustee cap.
        if key == SettingKey::Trustees
            && let Some(owner) = self.owner()
        {
            items.retain(|t| t != owner);
        }
        items.truncate(self.max_list_len);

        match key {
            SettingKey::Trustees => {
                let refs: Vec<&str> = items.iter().map(String::as_str).collect();
                self.strip(SettingKey::Blacklist, &refs);
            }
            SettingKey::Blacklist => {
                if self.owner().is_some_and(|o| items.iter().any(|b| b == o)) {
                    self.snapshot.remove(SettingKey::Owner.as_str());
                }
                let refs: Vec<&str> = items.iter().map(String::as_str).collect();
                self.strip(SettingKey::Trustees, &refs);
            }
            _ => {}
        }
        self.write_list(key, items);
        Ok(self.finish(before))
    }

    /// Append one element, moving it out of the opposing list.
    pub fn list_add(&mut self, key: SettingKey, elem: &str) -> Result<bool, SettingsError> {
        if key.kind() != KeyKind::List {
            return Err(wrong_kind(key));
        }
        let elem = elem.trim();
        if elem.is_empty() || self.list(key).iter().any(|e| e == elem) {
            return Ok(false);
        }
        if key == SettingKey::Trustees && self.owner() == Some(elem) {
            return Err(SettingsError::OwnerAsTrustee);
        }
        if self.list(key).len() >= self.max_list_len {
            return Err(SettingsError::ListFull {
                key: key.to_string(),
                cap: self.max_list_len,
            });
        }

        let before = self.snapshot.clone();
        match key {
            SettingKey::Trustees => self.strip(SettingKey::Blacklist, &[elem]),
            SettingKey::Blacklist => {
                self.strip(SettingKey::Trustees, &[elem]);
                if self.owner() == Some(elem) {
                    self.snapshot.remove(SettingKey::Owner.as_str());
                }
            }
            _ => {}
        }
        let mut items = self.list(key).to_vec();
        items.push(elem.to_string());
        self.write_list(key, items);
        Ok(self.finish(before))
    }

    /// Remove one element. Removing an absent element is not a change.
    pub fn list_remove(&mut self, key: SettingKey, elem: &str) -> Result<bool, SettingsError> {
        if key.kind() != KeyKind::List {
            return Err(wrong_kind(key));
        }
        let before = self.snapshot.clone();
        self.strip(key, &[elem.trim()]);
        Ok(self.finish(before))
    }

    /// Re-establish the role invariant and report whether anything moved.
    fn finish(&mut self, before: Snapshot) -> bool {
        if let Some(owner) = self.owner().map(str::to_string) {
            self.strip(SettingKey::Trustees, &[owner.as_str()]);
            self.strip(SettingKey::Blacklist, &[owner.as_str()]);
        }
        let blacklist = self.list(SettingKey::Blacklist).to_vec();
        let refs: Vec<&str> = blacklist.iter().map(String::as_str).collect();
        self.strip(SettingKey::Trustees, &refs);
        self.snapshot != before
    }

    fn strip(&mut self, key: SettingKey, doomed: &[&str]) {
        let current = self.list(key);
        if !current.iter().any(|e| doomed.contains(&e.as_str())) {
            return;
        }
        let kept: Vec<String> = current
            .iter()
            .filter(|e| !doomed.contains(&e.as_str()))
            .cloned()
            .collect();
        self.write_list(key, kept);
    }

    /// Empty lists are stored as an absent key.
    fn write_list(&mut self, key: SettingKey, items: Vec<String>) {
        if items.is_empty() {
            self.snapshot.remove(key.as_str());
        } else {
            self.snapshot.insert(key.as_str(), SettingValue::List(items));
        }
    }
}

fn wrong_kind(key: SettingKey) -> SettingsError {
    SettingsError::WrongKind {
        key: key.to_string(),
        expected: key.kind().as_str(),
    }
}

fn dedupe(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim();
        if !v.is_empty() && !out.iter().any(|o| o == v) {
            out.push(v.to_string());
        }
    }
    out
}

/// Fold any boolean-ish input onto `"0"` / `"1"`.
pub fn normalize_flag(value: &str) -> &'static str {
    let v = value.trim().to_ascii_lowercase();
    let on = match v.as_str() {
        "true" | "yes" | "on" => true,
        other => other.parse::<i64>().map(|n| n != 0).unwrap_or(false),
    };
    if on { "1" } else { "0" }
}
