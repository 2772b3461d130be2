//! Config model (C5): resolves a single property through the
//! precedence chain user value → special-property default → host
//! default → hard-coded default, and owns validation/canonicalization
//! on write.
//!
//! Special properties (C6) are not stored as separate typed fields;
//! `Config` holds one flat `BTreeMap<String, Value>` and defers to
//! [`crate::config::special`] to canonicalize a raw string before it's
//! inserted. This sidesteps the cyclic `Jail ↔ Config ↔ SpecialProperty`
//! ownership a naive port would reach for: nothing here holds a
//! back-reference to the owning `Jail`, so there's no notification
//! callback to wire up.

use crate::config::special;
use crate::error::{JailError, ValidationError};
use crate::value::Value;
use std::collections::BTreeMap;

/// A NIC name followed by `_mac`, e.g. `vnet0_mac`.
fn is_nic_mac_key(key: &str) -> bool {
    key.ends_with("_mac") && key.len() > 4
}

/// Arbitrary user namespace, stored and returned verbatim, never
/// validated — a user namespace escape hatch.
fn is_user_namespace_key(key: &str) -> bool {
    key.starts_with("user.")
}

fn validate_mac(raw: &str) -> Result<String, JailError> {
    let octets: Vec<&str> = raw.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(raw.to_lowercase())
    } else {
        Err(ValidationError::InvalidMacAddress(raw.to_string()).into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    Applied,
    SkippedWithWarning(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Values explicitly set on this jail, keyed by raw property name.
    data: BTreeMap<String, Value>,
    /// hard-coded defaults merged with host's `defaults.json`, consulted
    /// only when `data` has no entry for a key.
    defaults: BTreeMap<String, Value>,
}

impl Config {
    pub fn new(data: BTreeMap<String, Value>, defaults: BTreeMap<String, Value>) -> Config {
        Config { data, defaults }
    }

    pub fn empty_with_defaults(defaults: BTreeMap<String, Value>) -> Config {
        Config {
            data: BTreeMap::new(),
            defaults,
        }
    }

    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// Look up `key` through the precedence chain: explicit value,
    /// then the merged default table. `exec_created`/`exec_started`
    /// (legacy iocage key names) are tolerated as aliases for
    /// `exec_start` when `exec_start` itself is unset.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if key == "exec_start" {
            if let Some(v) = self.data.get("exec_start") {
                return Some(v);
            }
            for alias in ["exec_created", "exec_started"] {
                if let Some(v) = self.data.get(alias) {
                    return Some(v);
                }
            }
        }
        self.data.get(key).or_else(|| self.defaults.get(key))
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_storage_string())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(Value::Int(i)) => Some(*i),
            Some(Value::Bool(b)) => Some(if *b { 1 } else { 0 }),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Set `key` to the raw textual `raw`, routing through special
    /// property validation/canonicalization when applicable.
    /// `skip_on_error` degrades an otherwise-fatal validation error into
    /// a dropped write plus a warning outcome, matching the CLI's
    /// bulk-import behavior.
    pub fn set(&mut self, key: &str, raw: &str, skip_on_error: bool) -> Result<SetOutcome, JailError> {
        let result = self.validate_and_canonicalize(key, raw);
        match result {
            Ok(canonical) => {
                self.data.insert(key.to_string(), Value::from_storage_str(&canonical));
                Ok(SetOutcome::Applied)
            }
            Err(e) if skip_on_error => Ok(SetOutcome::SkippedWithWarning(e.to_string())),
            Err(e) => Err(e),
        }
    }

    fn validate_and_canonicalize(&self, key: &str, raw: &str) -> Result<String, JailError> {
        if is_user_namespace_key(key) {
            return Ok(raw.to_string());
        }
        if is_nic_mac_key(key) {
            return validate_mac(raw);
        }
        if special::is_special(key) {
            return special::validate_and_canonicalize(key, raw);
        }
        if self.defaults.contains_key(key) || self.data.contains_key(key) {
            return Ok(raw.to_string());
        }
        if matches!(key, "exec_created" | "exec_started") {
            return Ok(raw.to_string());
        }
        Err(ValidationError::UnknownJailConfigProperty(key.to_string()).into())
    }

    /// Every key currently set on this jail, including dotted
    /// `user.*` namespaced keys, in sorted order. Values pulled only
    /// from defaults are not included — this enumerates what was
    /// explicitly written, not the resolved view.
    pub fn iter_set(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn resource_limits(&self) -> Vec<(&str, special::resource_limit::ResourceLimit)> {
        self.data
            .iter()
            .filter_map(|(k, v)| {
                if special::resource_limit::KNOWN_LIMITS.contains(&k.as_str()) {
                    v.as_str()
                        .and_then(|s| s.parse().ok())
                        .map(|rl| (k.as_str(), rl))
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::hardcoded_defaults;

    #[test]
    fn falls_through_to_defaults() {
        let cfg = Config::empty_with_defaults(hardcoded_defaults());
        assert_eq!(cfg.get_bool("vnet"), Some(false));
        assert_eq!(cfg.get_str("basejail_type"), Some("nullfs".to_string()));
    }

    #[test]
    fn set_overrides_default() {
        let mut cfg = Config::empty_with_defaults(hardcoded_defaults());
        cfg.set("vnet", "yes", false).unwrap();
        assert_eq!(cfg.get_bool("vnet"), Some(true));
    }

    #[test]
    fn unknown_key_rejected_unless_skip_on_error() {
        let mut cfg = Config::empty_with_defaults(hardcoded_defaults());
        assert!(cfg.set("bogus_key", "1", false).is_err());
        let outcome = cfg.set("bogus_key", "1", true).unwrap();
        assert!(matches!(outcome, SetOutcome::SkippedWithWarning(_)));
    }

    #[test]
    fn user_namespace_always_accepted() {
        let mut cfg = Config::empty_with_defaults(hardcoded_defaults());
        cfg.set("user.note", "hello world", false).unwrap();
        assert_eq!(cfg.get_str("user.note"), Some("hello world".to_string()));
    }

    #[test]
    fn nic_mac_validated() {
        let mut cfg = Config::empty_with_defaults(hardcoded_defaults());
        assert!(cfg.set("vnet0_mac", "not-a-mac", false).is_err());
        cfg.set("vnet0_mac", "02:FF:60:01:02:03", false).unwrap();
        assert_eq!(cfg.get_str("vnet0_mac"), Some("02:ff:60:01:02:03".to_string()));
    }

    #[test]
    fn exec_start_falls_back_to_legacy_aliases() {
        let mut cfg = Config::empty_with_defaults(hardcoded_defaults());
        cfg.set("exec_created", "/bin/sh /etc/rc.custom", false).unwrap();
        assert_eq!(cfg.get_str("exec_start"), Some("/bin/sh /etc/rc.custom".to_string()));
    }

    #[test]
    fn resource_limit_set_through_model_always_canonicalizes() {
        let mut cfg = Config::empty_with_defaults(hardcoded_defaults());
        cfg.set("memoryuse", "512M:deny", false).unwrap();
        assert_eq!(cfg.get_str("memoryuse"), Some("deny=512M/jail".to_string()));
    }

    #[test]
    fn integer_flag_set_to_one_is_not_swallowed_by_bool_coercion() {
        let mut cfg = Config::empty_with_defaults(hardcoded_defaults());
        cfg.set("children_max", "1", false).unwrap();
        assert_eq!(cfg.get_int("children_max"), Some(1));
        cfg.set("allow_sysvipc", "0", false).unwrap();
        assert_eq!(cfg.get_int("allow_sysvipc"), Some(0));
    }
}
