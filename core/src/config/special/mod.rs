//! Special properties (C6): config keys whose textual value has extra
//! parse/validate/stringify structure beyond a plain [`crate::value::Value`],
//! and which may additionally contribute shell commands to the hook
//! scripts assembled by the lifecycle engine (C13).
//!
//! These are deliberately plain functions over `&str`, not a trait
//! object owned by `Config` — see `depends.rs`'s sibling modules for
//! the per-property grammars. `Config::set` dispatches to
//! [`is_special`] / [`validate`] and then stores the canonical
//! re-stringified form, so no special-property state outlives a single
//! `set` call.

pub mod defaultrouter;
pub mod depends;
pub mod interfaces;
pub mod ip_addr;
pub mod resolver;
pub mod resource_limit;

use crate::error::JailError;
use resource_limit::ResourceLimit;

/// Names handled by one of the parse/stringify modules in this file,
/// as opposed to a plain passthrough [`crate::value::Value`].
pub fn is_special(key: &str) -> bool {
    matches!(
        key,
        "ip4_addr" | "ip6_addr" | "interfaces" | "defaultrouter" | "defaultrouter6" | "resolver" | "depends"
    ) || resource_limit::KNOWN_LIMITS.contains(&key)
}

/// Validate `raw` against the property named `key`, returning the
/// canonical re-stringified form to persist. Unknown-but-non-special
/// keys are passed through unchanged by the caller; this function is
/// only invoked once `is_special` has returned true.
pub fn validate_and_canonicalize(key: &str, raw: &str) -> Result<String, JailError> {
    use ip_addr::{Ip4AddressSet, Ip6AddressSet};
    use std::str::FromStr;

    let canonical = match key {
        "ip4_addr" => Ip4AddressSet::from_str(raw)?.to_string(),
        "ip6_addr" => Ip6AddressSet::from_str(raw)?.to_string(),
        "interfaces" => interfaces::Interfaces::from_str(raw)?.to_string(),
        "defaultrouter" => defaultrouter::DefaultRouter4::from_str(raw)?.to_string(),
        "defaultrouter6" => defaultrouter::DefaultRouter6::from_str(raw)?.to_string(),
        "resolver" => resolver::Resolver::parse(raw).to_storage_string(),
        "depends" => depends::Depends::from_str(raw)
            .map(|d| d.to_string())
            .unwrap_or_else(|_| raw.to_string()),
        name if resource_limit::KNOWN_LIMITS.contains(&name) => {
            ResourceLimit::from_str(raw)?.to_storage_string()
        }
        _ => raw.to_string(),
    };
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_special_keys() {
        assert!(is_special("ip4_addr"));
        assert!(is_special("memoryuse"));
        assert!(!is_special("hostname"));
    }

    #[test]
    fn canonicalizes_resource_limit() {
        let out = validate_and_canonicalize("memoryuse", "512M:deny").unwrap();
        assert_eq!(out, "deny=512M/jail");
    }
}
