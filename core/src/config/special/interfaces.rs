//! `interfaces` special property (C6): the `jail_if:bridge_if[,...]`
//! list consumed by the network builder when constructing epair pairs.
//!
//! A leading `:` on the bridge name (`jail_if::bridge_if`) toggles
//! *secure mode*: the network builder interposes an anti-spoofing
//! bridge built from `ipfw` layer-2 rules instead of joining
//! `bridge_if` directly.

use crate::error::{JailError, ValidationError};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMember {
    pub jail_if: String,
    pub bridge_if: String,
    pub secure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interfaces(pub Vec<InterfaceMember>);

impl FromStr for Interfaces {
    type Err = JailError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "none" {
            return Ok(Interfaces::default());
        }
        let mut out = Vec::new();
        for part in s.split(',') {
            let (jail_if, rest) = part
                .split_once(':')
                .ok_or_else(|| ValidationError::InvalidJailConfigValue("interfaces".into(), part.to_string()))?;
            let (secure, bridge_if) = match rest.strip_prefix(':') {
                Some(stripped) => (true, stripped),
                None => (false, rest),
            };
            out.push(InterfaceMember {
                jail_if: jail_if.to_string(),
                bridge_if: bridge_if.to_string(),
                secure,
            });
        }
        Ok(Interfaces(out))
    }
}

impl fmt::Display for Interfaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|m| {
                if m.secure {
                    format!("{}::{}", m.jail_if, m.bridge_if)
                } else {
                    format!("{}:{}", m.jail_if, m.bridge_if)
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{rendered}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let s = "vnet0:bridge0,vnet1:bridge1";
        let parsed: Interfaces = s.parse().unwrap();
        assert_eq!(parsed.0.len(), 2);
        assert_eq!(parsed.to_string(), s);
    }

    #[test]
    fn secure_mode_leading_colon() {
        let s = "vnet0::bridge0";
        let parsed: Interfaces = s.parse().unwrap();
        assert!(parsed.0[0].secure);
        assert_eq!(parsed.0[0].bridge_if, "bridge0");
        assert_eq!(parsed.to_string(), s);
    }

    #[test]
    fn empty_is_none() {
        let parsed: Interfaces = "none".parse().unwrap();
        assert!(parsed.0.is_empty());
    }
}
