//! `ip4_addr` / `ip6_addr` special properties (C6).
//!
//! Grammar: `nic|addr[,nic|addr]...` where `addr` is an
//! [`ipcidr::Ipv4Cidr`]/[`ipcidr::Ipv6Cidr`] or the sentinel `dhcp`
//! (IPv4) / `accept_rtadv` (IPv6).

use crate::error::{JailError, ValidationError};
use ipcidr::{Ipv4Cidr, Ipv6Cidr};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ip4Member {
    Static(Ipv4Cidr),
    Dhcp,
}

impl fmt::Display for Ip4Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ip4Member::Static(cidr) => write!(f, "{cidr}"),
            Ip4Member::Dhcp => write!(f, "dhcp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ip6Member {
    Static(Ipv6Cidr),
    AcceptRtAdv,
}

impl fmt::Display for Ip6Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ip6Member::Static(cidr) => write!(f, "{cidr}"),
            Ip6Member::AcceptRtAdv => write!(f, "accept_rtadv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ip4AddressSet(pub Vec<(String, Ip4Member)>);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ip6AddressSet(pub Vec<(String, Ip6Member)>);

impl FromStr for Ip4AddressSet {
    type Err = JailError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "none" {
            return Ok(Ip4AddressSet::default());
        }
        let mut out = Vec::new();
        for part in s.split(',') {
            let (nic, addr) = part
                .split_once('|')
                .ok_or_else(|| ValidationError::InvalidIpAddress(part.to_string()))?;
            let member = if addr == "dhcp" {
                Ip4Member::Dhcp
            } else {
                Ip4Member::Static(
                    addr.parse()
                        .map_err(|_| ValidationError::InvalidIpAddress(addr.to_string()))?,
                )
            };
            out.push((nic.to_string(), member));
        }
        Ok(Ip4AddressSet(out))
    }
}

impl fmt::Display for Ip4AddressSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|(nic, m)| format!("{nic}|{m}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{rendered}")
    }
}

impl FromStr for Ip6AddressSet {
    type Err = JailError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "none" {
            return Ok(Ip6AddressSet::default());
        }
        let mut out = Vec::new();
        for part in s.split(',') {
            let (nic, addr) = part
                .split_once('|')
                .ok_or_else(|| ValidationError::InvalidIpAddress(part.to_string()))?;
            let member = if addr == "accept_rtadv" {
                Ip6Member::AcceptRtAdv
            } else {
                Ip6Member::Static(
                    addr.parse()
                        .map_err(|_| ValidationError::InvalidIpAddress(addr.to_string()))?,
                )
            };
            out.push((nic.to_string(), member));
        }
        Ok(Ip6AddressSet(out))
    }
}

impl fmt::Display for Ip6AddressSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|(nic, m)| format!("{nic}|{m}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{rendered}")
    }
}

impl Ip4AddressSet {
    pub fn has_dhcp(&self) -> bool {
        self.0.iter().any(|(_, m)| *m == Ip4Member::Dhcp)
    }
}

impl Ip6AddressSet {
    pub fn has_accept_rtadv(&self) -> bool {
        self.0.iter().any(|(_, m)| *m == Ip6Member::AcceptRtAdv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_static_v4() {
        let s = "vnet0|10.0.0.2/24,vnet1|10.0.1.2/24";
        let parsed: Ip4AddressSet = s.parse().unwrap();
        assert_eq!(parsed.to_string(), s);
    }

    #[test]
    fn roundtrips_dhcp() {
        let s = "vnet0|dhcp";
        let parsed: Ip4AddressSet = s.parse().unwrap();
        assert!(parsed.has_dhcp());
        assert_eq!(parsed.to_string(), s);
    }

    #[test]
    fn roundtrips_accept_rtadv() {
        let s = "vnet0|accept_rtadv";
        let parsed: Ip6AddressSet = s.parse().unwrap();
        assert!(parsed.has_accept_rtadv());
        assert_eq!(parsed.to_string(), s);
    }
}
