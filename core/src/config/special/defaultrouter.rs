//! `defaultrouter` / `defaultrouter6` special properties (C6): an
//! optional gateway address, `addr[@nic]`, applied via `route add`
//! inside the jail's start hook. When `@nic` is present a
//! point-to-point route through that interface is added first. IPv6
//! link-local addresses use `%nic` scope syntax instead.

use crate::error::{JailError, ValidationError};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultRouter4 {
    None,
    Addr { addr: Ipv4Addr, via_nic: Option<String> },
}

impl FromStr for DefaultRouter4 {
    type Err = JailError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "none" {
            return Ok(DefaultRouter4::None);
        }
        let (addr_part, via_nic) = match s.split_once('@') {
            Some((a, nic)) => (a, Some(nic.to_string())),
            None => (s, None),
        };
        let addr = addr_part
            .parse()
            .map_err(|_| ValidationError::InvalidIpAddress(s.to_string()))?;
        Ok(DefaultRouter4::Addr { addr, via_nic })
    }
}

impl fmt::Display for DefaultRouter4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultRouter4::None => write!(f, "none"),
            DefaultRouter4::Addr { addr, via_nic: None } => write!(f, "{addr}"),
            DefaultRouter4::Addr {
                addr,
                via_nic: Some(nic),
            } => write!(f, "{addr}@{nic}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultRouter6 {
    None,
    /// `addr` carries its own `%nic` scope when link-local.
    Addr { addr: Ipv6Addr, scope: Option<String>, via_nic: Option<String> },
}

impl FromStr for DefaultRouter6 {
    type Err = JailError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "none" {
            return Ok(DefaultRouter6::None);
        }
        let (head, via_nic) = match s.split_once('@') {
            Some((a, nic)) => (a, Some(nic.to_string())),
            None => (s, None),
        };
        let (addr_part, scope) = match head.split_once('%') {
            Some((a, scope)) => (a, Some(scope.to_string())),
            None => (head, None),
        };
        let addr = addr_part
            .parse()
            .map_err(|_| ValidationError::InvalidIpAddress(s.to_string()))?;
        Ok(DefaultRouter6::Addr { addr, scope, via_nic })
    }
}

impl fmt::Display for DefaultRouter6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultRouter6::None => write!(f, "none"),
            DefaultRouter6::Addr { addr, scope, via_nic } => {
                write!(f, "{addr}")?;
                if let Some(scope) = scope {
                    write!(f, "%{scope}")?;
                }
                if let Some(nic) = via_nic {
                    write!(f, "@{nic}")?;
                }
                Ok(())
            }
        }
    }
}

/// Shell commands to install the route inside the jail's start hook:
/// an optional point-to-point route through `via_nic` first, then the
/// default route itself.
pub fn route_add_cmds(router: &DefaultRouter4) -> Vec<String> {
    match router {
        DefaultRouter4::None => Vec::new(),
        DefaultRouter4::Addr { addr, via_nic } => {
            let mut cmds = Vec::new();
            if let Some(nic) = via_nic {
                cmds.push(format!("/sbin/route add {addr} -iface {nic}"));
            }
            cmds.push(format!("/sbin/route add default {addr}"));
            cmds
        }
    }
}

pub fn route_add_cmds6(router: &DefaultRouter6) -> Vec<String> {
    match router {
        DefaultRouter6::None => Vec::new(),
        DefaultRouter6::Addr { addr, scope, via_nic } => {
            let scoped = match scope {
                Some(s) => format!("{addr}%{s}"),
                None => addr.to_string(),
            };
            let mut cmds = Vec::new();
            if let Some(nic) = via_nic {
                cmds.push(format!("/sbin/route add -6 {scoped} -iface {nic}"));
            }
            cmds.push(format!("/sbin/route add -6 default {scoped}"));
            cmds
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_none() {
        assert_eq!("none".parse::<DefaultRouter4>().unwrap(), DefaultRouter4::None);
    }

    #[test]
    fn builds_plain_route_command() {
        let r: DefaultRouter4 = "10.0.0.1".parse().unwrap();
        assert_eq!(route_add_cmds(&r), vec!["/sbin/route add default 10.0.0.1"]);
    }

    #[test]
    fn builds_point_to_point_route_command() {
        let r: DefaultRouter4 = "10.0.0.1@vnet0".parse().unwrap();
        assert_eq!(
            route_add_cmds(&r),
            vec![
                "/sbin/route add 10.0.0.1 -iface vnet0",
                "/sbin/route add default 10.0.0.1",
            ]
        );
        assert_eq!(r.to_string(), "10.0.0.1@vnet0");
    }

    #[test]
    fn v6_link_local_scope_roundtrips() {
        let r: DefaultRouter6 = "fe80::1%vnet0".parse().unwrap();
        assert_eq!(r.to_string(), "fe80::1%vnet0");
    }
}
