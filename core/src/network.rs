//! Network builder (C11): wires up one epair per `interfaces` entry,
//! derives deterministic MAC pairs, and produces the command-queue
//! text consumed by the generated hook scripts (C13) for the steps
//! that must run on the host before `jail -c`, inside the jail at
//! `exec.start`, and at teardown.

use crate::commandqueue::{shell_quote, CommandQueue};
use crate::config::special::defaultrouter::{route_add_cmds, route_add_cmds6, DefaultRouter4, DefaultRouter6};
use crate::config::special::interfaces::InterfaceMember;
use crate::config::special::ip_addr::{Ip4AddressSet, Ip4Member, Ip6AddressSet, Ip6Member};
use freebsd::net::ifconfig;
use freebsd::net::ipfw;
use sha2::{Digest, Sha224};

/// `sha224(jail_name || nic)`, truncated to `12 - len(prefix)` hex
/// digits and prefixed with `mac_prefix` (default `02ff60`). The
/// second NIC of the pair reuses the same address plus one.
pub fn derive_mac_pair(jail_name: &str, nic: &str, mac_prefix: &str) -> (String, String) {
    let mut hasher = Sha224::new();
    hasher.update(jail_name.as_bytes());
    hasher.update(nic.as_bytes());
    let digest = hex::encode(hasher.finalize());
    let suffix_len = 12usize.saturating_sub(mac_prefix.len());
    let suffix = &digest[..suffix_len.min(digest.len())];
    let combined = format!("{mac_prefix}{suffix}");
    let mac_a = colonize_mac(&combined);
    let mac_b_numeric = increment_mac(&combined);
    let mac_b = colonize_mac(&mac_b_numeric);
    (mac_a, mac_b)
}

fn colonize_mac(hex12: &str) -> String {
    hex12
        .as_bytes()
        .chunks(2)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join(":")
}

fn increment_mac(hex12: &str) -> String {
    let value = u64::from_str_radix(hex12, 16).unwrap_or(0);
    format!("{:012x}", value.wrapping_add(1))
}

/// Host-side setup for one `interfaces` entry: create the epair,
/// rename the host side to `<nic>:<jid-placeholder>`, set its
/// description/MTU/MAC, join it to the bridge, and bring it up. Runs
/// in `prestart.sh`, before `jail -c`. The jail side is attached via
/// the `vnet.interface` jail.conf parameter rather than a post-hoc
/// `ifconfig ... vnet <jid>` call, sidestepping the jid-not-yet-
/// assigned ordering problem.
pub fn host_setup_commands(
    member: &InterfaceMember,
    jail_name: &str,
    mac_prefix: &str,
    rule_base: u32,
    jail_addrs: &[String],
) -> (String, String, CommandQueue) {
    let (mac_a, mac_b) = derive_mac_pair(jail_name, &member.jail_if, mac_prefix);
    let host_var = format!("IOCAGE_NIC_{}", member.jail_if);
    let jail_var = format!("IOCAGE_NIC_{}_B", member.jail_if);
    let mut q = CommandQueue::new();
    q.capture(&host_var, &format!("{} | cut -d' ' -f1", ifconfig::create_epair_cmd()));
    q.push(format!("{jail_var}=${{{host_var}}}b"));
    q.push(format!("{host_var}=${{{host_var}}}a"));
    let renamed_host = format!("{}:$IOCAGE_JID", member.jail_if);
    q.push(format!("{} ${{{host_var}}} name {}", ifconfig::IFCONFIG_CMD, shell_quote(&renamed_host)));
    q.push(format!("{}={}", host_var, shell_quote(&renamed_host)));
    q.push(format!("{} ${{{host_var}}} description {}", ifconfig::IFCONFIG_CMD, shell_quote(&format!("iocage:{}", member.jail_if))));
    q.push(format!("{} ${{{host_var}}} mtu 1500", ifconfig::IFCONFIG_CMD));
    q.push(format!("{} ${{{host_var}}} ether {mac_a}", ifconfig::IFCONFIG_CMD));
    q.push(format!("{} ${{{jail_var}}} ether {mac_b}", ifconfig::IFCONFIG_CMD));
    q.push(format!("{} {} addm ${{{host_var}}}", ifconfig::IFCONFIG_CMD, member.bridge_if));
    if member.secure {
        q.push("/sbin/sysctl net.inet.ip.fw.enable=1 >/dev/null".to_string());
        q.push_commented(
            "secure mode: interposed anti-spoof layer-2 rules on top of the bridge join above",
            format!("{} ${{{host_var}}} group iocage_secure", ifconfig::IFCONFIG_CMD),
        );
        for rule in ipfw::antispoof_rules(rule_base, &format!("${{{host_var}}}"), &mac_a, jail_addrs) {
            q.push(format!("{} add {rule}", ipfw::IPFW_CMD));
        }
    }
    q.push(format!("{} ${{{host_var}}} up", ifconfig::IFCONFIG_CMD));
    (mac_a, mac_b, q)
}

/// `vnet.interface=<epair-b>;` jail.conf fragment for one NIC, moved
/// into the jail automatically by `jail(8)` at creation time.
pub fn vnet_interface_param(jail_var: &str) -> String {
    format!("vnet.interface += \"${{{jail_var}}}\";")
}

/// Commands for `start.sh`, run inside the jail via `jexec`: rename
/// the jail side to the plain nic name, assign every configured
/// address, and kick off `dhclient`/`rtsold` for dynamic members.
pub fn jail_start_commands(nic: &str, v4: &Ip4AddressSet, v6: &Ip6AddressSet) -> CommandQueue {
    let mut q = CommandQueue::new();
    q.push(format!("{} {}b name {}", ifconfig::IFCONFIG_CMD, nic, nic));
    for (member_nic, addr) in &v4.0 {
        if member_nic != nic {
            continue;
        }
        match addr {
            Ip4Member::Static(cidr) => {
                q.push(format!("{} {} inet {} alias", ifconfig::IFCONFIG_CMD, nic, cidr));
            }
            Ip4Member::Dhcp => {
                q.push(format!("/sbin/dhclient {nic}"));
            }
        }
    }
    for (member_nic, addr) in &v6.0 {
        if member_nic != nic {
            continue;
        }
        match addr {
            Ip6Member::Static(cidr) => {
                q.push(format!("{} {} inet6 {} alias", ifconfig::IFCONFIG_CMD, nic, cidr));
            }
            Ip6Member::AcceptRtAdv => {
                q.push(format!("{} {} inet6 accept_rtadv", ifconfig::IFCONFIG_CMD, nic));
                q.push("/usr/sbin/rtsold -a".to_string());
            }
        }
    }
    q
}

/// Whether any `ip6_addr` member requests router advertisements —
/// drives the `rtsold_enable` rc.conf toggle.
pub fn needs_rtsold(v6: &Ip6AddressSet) -> bool {
    v6.has_accept_rtadv()
}

/// Default-route commands for `start.sh`, appended after every NIC's
/// addresses are assigned.
pub fn default_route_commands(router4: &DefaultRouter4, router6: &DefaultRouter6) -> CommandQueue {
    let mut q = CommandQueue::new();
    for cmd in route_add_cmds(router4) {
        q.push(cmd);
    }
    for cmd in route_add_cmds6(router6) {
        q.push(cmd);
    }
    q
}

/// Teardown at `poststop.sh`: destroy the host-side epair end. The
/// jail-side end is destroyed automatically when the jail's vnet
/// stack tears down. `poststop.sh` runs as its own shell invocation, so
/// rather than relying on a `prestart.sh`-local capture variable this
/// reconstructs the deterministic host interface name
/// `<jail_if>:$IOCAGE_JID` from the persisted `.env`.
pub fn teardown_commands(jail_if: &str) -> CommandQueue {
    let mut q = CommandQueue::new();
    q.push(format!("{} {}:$IOCAGE_JID destroy 2>/dev/null || true", ifconfig::IFCONFIG_CMD, jail_if));
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_mac_pair_is_deterministic_and_sequential() {
        let (a, b) = derive_mac_pair("web1", "vnet0", "02ff60");
        let (a2, b2) = derive_mac_pair("web1", "vnet0", "02ff60");
        assert_eq!(a, a2);
        assert_eq!(b, b2);
        assert_ne!(a, b);
        assert!(a.starts_with("02:ff:60"));
    }

    #[test]
    fn differs_per_nic() {
        let (a, _) = derive_mac_pair("web1", "vnet0", "02ff60");
        let (c, _) = derive_mac_pair("web1", "vnet1", "02ff60");
        assert_ne!(a, c);
    }

    #[test]
    fn jail_start_commands_handles_dhcp() {
        let v4: Ip4AddressSet = "vnet0|dhcp".parse().unwrap();
        let v6 = Ip6AddressSet::default();
        let q = jail_start_commands("vnet0", &v4, &v6);
        assert!(q.render().contains("dhclient vnet0"));
    }

    #[test]
    fn jail_start_commands_handles_static_address() {
        let v4: Ip4AddressSet = "vnet0|10.0.0.2/24".parse().unwrap();
        let v6 = Ip6AddressSet::default();
        let q = jail_start_commands("vnet0", &v4, &v6);
        assert!(q.render().contains("inet 10.0.0.2/24 alias"));
    }

    #[test]
    fn needs_rtsold_detects_accept_rtadv() {
        let v6: Ip6AddressSet = "vnet0|accept_rtadv".parse().unwrap();
        assert!(needs_rtsold(&v6));
    }

    #[test]
    fn secure_mode_emits_antispoof_rules() {
        use crate::config::special::interfaces::InterfaceMember;
        let member = InterfaceMember {
            jail_if: "vnet0".to_string(),
            bridge_if: "bridge0".to_string(),
            secure: true,
        };
        let (_, _, q) = host_setup_commands(&member, "web1", "02ff60", 20000, &["10.0.0.2".to_string()]);
        let rendered = q.render();
        assert!(rendered.contains(ipfw::IPFW_CMD));
        assert!(rendered.contains("group iocage_secure"));
        assert!(rendered.contains("addm"));
    }

    #[test]
    fn plain_mode_skips_antispoof_rules() {
        use crate::config::special::interfaces::InterfaceMember;
        let member = InterfaceMember {
            jail_if: "vnet0".to_string(),
            bridge_if: "bridge0".to_string(),
            secure: false,
        };
        let (_, _, q) = host_setup_commands(&member, "web1", "02ff60", 20000, &[]);
        assert!(!q.render().contains(ipfw::IPFW_CMD));
    }
}
