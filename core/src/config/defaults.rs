//! Hard-coded default table. Host `defaults.json` is merged
//! on top of this at [`crate::config::model::Config::with_host_defaults`].

use crate::value::Value;
use std::collections::BTreeMap;

pub fn hardcoded_defaults() -> BTreeMap<String, Value> {
    let mut d = BTreeMap::new();
    macro_rules! set {
        ($k:expr, $v:expr) => {
            d.insert($k.to_string(), $v.into());
        };
    }
    set!("boot", false);
    set!("priority", Value::Int(0));
    set!("basejail", false);
    set!("basejail_type", "nullfs");
    set!("vnet", false);
    set!("ip4", "new");
    set!("ip6", "new");
    set!("resolver", "/etc/resolv.conf");
    set!("devfs_ruleset", Value::Int(4));
    set!("enforce_statfs", Value::Int(2));
    set!("children_max", Value::Int(0));
    set!("allow_set_hostname", Value::Int(1));
    set!("allow_sysvipc", Value::Int(0));
    set!("allow_raw_sockets", Value::Int(0));
    set!("allow_chflags", Value::Int(0));
    set!("allow_mount", Value::Int(0));
    set!("allow_mount_devfs", Value::Int(0));
    set!("allow_mount_nullfs", Value::Int(0));
    set!("allow_mount_procfs", Value::Int(0));
    set!("allow_mount_tmpfs", Value::Int(0));
    set!("allow_mount_zfs", Value::Int(0));
    set!("allow_quotas", Value::Int(0));
    set!("allow_socket_af", Value::Int(0));
    set!("exec_clean", Value::Int(1));
    set!("exec_fib", Value::Int(1));
    set!("exec_start", "/bin/sh /etc/rc");
    set!("exec_stop", "/bin/sh /etc/rc.shutdown");
    set!("exec_jail_user", "root");
    set!("exec_timeout", Value::Int(600));
    set!("stop_timeout", Value::Int(30));
    set!("mount_devfs", Value::Int(1));
    set!("mount_fdescfs", Value::Int(0));
    set!("securelevel", Value::Int(2));
    set!("template", false);
    set!("jail_zfs", false);
    set!("mac_prefix", "02ff60");
    set!("rlimits", "none");
    set!("provisioning_method", "none");
    set!("provisioning_source", "none");
    set!("provisioning_rev", "master");
    d
}

/// Merge `host` (read from `<source>/iocage/defaults.json`) over the
/// hard-coded table.
pub fn merge_host_defaults(
    mut base: BTreeMap<String, Value>,
    host: BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    for (k, v) in host {
        base.insert(k, v);
    }
    base
}
