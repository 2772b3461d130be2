// Copyright (c) 2023 Yan Ka, Chiu.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions
// are met:
// 1. Redistributions of source code must retain the above copyright
//    notice, this list of conditions, and the following disclaimer,
//    without modification, immediately at the beginning of the file.
// 2. The name of the author may not be used to endorse or promote products
//    derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE AUTHOR AND CONTRIBUTORS ``AS IS'' AND
// ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE
// ARE DISCLAIMED. IN NO EVENT SHALL THE AUTHOR OR CONTRIBUTORS BE LIABLE FOR
// ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS
// OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION)
// HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT
// LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY
// OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF
// SUCH DAMAGE.

//! Helper utilities to work with `ipfw(8)`, used to build the interposed
//! anti-spoofing bridge for "secure mode" bridged NICs.

use std::process::Command;

pub const IPFW_CMD: &str = crate::env_or_default!("XC_IPFW_CMD", "/sbin/ipfw");

pub fn is_enabled() -> Result<bool, std::io::Error> {
    Command::new(IPFW_CMD)
        .arg("-q")
        .arg("show")
        .output()
        .map(|o| o.status.success())
}

pub fn enable_via_sysctl() -> Result<(), std::io::Error> {
    Command::new("/sbin/sysctl")
        .arg("net.inet.ip.fw.enable=1")
        .status()
        .map(|_| ())
}

/// Anti-spoofing layer-2 rule pair for a secure bridged member: only
/// frames whose source MAC matches the jail's assigned epair MAC, and
/// whose source IP (if any) matches its assigned address, may leave the
/// interposed bridge toward the real bridge.
pub fn antispoof_rules(rule_base: u32, member_if: &str, mac: &str, addrs: &[String]) -> Vec<String> {
    let mut rules = vec![format!(
        "{} allow MAC {mac} any via {member_if}",
        rule_base
    )];
    for (i, addr) in addrs.iter().enumerate() {
        rules.push(format!(
            "{} allow ip from {addr} to any via {member_if}",
            rule_base + 1 + i as u32
        ));
    }
    rules.push(format!("{} deny ip from any to any via {member_if}", rule_base + 100));
    rules
}

pub fn add_rule(rule: &str) -> Result<(), std::io::Error> {
    Command::new(IPFW_CMD)
        .arg("add")
        .args(rule.split_whitespace())
        .status()
        .map(|_| ())
}

pub fn delete_rule(number: u32) -> Result<(), std::io::Error> {
    Command::new(IPFW_CMD)
        .arg("delete")
        .arg(number.to_string())
        .status()
        .map(|_| ())
}
