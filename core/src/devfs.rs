//! DevFS ruleset manager (C8): composes a jail's effective devfs
//! ruleset from its configured base ruleset plus a handful of
//! conditional rules, then finds or allocates a matching numbered
//! ruleset in `/etc/devfs.rules`.

use crate::error::JailError;
use freebsd::fs::devfs;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const SYSTEM_RULES_PATH: &str = "/etc/defaults/devfs.rules";
pub const USER_RULES_PATH: &str = "/etc/devfs.rules";

/// One `[name=N]` block with its ordered, de-duplicated rule lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruleset {
    pub number: u16,
    pub name: String,
    pub rules: Vec<String>,
    /// Parsed from `/etc/defaults/devfs.rules`; system rulesets are
    /// never rewritten.
    pub system: bool,
}

impl Ruleset {
    fn body(&self) -> String {
        self.rules.join("\n")
    }
}

fn parse_rules_file(raw: &str, system: bool) -> Vec<Ruleset> {
    let mut out = Vec::new();
    let mut current: Option<Ruleset> = None;
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(header) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(done) = current.take() {
                out.push(done);
            }
            let (name, number) = header
                .rsplit_once('=')
                .map(|(n, num)| (n.to_string(), num.parse().unwrap_or(0)))
                .unwrap_or((header.to_string(), 0));
            current = Some(Ruleset {
                number,
                name,
                rules: Vec::new(),
                system,
            });
        } else if let Some(rs) = current.as_mut() {
            rs.rules.push(trimmed.to_string());
        }
    }
    if let Some(done) = current {
        out.push(done);
    }
    out
}

pub struct DevfsManager {
    user_rules_path: PathBuf,
}

impl DevfsManager {
    pub fn new() -> DevfsManager {
        DevfsManager {
            user_rules_path: PathBuf::from(USER_RULES_PATH),
        }
    }

    pub fn with_user_rules_path(path: impl Into<PathBuf>) -> DevfsManager {
        DevfsManager {
            user_rules_path: path.into(),
        }
    }

    fn system_rulesets(&self) -> Vec<Ruleset> {
        std::fs::read_to_string(SYSTEM_RULES_PATH)
            .map(|raw| parse_rules_file(&raw, true))
            .unwrap_or_default()
    }

    fn user_rulesets(&self) -> Vec<Ruleset> {
        std::fs::read_to_string(&self.user_rules_path)
            .map(|raw| parse_rules_file(&raw, false))
            .unwrap_or_default()
    }

    /// Resolve a `devfs_ruleset` config value (number or name) against
    /// the system rulesets (never rewritten) plus any already-assigned
    /// user ones.
    pub fn resolve_base(&self, devfs_ruleset: &str) -> Option<Ruleset> {
        let all: Vec<Ruleset> = self.system_rulesets().into_iter().chain(self.user_rulesets()).collect();
        if let Ok(number) = devfs_ruleset.parse::<u16>() {
            all.into_iter().find(|r| r.number == number)
        } else {
            all.into_iter().find(|r| r.name == devfs_ruleset)
        }
    }

    /// Build the composed rule set: base ruleset's rules plus any
    /// conditional extras (dhcp needs `bpf*` unhidden; zfs-in-jail
    /// needs `zfs` unhidden), de-duplicated and order-preserving.
    pub fn compose(&self, base: &Ruleset, needs_bpf: bool, needs_zfs: bool) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut rules = Vec::new();
        for rule in &base.rules {
            if seen.insert(rule.clone()) {
                rules.push(rule.clone());
            }
        }
        if needs_bpf {
            let rule = "add path 'bpf*' unhide".to_string();
            if seen.insert(rule.clone()) {
                rules.push(rule);
            }
        }
        if needs_zfs {
            let rule = "add path zfs unhide".to_string();
            if seen.insert(rule.clone()) {
                rules.push(rule);
            }
        }
        rules
    }

    /// Look up a ruleset whose body exactly matches `rules`; if none
    /// exists, allocate the next number above every known ruleset,
    /// name it `iocage_auto_<N>`, append it to `/etc/devfs.rules`, and
    /// restart the devfs service. Returns the resolved number either
    /// way. The file is rewritten only when its content actually
    /// changes.
    pub fn find_or_create(&self, rules: &[String]) -> Result<u16, JailError> {
        let user = self.user_rulesets();
        let system = self.system_rulesets();
        let joined = rules.join("\n");

        if let Some(existing) = user.iter().chain(system.iter()).find(|r| r.body() == joined) {
            return Ok(existing.number);
        }

        let next_number = system
            .iter()
            .chain(user.iter())
            .map(|r| r.number)
            .max()
            .unwrap_or(4)
            + 1;
        let name = format!("iocage_auto_{next_number}");
        let new_ruleset = Ruleset {
            number: next_number,
            name: name.clone(),
            rules: rules.to_vec(),
            system: false,
        };

        let mut rendered = std::fs::read_to_string(&self.user_rules_path).unwrap_or_default();
        let addition = format!(
            "\n[{name}={next_number}]\n{}\n",
            new_ruleset.rules.join("\n")
        );
        let candidate = format!("{rendered}{addition}");
        if candidate != rendered {
            rendered = candidate;
            std::fs::write(&self.user_rules_path, &rendered)?;
            devfs::restart_devfs_service()?;
        }
        Ok(next_number)
    }
}

impl Default for DevfsManager {
    fn default() -> DevfsManager {
        DevfsManager::new()
    }
}

pub fn mount_devfs(ruleset: u16, mountpoint: &Path) -> Result<(), JailError> {
    devfs::mount_devfs(ruleset, mountpoint).map_err(|e| crate::error::CommandError::MountFailed(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_named_ruleset() {
        let raw = "[myset=10]\nadd path zfs unhide\nadd path 'bpf*' unhide\n";
        let sets = parse_rules_file(raw, false);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].number, 10);
        assert_eq!(sets[0].name, "myset");
        assert_eq!(sets[0].rules.len(), 2);
    }

    #[test]
    fn compose_deduplicates_and_adds_conditional_rules() {
        let mgr = DevfsManager::new();
        let base = Ruleset {
            number: 4,
            name: "devfsrules_jail".to_string(),
            rules: vec!["add path 'fd/*' unhide".to_string()],
            system: true,
        };
        let composed = mgr.compose(&base, true, true);
        assert_eq!(
            composed,
            vec![
                "add path 'fd/*' unhide".to_string(),
                "add path 'bpf*' unhide".to_string(),
                "add path zfs unhide".to_string(),
            ]
        );
    }

    #[test]
    fn find_or_create_reuses_matching_ruleset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("devfs.rules");
        std::fs::write(&path, "[iocage_auto_5=5]\nadd path zfs unhide\n").unwrap();
        let mgr = DevfsManager::with_user_rules_path(&path);
        let number = mgr.find_or_create(&["add path zfs unhide".to_string()]).unwrap();
        assert_eq!(number, 5);
    }
}
