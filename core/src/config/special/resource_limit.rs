//! Resource limit special properties (C6), e.g. `memoryuse`, `pcpu`,
//! `vmemoryuse`, `openfiles`. Two accepted input grammars:
//!
//!  * current rctl form: `action=amount/per` (e.g. `deny=512M/jail`)
//!  * legacy form: `amount:action` with `per` implicitly `jail`
//!
//! Regardless of which grammar was read, [`ResourceLimit::to_storage_string`]
//! always re-renders the current rctl form, even when `per == "jail"` —
//! this is a deliberate divergence from tools that keep the legacy
//! shorthand once `per` is the default.

use crate::error::{JailError, ValidationError};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimit {
    pub action: String,
    pub amount: String,
    pub per: String,
}

impl ResourceLimit {
    pub fn rctl_rule(&self, subject: &str, limit_name: &str) -> String {
        format!(
            "jail:{subject}:{limit_name}:{action}={amount}/{per}",
            action = self.action,
            amount = self.amount,
            per = self.per,
        )
    }
}

impl FromStr for ResourceLimit {
    type Err = JailError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((action, rest)) = s.split_once('=') {
            let (amount, per) = rest
                .split_once('/')
                .map(|(a, p)| (a.to_string(), p.to_string()))
                .unwrap_or((rest.to_string(), "jail".to_string()));
            return Ok(ResourceLimit {
                action: action.to_string(),
                amount,
                per,
            });
        }
        if let Some((amount, action)) = s.split_once(':') {
            return Ok(ResourceLimit {
                action: action.to_string(),
                amount: amount.to_string(),
                per: "jail".to_string(),
            });
        }
        Err(ValidationError::ResourceLimitSyntax(s.to_string()).into())
    }
}

impl fmt::Display for ResourceLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}/{}", self.action, self.amount, self.per)
    }
}

impl ResourceLimit {
    pub fn to_storage_string(&self) -> String {
        self.to_string()
    }
}

pub const KNOWN_LIMITS: &[&str] = &[
    "cputime",
    "datasize",
    "stacksize",
    "coredumpsize",
    "memoryuse",
    "memorylocked",
    "maxproc",
    "openfiles",
    "vmemoryuse",
    "pseudoterminals",
    "swapuse",
    "nthr",
    "msgqqueued",
    "msgqsize",
    "nmsgq",
    "nsem",
    "nsemop",
    "nshm",
    "shmsize",
    "wallclock",
    "pcpu",
    "readbps",
    "writebps",
    "readiops",
    "writeiops",
];

pub fn validate_limit_name(name: &str) -> Result<(), JailError> {
    if KNOWN_LIMITS.contains(&name) {
        Ok(())
    } else {
        Err(ValidationError::ResourceLimitUnknown(name.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_form() {
        let r: ResourceLimit = "deny=512M/jail".parse().unwrap();
        assert_eq!(r.action, "deny");
        assert_eq!(r.amount, "512M");
        assert_eq!(r.per, "jail");
    }

    #[test]
    fn parses_legacy_form_and_always_rerenders_current() {
        let r: ResourceLimit = "512M:deny".parse().unwrap();
        assert_eq!(r.per, "jail");
        assert_eq!(r.to_storage_string(), "deny=512M/jail");
    }

    #[test]
    fn rejects_garbage() {
        assert!("garbage".parse::<ResourceLimit>().is_err());
    }

    #[test]
    fn builds_rctl_rule() {
        let r: ResourceLimit = "deny=512M/jail".parse().unwrap();
        assert_eq!(
            r.rctl_rule("myjail", "memoryuse"),
            "jail:myjail:memoryuse:deny=512M/jail"
        );
    }
}
