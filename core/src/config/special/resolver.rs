//! `resolver` special property (C6), three modes:
//!
//!  * `skip` — value is `/dev/null` or `-`; do not touch the jail's
//!    `resolv.conf` at all.
//!  * `copy` — value is `/etc/resolv.conf`; bind the host's file in.
//!  * `manual` — one or more nameserver addresses, `;`- or
//!    list-separated.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolver {
    Skip,
    CopyHost,
    Manual(Vec<String>),
}

impl Resolver {
    pub fn parse(raw: &str) -> Resolver {
        match raw {
            "/dev/null" | "-" => Resolver::Skip,
            "" | "/etc/resolv.conf" => Resolver::CopyHost,
            other => Resolver::Manual(
                other
                    .split(|c| c == ';' || c == ',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        }
    }

    pub fn to_storage_string(&self) -> String {
        match self {
            Resolver::Skip => "/dev/null".to_string(),
            Resolver::CopyHost => "/etc/resolv.conf".to_string(),
            Resolver::Manual(servers) => servers.join(";"),
        }
    }

    /// Content to write into the jail's `resolv.conf`, or `None` when
    /// no write should happen (`Skip`) or the host file should be
    /// bind-copied instead (`CopyHost`).
    pub fn file_contents(&self) -> Option<String> {
        match self {
            Resolver::Skip | Resolver::CopyHost => None,
            Resolver::Manual(servers) => Some(
                servers
                    .iter()
                    .map(|s| format!("nameserver {s}\n"))
                    .collect::<String>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_host_sentinel() {
        assert_eq!(Resolver::parse("/etc/resolv.conf"), Resolver::CopyHost);
        assert_eq!(Resolver::parse(""), Resolver::CopyHost);
    }

    #[test]
    fn skip_sentinel() {
        assert_eq!(Resolver::parse("/dev/null"), Resolver::Skip);
        assert_eq!(Resolver::parse("-"), Resolver::Skip);
        assert!(Resolver::parse("-").file_contents().is_none());
    }

    #[test]
    fn manual_roundtrips() {
        let r = Resolver::parse("1.1.1.1;8.8.8.8");
        assert_eq!(
            r.file_contents().unwrap(),
            "nameserver 1.1.1.1\nnameserver 8.8.8.8\n"
        );
        assert_eq!(r.to_storage_string(), "1.1.1.1;8.8.8.8");
    }
}
