//! Jail identity and the long-lived `Jail` resource.

use crate::config::model::Config;
use crate::error::{JailError, ValidationError};
use std::path::PathBuf;

/// `[A-Za-z0-9][A-Za-z0-9._-]{0,31}` or a UUID.
pub fn validate_jail_name(name: &str) -> Result<(), JailError> {
    if uuid::Uuid::parse_str(name).is_ok() {
        return Ok(());
    }
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => true,
        _ => false,
    };
    let rest_ok = name.len() <= 32
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if ok && rest_ok && !name.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvalidJailName(name.to_string()).into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum JailLifecycleState {
    NotExisting,
    Created,
    Running,
    Destroyed,
}

/// A jail's on-disk resource, rooted at `<source>/jails/<id>`.
#[derive(Debug, Clone)]
pub struct Jail {
    pub id: String,
    pub source: String,
    pub dataset_root: PathBuf,
    pub mountpoint: PathBuf,
    pub config: Config,
}

impl Jail {
    pub fn new(id: &str, source: &str, dataset_root: PathBuf, mountpoint: PathBuf, config: Config) -> Result<Jail, JailError> {
        validate_jail_name(id)?;
        Ok(Jail {
            id: id.to_string(),
            source: source.to_string(),
            dataset_root,
            mountpoint,
            config,
        })
    }

    /// `<source>/<id>`, used when more than one source is activated.
    pub fn full_name(&self, multiple_sources: bool) -> String {
        if multiple_sources {
            format!("{}/{}", self.source, self.id)
        } else {
            self.id.clone()
        }
    }

    /// Name used for the `jail(8)` `name=` parameter and as the rctl
    /// resource prefix: `<source>-<id>`.
    pub fn jail_conf_name(&self) -> String {
        format!("{}-{}", self.source, self.id)
    }

    pub fn root_path(&self) -> PathBuf {
        self.mountpoint.join("root")
    }

    pub fn fstab_path(&self) -> PathBuf {
        self.mountpoint.join("fstab")
    }

    pub fn launch_scripts_dir(&self) -> PathBuf {
        self.mountpoint.join("launch-scripts")
    }

    pub fn is_template(&self) -> bool {
        self.config.get_bool("template").unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(validate_jail_name("web1").is_ok());
        assert!(validate_jail_name("web-1.db_2").is_ok());
    }

    #[test]
    fn accepts_uuid() {
        assert!(validate_jail_name("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn rejects_too_long_or_invalid_start() {
        assert!(validate_jail_name(&"a".repeat(40)).is_err());
        assert!(validate_jail_name("-web1").is_err());
        assert!(validate_jail_name("").is_err());
    }
}
