//! Config store (C4): multi-format (JSON / UCL / ZFS-property) reader and
//! writer for a jail's configuration. Format is auto-detected in the
//! order JSON → UCL → ZFS properties; new jails always write JSON
//!.

use crate::error::{JailError, SecurityError};
use crate::value::Value;
use freebsd::fs::zfs::ZfsHandle;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ZFS_PROPERTY_PREFIX: &str = "org.freebsd.iocage:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Ucl,
    ZfsProperties,
}

pub struct ConfigStore {
    pub jail_dir: PathBuf,
    pub dataset: String,
}

impl ConfigStore {
    pub fn new(jail_dir: impl Into<PathBuf>, dataset: impl Into<String>) -> ConfigStore {
        ConfigStore {
            jail_dir: jail_dir.into(),
            dataset: dataset.into(),
        }
    }

    fn json_path(&self) -> PathBuf {
        self.jail_dir.join("config.json")
    }

    fn ucl_path(&self) -> PathBuf {
        self.jail_dir.join("config")
    }

    pub fn detect_format(&self, zfs: &ZfsHandle) -> ConfigFormat {
        if self.json_path().is_file() {
            ConfigFormat::Json
        } else if self.ucl_path().is_file() {
            ConfigFormat::Ucl
        } else if !zfs
            .get_props(&self.dataset)
            .map(|props| {
                props
                    .keys()
                    .any(|k| k.starts_with(ZFS_PROPERTY_PREFIX))
            })
            .unwrap_or(false)
        {
            ConfigFormat::Json
        } else {
            ConfigFormat::ZfsProperties
        }
    }

    /// Validate that `path` resolves inside `self.jail_dir`.
    fn check_contained(&self, path: &Path) -> Result<(), JailError> {
        let real_root = std::fs::canonicalize(&self.jail_dir).unwrap_or_else(|_| self.jail_dir.clone());
        let mut probe = path.to_path_buf();
        // config.json may not exist yet on first write; canonicalize the
        // parent directory instead in that case.
        if !probe.exists() {
            probe = probe
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or(probe);
        }
        let real = std::fs::canonicalize(&probe).unwrap_or(probe);
        if real.starts_with(&real_root) {
            Ok(())
        } else {
            Err(SecurityError::SecurityViolationConfigJailEscape(path.display().to_string()).into())
        }
    }

    pub fn read(&self, zfs: &ZfsHandle) -> Result<BTreeMap<String, Value>, JailError> {
        match self.detect_format(zfs) {
            ConfigFormat::Json => self.read_json(),
            ConfigFormat::Ucl => self.read_ucl(),
            ConfigFormat::ZfsProperties => self.read_zfs_properties(zfs),
        }
    }

    fn read_json(&self) -> Result<BTreeMap<String, Value>, JailError> {
        let path = self.json_path();
        self.check_contained(&path)?;
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let parsed: BTreeMap<String, serde_json::Value> = serde_json::from_str(&raw)?;
        Ok(parsed
            .into_iter()
            .map(|(k, v)| (k, json_value_to_value(v)))
            .collect())
    }

    fn read_ucl(&self) -> Result<BTreeMap<String, Value>, JailError> {
        let path = self.ucl_path();
        self.check_contained(&path)?;
        let raw = std::fs::read_to_string(&path)?;
        Ok(parse_ucl(&raw))
    }

    fn read_zfs_properties(&self, zfs: &ZfsHandle) -> Result<BTreeMap<String, Value>, JailError> {
        let props = zfs
            .get_props(&self.dataset)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?;
        let mut out = BTreeMap::new();
        for (key, value) in props {
            if let Some(stripped) = key.strip_prefix(ZFS_PROPERTY_PREFIX) {
                if let Some(v) = value {
                    out.insert(stripped.to_string(), Value::from_storage_str(&v));
                }
            }
        }
        Ok(out)
    }

    /// Whole-file atomic write: write to a temp file in the same
    /// directory, then rename over the target ("write is
    /// whole-file atomic").
    pub fn write_json(&self, data: &BTreeMap<String, Value>) -> Result<(), JailError> {
        let path = self.json_path();
        self.check_contained(&path)?;
        let as_json: BTreeMap<String, serde_json::Value> = data
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json_value(v)))
            .collect();
        let rendered = serde_json::to_string_pretty(&as_json)?;

        let tmp_path = self.jail_dir.join(".config.json.tmp");
        {
            let mut f = std::fs::File::create(&tmp_path)?;
            f.write_all(rendered.as_bytes())?;
            f.write_all(b"\n")?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

fn json_value_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::String(s) => Value::from_storage_str(&s),
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::String(n.to_string())
            }
        }
        serde_json::Value::Null => Value::None,
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(|i| i.as_str().unwrap_or_default().to_string())
                .collect(),
        ),
        serde_json::Value::Object(_) => Value::None,
    }
}

fn value_to_json_value(v: &Value) -> serde_json::Value {
    match v {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::List(items) => serde_json::Value::Array(
            items.iter().map(|i| serde_json::Value::String(i.clone())).collect(),
        ),
        Value::None => serde_json::Value::String("none".to_string()),
    }
}

/// Minimal UCL reader sufficient for iocage-style flat config: one
/// `key = "value";` or `key = value;` assignment per line, `#`
/// line-comments, blank lines ignored.
fn parse_ucl(raw: &str) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let line = line.trim_end_matches(';');
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let value = value.trim().trim_matches('"');
            out.insert(key, Value::from_storage_str(value));
        }
    }
    out
}

pub fn render_ucl(data: &BTreeMap<String, Value>) -> String {
    let mut out = String::new();
    for (key, value) in data {
        out.push_str(&format!("{key} = \"{}\";\n", value.to_storage_string()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_ucl() {
        let raw = "# comment\nboot = \"yes\";\npriority = \"10\";\n";
        let parsed = parse_ucl(raw);
        assert_eq!(parsed.get("boot"), Some(&Value::Bool(true)));
        assert_eq!(parsed.get("priority"), Some(&Value::String("10".to_string())));
    }
}
