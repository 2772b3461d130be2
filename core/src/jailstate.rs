//! Jail state (C12): queries `jls(8)` for the live view of running
//! jails, mirroring the `--libxo=json` decoding pattern used for
//! `ps(8)` in the `freebsd` adapter crate.

use crate::error::{CommandError, JailError};
use serde::Deserialize;
use std::process::Command;

pub const JLS_CMD: &str = "/usr/sbin/jls";

#[derive(Deserialize, Debug, Clone)]
pub struct JlsEntry {
    pub jid: i32,
    pub name: String,
    #[serde(default)]
    pub host_hostname: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub ip4_addr: String,
    #[serde(default)]
    pub ip6_addr: String,
    #[serde(default)]
    pub dying: bool,
}

#[derive(Deserialize)]
struct JailInformation {
    jail: Vec<JlsEntry>,
}

#[derive(Deserialize)]
struct JlsOutput {
    #[serde(rename = "jail-information")]
    jail_information: JailInformation,
}

/// Query the live jid/state for every running jail, or for `jail_conf_name`
/// specifically when given.
pub fn query(jail_conf_name: Option<&str>) -> Result<Vec<JlsEntry>, JailError> {
    let mut cmd = Command::new(JLS_CMD);
    cmd.arg("-v").arg("-h").arg("--libxo=json");
    if let Some(name) = jail_conf_name {
        cmd.arg("-j").arg(name);
    }
    let output = cmd
        .output()
        .map_err(|e| CommandError::CommandFailure(format!("{JLS_CMD}: {e}")))?;
    if !output.status.success() {
        // jls exits non-zero when the named jail isn't running; treat
        // that as "not running" rather than a hard failure.
        if jail_conf_name.is_some() {
            return Ok(Vec::new());
        }
        return Err(CommandError::CommandFailure(format!(
            "{JLS_CMD} exited with {}",
            output.status
        ))
        .into());
    }
    let parsed: JlsOutput = serde_json::from_slice(&output.stdout)?;
    Ok(parsed.jail_information.jail)
}

pub fn is_running(jail_conf_name: &str) -> Result<bool, JailError> {
    Ok(!query(Some(jail_conf_name))?.is_empty())
}

pub fn jid_of(jail_conf_name: &str) -> Result<Option<i32>, JailError> {
    Ok(query(Some(jail_conf_name))?.into_iter().next().map(|e| e.jid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_libxo_json_shape() {
        let raw = br#"{"jail-information":{"jail":[{"jid":3,"name":"iocage-web1","host_hostname":"web1.jail","path":"/iocage/jails/web1/root","ip4_addr":"10.0.0.2","ip6_addr":"","dying":false}]}}"#;
        let parsed: JlsOutput = serde_json::from_slice(raw).unwrap();
        assert_eq!(parsed.jail_information.jail.len(), 1);
        assert_eq!(parsed.jail_information.jail[0].jid, 3);
    }
}
