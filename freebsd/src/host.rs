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

//! Host identification primitives (C2): userland version, distribution
//! family, processor architecture.

use std::process::Command;
use thiserror::Error;

pub const FREEBSD_VERSION_CMD: &str =
    crate::env_or_default!("XC_FREEBSD_VERSION_CMD", "/bin/freebsd-version");
pub const UNAME_CMD: &str = crate::env_or_default!("XC_UNAME_CMD", "/usr/bin/uname");

#[derive(Error, Debug)]
pub enum HostQueryError {
    #[error("failed to spawn {0}: {1}")]
    Spawn(&'static str, std::io::Error),
    #[error("could not parse USERLAND_VERSION from freebsd-version output")]
    UnparseableVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    FreeBsd,
    HardenedBsd,
}

impl Distribution {
    /// Detect whether this is a HardenedBSD userland by checking for the
    /// `hbsd-update` binary, mirroring `iocage/lib/Distribution.py`'s
    /// `_hardened` probe.
    pub fn detect() -> Distribution {
        if std::path::Path::new("/usr/sbin/hbsd-update").exists() {
            Distribution::HardenedBsd
        } else {
            Distribution::FreeBsd
        }
    }
}

/// Parsed `USERLAND_VERSION="12.1-RELEASE-p10"`-style output of
/// `freebsd-version -u`. ASCII-pinned parsing
/// (locale-independent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserlandVersion {
    pub major_minor: String,
    pub patchlevel: String,
}

impl UserlandVersion {
    pub fn major(&self) -> f32 {
        self.major_minor.parse().unwrap_or(0.0)
    }

    pub fn query() -> Result<UserlandVersion, HostQueryError> {
        let output = Command::new(FREEBSD_VERSION_CMD)
            .arg("-u")
            .output()
            .map_err(|e| HostQueryError::Spawn("freebsd-version", e))?;
        let raw = String::from_utf8_lossy(&output.stdout);
        Self::parse(raw.trim())
    }

    /// Parse `"12.1-RELEASE-p10"` into `(12.1, RELEASE-p10)`. Only ASCII
    /// digits/`.`/`-` are consulted; this never depends on locale.
    pub fn parse(raw: &str) -> Result<UserlandVersion, HostQueryError> {
        let bytes = raw.as_bytes();
        let mut i = 0;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        if i == 0 || bytes.get(i) != Some(&b'-') {
            return Err(HostQueryError::UnparseableVersion);
        }
        let major_minor = raw[..i].to_string();
        let patchlevel = raw[i + 1..].to_string();
        if patchlevel.is_empty() {
            return Err(HostQueryError::UnparseableVersion);
        }
        Ok(UserlandVersion {
            major_minor,
            patchlevel,
        })
    }
}

pub fn processor() -> Result<String, HostQueryError> {
    let output = Command::new(UNAME_CMD)
        .arg("-p")
        .output()
        .map_err(|e| HostQueryError::Spawn("uname", e))?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_userland_version() {
        let v = UserlandVersion::parse("12.1-RELEASE-p10").unwrap();
        assert_eq!(v.major_minor, "12.1");
        assert_eq!(v.patchlevel, "RELEASE-p10");
        assert_eq!(v.major(), 12.1);
    }

    #[test]
    fn rejects_garbage() {
        assert!(UserlandVersion::parse("not a version").is_err());
    }
}
