//! Release manager (C9): fetches a FreeBSD/HardenedBSD userland
//! release into `<source>/releases/<name>/root`, verifies its assets
//! against the published checksum manifest, extracts them with a
//! path-traversal-safe tar pass, and seeds the jail-facing defaults.

use crate::datasets::Datasets;
use crate::error::{CommandError, JailError, SecurityError, StorageError};
use freebsd::fs::zfs::ZfsHandle;
use freebsd::host::Distribution;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DEFAULT_ASSETS: &[&str] = &["base.txz", "lib32.txz"];
pub const MANIFEST_NAME: &str = "MANIFEST";

#[derive(Debug, Clone)]
pub struct ReleaseMirror {
    pub base_url: String,
}

impl ReleaseMirror {
    /// `realname` equals `name` on FreeBSD; on HardenedBSD it follows
    /// `HardenedBSD-<name>-<arch>-LATEST`.
    pub fn realname(&self, dist: Distribution, name: &str, arch: &str) -> String {
        match dist {
            Distribution::FreeBsd => name.to_string(),
            Distribution::HardenedBsd => format!("HardenedBSD-{name}-{arch}-LATEST"),
        }
    }

    pub fn manifest_url(&self, dist: Distribution, name: &str, arch: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.realname(dist, name, arch), MANIFEST_NAME)
    }

    pub fn asset_url(&self, dist: Distribution, name: &str, arch: &str, asset: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.realname(dist, name, arch), asset)
    }
}

/// Parse a `MANIFEST`/`CHECKSUMS.SHA256`-style line: `<name> <sha256>`.
pub fn parse_manifest(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let hash = fields.last()?;
            Some((name.to_string(), hash.to_lowercase()))
        })
        .collect()
}

pub fn sha256_hex(reader: &mut impl Read) -> Result<String, std::io::Error> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_asset(path: &Path, expected_hex: &str) -> Result<(), JailError> {
    let f = std::fs::File::open(path)?;
    let mut reader = BufReader::new(f);
    let actual = sha256_hex(&mut reader)?;
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(SecurityError::InvalidReleaseAssetSignature(path.display().to_string()).into())
    }
}

/// Reject archive entries that would escape `dest`: absolute paths,
/// `..` parent components, symlinks pointing outside `dest`, and
/// device nodes (unless `allow_device_nodes`, used only by the
/// top-level release extraction which legitimately needs them).
pub fn check_archive_entry_path(entry_path: &Path, allow_device_nodes: bool, is_device: bool) -> Result<(), JailError> {
    if entry_path.is_absolute() {
        return Err(SecurityError::IllegalArchiveContent(entry_path.display().to_string()).into());
    }
    if entry_path.components().any(|c| c == std::path::Component::ParentDir) {
        return Err(SecurityError::IllegalArchiveContent(entry_path.display().to_string()).into());
    }
    if is_device && !allow_device_nodes {
        return Err(SecurityError::IllegalArchiveContent(entry_path.display().to_string()).into());
    }
    Ok(())
}

pub fn check_symlink_target(entry_path: &Path, target: &Path, dest_root: &Path) -> Result<(), JailError> {
    let resolved = entry_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(target);
    let normalized = normalize_lexically(&resolved);
    if normalized.starts_with("..") || normalized.is_absolute() {
        return Err(SecurityError::IllegalArchiveContent(entry_path.display().to_string()).into());
    }
    let _ = dest_root;
    Ok(())
}

/// Download `url` into `dest`, overwriting it if present.
pub fn fetch_asset(url: &str, dest: &Path) -> Result<(), JailError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| CommandError::CommandFailure(format!("fetching {url}: {e}")))?;
    let bytes = response
        .bytes()
        .map_err(|e| CommandError::CommandFailure(format!("reading response body from {url}: {e}")))?;
    std::fs::write(dest, &bytes)?;
    Ok(())
}

/// List `archive`'s members (`bsdtar -tv`) and run each path, and each
/// symlink's target, through [`check_archive_entry_path`] and
/// [`check_symlink_target`] before any extraction touches disk —
/// `bsdtar` itself already declines absolute members and `..`
/// components, but release assets are untrusted input and get our own
/// device-node policy applied on top rather than relying solely on
/// the extractor's defaults.
fn validate_archive_members(archive: &Path, dest_root: &Path, allow_device_nodes: bool) -> Result<(), JailError> {
    let output = Command::new("/usr/bin/tar")
        .arg("-tvf")
        .arg(archive)
        .output()
        .map_err(|e| CommandError::CommandFailure(e.to_string()))?;
    if !output.status.success() {
        return Err(CommandError::CommandFailure(format!(
            "listing {} failed: {}",
            archive.display(),
            String::from_utf8_lossy(&output.stderr)
        ))
        .into());
    }
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        // `<mode> <links> <owner> <group> <size> <month> <day> <time-or-year> <path>[ -> <target>]`
        let is_device = line.starts_with('b') || line.starts_with('c');
        let is_symlink = line.starts_with('l');
        let path_field = match line.splitn(8, char::is_whitespace).last() {
            Some(field) if !field.is_empty() => field,
            _ => continue,
        };
        let (entry_str, target_str) = match path_field.split_once(" -> ") {
            Some((p, t)) => (p, Some(t)),
            None => (path_field, None),
        };
        let entry_path = Path::new(entry_str.trim());
        check_archive_entry_path(entry_path, allow_device_nodes, is_device)?;
        if is_symlink {
            if let Some(target) = target_str {
                check_symlink_target(entry_path, Path::new(target.trim()), dest_root)?;
            }
        }
    }
    Ok(())
}

/// Validate `archive`'s members, then extract it into `dest_root` with
/// the system `tar(1)`, which transparently handles whichever of
/// gzip/xz/zstd the release asset was compressed with.
pub fn extract_archive(archive: &Path, dest_root: &Path, allow_device_nodes: bool) -> Result<(), JailError> {
    validate_archive_members(archive, dest_root, allow_device_nodes)?;
    std::fs::create_dir_all(dest_root)?;
    let status = Command::new("/usr/bin/tar")
        .arg("-xpf")
        .arg(archive)
        .arg("-C")
        .arg(dest_root)
        .status()
        .map_err(|e| CommandError::CommandFailure(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(CommandError::CommandFailure(format!("extracting {} failed: exit status {status}", archive.display())).into())
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `rc.conf` defaults seeded into a freshly fetched release: disable
/// `sendmail`, `netif`, and network syslogd.
pub fn default_rc_conf_entries() -> &'static [(&'static str, &'static str)] {
    &[
        ("sendmail_enable", "NONE"),
        ("sendmail_submit_enable", "NO"),
        ("sendmail_outbound_enable", "NO"),
        ("sendmail_msp_queue_enable", "NO"),
        ("netif_enable", "NO"),
        ("syslogd_flags", "-ss"),
    ]
}

pub fn default_sysctl_conf_entries() -> &'static [(&'static str, &'static str)] {
    &[("net.inet.ip.fw.enable", "0")]
}

pub fn render_conf_entries(entries: &[(&str, &str)]) -> String {
    entries
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\"\n"))
        .collect()
}

pub struct ReleaseManager<'a> {
    pub zfs: &'a ZfsHandle,
    pub datasets: &'a Datasets,
    pub mirror: ReleaseMirror,
}

impl<'a> ReleaseManager<'a> {
    /// Create the release's dataset tree (`releases/<name>` and its
    /// `root` child) if absent. Downloading, hashing, and extraction
    /// are performed by the caller against the returned mountpoint —
    /// kept out of this method so callers can stream downloads with
    /// their own progress reporting.
    pub fn prepare_dataset(&self, release: &str) -> Result<PathBuf, JailError> {
        let release_ds = format!("{}/{release}", self.datasets.releases_dataset());
        let root_ds = self.datasets.release_root_dataset(release);
        if !self.zfs.exists(&release_ds) {
            self.zfs
                .create2(&release_ds, true, false)
                .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        }
        if !self.zfs.exists(&root_ds) {
            self.zfs
                .create2(&root_ds, true, false)
                .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        }
        self.zfs
            .mount_point(&root_ds)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?
            .ok_or_else(|| StorageError::DatasetNotMounted(root_ds).into())
    }

    /// Fetch `assets` (default [`DEFAULT_ASSETS`]) for `release`,
    /// verify each against the mirror's published manifest, and
    /// extract them into the release's root dataset. Downloaded
    /// archives and the manifest are staged under `scratch_dir` (the
    /// caller picks a throwaway directory, typically under the
    /// release dataset's own mountpoint) and removed once extraction
    /// succeeds.
    pub fn fetch(
        &self,
        dist: Distribution,
        release: &str,
        arch: &str,
        assets: &[&str],
        scratch_dir: &Path,
    ) -> Result<PathBuf, JailError> {
        let root = self.prepare_dataset(release)?;
        std::fs::create_dir_all(scratch_dir)?;

        let manifest_path = scratch_dir.join(MANIFEST_NAME);
        fetch_asset(&self.mirror.manifest_url(dist, release, arch), &manifest_path)?;
        let manifest_raw = std::fs::read_to_string(&manifest_path)?;
        let manifest = parse_manifest(&manifest_raw);

        for asset in assets {
            let asset_path = scratch_dir.join(asset);
            fetch_asset(&self.mirror.asset_url(dist, release, arch, asset), &asset_path)?;
            if let Some(expected) = manifest.get(*asset) {
                verify_asset(&asset_path, expected)?;
            }
            extract_archive(&asset_path, &root, false)?;
            std::fs::remove_file(&asset_path)?;
        }
        std::fs::remove_file(&manifest_path)?;
        Ok(root)
    }

    /// Snapshot the release's updates dataset for rollback before a
    /// `freebsd-update`/`hbsd-update` run (see C15).
    pub fn snapshot_for_update(&self, release: &str, tag: &str) -> Result<(), JailError> {
        let ds = self.datasets.release_root_dataset(release);
        self.zfs
            .snapshot2(&ds, tag)
            .map_err(|e| StorageError::ZfsException(e.to_string()).into())
    }

    pub fn is_fetched(&self, release: &str) -> bool {
        self.zfs.exists(&self.datasets.release_root_dataset(release))
    }
}

/// Known hard-coded EOL source; scraped at most once per process and
/// treated as purely informational — it never blocks an operation,
/// only annotates release listings.
pub const EOL_INDEX_URL: &str = "https://www.freebsd.org/security/unsupported/";

pub fn parse_eol_majors(raw: &str) -> Vec<String> {
    let mut majors = Vec::new();
    for line in raw.lines() {
        if let Some(start) = line.find("FreeBSD ") {
            let rest = &line[start + "FreeBSD ".len()..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
            if !digits.is_empty() && !majors.contains(&digits) {
                majors.push(digits);
            }
        }
    }
    majors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realname_differs_for_hardenedbsd() {
        let mirror = ReleaseMirror {
            base_url: "https://download.freebsd.org/ftp/releases/amd64".to_string(),
        };
        assert_eq!(mirror.realname(Distribution::FreeBsd, "13.2-RELEASE", "amd64"), "13.2-RELEASE");
        assert_eq!(
            mirror.realname(Distribution::HardenedBsd, "13.2-RELEASE", "amd64"),
            "HardenedBSD-13.2-RELEASE-amd64-LATEST"
        );
    }

    #[test]
    fn parses_manifest_lines() {
        let raw = "base.txz deadbeef0123\nlib32.txz cafef00dfeed\n";
        let manifest = parse_manifest(raw);
        assert_eq!(manifest.get("base.txz"), Some(&"deadbeef0123".to_string()));
    }

    #[test]
    fn rejects_absolute_and_parent_escaping_paths() {
        assert!(check_archive_entry_path(Path::new("/etc/passwd"), false, false).is_err());
        assert!(check_archive_entry_path(Path::new("../../etc/passwd"), false, false).is_err());
        assert!(check_archive_entry_path(Path::new("etc/passwd"), false, false).is_ok());
    }

    #[test]
    fn rejects_device_nodes_unless_allowed() {
        assert!(check_archive_entry_path(Path::new("dev/null"), false, true).is_err());
        assert!(check_archive_entry_path(Path::new("dev/null"), true, true).is_ok());
    }

    #[test]
    fn rejects_symlink_escaping_destination() {
        assert!(check_symlink_target(Path::new("etc/foo"), Path::new("../../../root"), Path::new("/jailroot")).is_err());
        assert!(check_symlink_target(Path::new("etc/foo"), Path::new("bar"), Path::new("/jailroot")).is_ok());
    }

    #[test]
    fn renders_rc_conf_entries() {
        let rendered = render_conf_entries(default_rc_conf_entries());
        assert!(rendered.contains("sendmail_enable=\"NONE\"\n"));
    }

    #[test]
    fn extracts_well_formed_archive_into_destination() {
        let work = tempfile::tempdir().unwrap();
        let payload_dir = work.path().join("payload");
        std::fs::create_dir_all(payload_dir.join("etc")).unwrap();
        std::fs::write(payload_dir.join("etc/hostname"), "web1\n").unwrap();

        let archive = work.path().join("base.txz");
        let status = std::process::Command::new("/usr/bin/tar")
            .arg("-cJf")
            .arg(&archive)
            .arg("-C")
            .arg(&payload_dir)
            .arg("etc")
            .status()
            .unwrap();
        assert!(status.success());

        let dest = work.path().join("dest");
        extract_archive(&archive, &dest, false).unwrap();
        assert_eq!(std::fs::read_to_string(dest.join("etc/hostname")).unwrap(), "web1\n");
    }
}
