//! Release/resource updater (C15): runs `freebsd-update`/`hbsd-update`
//! against a release root from the host, rolling back to a pre-update
//! snapshot on unexpected failure.

use crate::datasets::Datasets;
use crate::error::{CommandError, JailError, StorageError};
use freebsd::fs::zfs::ZfsHandle;
use freebsd::host::Distribution;
use std::path::PathBuf;
use std::process::Command;

/// Strings tolerated as a successful no-op outcome from the updater,
/// matching the original tool's string-sniffing of updater stdout.
pub const TOLERATED_SUCCESS_MESSAGES: &[&str] = &[
    "No updates are available to install.",
    "EOL",
];

pub fn is_tolerated_output(stdout: &str) -> bool {
    TOLERATED_SUCCESS_MESSAGES.iter().any(|m| stdout.contains(m))
}

pub struct UpdaterUrls;

impl UpdaterUrls {
    /// FreeBSD pulls the updater from the release's svn branch;
    /// HardenedBSD pulls from its own github raw mirror.
    pub fn script_url(dist: Distribution, release: &str) -> String {
        match dist {
            Distribution::FreeBsd => format!(
                "https://svn.freebsd.org/base/release/{release}/usr.sbin/freebsd-update/freebsd-update.sh"
            ),
            Distribution::HardenedBsd => {
                "https://raw.githubusercontent.com/HardenedBSD/hardenedBSD-update/master/hbsd-update".to_string()
            }
        }
    }

    pub fn conf_url(dist: Distribution, release: &str) -> String {
        match dist {
            Distribution::FreeBsd => {
                format!("https://svn.freebsd.org/base/release/{release}/etc/freebsd-update.conf")
            }
            Distribution::HardenedBsd => {
                "https://raw.githubusercontent.com/HardenedBSD/hardenedBSD-update/master/hbsd-update.conf".to_string()
            }
        }
    }
}

/// Rewrite a FreeBSD `freebsd-update.conf`'s `Components ...` line to
/// `Components world`, matching the original tool's conf patch so the
/// updater doesn't try to pull kernel sources into a jail.
pub fn rewrite_components_line(conf: &str) -> String {
    conf.lines()
        .map(|line| {
            if line.trim_start().starts_with("Components") {
                "Components world".to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

pub struct ReleaseUpdater<'a> {
    pub zfs: &'a ZfsHandle,
    pub datasets: &'a Datasets,
}

impl<'a> ReleaseUpdater<'a> {
    pub fn ensure_updates_dataset(&self, release: &str) -> Result<PathBuf, JailError> {
        let ds = self.datasets.release_updates_dataset(release);
        if !self.zfs.exists(&ds) {
            self.zfs
                .create2(&ds, true, false)
                .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        }
        self.zfs
            .mount_point(&ds)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?
            .ok_or_else(|| StorageError::DatasetNotMounted(ds).into())
    }

    pub fn snapshot_before_update(&self, release: &str, tag: &str) -> Result<(), JailError> {
        let ds = self.datasets.release_root_dataset(release);
        self.zfs
            .snapshot2(&ds, tag)
            .map_err(|e| StorageError::ZfsException(e.to_string()).into())
    }

    /// Roll back to `tag` after an update failure that isn't a
    /// tolerated no-op: destroy the working root and clone the
    /// snapshot back in its place, then drop the snapshot.
    ///
    /// The working root can't just be destroyed while `ds@tag` still
    /// hangs off it (`zfs destroy` refuses a dataset with snapshots,
    /// and destroying it recursively would take the snapshot with
    /// it), so this renames it out of the way first, clones the
    /// snapshot — now carried along under the renamed name — back
    /// into `ds`, promotes the clone so it no longer depends on the
    /// renamed original, then destroys the renamed original and its
    /// snapshot together.
    pub fn rollback_to_snapshot(&self, release: &str, tag: &str) -> Result<(), JailError> {
        let ds = self.datasets.release_root_dataset(release);
        let stale = format!("{ds}-rollback-{tag}");
        self.zfs
            .rename(&ds, &stale)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        self.zfs
            .clone2(&stale, tag, &ds)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        self.zfs
            .promote(&ds)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        self.zfs
            .destroy(&stale, true, false, true)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        Ok(())
    }

    /// Run `freebsd-update fetch && freebsd-update install` (or
    /// `hbsd-update`) against `jail_root` from the host, keeping
    /// fetched patches and work state on `updates_mount` (the updates
    /// dataset's mountpoint) via `-d` so they survive between runs and
    /// don't get mixed into the release root itself. Tolerates known
    /// no-op messages.
    pub fn run_updater(&self, dist: Distribution, jail_root: &std::path::Path, updates_mount: &std::path::Path) -> Result<(), JailError> {
        let (cmd, args): (&str, Vec<String>) = match dist {
            Distribution::FreeBsd => (
                "/usr/sbin/freebsd-update",
                vec![
                    "-b".to_string(),
                    jail_root.to_string_lossy().to_string(),
                    "-d".to_string(),
                    updates_mount.to_string_lossy().to_string(),
                    "fetch".to_string(),
                    "install".to_string(),
                ],
            ),
            Distribution::HardenedBsd => (
                "/usr/sbin/hbsd-update",
                vec!["-b".to_string(), jail_root.to_string_lossy().to_string()],
            ),
        };
        let output = Command::new(cmd)
            .args(&args)
            .output()
            .map_err(|e| CommandError::CommandFailure(e.to_string()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() || is_tolerated_output(&stdout) {
            Ok(())
        } else {
            Err(CommandError::CommandFailure(format!("{cmd} failed: {stdout}")).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerates_no_updates_message() {
        assert!(is_tolerated_output("Looking up update.FreeBSD.org mirrors... 3 mirrors found.\nNo updates are available to install.\n"));
    }

    #[test]
    fn rewrites_components_line() {
        let conf = "KeepModifiedMetadata yes\nComponents src world kernel\nAllowAdd yes\n";
        let rewritten = rewrite_components_line(conf);
        assert!(rewritten.contains("Components world\n"));
        assert!(!rewritten.contains("src world kernel"));
    }

    #[test]
    fn resolves_distribution_specific_urls() {
        assert!(UpdaterUrls::script_url(Distribution::FreeBsd, "13.2-RELEASE").contains("svn.freebsd.org"));
        assert!(UpdaterUrls::script_url(Distribution::HardenedBsd, "13.2-RELEASE").contains("github"));
    }
}
