//! Storage backend (C10): the three strategies for populating and
//! maintaining a jail's root filesystem from a release.

use crate::datasets::Datasets;
use crate::error::{JailError, StorageError};
use crate::fstab::{basejail_auto_lines, FstabLine};
use freebsd::fs::zfs::ZfsHandle;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasejailType {
    Standalone,
    NullfsBasejail,
    ZfsBasejail,
}

impl BasejailType {
    pub fn from_config(basejail: bool, basejail_type: &str) -> BasejailType {
        if !basejail {
            BasejailType::Standalone
        } else if basejail_type == "zfs" {
            BasejailType::ZfsBasejail
        } else {
            BasejailType::NullfsBasejail
        }
    }
}

pub struct StorageBackend<'a> {
    pub zfs: &'a ZfsHandle,
    pub datasets: &'a Datasets,
}

impl<'a> StorageBackend<'a> {
    /// Populate `jails/<id>/root` for a freshly created jail.
    pub fn create(&self, jail_id: &str, release: &str, kind: BasejailType) -> Result<(), JailError> {
        let jail_root = self.datasets.jail_root_dataset(jail_id);
        match kind {
            BasejailType::Standalone => {
                self.zfs
                    .clone2(&self.datasets.release_root_dataset(release), "iocage", &jail_root)
                    .map_err(|e| StorageError::ZfsException(e.to_string()))?;
            }
            BasejailType::NullfsBasejail => {
                self.zfs
                    .create2(&jail_root, true, false)
                    .map_err(|e| StorageError::ZfsException(e.to_string()))?;
                let mountpoint = self
                    .zfs
                    .mount_point(&jail_root)
                    .map_err(|e| StorageError::ZfsException(e.to_string()))?
                    .ok_or_else(|| StorageError::DatasetNotMounted(jail_root.clone()))?;
                for dir in ["dev", "etc"] {
                    std::fs::create_dir_all(mountpoint.join(dir))?;
                }
            }
            BasejailType::ZfsBasejail => {
                for basedir in crate::fstab::BASEJAIL_BASEDIRS {
                    let src = self.datasets.base_tree_dataset(release, basedir);
                    let dest = format!("{jail_root}/{basedir}");
                    self.zfs
                        .clone2(&src, "iocage", &dest)
                        .map_err(|e| StorageError::ZfsException(e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    /// Per-start work: nullfs-basejails get fresh release snapshots and
    /// auto fstab lines; zfs-basejails get their clones refreshed if
    /// they've gone stale against the current release.
    pub fn apply(
        &self,
        jail_id: &str,
        jail_root: &Path,
        release: &str,
        kind: BasejailType,
    ) -> Result<Vec<FstabLine>, JailError> {
        match kind {
            BasejailType::Standalone => Ok(Vec::new()),
            BasejailType::NullfsBasejail => {
                let release_root_ds = self.datasets.release_root_dataset(release);
                let boot_tag = format!("iocage-boot-{jail_id}");
                let snapshots = self
                    .zfs
                    .list_snapshots(&release_root_ds)
                    .map_err(|e| StorageError::ZfsException(e.to_string()))?;
                let already_tagged = snapshots
                    .iter()
                    .any(|s| s.to_string_lossy().ends_with(&format!("@{boot_tag}")));
                if !already_tagged {
                    self.zfs
                        .snapshot2(&release_root_ds, &boot_tag)
                        .map_err(|e| StorageError::ZfsException(e.to_string()))?;
                }
                let release_mountpoint = self
                    .zfs
                    .mount_point(&release_root_ds)
                    .map_err(|e| StorageError::ZfsException(e.to_string()))?
                    .ok_or_else(|| StorageError::DatasetNotMounted(release_root_ds))?;
                Ok(basejail_auto_lines(&release_mountpoint, jail_root))
            }
            BasejailType::ZfsBasejail => {
                for basedir in crate::fstab::BASEJAIL_BASEDIRS {
                    let expected_src = self.datasets.base_tree_dataset(release, basedir);
                    let dest = format!("{}/{basedir}", self.datasets.jail_root_dataset(jail_id));
                    let current_origin = self
                        .zfs
                        .get_prop(&dest, "origin")
                        .map_err(|e| StorageError::ZfsException(e.to_string()))?
                        .unwrap_or_default();
                    let current_ds = current_origin.split('@').next().unwrap_or("").to_string();
                    if self.zfs.exists(&dest) && current_ds != expected_src {
                        self.zfs
                            .destroy(&dest, false, false, false)
                            .map_err(|e| StorageError::ZfsException(e.to_string()))?;
                    }
                    if !self.zfs.exists(&dest) {
                        self.zfs
                            .clone2(&expected_src, "iocage", &dest)
                            .map_err(|e| StorageError::ZfsException(e.to_string()))?;
                    }
                }
                Ok(Vec::new())
            }
        }
    }

    pub fn teardown(&self, jail_id: &str, kind: BasejailType) -> Result<(), JailError> {
        let jail_root = self.datasets.jail_root_dataset(jail_id);
        match kind {
            BasejailType::Standalone | BasejailType::NullfsBasejail => {
                self.zfs
                    .destroy(&jail_root, true, true, false)
                    .map_err(|e| StorageError::ZfsException(e.to_string()).into())
            }
            BasejailType::ZfsBasejail => {
                for basedir in crate::fstab::BASEJAIL_BASEDIRS {
                    let dest = format!("{jail_root}/{basedir}");
                    if self.zfs.exists(&dest) {
                        self.zfs
                            .destroy(&dest, false, true, false)
                            .map_err(|e| StorageError::ZfsException(e.to_string()))?;
                    }
                }
                self.zfs
                    .destroy(&jail_root, true, true, false)
                    .map_err(|e| StorageError::ZfsException(e.to_string()).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basejail_type_resolves_from_config() {
        assert_eq!(BasejailType::from_config(false, "nullfs"), BasejailType::Standalone);
        assert_eq!(BasejailType::from_config(true, "nullfs"), BasejailType::NullfsBasejail);
        assert_eq!(BasejailType::from_config(true, "zfs"), BasejailType::ZfsBasejail);
    }
}
