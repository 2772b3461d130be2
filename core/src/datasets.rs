//! Datasets registry (C3): activates a ZFS pool as an iocage root and
//! exposes the well-known child datasets. Several named "sources" may
//! be activated simultaneously.

use crate::error::{JailError, StorageError};
use freebsd::fs::zfs::ZfsHandle;
use std::path::{Path, PathBuf};

pub const ACTIVATION_PROPERTY: &str = "org.freebsd.ioc:active";

/// One activated iocage root, e.g. `tank/iocage`.
#[derive(Debug, Clone)]
pub struct Datasets {
    pub source: String,
    pub pool: String,
    pub root_dataset: String,
    pub mountpoint: PathBuf,
}

impl Datasets {
    pub fn releases_dataset(&self) -> String {
        format!("{}/releases", self.root_dataset)
    }

    pub fn base_dataset(&self) -> String {
        format!("{}/base", self.root_dataset)
    }

    pub fn jails_dataset(&self) -> String {
        format!("{}/jails", self.root_dataset)
    }

    pub fn pkg_dataset(&self) -> String {
        format!("{}/pkg", self.root_dataset)
    }

    pub fn release_root_dataset(&self, release: &str) -> String {
        format!("{}/{release}/root", self.releases_dataset())
    }

    pub fn release_updates_dataset(&self, release: &str) -> String {
        format!("{}/{release}/updates", self.releases_dataset())
    }

    pub fn base_tree_dataset(&self, release: &str, basedir: &str) -> String {
        format!("{}/{release}/{basedir}", self.base_dataset())
    }

    pub fn jail_dataset(&self, id: &str) -> String {
        format!("{}/{id}", self.jails_dataset())
    }

    pub fn jail_root_dataset(&self, id: &str) -> String {
        format!("{}/root", self.jail_dataset(id))
    }

    /// Activate `pool` as an iocage root named `source`, creating the
    /// `iocage` dataset and its children if absent, and setting the
    /// activation property so future processes can discover it.
    pub fn activate(zfs: &ZfsHandle, pool: &str, source: &str) -> Result<Datasets, JailError> {
        let root_dataset = format!("{pool}/iocage");
        if !zfs.exists(&root_dataset) {
            zfs.create2(&root_dataset, true, false)
                .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        }
        zfs.set_prop(&root_dataset, ACTIVATION_PROPERTY, source)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?;

        for child in ["releases", "base", "jails", "pkg"] {
            let ds = format!("{root_dataset}/{child}");
            if !zfs.exists(&ds) {
                zfs.create2(&ds, true, false)
                    .map_err(|e| StorageError::ZfsException(e.to_string()))?;
            }
        }

        let mountpoint = zfs
            .mount_point(&root_dataset)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?
            .ok_or_else(|| StorageError::DatasetNotMounted(root_dataset.clone()))?;

        Ok(Datasets {
            source: source.to_string(),
            pool: pool.to_string(),
            root_dataset,
            mountpoint,
        })
    }

    /// Discover every activated source across all imported pools.
    pub fn discover_all(zfs: &ZfsHandle) -> Result<Vec<Datasets>, JailError> {
        let activated = zfs
            .list_activated_pools(ACTIVATION_PROPERTY)
            .map_err(|e| StorageError::ZfsException(e.to_string()))?;
        let mut result = Vec::new();
        for (pool, source) in activated {
            let root_dataset = format!("{pool}/iocage");
            let mountpoint = zfs
                .mount_point(&root_dataset)
                .map_err(|e| StorageError::ZfsException(e.to_string()))?
                .ok_or_else(|| StorageError::DatasetNotMounted(root_dataset.clone()))?;
            result.push(Datasets {
                source,
                pool,
                root_dataset,
                mountpoint,
            });
        }
        Ok(result)
    }

    /// Verify `candidate` is contained within `self.mountpoint` via
    /// `realpath` comparison escape check.
    pub fn assert_contains(&self, candidate: &Path) -> Result<(), JailError> {
        let real_root = std::fs::canonicalize(&self.mountpoint).unwrap_or_else(|_| self.mountpoint.clone());
        let real_candidate = std::fs::canonicalize(candidate).unwrap_or_else(|_| candidate.to_path_buf());
        if real_candidate.starts_with(&real_root) {
            Ok(())
        } else {
            Err(crate::error::SecurityError::SecurityViolationConfigJailEscape(
                candidate.display().to_string(),
            )
            .into())
        }
    }
}
