//! Config layer (C4/C5/C6): storage format handling, the default
//! table, the resolved `Config` model, and special-property grammars.

pub mod defaults;
pub mod model;
pub mod special;
pub mod store;

use crate::error::JailError;
use freebsd::fs::zfs::ZfsHandle;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Load a jail's `Config`, merging its stored data over the supplied
/// host-merged default table.
pub fn load(
    jail_dir: impl Into<PathBuf>,
    dataset: impl Into<String>,
    zfs: &ZfsHandle,
    host_defaults: BTreeMap<String, crate::value::Value>,
) -> Result<model::Config, JailError> {
    let store = store::ConfigStore::new(jail_dir, dataset);
    let data = store.read(zfs)?;
    let merged_defaults = defaults::merge_host_defaults(defaults::hardcoded_defaults(), host_defaults);
    Ok(model::Config::new(data, merged_defaults))
}

pub fn save(jail_dir: impl Into<PathBuf>, dataset: impl Into<String>, config: &model::Config) -> Result<(), JailError> {
    let store = store::ConfigStore::new(jail_dir, dataset);
    store.write_json(config.data())
}
