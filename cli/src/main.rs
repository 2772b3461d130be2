//! Thin front-end over `jailcore`. Argument parsing, filter
//! expressions, and interactive table/output formatting belong to a
//! separate front-end layer and are intentionally not built here —
//! this binary exists so the workspace has something runnable against
//! `jailcore`'s public API during manual smoke testing.

use anyhow::{Context, Result};
use jailcore::datasets::Datasets;
use std::env;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let mut args = env::args().skip(1);
    let command = args.next().context("usage: jailctl <list|activate> [pool]")?;

    match command.as_str() {
        "list" => {
            let zfs = freebsd::fs::zfs::ZfsHandle::new("/sbin/zfs", false, false);
            let sources = Datasets::discover_all(&zfs)?;
            for source in sources {
                println!("{}\t{}", source.source, source.pool);
            }
        }
        "activate" => {
            let pool = args.next().context("usage: jailctl activate <pool> [source]")?;
            let source = args.next().unwrap_or_else(|| "iocage".to_string());
            let zfs = freebsd::fs::zfs::ZfsHandle::new("/sbin/zfs", false, false);
            let datasets = Datasets::activate(&zfs, &pool, &source)?;
            println!("activated {} at {}", datasets.root_dataset, datasets.mountpoint.display());
        }
        other => {
            anyhow::bail!("unknown command: {other}");
        }
    }

    Ok(())
}
