//! Lifecycle engine (C13): writes the six hook scripts and the
//! `jail.conf` fragment, and drives create/start/stop/destroy/rename/
//! clone/restart through [`crate::event::EventStream`].

use crate::commandqueue::{shell_quote, CommandQueue};
use crate::config::model::Config;
use crate::config::special::defaultrouter::{DefaultRouter4, DefaultRouter6};
use crate::config::special::depends::Depends;
use crate::config::special::interfaces::Interfaces;
use crate::config::special::ip_addr::{Ip4AddressSet, Ip6AddressSet};
use crate::config::special::resolver::Resolver;
use crate::datasets::Datasets;
use crate::devfs::DevfsManager;
use crate::error::{CommandError, JailError, PreconditionError};
use crate::event::EventStream;
use crate::fstab::{basejail_auto_lines, Fstab};
use crate::jail::Jail;
use crate::jailstate;
use crate::network;
use crate::storage::{BasejailType, StorageBackend};
use freebsd::fs::zfs::ZfsHandle;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::Command;

pub const JAIL_CMD: &str = "/usr/sbin/jail";
pub const JEXEC_CMD: &str = "/usr/sbin/jexec";
pub const RCTL_CMD: &str = "/usr/sbin/rctl";
pub const MOUNT_BIND_CMD: &str = "/sbin/mount";

/// Mountpoints always unmounted (force, ignore errors) inside the
/// jail root during `poststop`, before the fstab-driven unmounts.
pub const FIXED_TEARDOWN_MOUNTS: &[&str] = &[
    ".iocage",
    "usr/bin",
    "dev/fd",
    "dev",
    "proc",
    "root/compat/linux/proc",
    "root/etcupdate",
    "root/usr/ports",
    "root/usr/src",
    "tmp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookScript {
    Prestart,
    Start,
    Started,
    Poststart,
    Prestop,
    Stop,
    Poststop,
}

impl HookScript {
    pub fn filename(self) -> &'static str {
        match self {
            HookScript::Prestart => "prestart.sh",
            HookScript::Start => "start.sh",
            HookScript::Started => "started.sh",
            HookScript::Poststart => "poststart.sh",
            HookScript::Prestop => "prestop.sh",
            HookScript::Stop => "stop.sh",
            HookScript::Poststop => "poststop.sh",
        }
    }
}

/// Render one hook script's full text: `.env` sourcing, `set -eu`
/// unless `ignore_errors`, then `body`.
pub fn render_hook_script(body: &CommandQueue, ignore_errors: bool) -> String {
    let mut out = String::new();
    out.push_str("#!/bin/sh\n");
    out.push_str(". ./.env\n");
    if !ignore_errors {
        out.push_str("set -eu\n");
    }
    out.push_str(&body.render());
    out
}

pub struct HookScriptWriter {
    pub dir: PathBuf,
}

impl HookScriptWriter {
    pub fn write(&self, script: HookScript, body: &CommandQueue, ignore_errors: bool) -> Result<(), JailError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(script.filename());
        let rendered = render_hook_script(body, ignore_errors);
        std::fs::write(&path, rendered)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    pub fn write_env(&self, jid: Option<i32>) -> Result<(), JailError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(".env");
        let content = format!("IOCAGE_JID={}\n", jid.map(|j| j.to_string()).unwrap_or_default());
        std::fs::write(&path, content)?;
        Ok(())
    }
}

/// Build the `param=value` list for `/usr/sbin/jail -c`, gating
/// `allow.mount.*`/sysvmsg/sem/shm parameters on the jail's userland
/// version the way the real `jail(8)` gates them too.
pub struct JailConfBuilder<'a> {
    pub jail: &'a Jail,
    pub devfs_ruleset: u16,
    pub userland_major: f32,
    /// Shell variable names (e.g. `IOCAGE_NIC_vnet0_B`) of epairs
    /// created in `prestart.sh`, attached via `vnet.interface` so
    /// `jail(8)` itself moves them in at creation time.
    pub vnet_interface_vars: Vec<String>,
}

impl<'a> JailConfBuilder<'a> {
    pub fn params(&self) -> Vec<String> {
        let cfg = &self.jail.config;
        let mut p = Vec::new();
        p.push(format!("name={}", self.jail.jail_conf_name()));
        p.push(format!("path={}", self.jail.root_path().display()));
        p.push(format!("host.hostname={}", cfg.get_str("host_hostname").unwrap_or_else(|| self.jail.id.clone())));
        p.push(format!("host.hostuuid={}", self.jail.id));
        p.push(format!("devfs_ruleset={}", self.devfs_ruleset));
        p.push(format!("securelevel={}", cfg.get_int("securelevel").unwrap_or(2)));
        p.push(format!("enforce_statfs={}", cfg.get_int("enforce_statfs").unwrap_or(2)));
        p.push(format!("children.max={}", cfg.get_int("children_max").unwrap_or(0)));
        p.push(format!("allow.set_hostname={}", cfg.get_int("allow_set_hostname").unwrap_or(1)));
        p.push(format!("allow.sysvipc={}", cfg.get_int("allow_sysvipc").unwrap_or(0)));
        p.push(format!("allow.raw_sockets={}", cfg.get_int("allow_raw_sockets").unwrap_or(0)));
        p.push(format!("allow.chflags={}", cfg.get_int("allow_chflags").unwrap_or(0)));
        p.push(format!("allow.mount={}", cfg.get_int("allow_mount").unwrap_or(0)));
        p.push(format!("allow.mount.devfs={}", cfg.get_int("allow_mount_devfs").unwrap_or(0)));
        p.push(format!("allow.mount.nullfs={}", cfg.get_int("allow_mount_nullfs").unwrap_or(0)));
        p.push(format!("allow.mount.procfs={}", cfg.get_int("allow_mount_procfs").unwrap_or(0)));
        p.push(format!("allow.mount.zfs={}", cfg.get_int("allow_mount_zfs").unwrap_or(0)));
        p.push(format!("allow.quotas={}", cfg.get_int("allow_quotas").unwrap_or(0)));
        p.push(format!("allow.socket_af={}", cfg.get_int("allow_socket_af").unwrap_or(0)));
        p.push(format!("mount.fstab={}", self.jail.fstab_path().display()));
        p.push(format!("exec.prestart={}", shell_quote("./launch-scripts/prestart.sh")));
        p.push(format!("exec.poststop={}", shell_quote("./launch-scripts/poststop.sh")));
        p.push(format!("exec.jail_user={}", cfg.get_str("exec_jail_user").unwrap_or_else(|| "root".to_string())));

        if cfg.get_bool("vnet").unwrap_or(false) {
            p.push("vnet".to_string());
            for var in &self.vnet_interface_vars {
                p.push(network::vnet_interface_param(var));
            }
        } else {
            p.push(format!("ip4.addr={}", cfg.get_str("ip4_addr").unwrap_or_default()));
            p.push(format!("ip6.addr={}", cfg.get_str("ip6_addr").unwrap_or_default()));
        }
        p.push("ip4.saddrsel=\"new\"".to_string());
        p.push("ip6.saddrsel=\"new\"".to_string());

        if self.userland_major > 9.3 {
            p.push(format!("allow.mount.tmpfs={}", cfg.get_int("allow_mount_tmpfs").unwrap_or(0)));
        }
        if self.userland_major > 10.3 {
            p.push("sysvmsg=\"new\"".to_string());
            p.push("sysvsem=\"new\"".to_string());
            p.push("sysvshm=\"new\"".to_string());
        }

        if self.jail.is_template() {
            p.push("nopersist".to_string());
        } else {
            p.push("persist".to_string());
            p.push(format!("exec.poststart={}", shell_quote("./launch-scripts/poststart.sh")));
        }
        p
    }
}

pub struct LifecycleEngine<'a> {
    pub zfs: &'a ZfsHandle,
    pub datasets: &'a Datasets,
    pub userland_major: f32,
}

impl<'a> LifecycleEngine<'a> {
    fn storage_backend(&self) -> StorageBackend<'a> {
        StorageBackend {
            zfs: self.zfs,
            datasets: self.datasets,
        }
    }

    fn devfs_ruleset_for(&self, jail: &Jail) -> Result<u16, JailError> {
        let mgr = DevfsManager::new();
        let devfs_ruleset_key = jail.config.get_str("devfs_ruleset").unwrap_or_else(|| "4".to_string());
        let base = mgr.resolve_base(&devfs_ruleset_key);
        let needs_bpf = jail
            .config
            .get_str("ip4_addr")
            .map(|s| s.contains("|dhcp"))
            .unwrap_or(false);
        let needs_zfs = jail.config.get_bool("allow_mount_zfs").unwrap_or(false) || jail.config.get_bool("jail_zfs").unwrap_or(false);
        match base {
            Some(base) => {
                let rules = mgr.compose(&base, needs_bpf, needs_zfs);
                mgr.find_or_create(&rules)
            }
            None => Ok(4),
        }
    }

    /// Materialize a brand-new jail: create its dataset, populate the
    /// root filesystem for `kind` via [`StorageBackend::create`], write
    /// `config.json`, and seed `fstab` with the basejail nullfs lines
    /// (for nullfs-basejails). Returns the `Jail` handle for the caller
    /// to pass to [`LifecycleEngine::start`].
    pub fn create(
        &self,
        jail_id: &str,
        source: &str,
        config: Config,
        events: &mut EventStream,
    ) -> Result<Jail, JailError> {
        events.begin("jail.create", jail_id);
        if let Err(e) = crate::jail::validate_jail_name(jail_id) {
            events.fail("jail.create", jail_id, "invalid name")?;
            return Err(e);
        }

        let jail_dataset = self.datasets.jail_dataset(jail_id);
        if self.zfs.exists(&jail_dataset) {
            events.fail("jail.create", jail_id, "already exists")?;
            return Err(PreconditionError::JailAlreadyExists(jail_id.to_string()).into());
        }

        let kind = BasejailType::from_config(
            config.get_bool("basejail").unwrap_or(false),
            &config.get_str("basejail_type").unwrap_or_else(|| "nullfs".to_string()),
        );
        let release = config.get_str("release").unwrap_or_default();
        if release.is_empty() {
            events.fail("jail.create", jail_id, "no release configured")?;
            return Err(PreconditionError::ReleaseNotFetched(String::new()).into());
        }
        let release_root_dataset = self.datasets.release_root_dataset(&release);
        if !self.zfs.exists(&release_root_dataset) {
            events.fail("jail.create", jail_id, "release not fetched")?;
            return Err(PreconditionError::ReleaseNotFetched(release.clone()).into());
        }

        self.zfs
            .create2(&jail_dataset, true, false)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?;
        let rollback_zfs = self.zfs.clone();
        let rollback_dataset = jail_dataset.clone();
        events.push_rollback("undo-jail-dataset", move || {
            let _ = rollback_zfs.destroy(&rollback_dataset, true, true, false);
            Vec::new()
        });

        let storage = self.storage_backend();
        if let Err(e) = storage.create(jail_id, &release, kind) {
            events.fail("jail.create", jail_id, "storage backend failed")?;
            return Err(e);
        }

        let jail_root_dataset = self.datasets.jail_root_dataset(jail_id);
        let mountpoint = self
            .zfs
            .mount_point(&jail_dataset)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?
            .ok_or_else(|| crate::error::StorageError::DatasetNotMounted(jail_dataset.clone()))?;

        let jail = match Jail::new(jail_id, source, PathBuf::from(&jail_root_dataset), mountpoint.clone(), config) {
            Ok(jail) => jail,
            Err(e) => {
                events.fail("jail.create", jail_id, "invalid jail")?;
                return Err(e);
            }
        };

        crate::config::save(jail.mountpoint.clone(), jail_dataset.clone(), &jail.config)?;

        let mut fstab = Fstab::load(jail.fstab_path())?;
        if kind == BasejailType::NullfsBasejail {
            let release_root_mountpoint = self
                .zfs
                .mount_point(&release_root_dataset)
                .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?
                .ok_or_else(|| crate::error::StorageError::DatasetNotMounted(release_root_dataset.clone()))?;
            let auto_lines = basejail_auto_lines(&release_root_mountpoint, &jail.root_path());
            fstab.write_full(&auto_lines)?;
        } else {
            fstab.write_full(&[])?;
        }

        events.clear_rollbacks();
        events.end("jail.create", jail_id)?;
        Ok(jail)
    }

    /// Start a jail: build the command queues for each hook script,
    /// write them plus `jail.conf`, invoke `jail -c`, then apply
    /// resource limits and DNS. Every mutation pushes a rollback onto
    /// `events` so a later failure unwinds cleanly.
    pub fn start(&self, jail: &Jail, events: &mut EventStream) -> Result<(), JailError> {
        events.begin("jail.start", &jail.id);

        if jailstate::is_running(&jail.jail_conf_name())? {
            events.fail("jail.start", &jail.id, "already running")?;
            return Err(PreconditionError::JailAlreadyRunning(jail.id.clone()).into());
        }
        if jail.is_template() {
            events.fail("jail.start", &jail.id, "is a template")?;
            return Err(PreconditionError::JailIsTemplate(jail.id.clone()).into());
        }

        let depends: Depends = jail.config.get_str("depends").unwrap_or_default().parse().unwrap_or_default();
        for dep_id in &depends.0 {
            let dep_conf_name = format!("{}-{dep_id}", jail.source);
            if !jailstate::is_running(&dep_conf_name)? {
                events.fail("jail.start", &jail.id, "dependency not running")?;
                return Err(PreconditionError::DependencyNotRunning(dep_id.clone()).into());
            }
        }

        let kind = BasejailType::from_config(
            jail.config.get_bool("basejail").unwrap_or(false),
            &jail.config.get_str("basejail_type").unwrap_or_else(|| "nullfs".to_string()),
        );
        let release = jail.config.get_str("release").unwrap_or_default();

        let storage = self.storage_backend();
        let auto_fstab_lines = storage.apply(&jail.id, &jail.root_path(), &release, kind)?;

        let fstab = Fstab::load(jail.fstab_path())?;
        fstab.write_full(&auto_fstab_lines)?;

        let devfs_ruleset = self.devfs_ruleset_for(jail)?;

        if let Some(raw) = jail.config.get_str("resolver") {
            let resolver = Resolver::parse(&raw);
            if let Some(contents) = resolver.file_contents() {
                std::fs::write(jail.root_path().join("etc/resolv.conf"), contents)?;
            }
        }

        let vnet = jail.config.get_bool("vnet").unwrap_or(false);
        let mac_prefix = jail.config.get_str("mac_prefix").unwrap_or_else(|| "02ff60".to_string());
        let v4: Ip4AddressSet = jail.config.get_str("ip4_addr").unwrap_or_default().parse().unwrap_or_default();
        let v6: Ip6AddressSet = jail.config.get_str("ip6_addr").unwrap_or_default().parse().unwrap_or_default();
        let interfaces: Interfaces = jail.config.get_str("interfaces").unwrap_or_default().parse().unwrap_or_default();
        let router4: DefaultRouter4 = jail.config.get_str("defaultrouter").unwrap_or_default().parse().unwrap_or(DefaultRouter4::None);
        let router6: DefaultRouter6 = jail.config.get_str("defaultrouter6").unwrap_or_default().parse().unwrap_or(DefaultRouter6::None);

        let mut prestart_body = CommandQueue::new();
        let mut start_body = CommandQueue::new();
        let mut vnet_interface_vars = Vec::new();
        if vnet {
            for (idx, member) in interfaces.0.iter().enumerate() {
                let jail_addrs: Vec<String> = v4
                    .0
                    .iter()
                    .filter(|(nic, _)| nic == &member.jail_if)
                    .map(|(_, m)| m.to_string())
                    .collect();
                let rule_base = 20000 + (idx as u32) * 100;
                let (_, _, host_cmds) = network::host_setup_commands(member, &jail.id, &mac_prefix, rule_base, &jail_addrs);
                prestart_body.extend(host_cmds);
                vnet_interface_vars.push(format!("IOCAGE_NIC_{}_B", member.jail_if));
                start_body.extend(network::jail_start_commands(&member.jail_if, &v4, &v6));
            }
            start_body.extend(network::default_route_commands(&router4, &router6));
        }

        let mut poststart_body = CommandQueue::new();
        poststart_body.push("./started.sh".to_string());
        poststart_body.push(format!("{} {} /.iocage/start.sh", JEXEC_CMD, jail.jail_conf_name()));
        if let Some(user_poststart) = jail.config.get_str("exec_poststart") {
            if !user_poststart.is_empty() {
                poststart_body.push(user_poststart);
            }
        }

        let writer = HookScriptWriter {
            dir: jail.launch_scripts_dir(),
        };
        writer.write_env(None)?;
        writer.write(HookScript::Prestart, &prestart_body, false)?;
        writer.write(HookScript::Start, &start_body, false)?;
        writer.write(HookScript::Started, &CommandQueue::new(), false)?;
        writer.write(HookScript::Poststart, &poststart_body, false)?;
        bind_mount_launch_scripts(jail)?;
        let iocage_mount = jail.root_path().join(".iocage");
        events.push_rollback("undo-launch-scripts-mount", move || {
            let _ = Command::new("/sbin/umount").arg("-f").arg(&iocage_mount).status();
            Vec::new()
        });

        // Covers whatever `prestart.sh` may have partially applied
        // (epairs, bridge membership) before `jail -c` itself failed;
        // the real teardown is whatever `poststop.sh` would have run.
        let teardown_script = render_hook_script(&self.teardown_commands(jail), true);
        events.push_rollback("undo-prestart-network-setup", move || {
            let _ = Command::new("/bin/sh").arg("-c").arg(&teardown_script).status();
            Vec::new()
        });

        let needs_rtsold = network::needs_rtsold(&v6);
        if needs_rtsold {
            apply_rc_conf(&jail.root_path(), "rtsold_enable", "YES")?;
        }

        let builder = JailConfBuilder {
            jail,
            devfs_ruleset,
            userland_major: self.userland_major,
            vnet_interface_vars,
        };
        let params = builder.params();

        let status = Command::new(JAIL_CMD)
            .arg("-c")
            .args(&params)
            .status()
            .map_err(|e| CommandError::JailLaunchFailed(e.to_string()))?;

        if !status.success() {
            events.fail("jail.start", &jail.id, "jail -c failed")?;
            return Err(CommandError::JailLaunchFailed(format!("exit status {status}")).into());
        }

        let jid = jailstate::jid_of(&jail.jail_conf_name())?;
        writer.write_env(jid)?;

        if !jail.config.get_str("rlimits").map(|s| s == "none").unwrap_or(true) {
            for (name, limit) in jail.config.resource_limits() {
                let rule = limit.rctl_rule(&jail.jail_conf_name(), name);
                let _ = Command::new(RCTL_CMD).arg("-a").arg(&rule).status();
            }
        }

        events.clear_rollbacks();
        events.end("jail.start", &jail.id)?;
        Ok(())
    }

    /// Stop a jail. `force` tolerates it already being stopped and
    /// drives `prestop`/`poststop` from the host if `jail -r` itself
    /// fails.
    pub fn stop(&self, jail: &Jail, events: &mut EventStream, force: bool) -> Result<(), JailError> {
        events.begin("jail.stop", &jail.id);
        let running = jailstate::is_running(&jail.jail_conf_name())?;
        if !running && !force {
            events.fail("jail.stop", &jail.id, "not running")?;
            return Err(PreconditionError::JailNotRunning(jail.id.clone()).into());
        }

        let writer = HookScriptWriter {
            dir: jail.launch_scripts_dir(),
        };
        let teardown_body = self.teardown_commands(jail);
        writer.write(HookScript::Prestop, &CommandQueue::new(), false)?;
        writer.write(HookScript::Stop, &CommandQueue::new(), false)?;
        writer.write(HookScript::Poststop, &teardown_body, true)?;

        let jail_conf_path = jail.mountpoint.join("jail.conf");
        let status = Command::new(JAIL_CMD)
            .arg("-r")
            .arg("-f")
            .arg(&jail_conf_path)
            .arg(jail.jail_conf_name())
            .status();

        let ok = status.map(|s| s.success()).unwrap_or(false);
        if !ok && force {
            let _ = Command::new("/bin/sh").arg(jail.launch_scripts_dir().join("prestop.sh")).status();
            let _ = Command::new("/bin/sh").arg(jail.launch_scripts_dir().join("poststop.sh")).status();
        }

        let _ = Command::new(RCTL_CMD).arg("-r").arg(format!("jail:{}", jail.jail_conf_name())).status();

        events.end("jail.stop", &jail.id)?;
        Ok(())
    }

    pub fn destroy(&self, jail: &Jail, events: &mut EventStream, force: bool) -> Result<(), JailError> {
        events.begin("jail.destroy", &jail.id);
        let running = jailstate::is_running(&jail.jail_conf_name())?;
        if running {
            if !force {
                events.fail("jail.destroy", &jail.id, "running")?;
                return Err(PreconditionError::JailAlreadyRunning(jail.id.clone()).into());
            }
            self.stop(jail, events, true)?;
        }
        let dataset = self.datasets.jail_dataset(&jail.id);
        self.zfs
            .destroy(&dataset, true, true, false)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?;
        events.end("jail.destroy", &jail.id)?;
        Ok(())
    }

    pub fn rename(&self, jail: &Jail, new_id: &str, events: &mut EventStream) -> Result<(), JailError> {
        events.begin("jail.rename", &jail.id);
        if jailstate::is_running(&jail.jail_conf_name())? {
            events.fail("jail.rename", &jail.id, "running")?;
            return Err(PreconditionError::JailAlreadyRunning(jail.id.clone()).into());
        }
        crate::jail::validate_jail_name(new_id)?;

        let old_dataset = self.datasets.jail_dataset(&jail.id);
        let new_dataset = self.datasets.jail_dataset(new_id);
        self.zfs
            .rename(&old_dataset, &new_dataset)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?;

        let new_mountpoint = self
            .zfs
            .mount_point(&new_dataset)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?
            .unwrap_or_else(|| jail.mountpoint.clone());

        let mut fstab = Fstab::load(new_mountpoint.join("fstab"))?;
        fstab.replace_path(&jail.mountpoint.display().to_string(), &new_mountpoint.display().to_string());
        fstab.save()?;

        events.end("jail.rename", &jail.id)?;
        Ok(())
    }

    pub fn clone_jail(&self, jail: &Jail, new_id: &str, snapshot_tag: &str, events: &mut EventStream) -> Result<(), JailError> {
        events.begin("jail.clone", &jail.id);
        let source_dataset = self.datasets.jail_dataset(&jail.id);
        let snap_name = format!("clone_{snapshot_tag}");
        self.zfs
            .snapshot2(&source_dataset, &snap_name)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?;

        let dest_dataset = self.datasets.jail_dataset(new_id);
        self.zfs
            .clone2(&source_dataset, &snap_name, &dest_dataset)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?;

        let dest_mountpoint = self
            .zfs
            .mount_point(&dest_dataset)
            .map_err(|e| crate::error::StorageError::ZfsException(e.to_string()))?
            .unwrap_or_else(|| jail.mountpoint.clone());

        let mut fstab = Fstab::load(dest_mountpoint.join("fstab"))?;
        fstab.replace_path(&jail.mountpoint.display().to_string(), &dest_mountpoint.display().to_string());
        fstab.save()?;

        events.end("jail.clone", &jail.id)?;
        Ok(())
    }

    /// Soft restart re-runs the `exec_start` hook via `jexec`; hard
    /// restart fully stops then starts.
    pub fn restart(&self, jail: &Jail, events: &mut EventStream, hard: bool) -> Result<(), JailError> {
        if hard {
            self.stop(jail, events, false)?;
            self.start(jail, events)?;
            return Ok(());
        }
        events.begin("jail.restart", &jail.id);
        let exec_start = jail.config.get_str("exec_start").unwrap_or_default();
        let status = Command::new(JEXEC_CMD)
            .arg(jail.jail_conf_name())
            .arg("/bin/sh")
            .arg("-c")
            .arg(&exec_start)
            .status()
            .map_err(|e| CommandError::CommandFailure(e.to_string()))?;
        if !status.success() {
            events.fail("jail.restart", &jail.id, "exec_start failed")?;
            return Err(CommandError::CommandFailure(format!("exec_start exit status {status}")).into());
        }
        events.end("jail.restart", &jail.id)?;
        Ok(())
    }

    fn teardown_commands(&self, jail: &Jail) -> CommandQueue {
        let mut q = CommandQueue::new();
        let root = jail.root_path();
        for rel in FIXED_TEARDOWN_MOUNTS {
            let target = root.join(rel);
            q.push(format!("/sbin/umount -f {} 2>/dev/null || true", shell_quote(&target.display().to_string())));
        }
        q.push(format!(
            "/sbin/umount -a -F {} 2>/dev/null || true",
            shell_quote(&jail.fstab_path().display().to_string())
        ));
        if jail.config.get_bool("vnet").unwrap_or(false) {
            let interfaces: Interfaces = jail.config.get_str("interfaces").unwrap_or_default().parse().unwrap_or_default();
            for member in &interfaces.0 {
                q.extend(network::teardown_commands(&member.jail_if));
            }
        }
        q
    }
}

pub fn bind_mount_launch_scripts(jail: &Jail) -> Result<(), JailError> {
    let target = jail.root_path().join(".iocage");
    std::fs::create_dir_all(&target)?;
    let status = Command::new(MOUNT_BIND_CMD)
        .arg("-t")
        .arg("nullfs")
        .arg("-o")
        .arg("ro")
        .arg(jail.launch_scripts_dir())
        .arg(&target)
        .status()
        .map_err(|e| CommandError::MountFailed(e.to_string()))?;
    if !status.success() {
        return Err(CommandError::MountFailed(format!("mount exit status {status}")).into());
    }
    Ok(())
}

/// Set `key="value"` in `<jail_root>/etc/rc.conf`, replacing any
/// existing assignment of `key` and otherwise leaving the file intact.
pub fn apply_rc_conf(jail_root: &std::path::Path, key: &str, value: &str) -> Result<(), JailError> {
    let path = jail_root.join("etc/rc.conf");
    let existing = std::fs::read_to_string(&path).unwrap_or_default();
    let prefix = format!("{key}=");
    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !line.starts_with(&prefix))
        .map(str::to_string)
        .collect();
    lines.push(format!("{key}=\"{value}\""));
    let mut rendered = lines.join("\n");
    rendered.push('\n');
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, rendered)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_hook_script_wraps_with_set_eu() {
        let mut q = CommandQueue::new();
        q.push("echo hi");
        let rendered = render_hook_script(&q, false);
        assert!(rendered.contains("set -eu"));
        assert!(rendered.contains(". ./.env"));
        assert!(rendered.contains("echo hi"));
    }

    #[test]
    fn render_hook_script_skips_set_eu_when_ignoring_errors() {
        let q = CommandQueue::new();
        let rendered = render_hook_script(&q, true);
        assert!(!rendered.contains("set -eu"));
    }

    #[test]
    fn apply_rc_conf_inserts_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/rc.conf"), "hostname=\"web1\"\n").unwrap();

        apply_rc_conf(dir.path(), "rtsold_enable", "YES").unwrap();
        let contents = std::fs::read_to_string(dir.path().join("etc/rc.conf")).unwrap();
        assert!(contents.contains("hostname=\"web1\""));
        assert!(contents.contains("rtsold_enable=\"YES\""));

        apply_rc_conf(dir.path(), "rtsold_enable", "NO").unwrap();
        let contents = std::fs::read_to_string(dir.path().join("etc/rc.conf")).unwrap();
        assert_eq!(contents.matches("rtsold_enable").count(), 1);
        assert!(contents.contains("rtsold_enable=\"NO\""));
    }
}
