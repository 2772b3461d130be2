//! Fstab manager (C7): read/write/merge a jail's `fstab` file
//! (`<source>/jails/<id>/fstab`), including the basejail nullfs lines
//! and hook-script mount line synthesized fresh on every read.

use crate::error::JailError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const AUTO_COMMENT: &str = "iocage-auto";

/// Basedirs nullfs-mounted read-only from the release root into a
/// nullfs-basejail's root, or cloned per-basedir for a zfs-basejail.
/// FreeBSD additionally carries `usr/lib32` (absent on other archs in
/// the original project, but this build targets FreeBSD only).
pub const BASEJAIL_BASEDIRS: &[&str] = &[
    "bin",
    "boot",
    "lib",
    "libexec",
    "rescue",
    "sbin",
    "usr/bin",
    "usr/include",
    "usr/lib",
    "usr/lib32",
    "usr/libdata",
    "usr/libexec",
    "usr/sbin",
    "usr/share",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabLine {
    pub source: String,
    pub destination: String,
    pub fs_type: String,
    pub options: String,
    pub dump: u32,
    pub passnum: u32,
    pub comment: Option<String>,
}

impl FstabLine {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        fs_type: impl Into<String>,
        options: impl Into<String>,
    ) -> FstabLine {
        FstabLine {
            source: source.into(),
            destination: destination.into(),
            fs_type: fs_type.into(),
            options: options.into(),
            dump: 0,
            passnum: 0,
            comment: None,
        }
    }

    pub fn auto(source: impl Into<String>, destination: impl Into<String>, fs_type: impl Into<String>, options: impl Into<String>) -> FstabLine {
        let mut line = FstabLine::new(source, destination, fs_type, options);
        line.comment = Some(AUTO_COMMENT.to_string());
        line
    }

    pub fn is_auto(&self) -> bool {
        self.comment.as_deref() == Some(AUTO_COMMENT)
    }

    fn render(&self) -> String {
        let base = format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.source, self.destination, self.fs_type, self.options, self.dump, self.passnum
        );
        match &self.comment {
            Some(c) => format!("{base}\t# {c}"),
            None => base,
        }
    }

    fn parse(raw: &str) -> Option<FstabLine> {
        let (body, comment) = match raw.split_once('#') {
            Some((b, c)) => (b.trim(), Some(c.trim().to_string())),
            None => (raw.trim(), None),
        };
        if body.is_empty() {
            return None;
        }
        let fields: Vec<&str> = body.split_whitespace().collect();
        if fields.len() < 4 {
            return None;
        }
        Some(FstabLine {
            source: fields[0].to_string(),
            destination: fields[1].to_string(),
            fs_type: fields[2].to_string(),
            options: fields[3].to_string(),
            dump: fields.get(4).and_then(|s| s.parse().ok()).unwrap_or(0),
            passnum: fields.get(5).and_then(|s| s.parse().ok()).unwrap_or(0),
            comment,
        })
    }
}

/// Build the auto basejail nullfs lines for a nullfs-basejail, one per
/// entry in [`BASEJAIL_BASEDIRS`], mounting read-only from the
/// release's root.
pub fn basejail_auto_lines(release_root: &Path, jail_root: &Path) -> Vec<FstabLine> {
    BASEJAIL_BASEDIRS
        .iter()
        .map(|basedir| {
            FstabLine::auto(
                release_root.join(basedir).display().to_string(),
                jail_root.join(basedir).display().to_string(),
                "nullfs",
                "ro",
            )
        })
        .collect()
}

pub struct Fstab {
    path: PathBuf,
    /// Persisted lines only; auto lines are never stored here.
    lines: Vec<FstabLine>,
}

impl Fstab {
    pub fn load(path: impl Into<PathBuf>) -> Result<Fstab, JailError> {
        let path = path.into();
        let mut lines = Vec::new();
        if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            for line in raw.lines() {
                if let Some(parsed) = FstabLine::parse(line) {
                    if !parsed.is_auto() {
                        lines.push(parsed);
                    }
                }
            }
        }
        Ok(Fstab { path, lines })
    }

    pub fn new_line(&self, source: impl Into<String>, destination: impl Into<String>, fs_type: impl Into<String>, options: impl Into<String>) -> FstabLine {
        FstabLine::new(source, destination, fs_type, options)
    }

    /// Add `line`, logging (not erroring) if its destination duplicates
    /// an existing one.
    pub fn add_line(&mut self, line: FstabLine) {
        if self.lines.iter().any(|l| l.destination == line.destination) {
            tracing::error!(destination = %line.destination, "duplicate fstab mount destination");
        }
        self.lines.push(line);
    }

    pub fn replace_path(&mut self, prefix_old: &str, prefix_new: &str) {
        for line in &mut self.lines {
            if let Some(rest) = line.source.strip_prefix(prefix_old) {
                line.source = format!("{prefix_new}{rest}");
            }
            if let Some(rest) = line.destination.strip_prefix(prefix_old) {
                line.destination = format!("{prefix_new}{rest}");
            }
        }
    }

    /// All lines a consumer would see: persisted lines followed by the
    /// auto basejail lines and the hook-script mount line, in that
    /// order. `extra_auto` carries the caller-supplied basejail/hook
    /// lines since deriving them requires release/jail context this
    /// type doesn't hold.
    pub fn iter_with_auto<'a>(&'a self, extra_auto: &'a [FstabLine]) -> impl Iterator<Item = &'a FstabLine> {
        self.lines.iter().chain(extra_auto.iter())
    }

    pub fn destinations(&self) -> HashSet<&str> {
        self.lines.iter().map(|l| l.destination.as_str()).collect()
    }

    /// Persist only the non-auto lines ("save() writes only
    /// non-auto lines").
    pub fn save(&self) -> Result<(), JailError> {
        let mut rendered = String::new();
        for line in &self.lines {
            rendered.push_str(&line.render());
            rendered.push('\n');
        }
        std::fs::write(&self.path, rendered)?;
        Ok(())
    }

    /// Write the full view — persisted lines plus `extra_auto` — to
    /// the actual fstab file `mount.fstab` points `jail -c` at. Unlike
    /// [`Fstab::save`], this is not what a later `load()` should see
    /// as the permanent record: callers recompute `extra_auto` fresh
    /// on every start and never keep it in `self.lines`.
    pub fn write_full(&self, extra_auto: &[FstabLine]) -> Result<(), JailError> {
        let mut rendered = String::new();
        for line in self.iter_with_auto(extra_auto) {
            rendered.push_str(&line.render());
            rendered.push('\n');
        }
        std::fs::write(&self.path, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_non_auto_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fstab");
        std::fs::write(&path, "/host/data\t/jail/data\tnullfs\trw\t0\t0\n").unwrap();

        let mut fstab = Fstab::load(&path).unwrap();
        assert_eq!(fstab.lines.len(), 1);
        fstab.add_line(fstab.new_line("/host/extra", "/jail/extra", "nullfs", "ro"));
        fstab.save().unwrap();

        let reloaded = Fstab::load(&path).unwrap();
        assert_eq!(reloaded.lines.len(), 2);
    }

    #[test]
    fn auto_lines_are_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fstab");
        std::fs::write(
            &path,
            "/releases/13.2/root/bin\t/jails/web1/root/bin\tnullfs\tro\t0\t0\t# iocage-auto\n",
        )
        .unwrap();
        let fstab = Fstab::load(&path).unwrap();
        assert!(fstab.lines.is_empty());
    }

    #[test]
    fn detects_duplicate_destination_without_erroring() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fstab");
        let mut fstab = Fstab::load(&path).unwrap();
        fstab.add_line(fstab.new_line("/a", "/jail/data", "nullfs", "rw"));
        fstab.add_line(fstab.new_line("/b", "/jail/data", "nullfs", "rw"));
        assert_eq!(fstab.lines.len(), 2);
    }

    #[test]
    fn basejail_auto_lines_cover_all_basedirs() {
        let lines = basejail_auto_lines(Path::new("/releases/13.2/root"), Path::new("/jails/web1/root"));
        assert_eq!(lines.len(), BASEJAIL_BASEDIRS.len());
        assert!(lines.iter().all(|l| l.is_auto() && l.fs_type == "nullfs"));
    }
}
