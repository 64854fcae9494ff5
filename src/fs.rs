use std::fs::{self, File, create_dir, rename};
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::debug;
use rustix::fs::{Mode, chmod, symlink};

/// File-system operations the reconciler needs. Paths are absolute host
/// paths; implementations decide where they actually land.
pub trait FileSystem: Send + Sync {
    /// Current content of a file, or None when it does not exist.
    fn read_to_string(&self, path: &Path) -> Result<Option<String>>;

    fn write(&self, path: &Path, contents: &str) -> Result<()>;

    /// Point `link` at `target`, replacing whatever is at `link`.
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Write `contents` only if they differ from what is on disk. Returns
    /// true when the file was written.
    fn converge(&self, path: &Path, contents: &str) -> Result<bool> {
        let current = self
            .read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        if current.as_deref() == Some(contents) {
            debug!("{} is up to date", path.display());
            return Ok(false);
        }
        self.write(path, contents)?;
        debug!("Wrote {}", path.display());
        Ok(true)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostFs;

impl FileSystem for HostFs {
    fn read_to_string(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            mkdir_p(dir, Mode::from(0o755))?;
        }
        atomic_write(path, |mut f| {
            f.write_all(contents.as_bytes())
                .map_err(|e| anyhow!("unable to write {}: {}", path.display(), e))
        })
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        if let Ok(current) = fs::read_link(link)
            && current == target
        {
            return Ok(());
        }
        match fs::remove_file(link) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                return Err(anyhow!("unable to remove {}: {}", link.display(), e));
            }
            _ => (),
        }
        symlink(target, link).map_err(|e| {
            anyhow!(
                "unable to link {} to {}: {}",
                target.display(),
                link.display(),
                e
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub fn mkdir_p<P: AsRef<Path>>(path: P, mode: Mode) -> Result<()> {
    let p = path.as_ref().to_str().ok_or_else(|| anyhow!("invalid path"))?;
    for dir in descending_dirs(p) {
        match create_dir(&dir) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => (),
            Err(e) => return Err(anyhow!("unable to create directory {}: {}", dir, e)),
            Ok(_) => {
                debug!("Created directory {}", &dir);
                chmod(&dir, mode)
                    .map_err(|e| anyhow!("unable to change mode of {}: {}", dir, e))?;
            }
        }
    }
    Ok(())
}

// Given a path, return a list of it and its parents in descending order.
// For example, "/a/b/c", returns the Vector ["/a", "/a/b", "/a/b/c"].
fn descending_dirs(path: &str) -> Vec<String> {
    let dirs = path.split("/").collect::<Vec<&str>>();
    (1..=dirs.len())
        .map(|i| dirs[..i].join("/"))
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn atomic_write<P: AsRef<Path>>(
    path: P,
    write: impl FnOnce(&File) -> Result<()>,
) -> Result<()> {
    let p = path.as_ref();
    let p_str = p.to_string_lossy();

    let dir_name = match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        Some(_) => Path::new("."),
        None => return Err(anyhow!("invalid path {}", p_str)),
    };
    let file_name = p
        .file_name()
        .ok_or_else(|| anyhow!("invalid path {}", p_str))?;
    let file_name_tmp = dir_name.join(format!(".{}.tmp", file_name.to_string_lossy()));

    {
        let f = File::create(&file_name_tmp)
            .context(format!("unable to create {}", file_name_tmp.to_string_lossy()))?;
        write(&f).context(format!("unable to write {}", p_str))?;
        f.sync_all().context(format!("unable to sync {}", p_str))?;
    }

    rename(&file_name_tmp, p).context(format!(
        "unable to rename {} to {}",
        file_name_tmp.to_string_lossy(),
        p_str
    ))?;
    let dir_name_str = dir_name.to_string_lossy();
    let dir = File::open(dir_name).context(format!("unable to open directory {}", dir_name_str))?;
    dir.sync_all()
        .context(format!("unable to sync directory {}", dir_name_str))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_descending_dirs() {
        struct Case<'a> {
            path: &'a str,
            expected: Vec<&'a str>,
        }
        let cases = [
            Case {
                path: "",
                expected: vec![],
            },
            Case {
                path: "/a",
                expected: vec!["/a"],
            },
            Case {
                path: "/etc/sysconfig/network-scripts",
                expected: vec!["/etc", "/etc/sysconfig", "/etc/sysconfig/network-scripts"],
            },
        ];
        for case in cases {
            assert_eq!(case.expected, descending_dirs(case.path));
        }
    }

    #[test]
    fn test_host_fs_read_missing() {
        let dir = TempDir::new().unwrap();
        let result = HostFs.read_to_string(&dir.path().join("nope")).unwrap();
        assert_eq!(None, result);
    }

    #[test]
    fn test_host_fs_converge() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/sysconfig/network-scripts/ifcfg-eth0");

        assert!(HostFs.converge(&path, "DEVICE=eth0\n").unwrap());
        assert_eq!(
            "DEVICE=eth0\n",
            fs::read_to_string(&path).unwrap()
        );
        assert!(!HostFs.converge(&path, "DEVICE=eth0\n").unwrap());
        assert!(HostFs.converge(&path, "DEVICE=eth1\n").unwrap());
        assert_eq!(
            "DEVICE=eth1\n",
            fs::read_to_string(&path).unwrap()
        );
        assert!(!dir.path().join("etc/sysconfig/network-scripts/.ifcfg-eth0.tmp").exists());
    }

    #[test]
    fn test_host_fs_symlink_replaces() {
        let dir = TempDir::new().unwrap();
        let target_a = dir.path().join("a.conf");
        let target_b = dir.path().join("b.conf");
        let link = dir.path().join("dhclient-eth0.conf");

        HostFs.symlink(&target_a, &link).unwrap();
        assert_eq!(target_a, fs::read_link(&link).unwrap());
        HostFs.symlink(&target_a, &link).unwrap();
        HostFs.symlink(&target_b, &link).unwrap();
        assert_eq!(target_b, fs::read_link(&link).unwrap());
    }

    #[test]
    fn test_host_fs_symlink_into_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("missing/dhclient-eth0.conf");
        let err = HostFs
            .symlink(&dir.path().join("a.conf"), &link)
            .unwrap_err();
        assert!(err.to_string().contains("unable to link"));
    }
}
