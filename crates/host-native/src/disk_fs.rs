//! Guest filesystem backed by a host directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tincture_boot::host::{GuestError, GuestFs, paths};
use walkdir::WalkDir;

/// Maps the guest path `/a/b` to `<root>/a/b`.
///
/// `..` components are collapsed before mapping, so no guest path escapes the root.
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, guest: &str) -> PathBuf {
        let normalized = paths::normalize(guest);
        let mut path = self.root.clone();
        for part in normalized.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    fn guest_path(&self, host: &Path) -> Option<String> {
        let relative = host.strip_prefix(&self.root).ok()?;
        let mut guest = String::new();
        for component in relative.components() {
            guest.push('/');
            guest.push_str(&component.as_os_str().to_string_lossy());
        }
        Some(if guest.is_empty() { "/".to_string() } else { guest })
    }
}

fn guest_error(path: &str, e: io::Error) -> GuestError {
    if e.kind() == io::ErrorKind::NotFound {
        GuestError::NotFound(path.to_string())
    } else {
        GuestError::Fs {
            path: path.to_string(),
            message: e.to_string(),
        }
    }
}

impl GuestFs for DiskFs {
    fn walk_files(&self, root: &str) -> Result<Vec<String>, GuestError> {
        let dir = self.host_path(root);
        if !dir.is_dir() {
            return Err(GuestError::NotFound(root.to_string()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| GuestError::Fs {
                path: root.to_string(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(guest) = self.guest_path(entry.path()) {
                files.push(guest);
            }
        }
        Ok(files)
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>, GuestError> {
        let entries = fs::read_dir(self.host_path(dir)).map_err(|e| guest_error(dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| guest_error(dir, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn is_file(&self, path: &str) -> bool {
        self.host_path(path).is_file()
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, GuestError> {
        fs::read(self.host_path(path)).map_err(|e| guest_error(path, e))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), GuestError> {
        fs::write(self.host_path(path), data).map_err(|e| guest_error(path, e))
    }

    fn create_dir_all(&self, path: &str) -> Result<(), GuestError> {
        fs::create_dir_all(self.host_path(path)).map_err(|e| guest_error(path, e))
    }
}
