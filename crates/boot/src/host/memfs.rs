//! In-memory guest filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::paths;
use super::traits::{GuestError, GuestFs};

#[derive(Default)]
struct FsState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

/// Thread-safe in-memory [`GuestFs`].
///
/// Directories must exist before files are written into them, like the
/// Emscripten filesystem the browser engine exposes. [`MemoryFs::insert_file`]
/// creates missing parents for fixture setup.
pub struct MemoryFs {
    state: Mutex<FsState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut state = FsState::default();
        state.dirs.insert("/".to_string());
        Self {
            state: Mutex::new(state),
        }
    }

    /// Write a file, creating parent directories as needed.
    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let path = paths::normalize(path);
        let mut state = self.lock();
        add_dirs(&mut state, paths::parent(&path));
        state.files.insert(path, data.into());
    }

    /// Snapshot of every file path currently stored.
    pub fn file_paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FsState> {
        // A poisoned lock only means a test panicked mid-write; the map is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

fn add_dirs(state: &mut FsState, dir: &str) {
    let dir = paths::normalize(dir);
    let mut current = String::new();
    state.dirs.insert("/".to_string());
    for part in dir.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        state.dirs.insert(current.clone());
    }
}

fn child_prefix(dir: &str) -> String {
    if dir == "/" {
        "/".to_string()
    } else {
        format!("{dir}/")
    }
}

impl GuestFs for MemoryFs {
    fn walk_files(&self, root: &str) -> Result<Vec<String>, GuestError> {
        let root = paths::normalize(root);
        let state = self.lock();
        if !state.dirs.contains(&root) {
            return Err(GuestError::NotFound(root));
        }
        let prefix = child_prefix(&root);
        Ok(state
            .files
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>, GuestError> {
        let dir = paths::normalize(dir);
        let state = self.lock();
        if !state.dirs.contains(&dir) {
            return Err(GuestError::NotFound(dir));
        }
        let prefix = child_prefix(&dir);
        let direct_child = |p: &String| -> Option<String> {
            let rest = p.strip_prefix(&prefix)?;
            if rest.is_empty() || rest.contains('/') {
                None
            } else {
                Some(rest.to_string())
            }
        };
        let mut entries: BTreeSet<String> = state.files.keys().filter_map(direct_child).collect();
        entries.extend(state.dirs.iter().filter_map(direct_child));
        Ok(entries.into_iter().collect())
    }

    fn is_file(&self, path: &str) -> bool {
        self.lock().files.contains_key(&paths::normalize(path))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, GuestError> {
        let path = paths::normalize(path);
        self.lock()
            .files
            .get(&path)
            .cloned()
            .ok_or(GuestError::NotFound(path))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), GuestError> {
        let path = paths::normalize(path);
        let mut state = self.lock();
        let parent = paths::parent(&path).to_string();
        if !state.dirs.contains(&parent) {
            return Err(GuestError::NotFound(parent));
        }
        if state.dirs.contains(&path) {
            return Err(GuestError::Fs {
                path,
                message: "is a directory".to_string(),
            });
        }
        state.files.insert(path, data.to_vec());
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> Result<(), GuestError> {
        let mut state = self.lock();
        add_dirs(&mut state, path);
        Ok(())
    }
}
