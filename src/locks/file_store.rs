//! Lock store backed by a directory shared by every replica set member.
//!
//! Layout: `{dir}/{replset}/backup.{name}.lock`, `restore.{name}.lock` and
//! `pitr.lock`. Lock files are created with create_new semantics so only one
//! process can win a given file; conflicts across lock types are checked
//! before the create and are best-effort only.

use super::metadata::LockMetadata;
use super::store::{LockError, LockStore};
use super::types::{LockHeader, LockInfo, OperationType};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCK_EXTENSION: &str = "lock";
const PITR_LOCK_FILE: &str = "pitr.lock";

/// What was found at a lock path after staleness handling.
#[derive(Debug, PartialEq, Eq)]
enum Existing {
    Missing,
    Live,
}

/// File-backed [`LockStore`].
#[derive(Debug, Clone)]
pub struct FileLockStore {
    dir: PathBuf,
    stale_secs: u64,
}

impl FileLockStore {
    /// Create a store rooted at `dir`. Locks whose heartbeat is older than
    /// `stale_secs` are treated as abandoned.
    pub fn new(dir: impl Into<PathBuf>, stale_secs: u64) -> Self {
        Self {
            dir: dir.into(),
            stale_secs,
        }
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file for `header`.
    pub fn lock_path(&self, header: &LockHeader) -> PathBuf {
        let replset_dir = self.replset_dir(&header.replset);
        match header.op {
            OperationType::Pitr => replset_dir.join(PITR_LOCK_FILE),
            op => replset_dir.join(format!(
                "{}.{}.{}",
                op,
                sanitize(&header.name),
                LOCK_EXTENSION
            )),
        }
    }

    fn replset_dir(&self, replset: &str) -> PathBuf {
        self.dir.join(sanitize(replset))
    }

    /// Lock files that block acquisition of `header` when live.
    fn conflicting_paths(&self, header: &LockHeader) -> Result<Vec<PathBuf>, LockError> {
        let replset_dir = self.replset_dir(&header.replset);
        match header.op {
            OperationType::Backup | OperationType::Restore => {
                Ok(vec![replset_dir.join(PITR_LOCK_FILE)])
            }
            OperationType::Pitr => {
                let entries = match fs::read_dir(&replset_dir) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(e) => {
                        return Err(LockError::Store(format!(
                            "failed to read lock directory '{}': {}",
                            replset_dir.display(),
                            e
                        )));
                    }
                };

                let mut paths = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(|e| {
                        LockError::Store(format!("failed to read lock directory entry: {}", e))
                    })?;
                    let path = entry.path();
                    if is_lock_file(&path)
                        && path.file_name().and_then(|n| n.to_str()) != Some(PITR_LOCK_FILE)
                    {
                        paths.push(path);
                    }
                }
                Ok(paths)
            }
        }
    }

    /// Inspect the lock at `path`, removing it if its holder is gone.
    fn check_existing(&self, path: &Path) -> Result<Existing, LockError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Existing::Missing),
            Err(e) => {
                return Err(LockError::Store(format!(
                    "failed to read lock file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        match serde_json::from_str::<LockMetadata>(&content) {
            Ok(meta) if meta.is_stale(self.stale_secs) => {
                remove_lock_file(path)?;
                Err(LockError::WasStale(meta.header))
            }
            Ok(_) => Ok(Existing::Live),
            // Unparseable content is a holder mid-write unless it has been
            // sitting there longer than the stale threshold.
            Err(_) if self.file_is_stale(path) => {
                remove_lock_file(path)?;
                Ok(Existing::Missing)
            }
            Err(_) => Ok(Existing::Live),
        }
    }

    fn file_is_stale(&self, path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > Duration::from_secs(self.stale_secs))
    }

    fn read_owned(&self, header: &LockHeader) -> Result<(PathBuf, LockMetadata), LockError> {
        let path = self.lock_path(header);
        if !path.exists() {
            return Err(LockError::NotHeld(header.clone()));
        }

        let meta = LockMetadata::from_file(&path)?;
        if meta.header.node != header.node {
            return Err(LockError::NotOwner {
                requested: header.clone(),
                holder: meta.header.node,
            });
        }
        Ok((path, meta))
    }
}

impl LockStore for FileLockStore {
    fn acquire(&self, header: &LockHeader) -> Result<bool, LockError> {
        for path in self.conflicting_paths(header)? {
            if self.check_existing(&path)? == Existing::Live {
                return Ok(false);
            }
        }

        let path = self.lock_path(header);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::Store(format!(
                    "failed to create lock directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let metadata = LockMetadata::new(header);
        match create_lock_file(&path, &metadata) {
            Ok(()) => Ok(true),
            Err(CreateError::Exists) => match self.check_existing(&path)? {
                Existing::Live => Ok(false),
                // The previous holder vanished between the create and the
                // inspection; one more attempt.
                Existing::Missing => match create_lock_file(&path, &metadata) {
                    Ok(()) => Ok(true),
                    Err(CreateError::Exists) => Ok(false),
                    Err(CreateError::Store(e)) => Err(e),
                },
            },
            Err(CreateError::Store(e)) => Err(e),
        }
    }

    fn release(&self, header: &LockHeader) -> Result<(), LockError> {
        let (path, _) = self.read_owned(header)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(LockError::NotHeld(header.clone())),
            Err(e) => Err(LockError::Store(format!(
                "failed to release lock '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn mark_stale(&self, header: &LockHeader) -> Result<(), LockError> {
        remove_lock_file(&self.lock_path(header))
    }

    fn refresh(&self, header: &LockHeader) -> Result<(), LockError> {
        let path = self.lock_path(header);

        // Check and rewrite through one handle: a lock removed or replaced
        // after the open is never recreated or overwritten.
        let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LockError::NotHeld(header.clone()));
            }
            Err(e) => {
                return Err(LockError::Store(format!(
                    "failed to open lock '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        let mut content = String::new();
        file.read_to_string(&mut content).map_err(|e| {
            LockError::Store(format!(
                "failed to read lock file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut meta: LockMetadata = serde_json::from_str(&content).map_err(|e| {
            LockError::Store(format!(
                "failed to parse lock file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let pid = std::process::id();
        if meta.header.node != header.node || meta.pid != Some(pid) {
            let holder = match meta.pid {
                Some(other) if meta.header.node == header.node => {
                    format!("{} (pid {})", meta.header.node, other)
                }
                _ => meta.header.node,
            };
            return Err(LockError::NotOwner {
                requested: header.clone(),
                holder,
            });
        }

        meta.heartbeat = chrono::Utc::now();
        let json = meta.to_json()?;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.set_len(0))
            .and_then(|_| file.write_all(json.as_bytes()))
            .map_err(|e| {
                LockError::Store(format!(
                    "failed to write heartbeat '{}': {}",
                    path.display(),
                    e
                ))
            })
    }

    fn list(&self) -> Result<Vec<LockInfo>, LockError> {
        let mut locks = Vec::new();

        let replsets = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(locks),
            Err(e) => {
                return Err(LockError::Store(format!(
                    "failed to read lock directory '{}': {}",
                    self.dir.display(),
                    e
                )));
            }
        };

        for replset in replsets.flatten() {
            let replset_path = replset.path();
            if !replset_path.is_dir() {
                continue;
            }
            let Ok(entries) = fs::read_dir(&replset_path) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !is_lock_file(&path) {
                    continue;
                }
                // Skip invalid lock files
                let Ok(metadata) = LockMetadata::from_file(&path) else {
                    continue;
                };
                let is_stale = metadata.is_stale(self.stale_secs);
                locks.push(LockInfo {
                    path,
                    metadata,
                    is_stale,
                });
            }
        }

        locks.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(locks)
    }
}

enum CreateError {
    Exists,
    Store(LockError),
}

fn create_lock_file(path: &Path, metadata: &LockMetadata) -> Result<(), CreateError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                CreateError::Exists
            } else {
                CreateError::Store(LockError::Store(format!(
                    "failed to create lock '{}': {}",
                    path.display(),
                    e
                )))
            }
        })?;

    let json = metadata.to_json().map_err(CreateError::Store)?;
    file.write_all(json.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(path);
            CreateError::Store(LockError::Store(format!(
                "failed to write lock metadata '{}': {}",
                path.display(),
                e
            )))
        })
}

fn remove_lock_file(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::Store(format!(
            "failed to remove lock '{}': {}",
            path.display(),
            e
        ))),
    }
}

fn is_lock_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(LOCK_EXTENSION)
}

/// Map a replica set or operation name onto a safe file name component.
pub(crate) fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with('.') {
        out.insert(0, '_');
    }
    out
}
