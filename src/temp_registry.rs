//! `TempRegistry` + cleanup guard, spec §4.7: a process-unique temp
//! directory whose every registered path is deleted on any exit path
//! (normal completion, interrupt, panic, or error), unless `keep_tmp_files`
//! is set. Generalizes the teacher's `InstanceLivedTempDir`
//! (`tempfile::TempDir` wrapper that leaks on unwind) to track individual
//! registered files, not just the directory itself.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{info, warn};

use crate::error::{FqError, FqResult};

pub struct TempRegistry {
    dir: Option<tempfile::TempDir>,
    paths: Mutex<HashSet<PathBuf>>,
    keep_tmp_files: bool,
}

impl TempRegistry {
    /// Creates a process-unique temp directory under `root` (the system
    /// temp dir if `None`), named `fasterq.<pid>.<tid>` per spec §6.
    pub fn new(root: Option<&Path>, keep_tmp_files: bool) -> FqResult<Self> {
        let pid = std::process::id();
        let tid = thread_id();
        let prefix = format!("fasterq.{pid}.{tid}");

        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => builder
                .tempdir_in(root)
                .map_err(|e| FqError::Resource(format!("cannot create temp dir in {}: {e}", root.display())))?,
            None => builder
                .tempdir()
                .map_err(|e| FqError::Resource(format!("cannot create temp dir: {e}")))?,
        };

        Ok(TempRegistry {
            dir: Some(dir),
            paths: Mutex::new(HashSet::new()),
            keep_tmp_files,
        })
    }

    pub fn dir_path(&self) -> &Path {
        self.dir.as_ref().expect("dir_path called after teardown").path()
    }

    /// Builds a path under the temp directory and registers it. Does not
    /// create the file; callers create it themselves.
    pub fn new_path(&self, name: &str) -> PathBuf {
        let path = self.dir_path().join(name);
        self.register(path.clone());
        path
    }

    /// A uniquely named intermediate sub-file, per spec §6 "named uniquely
    /// per stage and instance".
    pub fn new_subfile_path(&self, stage: &str) -> PathBuf {
        self.new_path(&format!("{stage}-{}", nanoid::nanoid!()))
    }

    /// Registers a path that was created by some other means (e.g. a
    /// fixed-name shard or lookup file) so cleanup still finds it.
    pub fn register(&self, path: PathBuf) {
        self.paths.lock().expect("temp registry poisoned").insert(path);
    }

    /// Deletes one file now and forgets it, used when a stage consumes and
    /// removes an intermediate file before final teardown (e.g. FileMerger
    /// deleting merged sub-files, Concatenator draining shards).
    pub fn remove_now(&self, path: &Path) -> FqResult<()> {
        self.paths.lock().expect("temp registry poisoned").remove(path);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FqError::Resource(format!("cannot remove {}: {e}", path.display()))),
        }
    }

    /// Explicit teardown point for the happy path. The actual work happens
    /// in `Drop`, so this is equivalent to just letting `self` go out of
    /// scope; it exists so call sites can name the moment cleanup is meant
    /// to happen instead of relying on scope exit being obvious.
    pub fn cleanup(self) {}
}

impl Drop for TempRegistry {
    /// Deletes every registered path, then the temp directory itself,
    /// regardless of how the run ended: normal return, `?`-propagated
    /// error, or unwind from a panic. A no-op (besides logging) when
    /// `keep_tmp_files` was requested. This is what makes cleanup
    /// unconditional per spec §4.7 rather than something only the success
    /// path remembers to do.
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else { return };

        if self.keep_tmp_files {
            info!("keep_tmp_files set, leaving {} in place", dir.path().display());
            let _ = dir.keep();
            return;
        }

        let paths: Vec<PathBuf> = {
            let guard = self.paths.lock().expect("temp registry poisoned");
            guard.iter().cloned().collect()
        };
        for path in paths {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to remove temp file {}: {e}", path.display());
                }
            }
        }
        // `dir` removes the directory tree itself on drop here.
    }
}

fn thread_id() -> u64 {
    // `std::thread::ThreadId` has no stable numeric accessor; hash it to
    // get a stable-enough-for-a-filename integer instead.
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}
