//! Pool batches under `files/outgoing`.
//!
//! A batch is a directory named by its [`MessageName`] holding the files of
//! one job from one scan. Files enter a batch by hard link, falling back to
//! a copy when the source directory lives on another filesystem. Several
//! jobs fed by the same scan each get their own batch linked to the same
//! inode.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::error::ScanError;
use crate::message::MessageName;

/// One file of a batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolFile {
    /// Name inside the batch, identical to the source name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Full path.
    pub path: PathBuf,
}

/// The pool directory.
#[derive(Clone, Debug)]
pub struct Pool {
    root: PathBuf,
}

impl Pool {
    /// Pool rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Pool root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of batch `name`.
    #[must_use]
    pub fn batch_path(&self, name: &MessageName) -> PathBuf {
        self.root.join(name.to_string())
    }

    /// Device of the pool filesystem, 0 when it cannot be determined.
    #[must_use]
    pub fn device(&self) -> u64 {
        fs::metadata(&self.root).map_or(0, |meta| meta.dev())
    }

    /// Links `sources` into a new batch `name`.
    ///
    /// Either every file lands in the batch or the batch is removed again
    /// and the error returned; the sources are left untouched.
    pub fn create_batch(&self, name: &MessageName, sources: &[&Path]) -> Result<Vec<PoolFile>, ScanError> {
        let batch = self.batch_path(name);
        fs::create_dir_all(&batch).map_err(|error| ScanError::pool("create", &batch, error))?;
        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            match self.link_one(source, &batch) {
                Ok(file) => files.push(file),
                Err(error) => {
                    if let Err(cleanup) = self.remove_batch(name) {
                        tracing::warn!(batch = %batch.display(), %cleanup, "failed to remove partial batch");
                    }
                    return Err(error);
                }
            }
        }
        Ok(files)
    }

    fn link_one(&self, source: &Path, batch: &Path) -> Result<PoolFile, ScanError> {
        let Some(file_name) = source.file_name() else {
            return Err(ScanError::pool(
                "link",
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
            ));
        };
        let target = batch.join(file_name);
        link_or_copy(source, &target).map_err(|error| ScanError::pool("link", source, error))?;
        let size = fs::metadata(&target)
            .map_err(|error| ScanError::pool("stat", &target, error))?
            .len();
        Ok(PoolFile {
            name: file_name.to_string_lossy().into_owned(),
            size,
            path: target,
        })
    }

    /// Files of batch `name`, sorted by name.
    pub fn files(&self, name: &MessageName) -> io::Result<Vec<PoolFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(self.batch_path(name))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            files.push(PoolFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                path: entry.path(),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Removes batch `name` and any parent directories it leaves empty.
    pub fn remove_batch(&self, name: &MessageName) -> io::Result<()> {
        let batch = self.batch_path(name);
        match fs::remove_dir_all(&batch) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error),
        }
        let mut parent = batch.parent();
        while let Some(dir) = parent {
            if dir == self.root || fs::remove_dir(dir).is_err() {
                break;
            }
            parent = dir.parent();
        }
        Ok(())
    }

    /// Every batch currently in the pool.
    ///
    /// Directories whose path does not parse as a message name are skipped.
    pub fn batches(&self) -> io::Result<Vec<MessageName>> {
        let mut names = Vec::new();
        for job in read_dirs(&self.root)? {
            for counter in read_dirs(&job)? {
                for batch in read_dirs(&counter)? {
                    let Ok(relative) = batch.strip_prefix(&self.root) else {
                        continue;
                    };
                    if let Ok(name) = relative.to_string_lossy().parse::<MessageName>() {
                        names.push(name);
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn read_dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Hard-links `from` to `to`, copying when they are on different devices.
pub fn link_or_copy(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => Ok(()),
        Err(error) if error.raw_os_error() == Some(libc::EXDEV) => fs::copy(from, to).map(drop),
        Err(error) => Err(error),
    }
}

/// Moves `from` to `to`, copying and removing across devices.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(error) if error.raw_os_error() == Some(libc::EXDEV) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(unique: u32) -> MessageName {
        MessageName {
            job_id: 0xabc,
            counter: 0,
            creation_time: 0x100,
            unique_number: unique,
            split_job_counter: 0,
        }
    }

    #[test]
    fn batches_share_the_source_inode() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("x.dat");
        fs::write(&source, b"0123456789").unwrap();
        let pool = Pool::new(temp.path().join("pool"));

        let first = pool.create_batch(&name(1), &[source.as_path()]).unwrap();
        let second = pool.create_batch(&name(2), &[source.as_path()]).unwrap();
        assert_eq!(first[0].size, 10);
        assert_eq!(
            fs::metadata(&first[0].path).unwrap().ino(),
            fs::metadata(&second[0].path).unwrap().ino()
        );
        assert!(source.exists(), "sources are removed by the scanner");
        assert_eq!(pool.batches().unwrap(), vec![name(1), name(2)]);
    }

    #[test]
    fn failed_link_removes_the_partial_batch() {
        let temp = tempfile::tempdir().unwrap();
        let good = temp.path().join("a");
        fs::write(&good, b"a").unwrap();
        let missing = temp.path().join("missing");
        let pool = Pool::new(temp.path().join("pool"));

        let error = pool
            .create_batch(&name(1), &[good.as_path(), missing.as_path()])
            .unwrap_err();
        assert!(matches!(error, ScanError::Pool { action: "link", .. }));
        assert!(!pool.batch_path(&name(1)).exists());
        assert!(pool.batches().unwrap().is_empty());
    }

    #[test]
    fn removing_the_last_batch_prunes_empty_parents() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("x");
        fs::write(&source, b"x").unwrap();
        let pool = Pool::new(temp.path().join("pool"));
        pool.create_batch(&name(1), &[source.as_path()]).unwrap();

        assert_eq!(pool.files(&name(1)).unwrap().len(), 1);
        pool.remove_batch(&name(1)).unwrap();
        assert!(!pool.root().join("abc").exists());
        assert!(pool.root().exists());
        pool.remove_batch(&name(1)).unwrap();
    }
}
