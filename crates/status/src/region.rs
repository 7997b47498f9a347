use std::fs::{File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use memmap2::{Mmap, MmapMut};
use rustc_hash::FxHashMap;

use crate::header::{AFD_WORD_OFFSET, Header, STALE};
use crate::{StatusError, sys};

/// Fixed-size record stored in a status file.
pub trait Record: Clone + Send + Sync {
    /// Encoded size in bytes.
    const SIZE: usize;
    /// Layout version written into the header.
    const VERSION: u8;

    /// Decodes one record from exactly [`Self::SIZE`] bytes.
    fn decode(bytes: &[u8]) -> Self;

    /// Encodes into exactly [`Self::SIZE`] bytes.
    fn encode(&self, bytes: &mut [u8]);

    /// Alias under which the record can be looked up.
    fn key(&self) -> String;
}

/// How a status file is mapped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    /// Updates allowed.
    ReadWrite,
    /// Snapshots only.
    ReadOnly,
}

/// Byte range inside a record guarded by a region lock.
///
/// A zero `len` covers the whole record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LockSlot {
    /// Offset of the guarded field inside the record.
    pub offset: usize,
    /// Length of the guarded range.
    pub len: usize,
}

impl LockSlot {
    /// Lock over the complete record.
    pub const WHOLE: Self = Self { offset: 0, len: 0 };

    /// Lock over `len` bytes at `offset`.
    #[must_use]
    pub const fn field(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }
}

enum Mapping {
    Write(MmapMut),
    Read(Mmap),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Write(map) => map,
            Self::Read(map) => map,
        }
    }
}

struct Mapped {
    file: File,
    map: Mapping,
    header: Header,
    index: FxHashMap<String, usize>,
}

/// Memory-mapped array of fixed-size records behind a 16-byte header.
///
/// All updates go through [`update`](Self::update), which holds the
/// in-process write lock and an exclusive `fcntl` lock on the record range
/// named by the [`LockSlot`]. Only bytes that the closure changed are
/// written back, leaving fields owned by other writers untouched.
///
/// [`rebuild`](Self::rebuild) replaces the file by writing a new one next to
/// it and renaming it into place. The old file is flagged [`STALE`] so other
/// processes mapping it know to reopen; [`refresh`](Self::refresh) does that.
pub struct StatusArray<R: Record> {
    path: PathBuf,
    access: Access,
    inner: RwLock<Mapped>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> std::fmt::Debug for StatusArray<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusArray")
            .field("path", &self.path)
            .field("access", &self.access)
            .field("len", &self.len())
            .finish()
    }
}

impl<R: Record> StatusArray<R> {
    /// Creates (or replaces) the file at `path` holding `records`.
    pub fn create(path: &Path, records: &[R]) -> Result<Self, StatusError> {
        write_file(path, records, 0)?;
        Self::open(path, Access::ReadWrite)
    }

    /// Maps an existing file, validating its header.
    pub fn open(path: &Path, access: Access) -> Result<Self, StatusError> {
        let mapped = map_file::<R>(path, access)?;
        Ok(Self {
            path: path.to_path_buf(),
            access,
            inner: RwLock::new(mapped),
            _record: PhantomData,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().header.count
    }

    /// Whether the array holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Generation of the mapped file.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.read().header.generation
    }

    /// Index of the record whose [`Record::key`] is `alias`.
    #[must_use]
    pub fn position(&self, alias: &str) -> Option<usize> {
        self.read().index.get(alias).copied()
    }

    /// Decodes record `index`.
    pub fn get(&self, index: usize) -> Result<R, StatusError> {
        let mapped = self.read();
        let range = record_range::<R>(&mapped.header, index)?;
        Ok(R::decode(&mapped.map.bytes()[range]))
    }

    /// Decodes the record stored under `alias`.
    pub fn get_by_alias(&self, alias: &str) -> Result<R, StatusError> {
        let index = self.require(alias)?;
        self.get(index)
    }

    /// Decodes every record in file order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<R> {
        let mapped = self.read();
        let bytes = mapped.map.bytes();
        (0..mapped.header.count)
            .map(|index| {
                let start = AFD_WORD_OFFSET + index * R::SIZE;
                R::decode(&bytes[start..start + R::SIZE])
            })
            .collect()
    }

    /// Applies `f` to record `index` under the region lock `slot`.
    pub fn update<T>(
        &self,
        index: usize,
        slot: LockSlot,
        f: impl FnOnce(&mut R) -> T,
    ) -> Result<T, StatusError> {
        let mut mapped = self.write();
        let range = record_range::<R>(&mapped.header, index)?;
        let (lock_offset, lock_len) = if slot.len == 0 {
            (range.start, R::SIZE)
        } else {
            (range.start + slot.offset, slot.len)
        };

        let Mapped { file, map, .. } = &mut *mapped;
        let Mapping::Write(map) = map else {
            return Err(StatusError::ReadOnly {
                path: self.path.clone(),
            });
        };

        sys::lock_range(file, lock_offset, lock_len, true)
            .map_err(|source| StatusError::io("lock", &self.path, source))?;
        // Compared against the bytes as decoded, not as they are now: fields
        // outside `slot` may change under another writer's lock meanwhile.
        let original = map[range.clone()].to_vec();
        let mut record = R::decode(&original);
        let result = f(&mut record);
        let mut encoded = vec![0_u8; R::SIZE];
        record.encode(&mut encoded);
        let bytes = &mut map[range];
        for ((live, before), new) in bytes.iter_mut().zip(&original).zip(&encoded) {
            if before != new {
                *live = *new;
            }
        }
        let unlocked = sys::unlock_range(file, lock_offset, lock_len);

        let key = record.key();
        if !mapped.index.contains_key(&key) {
            mapped.index.retain(|_, position| *position != index);
            mapped.index.insert(key, index);
        }
        unlocked.map_err(|source| StatusError::io("unlock", &self.path, source))?;
        Ok(result)
    }

    /// Like [`update`](Self::update) but addressed by alias.
    pub fn update_by_alias<T>(
        &self,
        alias: &str,
        slot: LockSlot,
        f: impl FnOnce(&mut R) -> T,
    ) -> Result<T, StatusError> {
        let index = self.require(alias)?;
        self.update(index, slot, f)
    }

    /// Replaces the file with `records`, bumping the generation.
    ///
    /// Holders of this array see the new records immediately; other
    /// processes find the old file flagged stale.
    pub fn rebuild(&self, records: &[R]) -> Result<(), StatusError> {
        let mut mapped = self.write();
        if self.access == Access::ReadOnly {
            return Err(StatusError::ReadOnly {
                path: self.path.clone(),
            });
        }
        let generation = mapped.header.generation.wrapping_add(1);
        write_file(&self.path, records, generation)?;
        if let Mapping::Write(map) = &mut mapped.map {
            map[4] |= STALE;
            let _ = map.flush_range(0, AFD_WORD_OFFSET);
        }
        *mapped = map_file::<R>(&self.path, self.access)?;
        tracing::debug!(
            path = %self.path.display(),
            generation,
            count = records.len(),
            "status file rebuilt"
        );
        Ok(())
    }

    /// Reopens the file by path when the mapped copy has been replaced.
    ///
    /// Returns `true` when a new mapping was installed.
    pub fn refresh(&self) -> Result<bool, StatusError> {
        let replaced = {
            let mapped = self.read();
            let current = Header::decode(mapped.map.bytes());
            current.is_stale() || current.generation != mapped.header.generation
        };
        if !replaced {
            return Ok(false);
        }
        let mut mapped = self.write();
        *mapped = map_file::<R>(&self.path, self.access)?;
        Ok(true)
    }

    /// Flushes dirty pages to the file.
    pub fn flush(&self) -> Result<(), StatusError> {
        let mapped = self.read();
        if let Mapping::Write(map) = &mapped.map {
            map.flush()
                .map_err(|source| StatusError::io("flush", &self.path, source))?;
        }
        Ok(())
    }

    fn require(&self, alias: &str) -> Result<usize, StatusError> {
        self.position(alias).ok_or_else(|| StatusError::UnknownAlias {
            alias: alias.to_string(),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Mapped> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Mapped> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_range<R: Record>(
    header: &Header,
    index: usize,
) -> Result<std::ops::Range<usize>, StatusError> {
    if index >= header.count {
        return Err(StatusError::OutOfRange {
            index,
            count: header.count,
        });
    }
    let start = AFD_WORD_OFFSET + index * R::SIZE;
    Ok(start..start + R::SIZE)
}

fn write_file<R: Record>(path: &Path, records: &[R], generation: u32) -> Result<(), StatusError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|source| StatusError::io("create", dir, source))?;

    let mut bytes = vec![0_u8; AFD_WORD_OFFSET + records.len() * R::SIZE];
    Header {
        count: records.len(),
        flags: 0,
        version: R::VERSION,
        pagesize: sys::page_size(),
        generation,
    }
    .encode(&mut bytes);
    for (index, record) in records.iter().enumerate() {
        let start = AFD_WORD_OFFSET + index * R::SIZE;
        record.encode(&mut bytes[start..start + R::SIZE]);
    }

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|source| StatusError::io("create", dir, source))?;
    temp.write_all(&bytes)
        .and_then(|()| temp.as_file().sync_data())
        .map_err(|source| StatusError::io("write", temp.path(), source))?;
    temp.persist(path)
        .map_err(|error| StatusError::io("rename into", path, error.error))?;
    Ok(())
}

fn map_file<R: Record>(path: &Path, access: Access) -> Result<Mapped, StatusError> {
    let file = OpenOptions::new()
        .read(true)
        .write(access == Access::ReadWrite)
        .open(path)
        .map_err(|source| StatusError::io("open", path, source))?;
    let map = match access {
        Access::ReadWrite => Mapping::Write(
            sys::map_mut(&file).map_err(|source| StatusError::io("map", path, source))?,
        ),
        Access::ReadOnly => {
            Mapping::Read(sys::map(&file).map_err(|source| StatusError::io("map", path, source))?)
        }
    };

    let bytes = map.bytes();
    if bytes.len() < AFD_WORD_OFFSET {
        return Err(StatusError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("{} bytes is shorter than the header", bytes.len()),
        });
    }
    let header = Header::decode(bytes);
    if header.version != R::VERSION {
        return Err(StatusError::VersionMismatch {
            path: path.to_path_buf(),
            found: header.version,
            expected: R::VERSION,
        });
    }
    let needed = AFD_WORD_OFFSET + header.count * R::SIZE;
    if bytes.len() < needed {
        return Err(StatusError::Corrupt {
            path: path.to_path_buf(),
            reason: format!(
                "{} records need {needed} bytes, file has {}",
                header.count,
                bytes.len()
            ),
        });
    }

    let mut index = FxHashMap::default();
    for position in 0..header.count {
        let start = AFD_WORD_OFFSET + position * R::SIZE;
        let key = R::decode(&bytes[start..start + R::SIZE]).key();
        index.entry(key).or_insert(position);
    }
    Ok(Mapped {
        file,
        map,
        header,
        index,
    })
}
