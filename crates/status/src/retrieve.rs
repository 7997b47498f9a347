use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::codec::{get_i32, get_i64, get_str, get_u8, put_i32, put_i64, put_str, put_u8};
use crate::dir::StupidMode;
use crate::header::AFD_WORD_OFFSET;
use crate::host::MAX_FILENAME_LENGTH;
use crate::StatusError;

/// Layout version of retrieve list files.
pub const RETRIEVE_LIST_VERSION: u8 = 3;

/// One remote file seen by a retrieving directory.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RetrieveEntry {
    /// Remote name.
    pub file_name: String,
    /// Claimed by a fetching worker.
    pub assigned: bool,
    /// Whether `mtime` is exact.
    pub got_date: bool,
    /// Completely fetched.
    pub retrieved: bool,
    /// Seen in the most recent listing.
    pub in_list: bool,
    /// Size reported by the last listing, −1 = unknown.
    pub size: i64,
    /// Size at the previous listing.
    pub prev_size: i64,
    /// Modification time, −1 = unknown.
    pub mtime: i64,
}

impl RetrieveEntry {
    const SIZE: usize = 288;

    fn decode(bytes: &[u8]) -> Self {
        Self {
            file_name: get_str(bytes, 0, MAX_FILENAME_LENGTH),
            assigned: get_u8(bytes, 256) != 0,
            got_date: get_u8(bytes, 257) != 0,
            retrieved: get_u8(bytes, 258) != 0,
            in_list: get_u8(bytes, 259) != 0,
            size: get_i64(bytes, 264),
            prev_size: get_i64(bytes, 272),
            mtime: get_i64(bytes, 280),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_str(bytes, 0, MAX_FILENAME_LENGTH, &self.file_name);
        put_u8(bytes, 256, u8::from(self.assigned));
        put_u8(bytes, 257, u8::from(self.got_date));
        put_u8(bytes, 258, u8::from(self.retrieved));
        put_u8(bytes, 259, u8::from(self.in_list));
        put_i64(bytes, 264, self.size);
        put_i64(bytes, 272, self.prev_size);
        put_i64(bytes, 280, self.mtime);
    }
}

/// Persisted listing of a remote directory (`ls_data/<dir_alias>`).
///
/// The file is rewritten as a whole by [`save`](Self::save) through a
/// temporary file that is renamed into place, so a crash leaves either the
/// old or the new list.
#[derive(Clone, Debug)]
pub struct RetrieveList {
    path: PathBuf,
    creation_time: i64,
    entries: Vec<RetrieveEntry>,
}

impl RetrieveList {
    /// Loads the list at `path`, or starts an empty one when it is missing.
    pub fn load(path: &Path, now: i64) -> Result<Self, StatusError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path: path.to_path_buf(),
                    creation_time: now,
                    entries: Vec::new(),
                });
            }
            Err(source) => return Err(StatusError::io("read", path, source)),
        };
        if bytes.len() < AFD_WORD_OFFSET {
            return Err(StatusError::Corrupt {
                path: path.to_path_buf(),
                reason: "retrieve list shorter than its header".into(),
            });
        }
        if bytes[7] != RETRIEVE_LIST_VERSION {
            return Err(StatusError::VersionMismatch {
                path: path.to_path_buf(),
                found: bytes[7],
                expected: RETRIEVE_LIST_VERSION,
            });
        }
        let count = get_i32(&bytes, 0).max(0) as usize;
        let needed = AFD_WORD_OFFSET + count * RetrieveEntry::SIZE;
        if bytes.len() < needed {
            return Err(StatusError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("{count} entries need {needed} bytes"),
            });
        }
        let entries = (0..count)
            .map(|index| {
                let start = AFD_WORD_OFFSET + index * RetrieveEntry::SIZE;
                RetrieveEntry::decode(&bytes[start..start + RetrieveEntry::SIZE])
            })
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            creation_time: get_i64(&bytes, 8),
            entries,
        })
    }

    /// Writes the list back atomically.
    pub fn save(&self) -> Result<(), StatusError> {
        let mut bytes = vec![0_u8; AFD_WORD_OFFSET + self.entries.len() * RetrieveEntry::SIZE];
        put_i32(&mut bytes, 0, self.entries.len() as i32);
        bytes[7] = RETRIEVE_LIST_VERSION;
        put_i64(&mut bytes, 8, self.creation_time);
        for (index, entry) in self.entries.iter().enumerate() {
            let start = AFD_WORD_OFFSET + index * RetrieveEntry::SIZE;
            entry.encode(&mut bytes[start..start + RetrieveEntry::SIZE]);
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|source| StatusError::io("create", dir, source))?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|source| StatusError::io("create", dir, source))?;
        temp.write_all(&bytes)
            .and_then(|()| temp.as_file().sync_data())
            .map_err(|source| StatusError::io("write", temp.path(), source))?;
        temp.persist(&self.path)
            .map_err(|error| StatusError::io("rename into", &self.path, error.error))?;
        Ok(())
    }

    /// Time the list was first created.
    #[must_use]
    pub const fn creation_time(&self) -> i64 {
        self.creation_time
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[RetrieveEntry] {
        &self.entries
    }

    /// Entry for `file_name`.
    #[must_use]
    pub fn get(&self, file_name: &str) -> Option<&RetrieveEntry> {
        self.entries.iter().find(|entry| entry.file_name == file_name)
    }

    /// Clears `in_list` on every entry before a new listing is merged.
    pub fn begin_listing(&mut self) {
        for entry in &mut self.entries {
            entry.in_list = false;
        }
    }

    /// Merges one listed remote entry and reports whether it must be fetched.
    ///
    /// A known entry is skipped when it was retrieved and its size (or exact
    /// date) is unchanged. `GetOnceOnly` never fetches a retrieved name again;
    /// `Yes` always fetches.
    pub fn observe(&mut self, file_name: &str, size: i64, mtime: Option<i64>, mode: StupidMode) -> bool {
        if mode == StupidMode::Yes {
            return true;
        }
        let (got_date, mtime) = mtime.map_or((false, -1), |time| (true, time));
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.file_name == file_name) {
            entry.in_list = true;
            let size_changed = size >= 0 && entry.size != size;
            let date_changed = got_date && entry.got_date && entry.mtime != mtime;
            if entry.retrieved {
                if mode == StupidMode::GetOnceOnly {
                    return false;
                }
                if !size_changed && !date_changed {
                    return false;
                }
                if mode == StupidMode::NotExact && !size_changed {
                    return false;
                }
                entry.retrieved = false;
            }
            entry.prev_size = entry.size;
            entry.size = size;
            entry.mtime = mtime;
            entry.got_date = got_date;
            return !entry.assigned;
        }
        self.entries.push(RetrieveEntry {
            file_name: file_name.to_string(),
            assigned: false,
            got_date,
            retrieved: false,
            in_list: true,
            size,
            prev_size: -1,
            mtime,
        });
        true
    }

    /// Marks `file_name` as claimed by a fetch.
    pub fn assign(&mut self, file_name: &str) -> bool {
        match self.entries.iter_mut().find(|entry| entry.file_name == file_name) {
            Some(entry) if !entry.assigned => {
                entry.assigned = true;
                true
            }
            _ => false,
        }
    }

    /// Records that `file_name` was fetched completely.
    pub fn mark_retrieved(&mut self, file_name: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.file_name == file_name) {
            entry.retrieved = true;
            entry.assigned = false;
        }
    }

    /// Releases a claimed entry after a failed fetch.
    pub fn release(&mut self, file_name: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.file_name == file_name) {
            entry.assigned = false;
        }
    }

    /// Drops entries that vanished from the remote listing.
    pub fn prune_unlisted(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.in_list || entry.assigned);
        before - self.entries.len()
    }

    /// Drops every entry; `DELETE_RETRIEVES_FROM_DIR` uses this.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops the entry for `file_name`.
    pub fn remove(&mut self, file_name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.file_name != file_name);
        before != self.entries.len()
    }
}
