//! Archive of delivered files.
//!
//! A delivered file of a job with an `archive` option is moved to
//! `archive/<user>@<host>/<YYYY>/<DOY>/<job_id>/<name>`, the date being the
//! UTC day of delivery. [`Archive::purge`] removes job directories whose
//! day ended more than the job's archive time ago.

use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use config::{CompiledConfig, Job};
use time::{Date, OffsetDateTime};

const SECONDS_PER_DAY: i64 = 86_400;

/// The archive tree under one root.
#[derive(Clone, Debug)]
pub struct Archive {
    root: PathBuf,
    dir_mode: u32,
}

impl Archive {
    /// Archive under `root`, creating directories with `dir_mode`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, dir_mode: u32) -> Self {
        Self {
            root: root.into(),
            dir_mode,
        }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory, relative to the root, holding `job`'s files delivered at
    /// `time`.
    #[must_use]
    pub fn relative_dir(job: &Job, time: i64) -> PathBuf {
        let user = if job.recipient.user.is_empty() {
            "anonymous"
        } else {
            job.recipient.user.as_str()
        };
        let date = OffsetDateTime::from_unix_timestamp(time)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
            .date();
        PathBuf::from(format!("{user}@{}", job.host_alias()))
            .join(format!("{:04}", date.year()))
            .join(format!("{:03}", date.ordinal()))
            .join(format!("{:x}", job.job_id))
    }

    /// Moves `source` into the archive as `name`; returns the relative
    /// directory it landed in.
    pub fn store(&self, job: &Job, source: &Path, name: &str, now: i64) -> io::Result<PathBuf> {
        let relative = Self::relative_dir(job, now);
        let dir = self.root.join(&relative);
        DirBuilder::new()
            .recursive(true)
            .mode(self.dir_mode)
            .create(&dir)?;
        amg::move_file(source, &dir.join(name))?;
        Ok(relative)
    }

    /// Removes every job directory whose archive time ran out. Jobs no
    /// longer configured keep their files for `default_time` seconds.
    pub fn purge(&self, config: &CompiledConfig, default_time: i64, now: i64) -> io::Result<usize> {
        let mut removed = 0;
        for owner in read_dirs(&self.root)? {
            for year_dir in read_dirs(&owner)? {
                let Some(year) = file_number(&year_dir, 10) else {
                    continue;
                };
                for day_dir in read_dirs(&year_dir)? {
                    let Some(day) = file_number(&day_dir, 10) else {
                        continue;
                    };
                    let Some(day_end) = day_end(year, day) else {
                        continue;
                    };
                    for job_dir in read_dirs(&day_dir)? {
                        let archive_time = file_number(&job_dir, 16)
                            .and_then(|job_id| config.job(job_id as u32))
                            .and_then(|job| job.options.archive_time)
                            .unwrap_or(default_time);
                        if day_end + archive_time <= now {
                            fs::remove_dir_all(&job_dir)?;
                            removed += 1;
                        }
                    }
                    remove_if_empty(&day_dir);
                }
                remove_if_empty(&year_dir);
            }
            remove_if_empty(&owner);
        }
        if removed > 0 {
            tracing::debug!(removed, root = %self.root.display(), "archive purged");
        }
        Ok(removed)
    }
}

fn read_dirs(path: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(path) {
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

fn file_number(path: &Path, radix: u32) -> Option<u64> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| u64::from_str_radix(name, radix).ok())
}

fn day_end(year: u64, ordinal: u64) -> Option<i64> {
    let date = Date::from_ordinal_date(i32::try_from(year).ok()?, u16::try_from(ordinal).ok()?).ok()?;
    Some(date.midnight().assume_utc().unix_timestamp() + SECONDS_PER_DAY)
}

fn remove_if_empty(path: &Path) {
    let _ = fs::remove_dir(path);
}

#[cfg(test)]
mod tests {
    use config::{JobOptions, Recipient};

    use super::*;

    fn job(archive_time: Option<i64>) -> Job {
        Job {
            job_id: 0xabc,
            dir_id: 1,
            dir_alias: "in".into(),
            file_mask_id: 2,
            dir_config_id: 3,
            recipient: Recipient::parse("file://ops@h1/out").unwrap(),
            options: JobOptions {
                archive_time,
                ..JobOptions::default()
            },
            salt: 0,
        }
    }

    #[test]
    fn layout_is_owner_year_day_job() {
        // 2024-02-01 12:00:00 UTC, day 32.
        let dir = Archive::relative_dir(&job(None), 1_706_788_800);
        assert_eq!(dir, PathBuf::from("ops@h1/2024/032/abc"));
    }

    #[test]
    fn store_moves_the_file() {
        let root = tempfile::tempdir().unwrap();
        let archive = Archive::new(root.path().join("archive"), 0o755);
        let source = root.path().join("x.dat");
        fs::write(&source, b"data").unwrap();
        let relative = archive.store(&job(Some(3600)), &source, "x.dat", 1_706_788_800).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(archive.root().join(relative).join("x.dat")).unwrap(), b"data");
    }

    #[test]
    fn purge_waits_for_the_day_to_expire() {
        let root = tempfile::tempdir().unwrap();
        let archive = Archive::new(root.path().join("archive"), 0o755);
        let source = root.path().join("x.dat");
        fs::write(&source, b"data").unwrap();
        let delivered = 1_706_788_800;
        archive.store(&job(Some(3600)), &source, "x.dat", delivered).unwrap();

        // Not configured any more, so the default time applies.
        let config = CompiledConfig::default();
        // Day 32 ends at 2024-02-02 00:00 UTC.
        let day_end = 1_706_832_000;
        assert_eq!(archive.purge(&config, 3600, day_end + 3599).unwrap(), 0);
        assert_eq!(archive.purge(&config, 3600, day_end + 3600).unwrap(), 1);
        assert!(!archive.root().join("ops@h1").exists());
    }
}
