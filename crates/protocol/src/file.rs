//! `file://` adapter: delivery into a local or mounted directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use bandwidth::BandwidthLimiter;

use crate::adapter::{Connector, Deadline, LOCK_FILE_NAME, LockScheme, RemoteEntry, SendRequest, Session};
use crate::error::TransferError;
use crate::progress::Progress;
use crate::scheme::Scheme;
use crate::target::{ConnectionKey, SessionOptions, Target};

/// Connector for [`Scheme::File`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FileConnector;

impl Connector for FileConnector {
    fn connect(
        &self,
        target: &Target,
        options: &SessionOptions,
    ) -> Result<Box<dyn Session>, TransferError> {
        let dir = target_dir(target)?;
        if options.debug {
            logging::trans_db_log!(debug, "file session opened for {}", dir.display());
        }
        Ok(Box::new(FileSession {
            key: target.connection_key(),
            dir,
            options: options.clone(),
            limiter: options.rate_limit.map(BandwidthLimiter::new),
        }))
    }
}

fn target_dir(target: &Target) -> Result<PathBuf, TransferError> {
    let dir = PathBuf::from(&target.path);
    if !dir.is_absolute() {
        return Err(TransferError::InvalidTarget {
            recipient: target.path.clone(),
            reason: "file:// needs an absolute path".into(),
        });
    }
    Ok(dir)
}

struct FileSession {
    key: ConnectionKey,
    dir: PathBuf,
    options: SessionOptions,
    limiter: Option<BandwidthLimiter>,
}

impl FileSession {
    fn ensure_dir(&self) -> Result<(), TransferError> {
        if self.dir.is_dir() {
            return Ok(());
        }
        if !self.options.create_target_dir {
            return Err(TransferError::TargetDirectory {
                path: self.dir.clone(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        fs::create_dir_all(&self.dir).map_err(|source| TransferError::TargetDirectory {
            path: self.dir.clone(),
            source,
        })
    }

    fn copy(
        &mut self,
        source: &mut File,
        source_path: &Path,
        dest: &mut File,
        dest_path: &Path,
        progress: &mut dyn Progress,
        deadline: &Deadline,
    ) -> Result<u64, TransferError> {
        let block = self.options.block_size.max(512);
        let chunk = self
            .limiter
            .as_ref()
            .map_or(block, |limiter| limiter.recommended_chunk(block));
        let mut buffer = vec![0_u8; chunk];
        let mut written = 0_u64;
        loop {
            deadline.check("send")?;
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    return Err(TransferError::ReadLocal {
                        path: source_path.to_path_buf(),
                        source: error,
                    });
                }
            };
            dest.write_all(&buffer[..read])
                .map_err(|error| TransferError::WriteRemote {
                    path: dest_path.to_path_buf(),
                    source: error,
                })?;
            written += read as u64;
            progress.transferred(read as u64);
            if let Some(limiter) = self.limiter.as_mut() {
                let slept = limiter.register(read);
                if self.options.debug && !slept.is_noop() {
                    logging::trans_db_log!(
                        trace,
                        "rate limit held the copy for {} ms",
                        slept.actual().as_millis()
                    );
                }
            }
        }
        Ok(written)
    }
}

impl Session for FileSession {
    fn scheme(&self) -> Scheme {
        Scheme::File
    }

    fn key(&self) -> &ConnectionKey {
        &self.key
    }

    fn change_target(&mut self, target: &Target) -> Result<(), TransferError> {
        self.dir = target_dir(target)?;
        Ok(())
    }

    fn send_file(
        &mut self,
        request: &SendRequest<'_>,
        progress: &mut dyn Progress,
    ) -> Result<u64, TransferError> {
        let deadline = Deadline::after(self.options.transfer_timeout);
        self.ensure_dir()?;

        let mut source = File::open(request.local_path).map_err(|error| TransferError::OpenLocal {
            path: request.local_path.to_path_buf(),
            source: error,
        })?;
        let metadata = source.metadata().map_err(|error| TransferError::ReadLocal {
            path: request.local_path.to_path_buf(),
            source: error,
        })?;
        progress.file_started(request.remote_name, metadata.len());

        let lock_path = self.dir.join(LOCK_FILE_NAME);
        if *request.lock == LockScheme::LockFile {
            File::create(&lock_path).map_err(|error| TransferError::WriteRemote {
                path: lock_path.clone(),
                source: error,
            })?;
        }

        let transit = self.dir.join(request.lock.in_transit_name(request.remote_name));
        let final_path = self.dir.join(request.lock.final_name(request.remote_name));
        let existing = fs::metadata(&transit).map(|meta| meta.len()).unwrap_or(0);
        let resume = request.resume_offset > 0
            && existing == request.resume_offset
            && existing <= metadata.len();

        let mut dest = if resume {
            source
                .seek(SeekFrom::Start(request.resume_offset))
                .map_err(|error| TransferError::ReadLocal {
                    path: request.local_path.to_path_buf(),
                    source: error,
                })?;
            progress.transferred(request.resume_offset);
            OpenOptions::new().append(true).open(&transit)
        } else {
            File::create(&transit)
        }
        .map_err(|error| TransferError::WriteRemote {
            path: transit.clone(),
            source: error,
        })?;

        let written = self.copy(
            &mut source,
            request.local_path,
            &mut dest,
            &transit,
            progress,
            &deadline,
        )?;
        dest.sync_data().map_err(|error| TransferError::WriteRemote {
            path: transit.clone(),
            source: error,
        })?;
        drop(dest);

        if let Some(mode) = request.mode {
            fs::set_permissions(&transit, fs::Permissions::from_mode(mode)).map_err(|error| {
                TransferError::WriteRemote {
                    path: transit.clone(),
                    source: error,
                }
            })?;
        }
        if self.options.keep_time_stamp {
            let mtime = filetime::FileTime::from_last_modification_time(&metadata);
            filetime::set_file_mtime(&transit, mtime).map_err(|error| TransferError::WriteRemote {
                path: transit.clone(),
                source: error,
            })?;
        }
        if transit != final_path {
            fs::rename(&transit, &final_path).map_err(|error| TransferError::Rename {
                from: transit.clone(),
                to: final_path.clone(),
                source: error,
            })?;
        }
        if *request.lock == LockScheme::LockFile {
            let _ = fs::remove_file(&lock_path);
        }
        progress.file_finished();
        if self.options.debug {
            logging::trans_db_log!(debug, "wrote {written} bytes to {}", final_path.display());
        }
        Ok(written)
    }

    fn receive_file(
        &mut self,
        remote_name: &str,
        local_path: &Path,
        progress: &mut dyn Progress,
    ) -> Result<u64, TransferError> {
        let deadline = Deadline::after(self.options.transfer_timeout);
        let remote = self.dir.join(remote_name);
        let mut source = File::open(&remote).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => TransferError::RemoteNotFound {
                name: remote_name.to_string(),
            },
            _ => TransferError::Connect {
                host: remote.display().to_string(),
                source: error,
            },
        })?;
        let size = source.metadata().map(|meta| meta.len()).unwrap_or(0);
        progress.file_started(remote_name, size);
        let mut dest = File::create(local_path).map_err(|error| TransferError::WriteLocal {
            path: local_path.to_path_buf(),
            source: error,
        })?;
        let mut buffer = vec![0_u8; self.options.block_size.max(512)];
        let mut read_total = 0_u64;
        loop {
            deadline.check("receive")?;
            let read = source.read(&mut buffer).map_err(|error| TransferError::Connect {
                host: remote.display().to_string(),
                source: error,
            })?;
            if read == 0 {
                break;
            }
            dest.write_all(&buffer[..read])
                .map_err(|error| TransferError::WriteLocal {
                    path: local_path.to_path_buf(),
                    source: error,
                })?;
            read_total += read as u64;
            progress.transferred(read as u64);
        }
        progress.file_finished();
        Ok(read_total)
    }

    fn list(&mut self) -> Result<Vec<RemoteEntry>, TransferError> {
        let entries = fs::read_dir(&self.dir).map_err(|error| TransferError::Connect {
            host: self.dir.display().to_string(),
            source: error,
        })?;
        let mut listing = Vec::new();
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let mtime = filetime::FileTime::from_last_modification_time(&metadata);
            listing.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len() as i64,
                mtime: Some(mtime.unix_seconds()),
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn remove(&mut self, remote_name: &str) -> Result<(), TransferError> {
        fs::remove_file(self.dir.join(remote_name)).map_err(|_| TransferError::RemoteNotFound {
            name: remote_name.to_string(),
        })
    }

    fn disconnect(self: Box<Self>) -> Result<(), TransferError> {
        if self.options.debug {
            logging::trans_db_log!(debug, "file session for {} closed", self.dir.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;

    fn session(dir: &Path, create: bool) -> Box<dyn Session> {
        let options = SessionOptions {
            create_target_dir: create,
            ..SessionOptions::default()
        };
        FileConnector
            .connect(&Target::local(dir.to_str().unwrap()), &options)
            .unwrap()
    }

    #[test]
    fn relative_path_is_rejected() {
        let error = FileConnector
            .connect(&Target::local("out"), &SessionOptions::default())
            .err()
            .unwrap();
        assert!(matches!(error, TransferError::InvalidTarget { .. }));
    }

    #[test]
    fn dot_lock_leaves_only_final_name() {
        let temp = tempfile::tempdir().unwrap();
        let pool = temp.path().join("x.dat");
        fs::write(&pool, vec![7_u8; 1024]).unwrap();
        let out = temp.path().join("out");
        let mut session = session(&out, true);
        let sent = session
            .send_file(
                &SendRequest {
                    local_path: &pool,
                    remote_name: "x.dat",
                    resume_offset: 0,
                    lock: &LockScheme::Dot,
                    mode: Some(0o640),
                },
                &mut NullProgress,
            )
            .unwrap();
        assert_eq!(sent, 1024);
        assert_eq!(fs::read(out.join("x.dat")).unwrap().len(), 1024);
        assert!(!out.join(".x.dat").exists());
        let mode = fs::metadata(out.join("x.dat")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn missing_directory_without_create_is_transient() {
        let temp = tempfile::tempdir().unwrap();
        let pool = temp.path().join("x");
        fs::write(&pool, b"x").unwrap();
        let mut session = session(&temp.path().join("absent"), false);
        let error = session
            .send_file(
                &SendRequest {
                    local_path: &pool,
                    remote_name: "x",
                    resume_offset: 0,
                    lock: &LockScheme::Off,
                    mode: None,
                },
                &mut NullProgress,
            )
            .unwrap_err();
        assert!(matches!(error, TransferError::TargetDirectory { .. }));
    }

    #[test]
    fn resume_appends_after_offset() {
        let temp = tempfile::tempdir().unwrap();
        let pool = temp.path().join("x");
        fs::write(&pool, b"0123456789").unwrap();
        let out = temp.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join(".x"), b"0123").unwrap();
        let mut session = session(&out, false);
        let sent = session
            .send_file(
                &SendRequest {
                    local_path: &pool,
                    remote_name: "x",
                    resume_offset: 4,
                    lock: &LockScheme::Dot,
                    mode: None,
                },
                &mut NullProgress,
            )
            .unwrap();
        assert_eq!(sent, 6);
        assert_eq!(fs::read(out.join("x")).unwrap(), b"0123456789");
    }

    #[test]
    fn lists_and_fetches_regular_files() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("b"), b"bb").unwrap();
        fs::write(temp.path().join("a"), b"a").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        let mut session = session(temp.path(), false);
        let names: Vec<_> = session.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["a", "b"]);

        let local = temp.path().join("sub").join("b.copy");
        assert_eq!(session.receive_file("b", &local, &mut NullProgress).unwrap(), 2);
        assert!(matches!(
            session.receive_file("zz", &local, &mut NullProgress),
            Err(TransferError::RemoteNotFound { .. })
        ));
    }
}
