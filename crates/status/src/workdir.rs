use std::io;
use std::path::{Path, PathBuf};

/// Names of the fifos under `fifodir/`.
pub mod fifo {
    /// Commands to AMG.
    pub const AMG_CMD: &str = "amg_cmd.fifo";
    /// Commands to FD.
    pub const FD_CMD: &str = "fd_cmd.fifo";
    /// Delete requests to FD.
    pub const FD_DELETE: &str = "fd_delete.fifo";
    /// Worker completion notifications.
    pub const SF_FIN: &str = "sf_fin.fifo";
    /// AMG to FD job messages.
    pub const MSG: &str = "msg.fifo";
    /// Wakes the FD scheduler.
    pub const FD_WAKE_UP: &str = "fd_wake_up.fifo";
    /// External reconfiguration requests.
    pub const DB_UPDATE: &str = "db_update.fifo";
    /// Prefix of the per-caller reply fifo; the caller's pid is appended.
    pub const DB_UPDATE_REPLY: &str = "db_update_reply.fifo";
    /// Liveness probe.
    pub const PROBE_ONLY: &str = "probe_only.fifo";
    /// Commands to the supervisor.
    pub const AFD_CMD: &str = "afd_cmd.fifo";
    /// Replies from the supervisor.
    pub const AFD_RESP: &str = "afd_resp.fifo";

    /// Every fifo the daemon creates at start.
    pub const ALL: [&str; 10] = [
        AMG_CMD, FD_CMD, FD_DELETE, SF_FIN, MSG, FD_WAKE_UP, DB_UPDATE, PROBE_ONLY, AFD_CMD,
        AFD_RESP,
    ];
}

/// Layout of an AFD work directory.
///
/// All paths are derived from the root passed to [`WorkDir::new`]. Nothing
/// in the engine consults a global location.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Work directory rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fifos and status files.
    #[must_use]
    pub fn fifodir(&self) -> PathBuf {
        self.root.join("fifodir")
    }

    /// Configuration files.
    #[must_use]
    pub fn etc_dir(&self) -> PathBuf {
        self.root.join("etc")
    }

    /// Stream and record logs.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    /// Pool of queued batches.
    #[must_use]
    pub fn pool_dir(&self) -> PathBuf {
        self.root.join("files").join("outgoing")
    }

    /// Quarantine for files that hit a local I/O error.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("files").join("store")
    }

    /// Staging area of retrieved files.
    #[must_use]
    pub fn incoming_dir(&self) -> PathBuf {
        self.root.join("files").join("incoming")
    }

    /// Archive tree.
    #[must_use]
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    /// Message files, one per queued batch.
    #[must_use]
    pub fn messages_dir(&self) -> PathBuf {
        self.root.join("messages")
    }

    /// Retrieve lists.
    #[must_use]
    pub fn ls_data_dir(&self) -> PathBuf {
        self.fifodir().join("ls_data")
    }

    /// Path of fifo `name`.
    #[must_use]
    pub fn fifo(&self, name: &str) -> PathBuf {
        self.fifodir().join(name)
    }

    /// Reply fifo of the DB-update caller with `pid`.
    #[must_use]
    pub fn db_update_reply(&self, pid: i32) -> PathBuf {
        self.fifodir().join(format!("{}.{pid}", fifo::DB_UPDATE_REPLY))
    }

    /// Host status array.
    #[must_use]
    pub fn fsa_status(&self) -> PathBuf {
        self.fifodir().join("fsa_status")
    }

    /// Directory status array.
    #[must_use]
    pub fn fra_status(&self) -> PathBuf {
        self.fifodir().join("fra_status")
    }

    /// Process status block.
    #[must_use]
    pub fn afd_status(&self) -> PathBuf {
        self.fifodir().join("afd.status")
    }

    /// Job registry.
    #[must_use]
    pub fn job_id_data(&self) -> PathBuf {
        self.fifodir().join("job_id_data")
    }

    /// Directory registry.
    #[must_use]
    pub fn directory_names(&self) -> PathBuf {
        self.fifodir().join("directory_names")
    }

    /// Mask registry.
    #[must_use]
    pub fn file_masks(&self) -> PathBuf {
        self.fifodir().join("file_masks")
    }

    /// Queue snapshot written at shutdown.
    #[must_use]
    pub fn fd_msg_queue(&self) -> PathBuf {
        self.fifodir().join("fd_msg_queue")
    }

    /// Retrieve list of `dir_alias`.
    #[must_use]
    pub fn retrieve_list(&self, dir_alias: &str) -> PathBuf {
        self.ls_data_dir().join(dir_alias)
    }

    /// `etc/AFD_CONFIG`.
    #[must_use]
    pub fn afd_config(&self) -> PathBuf {
        self.etc_dir().join("AFD_CONFIG")
    }

    /// `etc/HOST_CONFIG`.
    #[must_use]
    pub fn host_config(&self) -> PathBuf {
        self.etc_dir().join("HOST_CONFIG")
    }

    /// `etc/DIR_CONFIG`.
    #[must_use]
    pub fn dir_config(&self) -> PathBuf {
        self.etc_dir().join("DIR_CONFIG")
    }

    /// `etc/rename.rule`.
    #[must_use]
    pub fn rename_rule(&self) -> PathBuf {
        self.etc_dir().join("rename.rule")
    }

    /// Marker whose presence means the system administrator disabled AFD.
    #[must_use]
    pub fn disabled_marker(&self) -> PathBuf {
        self.etc_dir().join("AFD_DISABLED")
    }

    /// Creates every directory of the layout.
    pub fn create_all(&self) -> io::Result<()> {
        for dir in [
            self.fifodir(),
            self.etc_dir(),
            self.log_dir(),
            self.pool_dir(),
            self.store_dir(),
            self.incoming_dir(),
            self.archive_dir(),
            self.messages_dir(),
            self.ls_data_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        work.create_all().unwrap();
        assert!(work.pool_dir().ends_with("files/outgoing"));
        assert!(work.pool_dir().is_dir());
        assert_eq!(
            work.db_update_reply(77).file_name().unwrap(),
            "db_update_reply.fifo.77"
        );
        assert!(work.retrieve_list("r1").starts_with(work.fifodir()));
    }
}
