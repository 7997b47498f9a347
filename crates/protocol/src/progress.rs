/// Observer of a running transfer.
///
/// Workers implement this against the host's `job_status` slot so status
/// viewers see the file in use and how far it got.
pub trait Progress {
    /// A file of `size` bytes is about to be sent or fetched.
    fn file_started(&mut self, name: &str, size: u64);

    /// `bytes` more bytes went over the wire.
    fn transferred(&mut self, bytes: u64);

    /// The current file completed.
    fn file_finished(&mut self);
}

/// Progress observer that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl Progress for NullProgress {
    fn file_started(&mut self, _name: &str, _size: u64) {}

    fn transferred(&mut self, _bytes: u64) {}

    fn file_finished(&mut self) {}
}
