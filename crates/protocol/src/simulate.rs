use crate::adapter::{Connector, SendRequest, Session};
use crate::error::TransferError;
use crate::progress::Progress;
use crate::scheme::Scheme;
use crate::target::{ConnectionKey, SessionOptions, Target};

/// Connector used while a host is in simulate-send mode.
///
/// Files are reported as delivered with their full size; the remote is
/// never contacted.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulateConnector;

impl Connector for SimulateConnector {
    fn connect(
        &self,
        target: &Target,
        _options: &SessionOptions,
    ) -> Result<Box<dyn Session>, TransferError> {
        Ok(Box::new(SimulateSession {
            key: target.connection_key(),
        }))
    }
}

struct SimulateSession {
    key: ConnectionKey,
}

impl Session for SimulateSession {
    fn scheme(&self) -> Scheme {
        self.key.scheme
    }

    fn key(&self) -> &ConnectionKey {
        &self.key
    }

    fn change_target(&mut self, _target: &Target) -> Result<(), TransferError> {
        Ok(())
    }

    fn send_file(
        &mut self,
        request: &SendRequest<'_>,
        progress: &mut dyn Progress,
    ) -> Result<u64, TransferError> {
        let size = std::fs::metadata(request.local_path)
            .map_err(|source| TransferError::OpenLocal {
                path: request.local_path.to_path_buf(),
                source,
            })?
            .len();
        progress.file_started(request.remote_name, size);
        progress.transferred(size);
        progress.file_finished();
        Ok(size)
    }

    fn disconnect(self: Box<Self>) -> Result<(), TransferError> {
        Ok(())
    }
}
