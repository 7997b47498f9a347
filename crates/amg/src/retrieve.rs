//! Fetching remote directories into `files/incoming/<dir_alias>`.
//!
//! The remote listing is merged into the directory's retrieve list, which
//! decides per entry whether it must be fetched. Fetched files are written
//! under a dot name and renamed when complete, so the local scan that
//! follows never sees a partial file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use config::CompiledDir;
use logging::receive_log;
use protocol::{AdapterRegistry, NullProgress, SessionOptions, TransferError};
use status::{DirStatus, HostStatus, RetrieveList, StatusArray, WorkDir, dir_options, host_status};

use crate::error::ScanError;

/// Result of one retrieval round.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetrieveReport {
    /// Entries in the remote listing.
    pub listed: usize,
    /// Files fetched.
    pub fetched: usize,
    /// Bytes fetched.
    pub bytes: u64,
}

/// Everything a retrieval needs besides the directory itself.
#[derive(Clone, Copy, Debug)]
pub struct RetrieveContext<'a> {
    /// Work directory.
    pub work: &'a WorkDir,
    /// Connectors.
    pub registry: &'a AdapterRegistry,
    /// Host status, for the active real hostname.
    pub hosts: Option<&'a StatusArray<HostStatus>>,
}

/// Lists `dir`'s remote source and fetches whatever its retrieve list asks for.
pub fn retrieve(
    ctx: RetrieveContext<'_>,
    dir: &CompiledDir,
    status: &DirStatus,
    now: i64,
) -> Result<RetrieveReport, ScanError> {
    let Some(remote) = &dir.remote else {
        return Ok(RetrieveReport::default());
    };
    let alias = status.dir_alias.as_str();
    let host = ctx
        .hosts
        .and_then(|hosts| hosts.get_by_alias(&remote.host_alias).ok());
    let disabled = host_status::HOST_CONFIG_HOST_DISABLED | host_status::STOP_TRANSFER_STAT;
    if host.as_ref().is_some_and(|host| host.has_status(disabled)) {
        tracing::debug!(dir = alias, host = %remote.host_alias, "host disabled, retrieval skipped");
        return Ok(RetrieveReport::default());
    }
    let hostname = host
        .as_ref()
        .map(HostStatus::active_hostname)
        .filter(|name| !name.is_empty())
        .unwrap_or(remote.host_alias.as_str());
    let simulate = host
        .as_ref()
        .is_some_and(|host| host.has_status(host_status::SIMULATE_SEND_MODE));
    let options = host.as_ref().map_or_else(SessionOptions::default, |host| SessionOptions {
        block_size: host.block_size.max(1) as usize,
        transfer_timeout: Duration::from_secs(host.transfer_timeout.max(0) as u64),
        ..SessionOptions::default()
    });

    let target = remote.to_target(hostname);
    let failed = |source: TransferError| ScanError::Retrieve {
        dir_alias: alias.to_string(),
        source,
    };
    let incoming = ctx.work.incoming_dir().join(alias);
    fs::create_dir_all(&incoming).map_err(|error| ScanError::pool("create", &incoming, error))?;
    let mut list = RetrieveList::load(&ctx.work.retrieve_list(alias), now)?;

    let mut session = ctx
        .registry
        .connect(&target, &options, simulate)
        .map_err(failed)?;
    let listing = if status.has_option(dir_options::DONT_GET_DIR_LIST) {
        Vec::new()
    } else {
        session.list().map_err(failed)?
    };

    let mut report = RetrieveReport {
        listed: listing.len(),
        ..RetrieveReport::default()
    };
    list.begin_listing();
    let accept_dot = status.has_option(dir_options::ACCEPT_DOT_FILES);
    let mut wanted = Vec::new();
    for entry in &listing {
        if entry.name.starts_with('.') && !accept_dot {
            continue;
        }
        if !dir.groups.iter().any(|group| group.masks.accepts(&entry.name)) {
            continue;
        }
        if list.observe(&entry.name, entry.size, entry.mtime, status.stupid_mode) {
            wanted.push(entry.name.clone());
        }
    }

    let mut outcome = Ok(());
    for name in wanted {
        if status.max_copied_files > 0 && report.fetched >= status.max_copied_files as usize {
            break;
        }
        if !list.assign(&name) {
            continue;
        }
        match fetch_one(session.as_mut(), &incoming, &name) {
            Ok(bytes) => {
                list.mark_retrieved(&name);
                report.fetched += 1;
                report.bytes += bytes;
                receive_log!(info, "{alias}: retrieved {name} ({bytes} bytes) from {hostname}");
                if !status.has_option(dir_options::DO_NOT_REMOVE) {
                    match session.remove(&name) {
                        Ok(()) | Err(TransferError::Unsupported { .. }) => {}
                        Err(error) => receive_log!(warn, "{alias}: failed to remove remote {name}: {error}"),
                    }
                }
            }
            Err(error) => {
                list.release(&name);
                outcome = Err(failed(error));
                break;
            }
        }
    }

    if outcome.is_ok() {
        list.prune_unlisted();
    }
    list.save()?;
    if let Err(error) = session.disconnect() {
        tracing::debug!(dir = alias, %error, "disconnect after retrieval failed");
    }
    outcome.map(|()| report)
}

fn fetch_one(
    session: &mut dyn protocol::Session,
    incoming: &Path,
    name: &str,
) -> Result<u64, TransferError> {
    let partial = incoming.join(format!(".{name}"));
    let bytes = session.receive_file(name, &partial, &mut NullProgress)?;
    fs::rename(&partial, incoming.join(name)).map_err(|source| TransferError::WriteLocal {
        path: partial.clone(),
        source,
    })?;
    Ok(bytes)
}
