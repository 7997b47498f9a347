//! Stream logging macros.
//!
//! Each macro takes a sign keyword (`info`, `warn`, `error`, `debug`,
//! `trace`, `config`, `fatal`, `offline`) followed by ordinary `format!`
//! arguments.

#[doc(hidden)]
#[macro_export]
macro_rules! __stream_event {
    ($target:expr, info, $($arg:tt)+) => {
        $crate::tracing::info!(target: $target, $($arg)+)
    };
    ($target:expr, warn, $($arg:tt)+) => {
        $crate::tracing::warn!(target: $target, $($arg)+)
    };
    ($target:expr, error, $($arg:tt)+) => {
        $crate::tracing::error!(target: $target, $($arg)+)
    };
    ($target:expr, debug, $($arg:tt)+) => {
        $crate::tracing::debug!(target: $target, $($arg)+)
    };
    ($target:expr, trace, $($arg:tt)+) => {
        $crate::tracing::trace!(target: $target, $($arg)+)
    };
    ($target:expr, config, $($arg:tt)+) => {
        $crate::tracing::warn!(target: $target, sign = "C", $($arg)+)
    };
    ($target:expr, fatal, $($arg:tt)+) => {
        $crate::tracing::error!(target: $target, sign = "F", $($arg)+)
    };
    ($target:expr, offline, $($arg:tt)+) => {
        $crate::tracing::info!(target: $target, sign = "O", $($arg)+)
    };
}

/// Writes a line to the System log.
///
/// ```
/// logging::system_log!(info, "AMG started with {} directories", 3);
/// ```
#[macro_export]
macro_rules! system_log {
    ($sign:ident, $($arg:tt)+) => {
        $crate::__stream_event!("afd::system", $sign, $($arg)+)
    };
}

/// Writes a line to the Receive log.
#[macro_export]
macro_rules! receive_log {
    ($sign:ident, $($arg:tt)+) => {
        $crate::__stream_event!("afd::receive", $sign, $($arg)+)
    };
}

/// Writes a line to the Transfer log.
#[macro_export]
macro_rules! transfer_log {
    ($sign:ident, $($arg:tt)+) => {
        $crate::__stream_event!("afd::transfer", $sign, $($arg)+)
    };
}

/// Writes a line to the Transfer-Debug log.
#[macro_export]
macro_rules! trans_db_log {
    ($sign:ident, $($arg:tt)+) => {
        $crate::__stream_event!("afd::transfer_debug", $sign, $($arg)+)
    };
}
