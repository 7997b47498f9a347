//! Error accounting of a host.
//!
//! The counter steps run under `LOCK_EC` and the flag steps under
//! `LOCK_HS`; each is a pure function of the record so the rules can be
//! tested without a status file.

use protocol::ErrorCode;
use status::{HostStatus, host_status};

/// What a failure did to the host.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FailureStep {
    /// Counter after the failure.
    pub error_counter: i32,
    /// `max_errors` was reached.
    pub pending: bool,
    /// The other real host name was switched to.
    pub toggled: bool,
    /// The host exceeded `max_errors`.
    pub not_working: bool,
}

/// What a success did to the host.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SuccessStep {
    /// Errors were pending before.
    pub recovered: bool,
    /// The original real host name was restored.
    pub toggled_back: bool,
}

/// Counts one failure with `code`.
pub fn count_failure(host: &mut HostStatus, code: ErrorCode, now: i64) -> FailureStep {
    host.push_error(code.code());
    if host.error_counter == 0 {
        host.first_error_time = now;
    }
    let max_errors = host.max_errors.max(0);
    host.error_counter = host.error_counter.saturating_add(1).min(max_errors + 1);
    host.total_errors = host.total_errors.saturating_add(1);
    host.last_retry_time = now;

    let mut step = FailureStep {
        error_counter: host.error_counter,
        ..FailureStep::default()
    };
    if max_errors > 0 && host.error_counter == max_errors {
        step.pending = true;
        if host.auto_toggle && !host.other_hostname().is_empty() {
            host.toggle();
            host.successful_retries = 0;
            host.error_counter = 0;
            step.toggled = true;
            step.error_counter = 0;
        }
    }
    step.not_working = host.error_counter > max_errors;
    step
}

/// Sets the status bits for `step`.
pub fn flag_failure(host: &mut HostStatus, step: FailureStep) {
    if step.pending {
        host.host_status |= host_status::PENDING_ERRORS;
    }
    if step.not_working {
        host.host_status |= host_status::NOT_WORKING;
    }
    if step.toggled {
        if host.host_toggle == status::HOST_TWO {
            host.host_status |= host_status::HOST_TWO_FLAG;
        } else {
            host.host_status &= !host_status::HOST_TWO_FLAG;
        }
    }
}

/// Counts one successful job.
pub fn count_success(host: &mut HostStatus, now: i64) -> SuccessStep {
    let mut step = SuccessStep {
        recovered: host.error_counter > 0,
        toggled_back: false,
    };
    host.error_counter = 0;
    host.last_connection = now;
    if host.max_successful_retries > 0 && host.host_toggle != host.original_toggle {
        host.successful_retries += 1;
        if host.successful_retries >= host.max_successful_retries {
            host.host_toggle = host.original_toggle;
            host.successful_retries = 0;
            step.toggled_back = true;
        }
    }
    step
}

/// Clears the error bits after a success. Returns whether any were set.
pub fn flag_success(host: &mut HostStatus, step: SuccessStep) -> bool {
    let bits = host_status::PENDING_ERRORS | host_status::NOT_WORKING | host_status::HOST_WARN_TIME_REACHED;
    let had = host.has_status(bits);
    host.host_status &= !bits;
    if step.toggled_back {
        if host.host_toggle == status::HOST_TWO {
            host.host_status |= host_status::HOST_TWO_FLAG;
        } else {
            host.host_status &= !host_status::HOST_TWO_FLAG;
        }
    }
    had || step.recovered
}

/// Sets `HOST_WARN_TIME_REACHED` when nothing was delivered for longer
/// than `warn_time`. Returns `true` only when the bit was newly set.
pub fn check_warn_time(host: &mut HostStatus, now: i64) -> bool {
    if host.warn_time <= 0
        || host.last_connection <= 0
        || host.has_status(host_status::HOST_WARN_TIME_REACHED)
    {
        return false;
    }
    if now - host.last_connection > host.warn_time {
        host.host_status |= host_status::HOST_WARN_TIME_REACHED;
        return true;
    }
    false
}

/// Whether rule 3 lets the host be tried at `now`.
#[must_use]
pub fn retry_due(host: &HostStatus, now: i64) -> bool {
    host.error_counter == 0
        || host.special_flag & status::special_flag::RETRY_REQUESTED != 0
        || now - host.last_retry_time >= i64::from(host.retry_interval)
}

#[cfg(test)]
mod tests {
    use status::{HOST_ONE, HOST_TWO};

    use super::*;

    fn host(max_errors: i32) -> HostStatus {
        let mut host = HostStatus::new("h2");
        host.real_hostname = ["down".into(), "up".into()];
        host.auto_toggle = true;
        host.max_errors = max_errors;
        host
    }

    fn fail(host: &mut HostStatus, code: ErrorCode, now: i64) -> FailureStep {
        let step = count_failure(host, code, now);
        flag_failure(host, step);
        step
    }

    #[test]
    fn reaching_max_errors_toggles_and_resets() {
        let mut host = host(3);
        for now in 1..=2 {
            let step = fail(&mut host, ErrorCode::ConnectionRefusedError, now);
            assert!(!step.pending);
        }
        assert_eq!(host.first_error_time, 1);
        let step = fail(&mut host, ErrorCode::ConnectionRefusedError, 3);
        assert!(step.pending && step.toggled);
        assert_eq!(host.host_toggle, HOST_TWO);
        assert_eq!(host.active_hostname(), "up");
        assert_eq!(host.error_counter, 0);
        assert_eq!(host.total_errors, 3);
        assert_eq!(host.error_history, [ErrorCode::ConnectionRefusedError.code(), 0, 0, 0, 0]);
        assert!(host.has_status(host_status::PENDING_ERRORS | host_status::HOST_TWO_FLAG));

        let step = count_success(&mut host, 4);
        assert!(flag_success(&mut host, step));
        assert!(!host.has_status(host_status::PENDING_ERRORS));
        assert_eq!(host.last_connection, 4);
    }

    #[test]
    fn without_toggle_the_host_stops_working() {
        let mut host = host(2);
        host.real_hostname[1].clear();
        fail(&mut host, ErrorCode::TimeoutError, 1);
        let pending = fail(&mut host, ErrorCode::TimeoutError, 2);
        assert!(pending.pending && !pending.toggled);
        let over = fail(&mut host, ErrorCode::TimeoutError, 3);
        assert!(over.not_working);
        assert_eq!(host.error_counter, 3);
        // The counter never exceeds max_errors + 1.
        fail(&mut host, ErrorCode::TimeoutError, 4);
        assert_eq!(host.error_counter, 3);
        assert_eq!(host.total_errors, 4);
    }

    #[test]
    fn zero_max_errors_is_offline_after_one_failure() {
        let mut host = host(0);
        let step = fail(&mut host, ErrorCode::ConnectError, 1);
        assert!(step.not_working);
        assert!(host.has_status(host_status::NOT_WORKING));
    }

    #[test]
    fn history_keeps_distinct_codes_newest_first() {
        let mut host = host(100);
        for code in [
            ErrorCode::ConnectError,
            ErrorCode::ConnectError,
            ErrorCode::TimeoutError,
            ErrorCode::WriteRemoteError,
        ] {
            fail(&mut host, code, 1);
        }
        assert_eq!(
            host.error_history[..3],
            [
                ErrorCode::WriteRemoteError.code(),
                ErrorCode::TimeoutError.code(),
                ErrorCode::ConnectError.code()
            ]
        );
    }

    #[test]
    fn successful_retries_restore_the_original_host() {
        let mut host = host(1);
        host.max_successful_retries = 2;
        fail(&mut host, ErrorCode::ConnectError, 1);
        assert_eq!(host.host_toggle, HOST_TWO);
        assert!(!count_success(&mut host, 2).toggled_back);
        let step = count_success(&mut host, 3);
        assert!(step.toggled_back);
        flag_success(&mut host, step);
        assert_eq!(host.host_toggle, HOST_ONE);
        assert!(!host.has_status(host_status::HOST_TWO_FLAG));
    }

    #[test]
    fn retry_interval_gates_hosts_with_errors() {
        let mut host = host(10);
        host.retry_interval = 60;
        assert!(retry_due(&host, 0));
        fail(&mut host, ErrorCode::ConnectError, 100);
        assert!(!retry_due(&host, 159));
        assert!(retry_due(&host, 160));
        host.special_flag |= status::special_flag::RETRY_REQUESTED;
        assert!(retry_due(&host, 101));
    }

    #[test]
    fn warn_time_is_reported_once() {
        let mut host = host(10);
        host.warn_time = 60;
        host.last_connection = 100;
        assert!(!check_warn_time(&mut host, 160));
        assert!(check_warn_time(&mut host, 161));
        assert!(!check_warn_time(&mut host, 200));
        let step = count_success(&mut host, 201);
        flag_success(&mut host, step);
        assert!(!host.has_status(host_status::HOST_WARN_TIME_REACHED));
    }
}
