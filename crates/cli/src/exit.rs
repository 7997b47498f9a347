//! Exit statuses of the AFD tools.

/// Success.
pub const SUCCESS: i32 = 0;
/// Usage or unexpected failure.
pub const INCORRECT: i32 = 1;
/// `udc`/`uhc`: reloaded with warnings.
pub const WARNINGS: i32 = 2;
/// `udc`/`uhc`: the configuration has errors.
pub const ERRORS: i32 = 3;
/// `afd`: a supervisor is running.
pub const AFD_IS_ACTIVE: i32 = 5;
/// `afd`: the system administrator disabled the work directory.
pub const AFD_DISABLED_BY_SYSADM: i32 = 6;
/// `afd`: a supervisor holds the fifos but does not answer.
pub const AFD_NOT_RESPONDING: i32 = 9;
/// `afd`: no supervisor is running.
pub const AFD_IS_NOT_ACTIVE: i32 = 10;
/// `afd`: the work directory belongs to another node.
pub const NOT_ON_CORRECT_HOST: i32 = 11;
/// `udc`/`uhc`: the request could not be made.
pub const INTERNAL: i32 = 255;
