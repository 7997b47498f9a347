use std::fmt;

use serde::Serialize;

macro_rules! error_codes {
    ($($variant:ident = $code:literal => $text:literal,)+) => {
        /// Error code recorded in a host's `error_history`.
        ///
        /// The numeric values are stored in the HSA and shown by observers, so
        /// they never change between releases.
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        #[repr(u8)]
        pub enum ErrorCode {
            $(
                #[doc = $text]
                $variant = $code,
            )+
        }

        impl ErrorCode {
            /// Every code in numeric order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Stored byte.
            #[must_use]
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Parses a stored byte.
            #[must_use]
            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Human-readable description.
            #[must_use]
            pub const fn description(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }
    };
}

error_codes! {
    Success = 0 => "success",
    ConnectError = 1 => "failed to connect",
    UserError = 2 => "remote user rejected",
    PasswordError = 3 => "remote password rejected",
    TypeError = 4 => "failed to set transfer type",
    ListError = 5 => "failed to list remote directory",
    MailError = 6 => "mail server rejected message",
    OpenRemoteError = 10 => "failed to open remote file",
    WriteRemoteError = 11 => "failed to write remote file",
    CloseRemoteError = 12 => "failed to close remote file",
    MoveRemoteError = 13 => "failed to rename remote file",
    ChdirError = 14 => "failed to change remote directory",
    WriteLockError = 15 => "failed to write lock file",
    RemoveLockfileError = 16 => "failed to remove lock file",
    StatError = 17 => "failed to stat file",
    MoveError = 18 => "failed to move file",
    RenameError = 19 => "failed to rename file",
    TimeoutError = 20 => "transfer timeout reached",
    ReadRemoteError = 22 => "failed to read remote file",
    SizeError = 23 => "remote size differs",
    DateError = 24 => "failed to get remote date",
    QuitError = 25 => "failed to disconnect cleanly",
    MkdirError = 26 => "failed to create directory",
    ChownError = 27 => "failed to change owner",
    ConnectionResetError = 28 => "connection reset by peer",
    ConnectionRefusedError = 29 => "connection refused",
    OpenLocalError = 30 => "failed to open local file",
    ReadLocalError = 31 => "failed to read local file",
    LockRegionError = 32 => "failed to lock status region",
    UnlockRegionError = 33 => "failed to unlock status region",
    GotKilled = 34 => "transfer was killed",
    NoMessageFile = 35 => "message file missing",
    RemoteUserError = 36 => "remote rejected the request",
    DataError = 37 => "remote rejected the data",
    WriteLocalError = 38 => "failed to write local file",
    AuthError = 40 => "authentication failed",
    TlsError = 41 => "TLS negotiation failed",
    ExecError = 42 => "command failed",
    SyntaxError = 60 => "invalid recipient or option",
    NoFilesToSend = 61 => "no files to send",
    UnsupportedScheme = 62 => "no adapter for scheme",
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}
