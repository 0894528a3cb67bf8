//! Error handling utilities for the helpers.
//!
//! Provides one error type shared by every wrapper. Windows error codes are
//! carried verbatim so callers can tell an OS failure from a plain "not found".

use thiserror::Error;
#[cfg(windows)]
use windows::core::Error as WinError;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A Windows API error with its error code.
    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    Windows(#[from] WinError),

    /// An invalid handle was provided or returned.
    #[error("Invalid handle: {context}")]
    InvalidHandle {
        /// Description of the invalid handle context.
        context: &'static str,
    },

    /// A null pointer was encountered where a valid pointer was expected.
    #[error("Null pointer error: {context}")]
    NullPointer {
        /// Description of where the null pointer was encountered.
        context: &'static str,
    },

    /// A string conversion error occurred.
    #[error("String conversion error: {0}")]
    StringConversion(String),

    /// The requested resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access was denied to the requested resource.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// A partition refresh was abandoned; the previous snapshot is still served.
    #[error("Partition refresh failed, stale data retained: {reason}")]
    Refresh {
        /// Why the drive enumeration failed.
        reason: String,
    },

    /// An operation did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The data has a shape this crate does not handle, like an unknown
    /// registry value type.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// An SQLite error, with the library's result code.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A custom error with a message.
    #[error("{0}")]
    Custom(String),
}

/// A specialized `Result` type for helper operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new invalid handle error with the given context.
    pub fn invalid_handle(context: &'static str) -> Self {
        Error::InvalidHandle { context }
    }

    /// Creates a new null pointer error with the given context.
    pub fn null_pointer(context: &'static str) -> Self {
        Error::NullPointer { context }
    }

    /// Creates a new string conversion error.
    pub fn string_conversion(msg: impl Into<String>) -> Self {
        Error::StringConversion(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new access denied error.
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Error::AccessDenied(msg.into())
    }

    /// Creates a refresh failure error.
    pub fn refresh(reason: impl Into<String>) -> Self {
        Error::Refresh {
            reason: reason.into(),
        }
    }

    /// Creates an unsupported data error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Creates a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    /// Creates a custom error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Error::Custom(msg.into())
    }

    /// Returns the Win32 error code if this is a Windows error.
    ///
    /// HRESULTs wrapping a Win32 code (`0x8007xxxx`) are unwrapped to the
    /// plain code, so the result compares directly with `ERROR_*` constants.
    pub fn win32_error_code(&self) -> Option<u32> {
        match self {
            #[cfg(windows)]
            Error::Windows(e) => {
                let code = e.code().0 as u32;
                if code & 0xFFFF_0000 == 0x8007_0000 {
                    Some(code & 0xFFFF)
                } else {
                    Some(code)
                }
            }
            Error::Io(e) => e.raw_os_error().map(|c| c as u32),
            _ => None,
        }
    }

    /// Returns the primary SQLite result code if this is an SQLite failure.
    pub fn sqlite_code(&self) -> Option<i32> {
        match self {
            Error::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => Some(e.extended_code & 0xFF),
            _ => None,
        }
    }

    /// Returns true if this error means the caller lacks the rights.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied(_)) || self.win32_error_code() == Some(5)
    }

    /// Returns true if this error means "the thing does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self.win32_error_code(), Some(2) | Some(3) | Some(1060))
    }
}

/// Extension trait for converting Windows `Result` types.
#[cfg(windows)]
pub trait ResultExt<T> {
    /// Converts a Windows result to our Result type.
    fn to_result(self) -> Result<T>;
}

#[cfg(windows)]
impl<T> ResultExt<T> for windows::core::Result<T> {
    fn to_result(self) -> Result<T> {
        self.map_err(Error::from)
    }
}

/// Gets the last Windows error as our Error type.
#[cfg(windows)]
pub fn last_error() -> Error {
    Error::Windows(WinError::from_win32())
}

/// Converts a `WIN32_ERROR` status into a `Result`.
#[cfg(windows)]
pub(crate) fn check_win32(err: windows::Win32::Foundation::WIN32_ERROR) -> Result<()> {
    if err == windows::Win32::Foundation::ERROR_SUCCESS {
        Ok(())
    } else {
        Err(Error::Windows(WinError::from(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_message_mentions_stale_data() {
        let err = Error::refresh("GetLogicalDrives returned 0");
        let msg = err.to_string();
        assert!(msg.contains("stale data retained"));
        assert!(msg.contains("GetLogicalDrives"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(Error::not_found("HKCU\\Nope").is_not_found());
        assert!(!Error::custom("boom").is_not_found());
        assert_eq!(Error::timeout("x").win32_error_code(), None);
    }

    #[test]
    fn test_access_denied_classification() {
        assert!(Error::access_denied("HKLM\\SAM\\SAM").is_access_denied());
        assert!(Error::from(std::io::Error::from_raw_os_error(5)).is_access_denied());
        assert!(!Error::not_found("x").is_access_denied());
        assert!(!Error::unsupported("REG_LINK").is_access_denied());
    }

    #[test]
    fn test_sqlite_code_is_primary_code() {
        // SQLITE_IOERR_READ
        let failure = rusqlite::ffi::Error::new(266);
        let err = Error::from(rusqlite::Error::SqliteFailure(failure, None));
        assert_eq!(err.sqlite_code(), Some(10));
        assert_eq!(err.win32_error_code(), None);
        assert_eq!(Error::custom("x").sqlite_code(), None);
    }

    #[test]
    fn test_io_error_code() {
        let err = Error::from(std::io::Error::from_raw_os_error(5));
        assert_eq!(err.win32_error_code(), Some(5));
    }

    #[cfg(windows)]
    #[test]
    fn test_win32_code_unwrapped_from_hresult() {
        use windows::Win32::Foundation::ERROR_ACCESS_DENIED;
        let err = Error::Windows(WinError::from(ERROR_ACCESS_DENIED));
        assert_eq!(err.win32_error_code(), Some(ERROR_ACCESS_DENIED.0));
    }
}
