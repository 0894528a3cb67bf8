//! Single application instance detection through a named mutex.

use crate::error::Result;
use crate::handle::OwnedHandle;
use crate::string::WideString;
use tracing::debug;
use windows::Win32::Foundation::{GetLastError, ERROR_ALREADY_EXISTS};
use windows::Win32::System::Threading::CreateMutexW;

/// Holds a named mutex for as long as it lives.
///
/// The first process to create the mutex for a given id is the first
/// instance; later processes open the same object and learn that another
/// instance is running.
///
/// # Example
///
/// ```no_run
/// use winapi_helpers::one_instance::SingleInstance;
///
/// let instance = SingleInstance::acquire("Global\\my-agent")?;
/// if !instance.is_first() {
///     return Ok(());
/// }
/// # Ok::<(), winapi_helpers::error::Error>(())
/// ```
#[derive(Debug)]
pub struct SingleInstance {
    _mutex: OwnedHandle,
    first: bool,
}

impl SingleInstance {
    /// Creates or opens the mutex named `id`.
    pub fn acquire(id: &str) -> Result<Self> {
        let name = WideString::new(id);

        // SAFETY: name is a valid null-terminated wide string. GetLastError is
        // read immediately after CreateMutexW to see whether it existed.
        let (handle, existed) = unsafe {
            let handle = CreateMutexW(None, false, name.as_pcwstr());
            let existed = GetLastError() == ERROR_ALREADY_EXISTS;
            (handle, existed)
        };
        let handle = handle?;

        debug!(id, first = !existed, "instance mutex acquired");
        Ok(Self {
            _mutex: OwnedHandle::new(handle)?,
            first: !existed,
        })
    }

    /// True when no other live guard held this id at acquisition.
    pub fn is_first(&self) -> bool {
        self.first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_id(test: &str) -> String {
        format!("winapi-helpers-{test}-{}", crate::process::current_pid())
    }

    #[test]
    fn test_second_guard_is_not_first() {
        let id = unique_id("second");
        let first = SingleInstance::acquire(&id).unwrap();
        let second = SingleInstance::acquire(&id).unwrap();
        assert!(first.is_first());
        assert!(!second.is_first());
    }

    #[test]
    fn test_name_taken_by_other_object_type() {
        use windows::Win32::Foundation::ERROR_INVALID_HANDLE;
        use windows::Win32::System::Threading::CreateEventW;

        let id = unique_id("event");
        let name = WideString::new(&id);
        let event = unsafe { CreateEventW(None, true, false, name.as_pcwstr()) }.unwrap();
        let _event = OwnedHandle::new(event).unwrap();

        let err = SingleInstance::acquire(&id).unwrap_err();
        assert_eq!(err.win32_error_code(), Some(ERROR_INVALID_HANDLE.0));
    }

    #[test]
    fn test_released_after_drop() {
        let id = unique_id("drop");
        drop(SingleInstance::acquire(&id).unwrap());
        assert!(SingleInstance::acquire(&id).unwrap().is_first());
    }
}
