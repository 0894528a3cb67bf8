//! RAII wrappers for Windows handles.
//!
//! Kernel object handles and Service Control Manager handles are closed by
//! different functions, so each gets its own owner type.

use crate::error::{Error, Result};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Services::{CloseServiceHandle, SC_HANDLE};

/// A kernel object `HANDLE` that is closed when dropped.
///
/// # Example
///
/// ```ignore
/// use winapi_helpers::handle::OwnedHandle;
///
/// // The volume handle is closed at the end of the scope
/// let volume = OwnedHandle::new(raw_volume_handle)?;
/// ```
#[derive(Debug)]
pub struct OwnedHandle {
    handle: HANDLE,
}

impl OwnedHandle {
    /// Takes ownership of a raw `HANDLE`.
    ///
    /// Returns an error if the handle is null or `INVALID_HANDLE_VALUE`.
    #[inline]
    pub fn new(handle: HANDLE) -> Result<Self> {
        if handle.is_invalid() || handle.0.is_null() {
            return Err(Error::invalid_handle("Cannot create OwnedHandle from invalid handle"));
        }
        Ok(Self { handle })
    }

    /// Returns the raw `HANDLE`.
    #[inline]
    pub fn as_raw(&self) -> HANDLE {
        self.handle
    }

    /// Consumes the `OwnedHandle` and returns the raw `HANDLE` without closing it.
    #[inline]
    pub fn into_raw(self) -> HANDLE {
        let handle = self.handle;
        std::mem::forget(self);
        handle
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: We own this handle exclusively and `new` rejected invalid values.
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

impl AsRef<HANDLE> for OwnedHandle {
    fn as_ref(&self) -> &HANDLE {
        &self.handle
    }
}

/// A Service Control Manager or service handle, closed with `CloseServiceHandle`.
#[derive(Debug)]
pub struct ServiceHandle {
    handle: SC_HANDLE,
}

impl ServiceHandle {
    /// Takes ownership of a raw `SC_HANDLE`.
    pub fn new(handle: SC_HANDLE) -> Result<Self> {
        if handle.is_invalid() {
            return Err(Error::invalid_handle("Cannot create ServiceHandle from null handle"));
        }
        Ok(Self { handle })
    }

    /// Returns the raw `SC_HANDLE`.
    #[inline]
    pub fn as_raw(&self) -> SC_HANDLE {
        self.handle
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        // SAFETY: We own this handle and it was checked for null in `new`.
        unsafe {
            let _ = CloseServiceHandle(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Foundation::INVALID_HANDLE_VALUE;

    #[test]
    fn test_invalid_handle_rejected() {
        let result = OwnedHandle::new(INVALID_HANDLE_VALUE);
        assert!(result.is_err());
    }

    #[test]
    fn test_null_handle_rejected() {
        let result = OwnedHandle::new(HANDLE::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_null_service_handle_rejected() {
        let result = ServiceHandle::new(SC_HANDLE::default());
        assert!(matches!(result, Err(Error::InvalidHandle { .. })));
    }
}
