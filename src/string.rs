//! String conversion utilities for Windows APIs.
//!
//! Windows APIs use UTF-16 encoded strings (wide strings), while Rust uses UTF-8.
//! The conversions themselves are platform-independent; only the pointer
//! helpers handed to Windows APIs are Windows-only.

use crate::error::{Error, Result};

/// Converts a Rust string to a null-terminated UTF-16 vector.
///
/// # Example
///
/// ```
/// use winapi_helpers::string::to_wide;
///
/// let wide = to_wide("C:\\");
/// assert_eq!(wide, vec![67, 58, 92, 0]);
/// ```
#[inline]
pub fn to_wide(s: &str) -> Vec<u16> {
    // UTF-16 length is at most the UTF-8 length, +1 for the terminator.
    let mut result = Vec::with_capacity(s.len() + 1);
    result.extend(s.encode_utf16());
    result.push(0);
    result
}

/// Converts a UTF-16 slice to a Rust `String`, stopping at the first null.
///
/// # Example
///
/// ```
/// use winapi_helpers::string::{to_wide, from_wide};
///
/// let wide = to_wide("NTFS");
/// assert_eq!(from_wide(&wide).unwrap(), "NTFS");
/// ```
#[inline]
pub fn from_wide(wide: &[u16]) -> Result<String> {
    let len = wide_len(wide);
    String::from_utf16(&wide[..len]).map_err(|_| Error::string_conversion("Invalid UTF-16 sequence"))
}

/// Like [`from_wide`], replacing invalid sequences instead of failing.
#[inline]
pub fn from_wide_lossy(wide: &[u16]) -> String {
    String::from_utf16_lossy(&wide[..wide_len(wide)])
}

/// Length of a possibly null-terminated UTF-16 buffer, without the terminator.
#[inline]
pub fn wide_len(wide: &[u16]) -> usize {
    wide.iter().position(|&c| c == 0).unwrap_or(wide.len())
}

/// Encodes strings as a `REG_MULTI_SZ` style block: each string null-terminated,
/// followed by an extra null.
pub fn to_wide_multi<I, S>(strings: I) -> Vec<u16>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut block = Vec::new();
    for s in strings {
        block.extend(s.as_ref().encode_utf16());
        block.push(0);
    }
    block.push(0);
    block
}

/// Decodes a double-null-terminated block into its strings.
///
/// Empty entries are skipped.
pub fn from_wide_multi(block: &[u16]) -> Result<Vec<String>> {
    block
        .split(|&c| c == 0)
        .filter(|s| !s.is_empty())
        .map(from_wide)
        .collect()
}

/// Converts a null-terminated UTF-16 pointer to a Rust `String`.
///
/// # Safety
///
/// The caller must ensure that `ptr` is either null (reported as an error) or
/// points to a readable, null-terminated UTF-16 string that stays valid for
/// the duration of the call.
pub unsafe fn from_wide_ptr(ptr: *const u16) -> Result<String> {
    if ptr.is_null() {
        return Err(Error::null_pointer("from_wide_ptr received null pointer"));
    }

    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }

    // SAFETY: The string is null-terminated at position `len`.
    let slice = std::slice::from_raw_parts(ptr, len);
    from_wide(slice)
}

/// An owned null-terminated wide string for passing to Windows APIs.
#[derive(Clone, Debug)]
pub struct WideString {
    buffer: Vec<u16>,
}

impl WideString {
    /// Creates a new `WideString` from a Rust string.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self { buffer: to_wide(s) }
    }

    /// Returns a pointer to the null-terminated wide string.
    #[inline]
    pub fn as_ptr(&self) -> *const u16 {
        self.buffer.as_ptr()
    }

    /// Returns the string as a PCWSTR for use with Windows APIs.
    #[cfg(windows)]
    #[inline]
    pub fn as_pcwstr(&self) -> windows::core::PCWSTR {
        windows::core::PCWSTR::from_raw(self.buffer.as_ptr())
    }

    /// Returns the length in UTF-16 code units, not including the null terminator.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    /// Returns true if the string is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the underlying buffer, including the terminator.
    #[inline]
    pub fn as_slice(&self) -> &[u16] {
        &self.buffer
    }

    /// Converts back to a Rust String.
    pub fn to_string_lossy(&self) -> String {
        from_wide_lossy(&self.buffer)
    }
}

impl From<&str> for WideString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for WideString {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let original = "Volume Ω";
        let wide = to_wide(original);
        assert_eq!(from_wide(&wide).unwrap(), original);
    }

    #[test]
    fn test_empty_string() {
        let wide = to_wide("");
        assert_eq!(wide, vec![0]);
        assert_eq!(from_wide(&wide).unwrap(), "");
    }

    #[test]
    fn test_fixed_buffer_stops_at_null() {
        let mut buffer = [0u16; 16];
        for (slot, unit) in buffer.iter_mut().zip("FAT32".encode_utf16()) {
            *slot = unit;
        }
        assert_eq!(wide_len(&buffer), 5);
        assert_eq!(from_wide_lossy(&buffer), "FAT32");
    }

    #[test]
    fn test_invalid_utf16_rejected() {
        let broken = [0xD800u16, 0];
        assert!(matches!(from_wide(&broken), Err(Error::StringConversion(_))));
        assert_eq!(from_wide_lossy(&broken), "\u{FFFD}");
    }

    #[test]
    fn test_multi_string_block() {
        let block = to_wide_multi(["Tcpip", "Afd"]);
        assert_eq!(block.iter().filter(|&&c| c == 0).count(), 3);
        assert_eq!(from_wide_multi(&block).unwrap(), vec!["Tcpip", "Afd"]);
        assert!(from_wide_multi(&to_wide_multi(Vec::<String>::new())).unwrap().is_empty());
    }

    #[test]
    fn test_wide_string_len() {
        let ws = WideString::new("\\\\.\\C:");
        assert_eq!(ws.len(), 6);
        assert_eq!(ws.to_string_lossy(), "\\\\.\\C:");
        assert!(WideString::from("").is_empty());
    }

    #[test]
    fn test_from_wide_ptr_null() {
        // SAFETY: null is explicitly handled.
        let result = unsafe { from_wide_ptr(std::ptr::null()) };
        assert!(result.is_err());
    }
}
