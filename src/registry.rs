//! Windows Registry access.
//!
//! Lookups distinguish three outcomes: `Ok(Some(_))` when the value exists,
//! `Ok(None)` when it does not, and `Err(_)` for any other OS failure.

use crate::error::{check_win32, Error, Result};
use crate::string::{from_wide, from_wide_multi, to_wide, to_wide_multi, WideString};
use tracing::debug;
use windows::core::PWSTR;
use windows::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_MORE_DATA, ERROR_NO_MORE_ITEMS, WIN32_ERROR,
};
use windows::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegDeleteTreeW, RegEnumKeyExW, RegEnumValueW, RegOpenKeyExW,
    RegQueryInfoKeyW, RegQueryValueExW, RegSetValueExW, HKEY, HKEY_CLASSES_ROOT,
    HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_ALL_ACCESS,
    KEY_READ, KEY_WOW64_64KEY, REG_BINARY, REG_DWORD, REG_EXPAND_SZ, REG_MULTI_SZ,
    REG_OPTION_NON_VOLATILE, REG_QWORD, REG_SAM_FLAGS, REG_SZ, REG_VALUE_TYPE,
};

/// Longest key name accepted by the registry, in characters.
const MAX_KEY_LENGTH: usize = 255;
/// Longest value name accepted by the registry, in characters.
const MAX_VALUE_NAME: usize = 16_383;

/// Predefined registry root keys.
#[derive(Clone, Copy, Debug)]
pub struct RootKey(pub HKEY);

impl RootKey {
    /// HKEY_CLASSES_ROOT - File associations and COM object registration.
    pub const CLASSES_ROOT: Self = Self(HKEY_CLASSES_ROOT);

    /// HKEY_CURRENT_USER - Settings for the current user.
    pub const CURRENT_USER: Self = Self(HKEY_CURRENT_USER);

    /// HKEY_LOCAL_MACHINE - System-wide settings.
    pub const LOCAL_MACHINE: Self = Self(HKEY_LOCAL_MACHINE);

    /// HKEY_USERS - Settings for all user profiles.
    pub const USERS: Self = Self(HKEY_USERS);

    /// HKEY_CURRENT_CONFIG - Current hardware profile.
    pub const CURRENT_CONFIG: Self = Self(HKEY_CURRENT_CONFIG);
}

/// Registry access rights.
#[derive(Clone, Copy, Debug)]
pub struct Access(pub REG_SAM_FLAGS);

impl Access {
    /// Read access.
    pub const READ: Self = Self(KEY_READ);

    /// Full access.
    pub const ALL: Self = Self(KEY_ALL_ACCESS);

    /// Access the 64-bit registry view from a 32-bit process.
    pub const WOW64_64: Self = Self(KEY_WOW64_64KEY);

    /// Combines two access flags.
    pub fn with(self, other: Self) -> Self {
        Self(REG_SAM_FLAGS(self.0 .0 | other.0 .0))
    }
}

/// A registry value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// A string value (REG_SZ).
    String(String),
    /// An expandable string value (REG_EXPAND_SZ).
    ExpandString(String),
    /// A multi-string value (REG_MULTI_SZ).
    MultiString(Vec<String>),
    /// A 32-bit integer (REG_DWORD).
    Dword(u32),
    /// A 64-bit integer (REG_QWORD).
    Qword(u64),
    /// Binary data (REG_BINARY).
    Binary(Vec<u8>),
}

impl Value {
    /// Gets the value as a string, if it is one.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::ExpandString(s) => Some(s),
            _ => None,
        }
    }

    /// Gets the value as a u32, if it is one.
    pub fn as_dword(&self) -> Option<u32> {
        match self {
            Value::Dword(v) => Some(*v),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "REG_SZ",
            Value::ExpandString(_) => "REG_EXPAND_SZ",
            Value::MultiString(_) => "REG_MULTI_SZ",
            Value::Dword(_) => "REG_DWORD",
            Value::Qword(_) => "REG_QWORD",
            Value::Binary(_) => "REG_BINARY",
        }
    }

    fn encode(&self) -> (REG_VALUE_TYPE, Vec<u8>) {
        fn bytes(wide: Vec<u16>) -> Vec<u8> {
            wide.iter().flat_map(|w| w.to_le_bytes()).collect()
        }

        match self {
            Value::String(s) => (REG_SZ, bytes(to_wide(s))),
            Value::ExpandString(s) => (REG_EXPAND_SZ, bytes(to_wide(s))),
            Value::MultiString(strings) => (REG_MULTI_SZ, bytes(to_wide_multi(strings))),
            Value::Dword(v) => (REG_DWORD, v.to_le_bytes().to_vec()),
            Value::Qword(v) => (REG_QWORD, v.to_le_bytes().to_vec()),
            Value::Binary(data) => (REG_BINARY, data.clone()),
        }
    }

    fn decode(value_type: REG_VALUE_TYPE, buffer: Vec<u8>) -> Result<Self> {
        let wide = || -> Vec<u16> {
            buffer
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect()
        };

        match value_type {
            REG_SZ => Ok(Value::String(from_wide(&wide())?)),
            REG_EXPAND_SZ => Ok(Value::ExpandString(from_wide(&wide())?)),
            REG_MULTI_SZ => Ok(Value::MultiString(from_wide_multi(&wide())?)),
            REG_DWORD => match buffer.get(..4) {
                Some(b) => Ok(Value::Dword(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
                None => Err(Error::custom("Invalid DWORD size")),
            },
            REG_QWORD => match buffer.get(..8) {
                Some(b) => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(b);
                    Ok(Value::Qword(u64::from_le_bytes(raw)))
                }
                None => Err(Error::custom("Invalid QWORD size")),
            },
            REG_BINARY => Ok(Value::Binary(buffer)),
            other => Err(Error::unsupported(format!("registry value type {}", other.0))),
        }
    }
}

fn not_found_as_none<T>(err: WIN32_ERROR, found: impl FnOnce() -> Result<T>) -> Result<Option<T>> {
    if err == ERROR_FILE_NOT_FOUND {
        Ok(None)
    } else {
        check_win32(err)?;
        found().map(Some)
    }
}

/// An open registry key, closed on drop.
#[derive(Debug)]
pub struct RegistryKey {
    hkey: HKEY,
}

impl RegistryKey {
    /// Opens an existing key with read-only or full access.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not exist or access is denied.
    pub fn open(root: RootKey, path: &str, read_only: bool) -> Result<Self> {
        let access = if read_only { Access::READ } else { Access::ALL };
        Self::open_with(root, path, access)
    }

    /// Opens an existing key with explicit access rights.
    pub fn open_with(root: RootKey, path: &str, access: Access) -> Result<Self> {
        Self::try_open(root, path, access)?
            .ok_or_else(|| Error::not_found(format!("registry key {path}")))
    }

    fn try_open(root: RootKey, path: &str, access: Access) -> Result<Option<Self>> {
        let path_wide = WideString::new(path);
        let mut hkey = HKEY::default();

        // SAFETY: root.0 is a predefined or open key, path_wide is a valid
        // null-terminated wide string, hkey is a valid output parameter.
        let err = unsafe { RegOpenKeyExW(root.0, path_wide.as_pcwstr(), 0, access.0, &mut hkey) };
        if err == ERROR_ACCESS_DENIED {
            return Err(Error::access_denied(format!("registry key {path}")));
        }
        not_found_as_none(err, || Ok(Self { hkey }))
    }

    /// Creates a key, or opens it if it already exists, with full access.
    pub fn create(root: RootKey, path: &str) -> Result<Self> {
        let path_wide = WideString::new(path);
        let mut hkey = HKEY::default();

        // SAFETY: All pointers are valid for the duration of the call.
        let err = unsafe {
            RegCreateKeyExW(
                root.0,
                path_wide.as_pcwstr(),
                0,
                None,
                REG_OPTION_NON_VOLATILE,
                KEY_ALL_ACCESS,
                None,
                &mut hkey,
                None,
            )
        };
        check_win32(err)?;

        Ok(Self { hkey })
    }

    /// Checks whether a key exists.
    pub fn exists(root: RootKey, path: &str) -> Result<bool> {
        Ok(Self::try_open(root, path, Access::READ)?.is_some())
    }

    /// Deletes a key with all its subkeys and values.
    ///
    /// Returns `Ok(false)` if the key did not exist.
    pub fn delete_tree(root: RootKey, path: &str) -> Result<bool> {
        let path_wide = WideString::new(path);
        // SAFETY: root.0 is a valid key, path_wide is valid.
        let err = unsafe { RegDeleteTreeW(root.0, path_wide.as_pcwstr()) };
        let deleted = not_found_as_none(err, || Ok(()))?.is_some();
        debug!(path, deleted, "registry tree delete");
        Ok(deleted)
    }

    /// Reads a value of any supported type.
    pub fn value(&self, name: &str) -> Result<Option<Value>> {
        let name_wide = WideString::new(name);
        let mut value_type = REG_VALUE_TYPE::default();
        let mut size = 0u32;

        // SAFETY: First call only asks for the type and size.
        let err = unsafe {
            RegQueryValueExW(
                self.hkey,
                name_wide.as_pcwstr(),
                None,
                Some(&mut value_type),
                None,
                Some(&mut size),
            )
        };
        if err == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if err != ERROR_MORE_DATA {
            check_win32(err)?;
        }

        let mut buffer = vec![0u8; size as usize];

        // SAFETY: buffer holds `size` bytes as reported by the first call.
        let err = unsafe {
            RegQueryValueExW(
                self.hkey,
                name_wide.as_pcwstr(),
                None,
                Some(&mut value_type),
                Some(buffer.as_mut_ptr()),
                Some(&mut size),
            )
        };
        check_win32(err)?;
        buffer.truncate(size as usize);

        Value::decode(value_type, buffer).map(Some)
    }

    /// Writes a value.
    pub fn set_value(&self, name: &str, value: &Value) -> Result<()> {
        let name_wide = WideString::new(name);
        let (value_type, data) = value.encode();

        // SAFETY: self.hkey is open, data outlives the call.
        let err =
            unsafe { RegSetValueExW(self.hkey, name_wide.as_pcwstr(), 0, value_type, Some(&data)) };
        check_win32(err)
    }

    /// Checks whether a value exists in this key.
    pub fn value_exists(&self, name: &str) -> Result<bool> {
        Ok(self.value(name)?.is_some())
    }

    fn typed<T>(
        &self,
        name: &str,
        expected: &str,
        pick: impl FnOnce(Value) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.value(name)? {
            None => Ok(None),
            Some(value) => {
                let kind = value.kind();
                pick(value).map(Some).ok_or_else(|| {
                    Error::custom(format!("Value {name} is {kind}, expected {expected}"))
                })
            }
        }
    }

    /// Reads a `REG_DWORD` value.
    pub fn get_dword(&self, name: &str) -> Result<Option<u32>> {
        self.typed(name, "REG_DWORD", |v| v.as_dword())
    }

    /// Writes a `REG_DWORD` value.
    pub fn set_dword(&self, name: &str, value: u32) -> Result<()> {
        self.set_value(name, &Value::Dword(value))
    }

    /// Reads a `REG_SZ` or `REG_EXPAND_SZ` value.
    pub fn get_string(&self, name: &str) -> Result<Option<String>> {
        self.typed(name, "REG_SZ", |v| match v {
            Value::String(s) | Value::ExpandString(s) => Some(s),
            _ => None,
        })
    }

    /// Writes a `REG_SZ` value.
    pub fn set_string(&self, name: &str, value: &str) -> Result<()> {
        self.set_value(name, &Value::String(value.to_string()))
    }

    /// Reads a `REG_MULTI_SZ` value.
    pub fn get_multi_string(&self, name: &str) -> Result<Option<Vec<String>>> {
        self.typed(name, "REG_MULTI_SZ", |v| match v {
            Value::MultiString(strings) => Some(strings),
            _ => None,
        })
    }

    /// Writes a `REG_MULTI_SZ` value.
    pub fn set_multi_string<S: AsRef<str>>(&self, name: &str, values: &[S]) -> Result<()> {
        let strings = values.iter().map(|s| s.as_ref().to_string()).collect();
        self.set_value(name, &Value::MultiString(strings))
    }

    /// Names of the direct subkeys.
    pub fn subkeys(&self) -> Result<Vec<String>> {
        self.enumerate_names(MAX_KEY_LENGTH + 1, |index, name, len| unsafe {
            // SAFETY: name points to a buffer of *len characters.
            RegEnumKeyExW(self.hkey, index, name, len, None, PWSTR::null(), None, None)
        })
    }

    /// Names of the values stored in this key.
    pub fn values(&self) -> Result<Vec<String>> {
        self.enumerate_names(MAX_VALUE_NAME + 1, |index, name, len| unsafe {
            // SAFETY: name points to a buffer of *len characters.
            RegEnumValueW(self.hkey, index, name, len, None, None, None, None)
        })
    }

    fn enumerate_names(
        &self,
        capacity: usize,
        enumerate: impl Fn(u32, PWSTR, &mut u32) -> WIN32_ERROR,
    ) -> Result<Vec<String>> {
        let mut result = Vec::new();
        let mut buffer = vec![0u16; capacity];

        for index in 0u32.. {
            let mut len = buffer.len() as u32;
            let err = enumerate(index, PWSTR(buffer.as_mut_ptr()), &mut len);
            if err == ERROR_NO_MORE_ITEMS {
                break;
            }
            check_win32(err)?;
            result.push(from_wide(&buffer[..len as usize])?);
        }

        Ok(result)
    }

    /// Number of subkeys and number of values.
    pub fn count_subvalues(&self) -> Result<(u32, u32)> {
        let mut subkeys = 0u32;
        let mut values = 0u32;

        // SAFETY: self.hkey is open; only the two counters are requested.
        let err = unsafe {
            RegQueryInfoKeyW(
                self.hkey,
                PWSTR::null(),
                None,
                None,
                Some(&mut subkeys),
                None,
                None,
                Some(&mut values),
                None,
                None,
                None,
                None,
            )
        };
        check_win32(err)?;

        Ok((subkeys, values))
    }

    /// Returns the raw HKEY handle.
    pub fn as_raw(&self) -> HKEY {
        self.hkey
    }
}

impl Drop for RegistryKey {
    fn drop(&mut self) {
        // SAFETY: We own this key handle and it is not used after drop.
        unsafe {
            let _ = RegCloseKey(self.hkey);
        }
    }
}
