//! Information about the account running the current process.

use crate::error::{last_error, Result};
use crate::process::Token;
use crate::special_path;
use crate::string::from_wide;
use tracing::debug;
use windows::core::PWSTR;
use windows::Win32::Security::Authentication::Identity::{
    GetUserNameExW, NameDisplay, NameUniqueId, EXTENDED_NAME_FORMAT,
};
use windows::Win32::System::WindowsProgramming::GetUserNameW;

/// SID of the `LocalSystem` account.
pub const LOCAL_SYSTEM_SID: &str = "S-1-5-18";

/// `UNLEN + 1`
const USER_NAME_CAPACITY: usize = 257;
/// Room for display names and `{GUID}` ids.
const EXTENDED_NAME_CAPACITY: usize = 1024;

/// Logon name of the current user.
pub fn user_name() -> Result<String> {
    let mut buffer = [0u16; USER_NAME_CAPACITY];
    let mut len = buffer.len() as u32;
    // SAFETY: buffer holds `len` characters.
    unsafe {
        GetUserNameW(PWSTR(buffer.as_mut_ptr()), &mut len)?;
    }
    from_wide(&buffer)
}

fn extended_name(format: EXTENDED_NAME_FORMAT) -> Result<String> {
    let mut buffer = vec![0u16; EXTENDED_NAME_CAPACITY];
    let mut len = buffer.len() as u32;
    // SAFETY: buffer holds `len` characters.
    let ok = unsafe { GetUserNameExW(format, PWSTR(buffer.as_mut_ptr()), &mut len) };
    if !ok.as_bool() {
        return Err(last_error());
    }
    from_wide(&buffer[..len as usize])
}

fn extended_or_logon_name(format: EXTENDED_NAME_FORMAT) -> Result<String> {
    match extended_name(format) {
        Ok(name) if !name.is_empty() => Ok(name),
        Ok(_) => user_name(),
        Err(e) => {
            debug!(error = %e, "extended name unavailable, using logon name");
            user_name()
        }
    }
}

/// Display name of the current user, e.g. `Jane Doe`.
///
/// Accounts without one (most local accounts) report the logon name.
pub fn display_name() -> Result<String> {
    extended_or_logon_name(NameDisplay)
}

/// Directory GUID of the current user in `{...}` form.
///
/// Only domain accounts have one; others report the logon name.
pub fn user_guid() -> Result<String> {
    extended_or_logon_name(NameUniqueId)
}

/// SID string of the user owning the current process token.
pub fn user_sid() -> Result<String> {
    Token::current_process()?.user_sid()
}

/// Whether the process runs as `LocalSystem`.
///
/// Reports `false` when the token cannot be queried.
pub fn is_system_user() -> bool {
    match user_sid() {
        Ok(sid) => sid == LOCAL_SYSTEM_SID,
        Err(e) => {
            debug!(error = %e, "token user query failed");
            false
        }
    }
}

/// A snapshot of the current user's identity and profile folders.
///
/// Collection never fails as a whole: a field that cannot be read is left
/// empty, [`retrieved_successfully`](Self::retrieved_successfully) turns
/// false and [`last_error`](Self::last_error) keeps the most recent failure.
#[derive(Debug, Clone, Default)]
pub struct UserInformation {
    name: String,
    display_name: String,
    guid: String,
    sid: String,
    home_path: Option<String>,
    local_path: Option<String>,
    roaming_path: Option<String>,
    last_error: Option<String>,
}

impl UserInformation {
    /// Reads everything from the current process token and profile.
    pub fn collect() -> Self {
        let mut info = Self::default();
        info.name = info.record(user_name());
        info.display_name = info.record(display_name());
        info.guid = info.record(user_guid());
        info.sid = info.record(user_sid());

        // SYSTEM has no profile worth reporting; the path helpers already
        // return None in that case.
        info.home_path = special_path::home();
        info.local_path = special_path::local_appdata();
        info.roaming_path = special_path::roaming_appdata();
        info
    }

    fn record(&mut self, value: Result<String>) -> String {
        value.unwrap_or_else(|e| {
            self.last_error = Some(e.to_string());
            String::new()
        })
    }

    /// Logon name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name, or the logon name when the account has none.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Directory GUID, or the logon name outside a domain.
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// SID in `S-1-5-...` form.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Profile folder, with trailing separator.
    pub fn home_path(&self) -> Option<&str> {
        self.home_path.as_deref()
    }

    /// Local application data folder.
    pub fn local_path(&self) -> Option<&str> {
        self.local_path.as_deref()
    }

    /// Roaming application data folder.
    pub fn roaming_path(&self) -> Option<&str> {
        self.roaming_path.as_deref()
    }

    /// Whether the collected SID is `LocalSystem`.
    pub fn is_system_user(&self) -> bool {
        self.sid == LOCAL_SYSTEM_SID
    }

    /// Message of the last failed query, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True when every identity query succeeded.
    pub fn retrieved_successfully(&self) -> bool {
        self.last_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect() {
        let info = UserInformation::collect();
        assert!(info.retrieved_successfully(), "{:?}", info.last_error());
        assert!(!info.name().is_empty());
        assert!(!info.display_name().is_empty());
        assert!(info.guid().starts_with('{') || info.guid() == info.name());
        assert!(info.sid().starts_with("S-1-5-"));
        assert_eq!(info.is_system_user(), is_system_user());
        assert_eq!(info.home_path().is_none(), info.is_system_user());
    }

    #[test]
    fn test_extended_names_fall_back_to_logon_name() {
        let logon = user_name().unwrap();
        match extended_name(NameUniqueId) {
            Ok(guid) if !guid.is_empty() => assert_eq!(user_guid().unwrap(), guid),
            _ => assert_eq!(user_guid().unwrap(), logon),
        }
        match extended_name(NameDisplay) {
            Ok(name) if !name.is_empty() => assert_eq!(display_name().unwrap(), name),
            _ => assert_eq!(display_name().unwrap(), logon),
        }
    }

    #[test]
    fn test_failed_query_is_recorded() {
        let mut info = UserInformation::default();
        let value = info.record(Err(crate::error::Error::not_found("user")));
        assert!(value.is_empty());
        assert!(!info.retrieved_successfully());
        assert!(info.last_error().unwrap().contains("user"));
    }
}
