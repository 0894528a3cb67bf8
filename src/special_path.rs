//! Well-known folder locations.
//!
//! Every path returned here ends with a separator, so relative names can be
//! appended directly. Per-user folders are `None` when the process runs as
//! `SYSTEM`, whose profile is never the one callers are interested in.

use crate::string::from_wide_lossy;
use crate::user::is_system_user;
use std::ffi::c_void;
use tracing::debug;
use windows::core::GUID;
use windows::Win32::Foundation::{HANDLE, MAX_PATH};
use windows::Win32::Storage::FileSystem::GetTempPathW;
use windows::Win32::System::Com::CoTaskMemFree;
use windows::Win32::UI::Shell::{
    FOLDERID_LocalAppData, FOLDERID_Profile, FOLDERID_ProgramData, FOLDERID_PublicDesktop,
    FOLDERID_RoamingAppData, FOLDERID_Windows, SHGetKnownFolderPath, KF_FLAG_DEFAULT,
};

const FALLBACK_WINDOWS: &str = r"C:\Windows\";
const FALLBACK_COMMON_DESKTOP: &str = r"C:\Users\Public\Desktop\";
const FALLBACK_TEMP: &str = r"C:\Temp\";
const FALLBACK_SERVICE_LOG: &str = r"C:\Windows\Temp\";

/// Appends a backslash unless the path already ends with `\` or `/`.
pub fn with_trailing_separator(mut path: String) -> String {
    if !path.ends_with(['\\', '/']) {
        path.push('\\');
    }
    path
}

fn known_folder(id: &GUID) -> Option<String> {
    // SAFETY: id points to a static FOLDERID; a null token means the current user.
    let raw = match unsafe { SHGetKnownFolderPath(id, KF_FLAG_DEFAULT, HANDLE::default()) } {
        Ok(raw) => raw,
        Err(e) => {
            debug!(folder = ?id, error = %e, "known folder lookup failed");
            return None;
        }
    };

    // SAFETY: raw is a null-terminated string allocated by the shell, freed
    // with CoTaskMemFree right after copying.
    let path = unsafe { from_wide_lossy(raw.as_wide()) };
    unsafe { CoTaskMemFree(Some(raw.0 as *const c_void)) };

    (!path.is_empty()).then(|| with_trailing_separator(path))
}

fn user_folder(id: &GUID) -> Option<String> {
    if is_system_user() {
        return None;
    }
    known_folder(id)
}

fn temp_path() -> Option<String> {
    let mut buffer = [0u16; MAX_PATH as usize + 1];
    // SAFETY: buffer is a writable slice; the length comes from the slice.
    let len = unsafe { GetTempPathW(Some(&mut buffer)) } as usize;
    if len == 0 || len > buffer.len() {
        return None;
    }
    Some(with_trailing_separator(from_wide_lossy(&buffer[..len])))
}

/// The user profile folder, e.g. `C:\Users\name\`.
pub fn home() -> Option<String> {
    user_folder(&FOLDERID_Profile)
}

/// `%LOCALAPPDATA%`.
pub fn local_appdata() -> Option<String> {
    user_folder(&FOLDERID_LocalAppData)
}

/// `%APPDATA%`.
pub fn roaming_appdata() -> Option<String> {
    user_folder(&FOLDERID_RoamingAppData)
}

/// `%ProgramData%`, available to every account including `SYSTEM`.
pub fn common_appdata() -> Option<String> {
    known_folder(&FOLDERID_ProgramData)
}

/// The public desktop, falling back to `C:\Users\Public\Desktop\`.
pub fn common_desktop() -> String {
    known_folder(&FOLDERID_PublicDesktop).unwrap_or_else(|| FALLBACK_COMMON_DESKTOP.to_string())
}

/// The Windows directory, falling back to `C:\Windows\`.
pub fn windows() -> String {
    known_folder(&FOLDERID_Windows).unwrap_or_else(|| FALLBACK_WINDOWS.to_string())
}

/// The temporary directory of the current user.
///
/// When `GetTempPathW` fails, `C:\Temp\` is created if missing and returned.
pub fn temp() -> String {
    temp_path().unwrap_or_else(|| {
        if let Err(e) = std::fs::create_dir_all(FALLBACK_TEMP) {
            debug!(error = %e, "could not create fallback temp directory");
        }
        FALLBACK_TEMP.to_string()
    })
}

/// `<windows>\Temp\`.
pub fn system_temp() -> String {
    windows() + r"Temp\"
}

/// Where services write their logs: the temp directory, or `C:\Windows\Temp\`.
pub fn service_log() -> String {
    temp_path().unwrap_or_else(|| FALLBACK_SERVICE_LOG.to_string())
}

/// `relative` appended to [`local_appdata`].
pub fn append_to_local(relative: &str) -> Option<String> {
    local_appdata().map(|base| base + relative)
}

/// `relative` appended to [`roaming_appdata`].
pub fn append_to_roaming(relative: &str) -> Option<String> {
    roaming_appdata().map(|base| base + relative)
}

/// `relative` appended to [`home`].
pub fn append_to_home(relative: &str) -> Option<String> {
    home().map(|base| base + relative)
}
