//! Process management utilities.
//!
//! Launching command lines, killing processes by executable name, and querying
//! the privileges of the current process token.

use crate::error::{Error, Result};
use crate::handle::OwnedHandle;
use crate::string::{from_wide, from_wide_lossy, to_wide, WideString};
use std::borrow::Cow;
use std::ffi::c_void;
use std::time::Duration;
use tracing::{debug, info, warn};
use windows::core::PWSTR;
use windows::Win32::Foundation::{
    CloseHandle, LocalFree, BOOL, ERROR_CANCELLED, HANDLE, HLOCAL, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows::Win32::Security::Authorization::ConvertSidToStringSidW;
use windows::Win32::Security::{
    AllocateAndInitializeSid, CheckTokenMembership, FreeSid, GetTokenInformation, TokenElevation,
    TokenUser, PSID, SID_IDENTIFIER_AUTHORITY, TOKEN_ELEVATION, TOKEN_QUERY, TOKEN_USER,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{
    CreateProcessW, GetCurrentProcess, GetCurrentProcessId, GetExitCodeProcess, OpenProcess,
    OpenProcessToken, TerminateProcess, WaitForSingleObject, CREATE_NO_WINDOW, INFINITE,
    PROCESS_ACCESS_RIGHTS, PROCESS_CREATION_FLAGS, PROCESS_INFORMATION,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE, STARTUPINFOW,
};
use windows::Win32::UI::Shell::{ShellExecuteExW, SHELLEXECUTEINFOW};

/// How long [`execute`] waits in [`ExecMode::Wait`].
pub const EXECUTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit code given to processes terminated by [`pkill`].
pub const PKILL_EXIT_CODE: u32 = 9;

/// `SECURITY_NT_AUTHORITY`
const NT_AUTHORITY: SID_IDENTIFIER_AUTHORITY = SID_IDENTIFIER_AUTHORITY {
    Value: [0, 0, 0, 0, 0, 5],
};
const SECURITY_BUILTIN_DOMAIN_RID: u32 = 0x20;
const DOMAIN_ALIAS_RID_ADMINS: u32 = 0x220;
/// `SW_NORMAL`
const SHOW_NORMAL: i32 = 1;

/// A running or completed process.
#[derive(Debug)]
pub struct Process {
    handle: OwnedHandle,
    pid: u32,
}

impl Process {
    /// Opens an existing process by its process ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the process doesn't exist or access is denied.
    pub fn open(pid: u32, access: ProcessAccess) -> Result<Self> {
        // SAFETY: OpenProcess accepts any pid; failure is reported as an error.
        let handle = unsafe { OpenProcess(access.0, false, pid)? };
        Ok(Self {
            handle: OwnedHandle::new(handle)?,
            pid,
        })
    }

    /// Returns the process ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Waits for the process to exit and returns its exit code.
    pub fn wait(&self) -> Result<u32> {
        self.wait_timeout(None)
    }

    /// Waits for the process to exit, failing with [`Error::Timeout`] if it
    /// is still running after `timeout`.
    pub fn wait_timeout(&self, timeout: Option<Duration>) -> Result<u32> {
        let timeout_ms = timeout
            .map(|d| u32::try_from(d.as_millis()).unwrap_or(INFINITE - 1))
            .unwrap_or(INFINITE);

        // SAFETY: self.handle is a process handle we own.
        let result = unsafe { WaitForSingleObject(self.handle.as_raw(), timeout_ms) };

        match result {
            WAIT_OBJECT_0 => self.exit_code(),
            WAIT_TIMEOUT => Err(Error::timeout(format!(
                "process {} still running after {timeout_ms} ms",
                self.pid
            ))),
            _ => Err(crate::error::last_error()),
        }
    }

    /// Gets the exit code; `STILL_ACTIVE` (259) while running.
    pub fn exit_code(&self) -> Result<u32> {
        let mut exit_code = 0u32;
        // SAFETY: self.handle is a valid process handle; exit_code is a valid output.
        unsafe {
            GetExitCodeProcess(self.handle.as_raw(), &mut exit_code)?;
        }
        Ok(exit_code)
    }

    /// Terminates the process immediately.
    pub fn terminate(&self, exit_code: u32) -> Result<()> {
        // SAFETY: self.handle was opened with PROCESS_TERMINATE or created by us.
        unsafe {
            TerminateProcess(self.handle.as_raw(), exit_code)?;
        }
        Ok(())
    }
}

/// Process access rights for opening existing processes.
#[derive(Clone, Copy, Debug)]
pub struct ProcessAccess(pub PROCESS_ACCESS_RIGHTS);

impl ProcessAccess {
    /// Access to query limited information.
    pub const QUERY: Self = Self(PROCESS_QUERY_LIMITED_INFORMATION);

    /// Access to terminate the process.
    pub const TERMINATE: Self = Self(PROCESS_TERMINATE);
}

/// Whether [`execute`] returns right after spawning or waits for exit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecMode {
    /// Return once the process has been created.
    Async,
    /// Wait up to [`EXECUTE_TIMEOUT`] for the process to exit.
    #[default]
    Wait,
}

/// Builder for a process command line.
#[derive(Debug, Clone)]
pub struct Command {
    program: String,
    args: Vec<String>,
    creation_flags: PROCESS_CREATION_FLAGS,
}

impl Command {
    /// Creates a command for the specified program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            creation_flags: PROCESS_CREATION_FLAGS(0),
        }
    }

    /// Adds an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Creates the process without a console window.
    pub fn no_window(mut self) -> Self {
        self.creation_flags.0 |= CREATE_NO_WINDOW.0;
        self
    }

    /// The quoted command line passed to `CreateProcessW`.
    pub fn command_line(&self) -> String {
        let mut cmd = quote_arg(&self.program).into_owned();
        for arg in &self.args {
            cmd.push(' ');
            cmd.push_str(&quote_arg(arg));
        }
        cmd
    }

    /// Spawns the process.
    pub fn spawn(&self) -> Result<Process> {
        spawn_command_line(&self.command_line(), self.creation_flags)
    }

    /// Spawns the process and waits for it to complete.
    pub fn run(&self) -> Result<u32> {
        self.spawn()?.wait()
    }
}

fn spawn_command_line(command_line: &str, flags: PROCESS_CREATION_FLAGS) -> Result<Process> {
    // CreateProcessW may write into the command line buffer.
    let mut command_line_wide = to_wide(command_line);
    let startup_info = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        ..Default::default()
    };
    let mut process_info = PROCESS_INFORMATION::default();

    // SAFETY: command_line_wide is a mutable null-terminated buffer that
    // outlives the call; startup_info and process_info are valid structs.
    unsafe {
        CreateProcessW(
            None,
            PWSTR(command_line_wide.as_mut_ptr()),
            None,
            None,
            false,
            flags,
            None,
            None,
            &startup_info,
            &mut process_info,
        )?;
    }

    if !process_info.hThread.is_invalid() {
        // SAFETY: The thread handle was returned to us and is not used again.
        unsafe {
            let _ = CloseHandle(process_info.hThread);
        }
    }

    debug!(command_line, pid = process_info.dwProcessId, "process created");
    Ok(Process {
        handle: OwnedHandle::new(process_info.hProcess)?,
        pid: process_info.dwProcessId,
    })
}

/// Runs a command line.
///
/// With [`ExecMode::Wait`] the call fails with [`Error::Timeout`] if the
/// process has not exited within [`EXECUTE_TIMEOUT`]; the process itself is
/// left running. The exit code is not inspected.
pub fn execute(command_line: &str, mode: ExecMode) -> Result<()> {
    let process = spawn_command_line(command_line, PROCESS_CREATION_FLAGS(0))?;
    if mode == ExecMode::Wait {
        process.wait_timeout(Some(EXECUTE_TIMEOUT))?;
    }
    Ok(())
}

/// Terminates every process whose executable name matches `name`
/// (case-insensitive), except the calling process.
///
/// Returns how many processes were terminated. Processes that cannot be
/// opened or terminated are skipped.
pub fn pkill(name: &str) -> Result<usize> {
    let own_pid = current_pid();
    let mut killed = 0;

    for (pid, exe) in process_list()? {
        if pid == own_pid || !exe.eq_ignore_ascii_case(name) {
            continue;
        }
        let outcome = Process::open(pid, ProcessAccess::TERMINATE)
            .and_then(|process| process.terminate(PKILL_EXIT_CODE));
        match outcome {
            Ok(()) => killed += 1,
            Err(e) => warn!(pid, exe, error = %e, "could not terminate process"),
        }
    }

    debug!(name, killed, "pkill finished");
    Ok(killed)
}

/// Snapshot of running processes as `(pid, executable name)` pairs.
pub fn process_list() -> Result<Vec<(u32, String)>> {
    // SAFETY: Snapshotting all processes has no preconditions.
    let snapshot = OwnedHandle::new(unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)? })?;

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };
    let mut processes = Vec::new();

    // SAFETY: snapshot is a valid toolhelp handle and entry.dwSize is set.
    let mut more = unsafe { Process32FirstW(snapshot.as_raw(), &mut entry) }.is_ok();
    while more {
        processes.push((entry.th32ProcessID, from_wide_lossy(&entry.szExeFile)));
        // SAFETY: As above.
        more = unsafe { Process32NextW(snapshot.as_raw(), &mut entry) }.is_ok();
    }

    Ok(processes)
}

/// The access token of the current process.
#[derive(Debug)]
pub struct Token {
    handle: OwnedHandle,
}

impl Token {
    /// Opens the current process token for querying.
    pub fn current_process() -> Result<Self> {
        let mut handle = HANDLE::default();
        // SAFETY: GetCurrentProcess returns a pseudo-handle; handle is a valid output.
        unsafe {
            OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut handle)?;
        }
        Ok(Self {
            handle: OwnedHandle::new(handle)?,
        })
    }

    /// Checks if the token is elevated.
    pub fn is_elevated(&self) -> Result<bool> {
        let mut elevation = TOKEN_ELEVATION::default();
        let mut size = 0u32;

        // SAFETY: elevation is a correctly sized output buffer.
        unsafe {
            GetTokenInformation(
                self.handle.as_raw(),
                TokenElevation,
                Some(&mut elevation as *mut _ as *mut c_void),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut size,
            )?;
        }

        Ok(elevation.TokenIsElevated != 0)
    }

    /// String form (`S-1-5-...`) of the token user's SID.
    pub fn user_sid(&self) -> Result<String> {
        let mut size = 0u32;
        // SAFETY: Size query only; the call fails with ERROR_INSUFFICIENT_BUFFER.
        let _ = unsafe { GetTokenInformation(self.handle.as_raw(), TokenUser, None, 0, &mut size) };
        if size == 0 {
            return Err(crate::error::last_error());
        }

        // u64 storage keeps TOKEN_USER suitably aligned.
        let mut buffer = vec![0u64; (size as usize).div_ceil(8)];
        // SAFETY: buffer holds at least `size` bytes.
        unsafe {
            GetTokenInformation(
                self.handle.as_raw(),
                TokenUser,
                Some(buffer.as_mut_ptr() as *mut c_void),
                size,
                &mut size,
            )?;
        }

        // SAFETY: GetTokenInformation filled the buffer with a TOKEN_USER.
        let sid = unsafe { (*(buffer.as_ptr() as *const TOKEN_USER)).User.Sid };
        sid_to_string(sid)
    }
}

fn sid_to_string(sid: PSID) -> Result<String> {
    let mut string_sid = PWSTR::null();
    // SAFETY: sid points into a live TOKEN_USER buffer.
    unsafe {
        ConvertSidToStringSidW(sid, &mut string_sid)?;
    }

    // SAFETY: string_sid was allocated by ConvertSidToStringSidW and is
    // null-terminated; it is released with LocalFree below.
    let result = unsafe { from_wide(string_sid.as_wide()) };
    unsafe {
        let _ = LocalFree(HLOCAL(string_sid.0 as *mut c_void));
    }
    result
}

/// Checks whether the current process token is elevated.
pub fn is_elevated() -> Result<bool> {
    Token::current_process()?.is_elevated()
}

/// Checks whether the Administrators group is enabled in the current token.
pub fn is_admin_mode() -> Result<bool> {
    let mut admins = PSID::default();

    // SAFETY: NT_AUTHORITY outlives the call; admins receives a SID that is
    // released with FreeSid.
    unsafe {
        AllocateAndInitializeSid(
            &NT_AUTHORITY,
            2,
            SECURITY_BUILTIN_DOMAIN_RID,
            DOMAIN_ALIAS_RID_ADMINS,
            0,
            0,
            0,
            0,
            0,
            0,
            &mut admins,
        )?;
    }

    let mut is_member = BOOL::default();
    // SAFETY: A null token checks the calling thread's effective token.
    let checked = unsafe { CheckTokenMembership(HANDLE::default(), admins, &mut is_member) };
    // SAFETY: admins came from AllocateAndInitializeSid.
    unsafe {
        FreeSid(admins);
    }
    checked?;

    Ok(is_member.as_bool())
}

/// Outcome of [`elevate_to_admin_mode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Elevation {
    /// The Administrators group is already enabled; nothing was started.
    AlreadyAdmin,
    /// An elevated copy of this executable was started. The caller should exit.
    Relaunched,
    /// The user declined the UAC prompt.
    Cancelled,
}

/// Restarts the current executable with the `runas` verb unless it already
/// runs in admin mode.
///
/// The command-line arguments of this process are passed on. The current
/// process keeps running either way; on [`Elevation::Relaunched`] it is up to
/// the caller to exit.
pub fn elevate_to_admin_mode() -> Result<Elevation> {
    if is_admin_mode()? {
        return Ok(Elevation::AlreadyAdmin);
    }

    let exe = std::env::current_exe()?;
    let parameters = std::env::args_os()
        .skip(1)
        .map(|arg| quote_arg(&arg.to_string_lossy()).into_owned())
        .collect::<Vec<_>>()
        .join(" ");

    let verb = WideString::new("runas");
    let file = WideString::new(&exe.to_string_lossy());
    let parameters = WideString::new(&parameters);
    let mut execute_info = SHELLEXECUTEINFOW {
        cbSize: std::mem::size_of::<SHELLEXECUTEINFOW>() as u32,
        lpVerb: verb.as_pcwstr(),
        lpFile: file.as_pcwstr(),
        lpParameters: parameters.as_pcwstr(),
        nShow: SHOW_NORMAL,
        ..Default::default()
    };

    // SAFETY: execute_info is fully initialised and the wide strings it
    // points to outlive the call.
    match unsafe { ShellExecuteExW(&mut execute_info) } {
        Ok(()) => {
            info!(exe = %exe.display(), "elevated instance started");
            Ok(Elevation::Relaunched)
        }
        Err(e) => {
            let err = Error::from(e);
            if err.win32_error_code() == Some(ERROR_CANCELLED.0) {
                debug!("elevation declined");
                Ok(Elevation::Cancelled)
            } else {
                Err(err)
            }
        }
    }
}

/// Quotes a command-line argument if necessary.
#[inline]
fn quote_arg(arg: &str) -> Cow<'_, str> {
    let needs_quoting = arg.is_empty() || arg.bytes().any(|b| b == b' ' || b == b'\t' || b == b'"');
    if !needs_quoting {
        return Cow::Borrowed(arg);
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');

    let mut chars = arg.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let mut backslashes = 1;
                while chars.peek() == Some(&'\\') {
                    chars.next();
                    backslashes += 1;
                }
                // Backslashes are only special before a quote, including the closing one.
                let escaped = matches!(chars.peek(), Some('"') | None);
                let count = if escaped { backslashes * 2 } else { backslashes };
                quoted.extend(std::iter::repeat('\\').take(count));
            }
            '"' => quoted.push_str("\\\""),
            c => quoted.push(c),
        }
    }

    quoted.push('"');
    Cow::Owned(quoted)
}

/// Gets the current process ID.
#[inline]
pub fn current_pid() -> u32 {
    // SAFETY: GetCurrentProcessId has no preconditions and cannot fail.
    unsafe { GetCurrentProcessId() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("simple"), "simple");
        assert_eq!(quote_arg("with space"), "\"with space\"");
        assert_eq!(quote_arg(""), "\"\"");
        assert_eq!(quote_arg("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote_arg("path\\"), "path\\");
        assert_eq!(quote_arg("path with space\\"), "\"path with space\\\\\"");
    }

    #[test]
    fn test_command_line() {
        let cmd = Command::new("sc.exe").arg("query").arg("Spooler Service");
        assert_eq!(cmd.command_line(), "sc.exe query \"Spooler Service\"");
    }

    #[test]
    fn test_execute_wait() {
        execute("cmd.exe /c exit 3", ExecMode::Wait).unwrap();
    }

    #[test]
    fn test_execute_wait_times_out() {
        let err = execute("cmd.exe /c ping -n 30 127.0.0.1 > nul", ExecMode::Wait).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_execute_missing_program() {
        assert!(execute("no_such_program_12345.exe", ExecMode::Async).is_err());
    }

    #[test]
    fn test_run_exit_code() {
        let code = Command::new("cmd.exe").args(["/c", "exit 42"]).no_window().run().unwrap();
        assert_eq!(code, 42);
    }

    #[test]
    fn test_pkill_spawned_process() {
        // A private copy of ping so no other ping on the host is touched
        let exe_name = format!("winapi-helpers-pkill-{}.exe", current_pid());
        let exe_path = std::env::temp_dir().join(&exe_name);
        let ping = format!(r"{}System32\PING.EXE", crate::special_path::windows());
        std::fs::copy(ping, &exe_path).unwrap();

        let process = Command::new(exe_path.to_string_lossy())
            .args(["-n", "60", "127.0.0.1"])
            .no_window()
            .spawn()
            .unwrap();
        assert_eq!(pkill(&exe_name.to_uppercase()).unwrap(), 1);
        assert_eq!(process.wait().unwrap(), PKILL_EXIT_CODE);

        let _ = std::fs::remove_file(&exe_path);
    }

    #[test]
    fn test_pkill_skips_current_process() {
        let own_name = process_list()
            .unwrap()
            .into_iter()
            .find(|(pid, _)| *pid == current_pid())
            .map(|(_, exe)| exe)
            .unwrap();
        pkill(&own_name).unwrap();
        assert!(Process::open(current_pid(), ProcessAccess::QUERY).is_ok());
    }

    #[test]
    fn test_pkill_no_match() {
        assert_eq!(pkill("definitely_not_running_12345.exe").unwrap(), 0);
    }

    #[test]
    fn test_elevation_is_a_no_op_in_admin_mode() {
        // Without admin rights this would raise a UAC prompt
        if is_admin_mode().unwrap() {
            assert_eq!(elevate_to_admin_mode().unwrap(), Elevation::AlreadyAdmin);
        }
    }

    #[test]
    fn test_token_queries() {
        let token = Token::current_process().unwrap();
        assert!(token.user_sid().unwrap().starts_with("S-1-5-"));
        let elevated = token.is_elevated().unwrap();
        let admin = is_admin_mode().unwrap();
        println!("elevated: {elevated}, admin: {admin}");
    }
}
