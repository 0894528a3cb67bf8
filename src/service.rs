//! Windows service control.
//!
//! [`ServiceManager`] wraps a Service Control Manager connection and exposes
//! the operations an installer or watchdog needs: registration, start/stop
//! with the documented wait-hint polling, and failure recovery settings.

use crate::error::{Error, Result};
use crate::handle::ServiceHandle;
use crate::string::WideString;
use std::ffi::c_void;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::ERROR_SERVICE_DOES_NOT_EXIST;
use windows::Win32::System::Services::{
    ChangeServiceConfig2W, ControlService, CreateServiceW, DeleteService, OpenSCManagerW,
    OpenServiceW, QueryServiceStatusEx, StartServiceW, SC_ACTION, SC_ACTION_NONE,
    SC_ACTION_RESTART, SC_MANAGER_ALL_ACCESS, SC_MANAGER_CONNECT, SC_MANAGER_ENUMERATE_SERVICE,
    SC_STATUS_PROCESS_INFO, SERVICE_ALL_ACCESS, SERVICE_AUTO_START, SERVICE_CHANGE_CONFIG,
    SERVICE_CONFIG_DESCRIPTION, SERVICE_CONFIG_FAILURE_ACTIONS, SERVICE_CONTROL_STOP,
    SERVICE_DESCRIPTIONW, SERVICE_ERROR_NORMAL, SERVICE_FAILURE_ACTIONSW, SERVICE_QUERY_STATUS,
    SERVICE_START, SERVICE_STATUS, SERVICE_STATUS_PROCESS, SERVICE_STOP,
    SERVICE_WIN32_OWN_PROCESS,
};

/// Account used by [`ServiceManager::register_service`] when none is given.
pub const DEFAULT_SERVICE_ACCOUNT: &str = r"NT AUTHORITY\LocalService";

/// Longest [`ServiceManager::stop_service`] waits for the service to stop.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Period after which the failure counter is reset.
const FAILURE_RESET_PERIOD_SECS: u32 = 24 * 60 * 60;
/// Standard `DELETE` access right.
const DELETE: u32 = 0x0001_0000;

const MIN_POLL: Duration = Duration::from_secs(1);
const MAX_POLL: Duration = Duration::from_secs(10);

/// How long to sleep between status polls: a tenth of the wait hint,
/// clamped to 1..=10 seconds.
pub fn poll_interval(wait_hint: Duration) -> Duration {
    (wait_hint / 10).clamp(MIN_POLL, MAX_POLL)
}

/// Access requested when connecting to the Service Control Manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScmAccess(pub u32);

impl ScmAccess {
    /// Connect and enumerate; enough for queries, start and stop.
    pub const READ: Self = Self(SC_MANAGER_CONNECT | SC_MANAGER_ENUMERATE_SERVICE);

    /// Full access; required to create or delete services.
    pub const ALL: Self = Self(SC_MANAGER_ALL_ACCESS);
}

/// Current state of a service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
    /// Not running.
    Stopped,
    /// Starting.
    StartPending,
    /// Stopping.
    StopPending,
    /// Running.
    Running,
    /// Resuming from pause.
    ContinuePending,
    /// Pausing.
    PausePending,
    /// Paused.
    Paused,
    /// A state code this crate does not know.
    Unknown(u32),
}

impl ServiceState {
    /// Maps a `SERVICE_*` state code.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Stopped,
            2 => Self::StartPending,
            3 => Self::StopPending,
            4 => Self::Running,
            5 => Self::ContinuePending,
            6 => Self::PausePending,
            7 => Self::Paused,
            other => Self::Unknown(other),
        }
    }

    /// Anything other than stopped or stopping counts as running.
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Stopped | Self::StopPending)
    }
}

/// A status snapshot from `QueryServiceStatusEx`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Current state.
    pub state: ServiceState,
    /// Progress counter incremented by the service during pending operations.
    pub checkpoint: u32,
    /// Time the service expects the pending operation to take.
    pub wait_hint: Duration,
    /// Win32 exit code reported by the service.
    pub exit_code: u32,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state {:?}, exit code {}, checkpoint {}, wait hint {:?}",
            self.state, self.exit_code, self.checkpoint, self.wait_hint
        )
    }
}

impl From<&SERVICE_STATUS_PROCESS> for ServiceStatus {
    fn from(raw: &SERVICE_STATUS_PROCESS) -> Self {
        Self {
            state: ServiceState::from_code(raw.dwCurrentState.0),
            checkpoint: raw.dwCheckPoint,
            wait_hint: Duration::from_millis(u64::from(raw.dwWaitHint)),
            exit_code: raw.dwWin32ExitCode,
        }
    }
}

/// Tracks checkpoint progress during a pending operation.
struct Progress {
    checkpoint: u32,
    since: Instant,
}

impl Progress {
    fn new(status: &ServiceStatus) -> Self {
        Self {
            checkpoint: status.checkpoint,
            since: Instant::now(),
        }
    }

    /// False once the checkpoint has not advanced for longer than the wait hint.
    fn advancing(&mut self, status: &ServiceStatus) -> bool {
        if status.checkpoint > self.checkpoint {
            self.checkpoint = status.checkpoint;
            self.since = Instant::now();
            true
        } else {
            self.since.elapsed() <= status.wait_hint
        }
    }
}

/// A connection to the local Service Control Manager.
#[derive(Debug)]
pub struct ServiceManager {
    scm: ServiceHandle,
}

impl ServiceManager {
    /// Connects to the active services database.
    pub fn connect(access: ScmAccess) -> Result<Self> {
        // SAFETY: Null machine and database names select the local active database.
        let handle = unsafe { OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), access.0) }
            .map_err(|e| match Error::from(e) {
                err if err.is_access_denied() => Error::access_denied("service control manager"),
                err => err,
            })?;
        Ok(Self {
            scm: ServiceHandle::new(handle)?,
        })
    }

    /// Whether the caller may open the SCM with full access.
    pub fn is_admin_access() -> Result<bool> {
        match Self::connect(ScmAccess::ALL) {
            Ok(_) => Ok(true),
            Err(e) if e.is_access_denied() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn open(&self, name: &str, access: u32) -> Result<ServiceHandle> {
        let name_wide = WideString::new(name);
        // SAFETY: self.scm is an open SCM handle, name_wide is valid.
        let handle = unsafe { OpenServiceW(self.scm.as_raw(), name_wide.as_pcwstr(), access)? };
        ServiceHandle::new(handle)
    }

    fn query(service: &ServiceHandle) -> Result<ServiceStatus> {
        let mut raw = SERVICE_STATUS_PROCESS::default();
        let mut needed = 0u32;

        // SAFETY: The byte view covers exactly `raw`, which outlives the call.
        unsafe {
            let buffer = std::slice::from_raw_parts_mut(
                &mut raw as *mut SERVICE_STATUS_PROCESS as *mut u8,
                std::mem::size_of::<SERVICE_STATUS_PROCESS>(),
            );
            QueryServiceStatusEx(service.as_raw(), SC_STATUS_PROCESS_INFO, Some(buffer), &mut needed)?;
        }

        Ok(ServiceStatus::from(&raw))
    }

    /// Whether a service with this name is installed.
    pub fn is_service_registered(&self, name: &str) -> Result<bool> {
        match self.open(name, SERVICE_QUERY_STATUS) {
            Ok(_) => Ok(true),
            Err(e) if e.win32_error_code() == Some(ERROR_SERVICE_DOES_NOT_EXIST.0) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Full status of a service.
    pub fn query_status(&self, name: &str) -> Result<ServiceStatus> {
        Self::query(&self.open(name, SERVICE_QUERY_STATUS)?)
    }

    /// Current state of a service.
    pub fn service_status(&self, name: &str) -> Result<ServiceState> {
        Ok(self.query_status(name)?.state)
    }

    /// True unless the service is stopped or stopping.
    pub fn is_service_running(&self, name: &str) -> Result<bool> {
        Ok(self.service_status(name)?.is_running())
    }

    /// Starts a service and waits until it reports running.
    ///
    /// A pending stop is waited out first. Fails if the service is already
    /// running, if a pending stop makes no progress within its wait hint, or
    /// if the service does not reach the running state.
    #[instrument(skip(self))]
    pub fn start_service(&self, name: &str) -> Result<()> {
        let service = self.open(name, SERVICE_QUERY_STATUS | SERVICE_START)?;
        let mut status = Self::query(&service)?;

        if status.state.is_running() {
            return Err(Error::custom(format!("Service {name} is already running")));
        }

        let mut progress = Progress::new(&status);
        while status.state == ServiceState::StopPending {
            thread::sleep(poll_interval(status.wait_hint));
            status = Self::query(&service)?;
            if !progress.advancing(&status) {
                return Err(Error::timeout(format!("Service {name} did not finish stopping")));
            }
        }

        // SAFETY: service was opened with SERVICE_START; no arguments are passed.
        unsafe {
            StartServiceW(service.as_raw(), None)?;
        }

        status = Self::query(&service)?;
        let mut progress = Progress::new(&status);
        while status.state == ServiceState::StartPending {
            thread::sleep(poll_interval(status.wait_hint));
            status = Self::query(&service)?;
            if !progress.advancing(&status) {
                break;
            }
        }

        if status.state != ServiceState::Running {
            return Err(Error::custom(format!("Service {name} not started: {status}")));
        }

        info!("service started");
        Ok(())
    }

    /// Stops a service and waits up to [`STOP_TIMEOUT`] for it to stop.
    #[instrument(skip(self))]
    pub fn stop_service(&self, name: &str) -> Result<()> {
        let service = self.open(name, SERVICE_QUERY_STATUS | SERVICE_STOP)?;
        let started = Instant::now();
        let mut status = Self::query(&service)?;

        if status.state == ServiceState::Stopped {
            return Err(Error::custom(format!("Service {name} is already stopped")));
        }

        while status.state == ServiceState::StopPending {
            thread::sleep(poll_interval(status.wait_hint));
            status = Self::query(&service)?;
            if status.state == ServiceState::Stopped {
                return Ok(());
            }
            if started.elapsed() > STOP_TIMEOUT {
                return Err(Error::timeout(format!("Service {name} stop timed out")));
            }
        }

        let mut raw = SERVICE_STATUS::default();
        // SAFETY: service was opened with SERVICE_STOP; raw is a valid output.
        unsafe {
            ControlService(service.as_raw(), SERVICE_CONTROL_STOP, &mut raw)?;
        }

        loop {
            status = Self::query(&service)?;
            if status.state == ServiceState::Stopped {
                break;
            }
            if started.elapsed() > STOP_TIMEOUT {
                return Err(Error::timeout(format!("Service {name} stop timed out")));
            }
            thread::sleep(poll_interval(status.wait_hint));
        }

        info!("service stopped");
        Ok(())
    }

    /// Installs the running executable as an auto-start, own-process service.
    ///
    /// An empty `display_name` reuses `name`; an empty `account` runs the
    /// service as [`DEFAULT_SERVICE_ACCOUNT`].
    #[instrument(skip(self))]
    pub fn register_service(&self, name: &str, display_name: &str, account: &str) -> Result<()> {
        let binary = std::env::current_exe()?;
        let binary = WideString::new(&binary.to_string_lossy());
        let name_wide = WideString::new(name);
        let display = WideString::new(if display_name.is_empty() { name } else { display_name });
        let account = WideString::new(if account.is_empty() {
            DEFAULT_SERVICE_ACCOUNT
        } else {
            account
        });

        // SAFETY: Every string outlives the call; optional arguments are null.
        let handle = unsafe {
            CreateServiceW(
                self.scm.as_raw(),
                name_wide.as_pcwstr(),
                display.as_pcwstr(),
                SERVICE_ALL_ACCESS,
                SERVICE_WIN32_OWN_PROCESS,
                SERVICE_AUTO_START,
                SERVICE_ERROR_NORMAL,
                binary.as_pcwstr(),
                PCWSTR::null(),
                None,
                PCWSTR::null(),
                account.as_pcwstr(),
                PCWSTR::null(),
            )?
        };
        ServiceHandle::new(handle)?;

        debug!("service registered");
        Ok(())
    }

    /// Marks a service for deletion.
    pub fn delete_service(&self, name: &str) -> Result<()> {
        let service = self.open(name, DELETE)?;
        // SAFETY: service was opened with DELETE access.
        unsafe {
            DeleteService(service.as_raw())?;
        }
        debug!(name, "service deleted");
        Ok(())
    }

    /// Sets the description shown in the services console.
    pub fn set_service_description(&self, name: &str, description: &str) -> Result<()> {
        let service = self.open(name, SERVICE_CHANGE_CONFIG)?;
        let mut text = crate::string::to_wide(description);
        let info = SERVICE_DESCRIPTIONW {
            lpDescription: PWSTR(text.as_mut_ptr()),
        };

        // SAFETY: info and the text it points to live until the call returns.
        unsafe {
            ChangeServiceConfig2W(
                service.as_raw(),
                SERVICE_CONFIG_DESCRIPTION,
                Some(&info as *const _ as *const c_void),
            )?;
        }
        Ok(())
    }

    /// Configures the service to be restarted after a failure.
    pub fn set_restart_on_failure(&self, name: &str) -> Result<()> {
        let service = self.open(name, SERVICE_ALL_ACCESS)?;
        let mut actions = [
            SC_ACTION {
                Type: SC_ACTION_RESTART,
                Delay: 1,
            },
            SC_ACTION {
                Type: SC_ACTION_NONE,
                Delay: 0,
            },
            SC_ACTION {
                Type: SC_ACTION_NONE,
                Delay: 0,
            },
        ];
        let info = SERVICE_FAILURE_ACTIONSW {
            dwResetPeriod: FAILURE_RESET_PERIOD_SECS,
            lpRebootMsg: PWSTR::null(),
            lpCommand: PWSTR::null(),
            cActions: actions.len() as u32,
            lpsaActions: actions.as_mut_ptr(),
        };

        // SAFETY: info and the action array live until the call returns.
        unsafe {
            ChangeServiceConfig2W(
                service.as_raw(),
                SERVICE_CONFIG_FAILURE_ACTIONS,
                Some(&info as *const _ as *const c_void),
            )?;
        }
        debug!(name, "restart on failure configured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_clamped() {
        assert_eq!(poll_interval(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(poll_interval(Duration::from_secs(30)), Duration::from_secs(3));
        assert_eq!(poll_interval(Duration::from_secs(600)), Duration::from_secs(10));
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(ServiceState::from_code(1), ServiceState::Stopped);
        assert_eq!(ServiceState::from_code(4), ServiceState::Running);
        assert_eq!(ServiceState::from_code(42), ServiceState::Unknown(42));
        assert!(!ServiceState::Stopped.is_running());
        assert!(!ServiceState::StopPending.is_running());
        assert!(ServiceState::StartPending.is_running());
        assert!(ServiceState::Paused.is_running());
    }

    #[test]
    fn test_progress_tracks_checkpoint() {
        let mut status = ServiceStatus {
            state: ServiceState::StopPending,
            checkpoint: 1,
            wait_hint: Duration::ZERO,
            exit_code: 0,
        };
        let mut progress = Progress::new(&status);
        status.checkpoint = 2;
        assert!(progress.advancing(&status));
        thread::sleep(Duration::from_millis(5));
        assert!(!progress.advancing(&status));
    }

    #[test]
    fn test_registered_services() {
        let scm = ServiceManager::connect(ScmAccess::READ).unwrap();
        assert!(scm.is_service_registered("EventLog").unwrap());
        assert!(!scm.is_service_registered("winapi-helpers-no-such-service").unwrap());
        assert!(scm.is_service_running("EventLog").unwrap());
    }

    #[test]
    fn test_status_of_missing_service() {
        let scm = ServiceManager::connect(ScmAccess::READ).unwrap();
        let err = scm.service_status("winapi-helpers-no-such-service").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_admin_access_query() {
        let admin = ServiceManager::is_admin_access().unwrap();
        match ServiceManager::connect(ScmAccess::ALL) {
            Ok(_) => assert!(admin),
            Err(e) => {
                assert!(matches!(e, Error::AccessDenied(_)), "{e}");
                assert!(!admin);
            }
        }
    }
}
