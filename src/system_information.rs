//! Operating system and processor information.
//!
//! [`SystemInformation::collect`] never fails as a whole: whatever cannot be
//! read stays at zero or `"Unknown"` and the failure is kept in
//! [`SystemInformation::last_error`].

use crate::error::Result;
use crate::registry::{RegistryKey, RootKey};
use std::fmt;
use tracing::debug;
use windows::Win32::Foundation::BOOL;
use windows::Win32::System::SystemInformation::{
    GetNativeSystemInfo, GetVersionExW, OSVERSIONINFOEXW, SYSTEM_INFO,
};
use windows::Win32::System::Threading::{GetCurrentProcess, IsWow64Process};

/// Key holding the real version numbers on Windows 10 and later, where
/// `GetVersionExW` reports 6.2 to unmanifested programs.
const CURRENT_VERSION_KEY: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion";

/// `VER_NT_WORKSTATION`
const VER_NT_WORKSTATION: u8 = 1;

/// Placeholder for names that could not be determined.
pub const UNKNOWN: &str = "Unknown";

/// Processor architecture of the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessorArchitecture {
    /// 32-bit Intel.
    X86,
    /// AMD64.
    X64,
    /// 32-bit ARM.
    Arm,
    /// ARM64.
    Arm64,
    /// Itanium.
    Ia64,
    /// Anything else, with the raw `PROCESSOR_ARCHITECTURE_*` value.
    Unknown(u16),
    /// Not queried yet.
    #[default]
    Undetermined,
}

impl ProcessorArchitecture {
    fn from_id(id: u16) -> Self {
        match id {
            0 => ProcessorArchitecture::X86,
            5 => ProcessorArchitecture::Arm,
            6 => ProcessorArchitecture::Ia64,
            9 => ProcessorArchitecture::X64,
            12 => ProcessorArchitecture::Arm64,
            other => ProcessorArchitecture::Unknown(other),
        }
    }

    /// Short name such as `x64`; `Unknown` when not recognised.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorArchitecture::X86 => "x86",
            ProcessorArchitecture::X64 => "x64",
            ProcessorArchitecture::Arm => "ARM",
            ProcessorArchitecture::Arm64 => "ARM64",
            ProcessorArchitecture::Ia64 => "IA64",
            ProcessorArchitecture::Unknown(_) | ProcessorArchitecture::Undetermined => UNKNOWN,
        }
    }
}

impl fmt::Display for ProcessorArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// True when this binary was built for x64.
pub const fn is_x64_application() -> bool {
    cfg!(target_arch = "x86_64")
}

/// True for a 32-bit process running under WOW64 on a 64-bit system.
pub fn is_x32_application_on_x64() -> Result<bool> {
    let mut wow64 = BOOL::default();
    // SAFETY: The pseudo handle of the current process is always valid.
    unsafe {
        IsWow64Process(GetCurrentProcess(), &mut wow64)?;
    }
    Ok(wow64.as_bool())
}

/// Marketing name for a Windows version.
///
/// `product_type` tells workstation from server editions, which share
/// version numbers.
pub fn os_name(major: u32, minor: u32, build: u32, product_type: u8) -> &'static str {
    let workstation = product_type == VER_NT_WORKSTATION;
    match (major, minor) {
        (10, 0) if workstation => {
            if build >= 22000 {
                "Windows 11"
            } else {
                "Windows 10"
            }
        }
        (10, 0) => match build {
            26100.. => "Windows Server 2025",
            20348.. => "Windows Server 2022",
            17763.. => "Windows Server 2019",
            _ => "Windows Server 2016",
        },
        (6, 3) if workstation => "Windows 8.1",
        (6, 3) => "Windows Server 2012 R2",
        (6, 2) if workstation => "Windows 8",
        (6, 2) => "Windows Server 2012",
        (6, 1) if workstation => "Windows 7",
        (6, 1) => "Windows Server 2008 R2",
        (6, 0) if workstation => "Windows Vista",
        (6, 0) => "Windows Server 2008",
        _ => UNKNOWN,
    }
}

/// Processor count, architecture and OS version of this machine.
#[derive(Debug, Clone, Default)]
pub struct SystemInformation {
    number_of_cpu: u32,
    cpu_architecture: ProcessorArchitecture,
    major_version: u32,
    minor_version: u32,
    build_number: u32,
    os_name: String,
    last_error: Option<String>,
}

impl SystemInformation {
    /// Queries the processor and the OS version.
    pub fn collect() -> Self {
        let mut info = Self {
            os_name: UNKNOWN.to_string(),
            ..Self::default()
        };

        let mut system = SYSTEM_INFO::default();
        // SAFETY: system is a valid output struct.
        unsafe {
            GetNativeSystemInfo(&mut system);
        }
        // SAFETY: GetNativeSystemInfo fills the architecture member of the union.
        let architecture = unsafe { system.Anonymous.Anonymous.wProcessorArchitecture };
        info.number_of_cpu = system.dwNumberOfProcessors;
        info.cpu_architecture = ProcessorArchitecture::from_id(architecture.0);

        let mut version = OSVERSIONINFOEXW {
            dwOSVersionInfoSize: std::mem::size_of::<OSVERSIONINFOEXW>() as u32,
            ..Default::default()
        };
        // SAFETY: version is initialised with its own size, as the extended
        // structure requires.
        match unsafe { GetVersionExW(&mut version as *mut _ as *mut _) } {
            Ok(()) => {
                info.major_version = version.dwMajorVersion;
                info.minor_version = version.dwMinorVersion;
                info.build_number = version.dwBuildNumber;
            }
            Err(e) => {
                info.last_error = Some(e.to_string());
                return info;
            }
        }

        match current_version() {
            Ok(Some((major, minor, build))) => {
                info.major_version = major;
                info.minor_version = minor;
                info.build_number = build;
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "registry version lookup failed"),
        }

        info.os_name = os_name(
            info.major_version,
            info.minor_version,
            info.build_number,
            version.wProductType,
        )
        .to_string();
        info
    }

    /// Number of logical processors.
    pub fn number_of_cpu(&self) -> u32 {
        self.number_of_cpu
    }

    /// Processor architecture of the OS.
    pub fn cpu_architecture(&self) -> ProcessorArchitecture {
        self.cpu_architecture
    }

    /// Windows major version.
    pub fn major_version(&self) -> u32 {
        self.major_version
    }

    /// Windows minor version.
    pub fn minor_version(&self) -> u32 {
        self.minor_version
    }

    /// Windows build number.
    pub fn build_number(&self) -> u32 {
        self.build_number
    }

    /// Always `windows`.
    pub fn os_family(&self) -> &'static str {
        "windows"
    }

    /// Name like `Windows 10`, or `Unknown`.
    pub fn os_name(&self) -> &str {
        &self.os_name
    }

    /// `major.minor.build`, or `Unknown` when the version query failed.
    pub fn os_version(&self) -> String {
        if self.major_version == 0 {
            return UNKNOWN.to_string();
        }
        format!(
            "{}.{}.{}",
            self.major_version, self.minor_version, self.build_number
        )
    }

    /// Message of the failed version query, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True when the version query succeeded.
    pub fn retrieved_successfully(&self) -> bool {
        self.last_error.is_none()
    }
}

/// Version numbers from the registry. Only Windows 10 and later write them.
fn current_version() -> Result<Option<(u32, u32, u32)>> {
    let key = RegistryKey::open(RootKey::LOCAL_MACHINE, CURRENT_VERSION_KEY, true)?;
    let (Some(major), Some(minor)) = (
        key.get_dword("CurrentMajorVersionNumber")?,
        key.get_dword("CurrentMinorVersionNumber")?,
    ) else {
        return Ok(None);
    };
    let build = key
        .get_string("CurrentBuildNumber")?
        .and_then(|build| build.parse().ok())
        .unwrap_or(0);
    Ok(Some((major, minor, build)))
}
