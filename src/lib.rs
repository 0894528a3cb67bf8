//! # WinAPI Helpers
//!
//! Helper wrappers around Windows APIs for agents and services.
//!
//! The centrepiece is a partition information cache; the rest are small
//! wrappers that report "not found" as `Ok(None)` / `Ok(false)` and keep real
//! OS failures as errors.
//!
//! - **Partitions**: Cached drive letter, disk and volume information
//! - **Error Handling**: Rich error types with Windows error code support
//! - **Handle Management**: RAII wrappers for kernel and service handles
//! - **String Utilities**: Conversion between Rust and UTF-16 strings
//! - **Registry**: Typed value access, key enumeration and tree deletion
//! - **Services**: Query, start, stop, install and configure services
//! - **Processes**: Launch command lines, kill by name, admin checks
//! - **Special Paths**: Profile, app data, temp and system folders
//! - **Single Instance**: Named mutex guard
//! - **User Information**: Account name, display name, GUID, SID and profile paths
//! - **System Information**: Processor count, architecture and OS version
//! - **Hardware IDs**: System volume serial number and CPUID
//! - **COM**: Per-thread initialisation guard
//! - **SQLite**: Small database handle that keeps the last result code
//!
//! The partition cache, hardware IDs, SQLite and string utilities build on
//! every platform, so the cache logic can be exercised against an in-memory
//! [`PartitionSource`] anywhere; everything that talks to the OS is
//! Windows-only.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(windows)] {
//! use winapi_helpers::partition::PortableView;
//!
//! let view = PortableView::native();
//! for partition in view.enumerate() {
//!     println!("{} {} {}", partition.root, partition.placement, partition.filesystem_name);
//! }
//! println!("System drive: {}", PortableView::system_drive());
//! # }
//! ```
//!
//! ## Feature Highlights
//!
//! ### Registry Access
//!
//! ```no_run
//! # #[cfg(windows)] {
//! use winapi_helpers::registry::{RegistryKey, RootKey};
//!
//! let key = RegistryKey::create(RootKey::CURRENT_USER, r"Software\MyAgent")?;
//! key.set_dword("Interval", 60)?;
//! assert_eq!(key.get_dword("Interval")?, Some(60));
//! assert_eq!(key.get_string("Missing")?, None);
//! # }
//! # Ok::<(), winapi_helpers::error::Error>(())
//! ```
//!
//! ### Services
//!
//! ```no_run
//! # #[cfg(windows)] {
//! use winapi_helpers::service::{ScmAccess, ServiceManager};
//!
//! let scm = ServiceManager::connect(ScmAccess::READ)?;
//! if scm.is_service_registered("Spooler")? && !scm.is_service_running("Spooler")? {
//!     scm.start_service("Spooler")?;
//! }
//! # }
//! # Ok::<(), winapi_helpers::error::Error>(())
//! ```
//!
//! [`PartitionSource`]: partition::PartitionSource

#![warn(missing_docs)]

// Core modules
pub mod error;
pub mod hardware;
pub mod partition;
pub mod sqlite;
pub mod string;

// System modules
#[cfg(windows)]
pub mod com;
#[cfg(windows)]
pub mod handle;
#[cfg(windows)]
pub mod one_instance;
#[cfg(windows)]
pub mod process;
#[cfg(windows)]
pub mod registry;
#[cfg(windows)]
pub mod service;
#[cfg(windows)]
pub mod special_path;
#[cfg(windows)]
pub mod system_information;
#[cfg(windows)]
pub mod user;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::hardware::HardwareInformation;
    pub use crate::partition::{
        CacheOptions, DiskType, PartitionCache, PartitionRecord, PartitionSource, PlacementType,
        PortablePartition, PortableView,
    };
    pub use crate::sqlite::Database;
    pub use crate::string::{from_wide, to_wide, WideString};

    #[cfg(windows)]
    pub use crate::com::{ComInitializer, ThreadingModel};

    #[cfg(windows)]
    pub use crate::error::ResultExt;
    #[cfg(windows)]
    pub use crate::handle::OwnedHandle;
    #[cfg(windows)]
    pub use crate::one_instance::SingleInstance;
    #[cfg(windows)]
    pub use crate::process::{
        elevate_to_admin_mode, execute, is_admin_mode, is_elevated, pkill, Elevation, ExecMode,
    };
    #[cfg(windows)]
    pub use crate::registry::{RegistryKey, RootKey, Value};
    #[cfg(windows)]
    pub use crate::service::{ScmAccess, ServiceManager, ServiceState};
    #[cfg(windows)]
    pub use crate::system_information::SystemInformation;
    #[cfg(windows)]
    pub use crate::user::UserInformation;
}
