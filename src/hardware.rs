//! Hardware identifiers: the system volume and the CPU.
//!
//! The volume fields come from the system partition of a [`PortableView`],
//! so the same lookup rules and degradation apply as for every other
//! partition.

use crate::partition::{PortablePartition, PortableView};

/// CPUID leaf 0 as the concatenated decimal values of `EAX`, `EBX`, `ECX`
/// and `EDX`. Empty on processors without CPUID.
pub fn cpu_id() -> String {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::__cpuid;
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::__cpuid;

        // SAFETY: CPUID is available on every x86 processor Rust targets.
        #[allow(unused_unsafe)]
        let leaf = unsafe { __cpuid(0) };
        [leaf.eax, leaf.ebx, leaf.ecx, leaf.edx]
            .iter()
            .map(|register| (*register as i32).to_string())
            .collect()
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        String::new()
    }
}

/// Volume and processor identifiers of this machine.
#[derive(Debug, Clone, Default)]
pub struct HardwareInformation {
    volume_name: String,
    volume_id: String,
    filesystem_name: String,
    cpu_id: String,
    last_error: Option<String>,
}

impl HardwareInformation {
    /// Reads the identifiers through the process-wide partition view.
    #[cfg(windows)]
    pub fn collect() -> Self {
        Self::from_view(PortableView::shared())
    }

    /// Reads the identifiers of the system partition known to `view`.
    pub fn from_view(view: &PortableView) -> Self {
        Self::from_partition(&view.system_partition(), cpu_id())
    }

    fn from_partition(system: &PortablePartition, cpu_id: String) -> Self {
        let last_error = if system.is_empty() {
            Some(format!("system drive {} not found", PortableView::system_drive()))
        } else if system.volume_id.is_empty() {
            Some(format!("no volume serial number for {}", system.root))
        } else if cpu_id.is_empty() {
            Some("CPUID not available".to_string())
        } else {
            None
        };

        Self {
            volume_name: system.volume_name.clone(),
            volume_id: system.volume_id.clone(),
            filesystem_name: system.filesystem_name.clone(),
            cpu_id,
            last_error,
        }
    }

    /// Label of the system volume, possibly empty.
    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    /// Serial number of the system volume as a decimal string.
    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Filesystem of the system volume, e.g. `NTFS`.
    pub fn filesystem_name(&self) -> &str {
        &self.filesystem_name
    }

    /// See [`cpu_id`].
    pub fn cpu_id(&self) -> &str {
        &self.cpu_id
    }

    /// What could not be read, if anything.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True when both the volume id and the CPU id were read.
    pub fn retrieved_successfully(&self) -> bool {
        self.last_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::fake::{FakeDrive, FakeSource};
    use crate::partition::DiskType;

    fn system_letter() -> char {
        PortableView::system_drive().chars().next().unwrap()
    }

    #[test]
    fn test_system_volume_ids() {
        let source = FakeSource::new().with(system_letter(), FakeDrive::fixed(0, DiskType::Ssd));
        let info = HardwareInformation::from_partition(
            &PortableView::new(source).system_partition(),
            "13".to_string(),
        );

        assert!(info.retrieved_successfully(), "{:?}", info.last_error());
        assert_eq!(info.volume_id(), "3735928559");
        assert_eq!(info.volume_name(), format!("VOL_{}", system_letter()));
        assert_eq!(info.filesystem_name(), "NTFS");
        assert_eq!(info.cpu_id(), "13");
    }

    #[test]
    fn test_missing_system_drive() {
        let view = PortableView::new(FakeSource::new());
        let info = HardwareInformation::from_partition(&view.system_partition(), "13".into());

        assert!(!info.retrieved_successfully());
        assert!(info.volume_id().is_empty());
        assert!(info.last_error().unwrap().contains("not found"));
    }

    #[test]
    fn test_volume_without_serial() {
        let mut drive = FakeDrive::fixed(0, DiskType::Hdd);
        if let Some(volume) = drive.volume.as_mut() {
            volume.serial_number = 0;
        }
        let view = PortableView::new(FakeSource::new().with(system_letter(), drive));
        let info = HardwareInformation::from_view(&view);

        assert!(!info.retrieved_successfully());
        assert_eq!(info.filesystem_name(), "NTFS");
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[test]
    fn test_cpu_id_is_stable_and_numeric() {
        let id = cpu_id();
        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_digit() || c == '-'));
        assert_eq!(id, cpu_id());
    }

    #[cfg(windows)]
    #[test]
    fn test_collect_native() {
        let info = HardwareInformation::collect();
        assert!(info.retrieved_successfully(), "{:?}", info.last_error());
        assert!(info.volume_id().parse::<u32>().is_ok());
    }
}
