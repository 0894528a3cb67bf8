//! Platform-neutral view of the partition cache.
//!
//! Callers of this module never see drive letters directly: each partition is
//! identified by its root string (`C:\` on Windows), so the same code keeps
//! working with a source whose roots are mount paths.

use super::{
    CacheOptions, DiskType, PartitionCache, PartitionRecord, PartitionSource, PlacementType,
    RefreshSummary,
};
use crate::error::Result;
use lazy_regex::regex_is_match;
use std::fmt;

/// Fallback when `%SystemDrive%` is missing or malformed.
pub const DEFAULT_SYSTEM_DRIVE: &str = "C:\\";

/// Partition information in a platform-neutral shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortablePartition {
    /// Drive root (`C:\`) or mount point. Empty when nothing was found.
    pub root: String,
    /// Physical drive index, `-1` when unknown.
    pub drive_number: i32,
    /// How the partition is attached.
    pub placement: PlacementType,
    /// HDD or SSD.
    pub disk_type: DiskType,
    /// Volume label, empty if unavailable.
    pub volume_name: String,
    /// Volume serial number in decimal, empty if unavailable.
    pub volume_id: String,
    /// File system name, empty if unavailable.
    pub filesystem_name: String,
}

impl Default for PortablePartition {
    fn default() -> Self {
        PartitionRecord::default().into()
    }
}

impl PortablePartition {
    /// Returns true when this is the "not found" value.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl From<PartitionRecord> for PortablePartition {
    fn from(record: PartitionRecord) -> Self {
        Self {
            root: record.root(),
            drive_number: record.physical_drive_index(),
            placement: record.placement,
            disk_type: record.disk_type,
            volume_name: record.volume_name,
            volume_id: record.volume_id,
            filesystem_name: record.filesystem_name,
        }
    }
}

/// Describes a placement type for humans.
pub fn placement_to_string(placement: PlacementType) -> &'static str {
    match placement {
        PlacementType::Fixed => "Fixed disk",
        PlacementType::Removable => "Removable disk",
        PlacementType::NoRootDir => "No root directory",
        PlacementType::Network => "Network disk",
        PlacementType::CdRom => "CD-ROM",
        PlacementType::RamDisk => "RAM disk",
        PlacementType::Unknown => "Unknown placement",
    }
}

/// Describes a disk type for humans.
pub fn disk_type_to_string(disk_type: DiskType) -> &'static str {
    match disk_type {
        DiskType::Hdd => "HDD",
        DiskType::Ssd => "SSD",
        DiskType::Unknown => "Unknown disk type",
    }
}

impl fmt::Display for PlacementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(placement_to_string(*self))
    }
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(disk_type_to_string(*self))
    }
}

/// Platform-neutral facade over one owned [`PartitionCache`].
///
/// The view has no state of its own; every call delegates to the cache and
/// reshapes the result.
#[derive(Debug)]
pub struct PortableView {
    cache: PartitionCache,
}

impl PortableView {
    /// Creates a view over a new cache reading from `source`.
    pub fn new(source: impl PartitionSource + 'static) -> Self {
        Self::from_cache(PartitionCache::new(source))
    }

    /// Creates a view over a new cache with explicit options.
    pub fn with_options(source: impl PartitionSource + 'static, options: CacheOptions) -> Self {
        Self::from_cache(PartitionCache::with_options(source, options))
    }

    /// Wraps an existing cache.
    pub fn from_cache(cache: PartitionCache) -> Self {
        Self { cache }
    }

    /// Creates a view backed by the Windows volume manager.
    #[cfg(windows)]
    pub fn native() -> Self {
        Self::from_cache(PartitionCache::native())
    }

    /// Process-wide view over the native backend, created on first use.
    ///
    /// Prefer owning a `PortableView` and passing it around; this exists for
    /// callers that need one shared instance without threading it through.
    #[cfg(windows)]
    pub fn shared() -> &'static PortableView {
        static SHARED: std::sync::OnceLock<PortableView> = std::sync::OnceLock::new();
        SHARED.get_or_init(PortableView::native)
    }

    /// The underlying cache.
    pub fn cache(&self) -> &PartitionCache {
        &self.cache
    }

    /// Refreshes the underlying snapshot. See [`PartitionCache::collect`].
    pub fn collect(&self) -> Result<RefreshSummary> {
        self.cache.collect()
    }

    /// Every partition in the current snapshot.
    pub fn enumerate(&self) -> Vec<PortablePartition> {
        self.cache.enumerate().into_iter().map(Into::into).collect()
    }

    /// Partitions on one physical drive. Negative or unknown indices yield an
    /// empty vector.
    pub fn enumerate_by_physical_drive(&self, drive_number: i32) -> Vec<PortablePartition> {
        match u32::try_from(drive_number) {
            Ok(index) => self
                .cache
                .enumerate_by_physical_drive(index)
                .into_iter()
                .map(Into::into)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Partition holding `path`; empty when not found.
    pub fn get_by_path(&self, path: impl AsRef<str>) -> PortablePartition {
        self.cache.get_by_path(path).into()
    }

    /// Distinct resolved physical drive numbers, ascending.
    pub fn physical_drive_indices(&self) -> Vec<i32> {
        self.cache
            .physical_drive_indices()
            .into_iter()
            .filter_map(|index| i32::try_from(index).ok())
            .collect()
    }

    /// Root of the system partition, e.g. `C:\`.
    pub fn system_drive() -> String {
        system_drive_from(std::env::var("SystemDrive").ok().as_deref())
    }

    /// The partition holding the system root.
    pub fn system_partition(&self) -> PortablePartition {
        self.get_by_path(Self::system_drive())
    }

    /// Length of a partition root identifier.
    pub fn root_string_size(&self) -> usize {
        self.cache.root_string_size()
    }

    /// See [`placement_to_string`].
    pub fn placement_to_string(placement: PlacementType) -> &'static str {
        placement_to_string(placement)
    }

    /// See [`disk_type_to_string`].
    pub fn disk_type_to_string(disk_type: DiskType) -> &'static str {
        disk_type_to_string(disk_type)
    }
}

fn system_drive_from(env_value: Option<&str>) -> String {
    match env_value {
        Some(drive) => {
            let root = format!("{drive}\\");
            if regex_is_match!(r"^[a-zA-Z]:\\$", root.as_str()) {
                root
            } else {
                DEFAULT_SYSTEM_DRIVE.to_string()
            }
        }
        None => DEFAULT_SYSTEM_DRIVE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::fake::{FakeDrive, FakeSource};
    use super::*;

    fn view() -> PortableView {
        PortableView::new(
            FakeSource::new()
                .with('C', FakeDrive::fixed(0, DiskType::Ssd))
                .with('D', FakeDrive::fixed(0, DiskType::Ssd))
                .with('E', FakeDrive::cdrom())
                .with('F', FakeDrive::removable(1))
                .with('L', FakeDrive::virtual_disk())
                .with('Z', FakeDrive::network()),
        )
    }

    #[test]
    fn test_enumerate_uses_roots() {
        let roots: Vec<_> = view().enumerate().into_iter().map(|p| p.root).collect();
        assert_eq!(roots, ["C:\\", "D:\\", "E:\\", "F:\\", "L:\\", "Z:\\"]);
    }

    #[test]
    fn test_unknown_drive_number_is_negative_one() {
        let view = view();
        assert_eq!(view.get_by_path("E:\\").drive_number, -1);
        assert_eq!(view.get_by_path("L:\\data").drive_number, -1);
        assert_eq!(view.get_by_path("F:\\").drive_number, 1);
    }

    #[test]
    fn test_by_physical_drive() {
        let view = view();
        let roots: Vec<_> = view
            .enumerate_by_physical_drive(0)
            .into_iter()
            .map(|p| p.root)
            .collect();
        assert_eq!(roots, ["C:\\", "D:\\"]);
        assert!(view.enumerate_by_physical_drive(-1).is_empty());
        assert!(view.enumerate_by_physical_drive(5).is_empty());
        assert_eq!(view.physical_drive_indices(), vec![0, 1]);
    }

    #[test]
    fn test_missing_path_is_empty() {
        let view = view();
        assert!(view.get_by_path("").is_empty());
        assert!(view.get_by_path("1abc").is_empty());
        assert!(view.get_by_path("Y:\\").is_empty());
        assert_eq!(view.get_by_path("").drive_number, -1);
        assert_eq!(PortablePartition::default(), view.get_by_path("Y:\\"));
    }

    #[test]
    fn test_fields_carried_over() {
        let c = view().get_by_path("c:\\windows");
        assert_eq!(c.root, "C:\\");
        assert_eq!(c.placement, PlacementType::Fixed);
        assert_eq!(c.disk_type, DiskType::Ssd);
        assert_eq!(c.volume_name, "VOL_C");
        assert_eq!(c.filesystem_name, "NTFS");
    }

    #[test]
    fn test_placement_strings() {
        assert_eq!(placement_to_string(PlacementType::Fixed), "Fixed disk");
        assert_eq!(placement_to_string(PlacementType::Network), "Network disk");
        assert_eq!(PortableView::placement_to_string(PlacementType::CdRom), "CD-ROM");
        assert_eq!(PlacementType::RamDisk.to_string(), "RAM disk");
        assert_eq!(PlacementType::default().to_string(), "Unknown placement");
    }

    #[test]
    fn test_disk_type_strings() {
        assert_eq!(disk_type_to_string(DiskType::Ssd), "SSD");
        assert_eq!(PortableView::disk_type_to_string(DiskType::Hdd), "HDD");
        assert_eq!(DiskType::Unknown.to_string(), "Unknown disk type");
        assert_eq!(format!("[{:<5}]", DiskType::Ssd), "[SSD  ]");
    }

    #[test]
    fn test_system_drive_parsing() {
        assert_eq!(system_drive_from(Some("D:")), "D:\\");
        assert_eq!(system_drive_from(Some("c:")), "c:\\");
        assert_eq!(system_drive_from(None), DEFAULT_SYSTEM_DRIVE);
        assert_eq!(system_drive_from(Some("")), DEFAULT_SYSTEM_DRIVE);
        assert_eq!(system_drive_from(Some("D:\\")), DEFAULT_SYSTEM_DRIVE);
        assert_eq!(system_drive_from(Some("\\\\server")), DEFAULT_SYSTEM_DRIVE);
    }

    #[test]
    fn test_system_partition_lookup() {
        let view = view();
        let root = PortableView::system_drive();
        let expected_letter = root.chars().next().map(|c| c.to_ascii_uppercase());
        let system = view.system_partition();
        if matches!(expected_letter, Some('C' | 'D' | 'E' | 'F' | 'L' | 'Z')) {
            assert!(!system.is_empty());
        } else {
            assert!(system.is_empty());
        }
    }

    #[test]
    fn test_refresh_through_view() {
        let view = view();
        let summary = view.collect().unwrap();
        assert_eq!(summary.generation, 2);
        assert_eq!(summary.partitions, 6);
        assert_eq!(view.root_string_size(), 1);
    }
}
