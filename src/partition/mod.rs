//! Logical partition information.
//!
//! [`PartitionCache`] keeps a point-in-time snapshot of every logical drive
//! letter together with the physical disk behind it, its placement (fixed,
//! removable, network, ...) and whether that disk is an HDD or an SSD.
//!
//! The snapshot is rebuilt wholesale by [`PartitionCache::collect`] and read
//! by any number of threads at the same time. Readers always receive copies,
//! and a refresh is swapped in atomically, so a reader never sees records from
//! two different refreshes mixed together.
//!
//! The operating system is reached only through the [`PartitionSource`]
//! trait. On Windows [`WindowsPartitionSource`] talks to the volume manager;
//! tests and other platforms inject their own source.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> winapi_helpers::error::Result<()> {
//! use winapi_helpers::partition::PartitionCache;
//!
//! let cache = PartitionCache::native();
//! for partition in cache.enumerate() {
//!     println!("{}: drive {:?} {}", partition.letter, partition.physical_drive, partition.disk_type);
//! }
//! cache.collect()?; // pick up newly mounted volumes
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};

#[cfg(windows)]
mod native;
mod portable;

#[cfg(test)]
pub(crate) mod fake;

#[cfg(windows)]
pub use native::WindowsPartitionSource;
pub use portable::{
    disk_type_to_string, placement_to_string, PortablePartition, PortableView, DEFAULT_SYSTEM_DRIVE,
};

/// Number of addressable drive letters, `A` to `Z`.
pub const DRIVE_LETTER_COUNT: u32 = 26;

/// How a logical drive is attached to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PlacementType {
    /// Fixed (internal) disk.
    Fixed,
    /// Removable media such as a USB stick.
    Removable,
    /// The root path is invalid, e.g. no volume is mounted there.
    NoRootDir,
    /// Remote (network) drive.
    Network,
    /// Optical drive.
    CdRom,
    /// RAM disk.
    RamDisk,
    /// The drive type could not be determined.
    #[default]
    Unknown,
}

impl PlacementType {
    /// Maps a `GetDriveTypeW` return code to a placement.
    ///
    /// Codes outside the documented `DRIVE_*` range map to `Unknown`.
    pub fn from_drive_type_code(code: u32) -> Self {
        match code {
            1 => PlacementType::NoRootDir,
            2 => PlacementType::Removable,
            3 => PlacementType::Fixed,
            4 => PlacementType::Network,
            5 => PlacementType::CdRom,
            6 => PlacementType::RamDisk,
            _ => PlacementType::Unknown,
        }
    }

    /// Returns true if drives with this placement can sit on a local physical disk.
    ///
    /// Only these placements are indexed by physical drive.
    pub fn is_physical(self) -> bool {
        matches!(
            self,
            PlacementType::Fixed | PlacementType::Removable | PlacementType::Unknown
        )
    }
}

/// Rotational or solid-state storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DiskType {
    /// Spinning disk (no TRIM support).
    Hdd,
    /// Solid-state disk (TRIM enabled).
    Ssd,
    /// Not probed or the probe failed.
    #[default]
    Unknown,
}

/// Name, serial number and file system of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VolumeInformation {
    /// Volume label, possibly empty.
    pub name: String,
    /// Volume serial number.
    pub serial_number: u32,
    /// File system name, e.g. `NTFS`.
    pub filesystem_name: String,
}

/// Everything known about one logical partition.
///
/// The `Default` value is the "not found" sentinel returned by
/// [`PartitionCache::get_by_path`]; check it with [`PartitionRecord::is_empty`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionRecord {
    /// Drive letter, `A` to `Z` in upper case.
    pub letter: char,
    /// Index of the physical disk, `None` if it could not be determined
    /// (network shares, virtual or spanned volumes).
    pub physical_drive: Option<u32>,
    /// How the drive is attached.
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

impl PartitionRecord {
    /// Returns true for the "not found" sentinel.
    pub fn is_empty(&self) -> bool {
        self.letter == '\0'
    }

    /// Physical drive as a signed index, `-1` when unknown.
    pub fn physical_drive_index(&self) -> i32 {
        self.physical_drive
            .and_then(|index| i32::try_from(index).ok())
            .unwrap_or(-1)
    }

    /// Windows root of this partition, e.g. `C:\`. Empty for the sentinel.
    pub fn root(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("{}:\\", self.letter)
        }
    }
}

/// Native queries the cache is built from.
///
/// Only [`logical_drives`](PartitionSource::logical_drives) failing aborts a
/// refresh. Every other error is absorbed by the cache and the affected field
/// falls back to its unknown value.
pub trait PartitionSource: Send + Sync {
    /// Bitmap of active drive letters, bit 0 is `A`. Bits above 25 are ignored.
    fn logical_drives(&self) -> Result<u32>;

    /// Placement of the drive with the given upper-case letter.
    fn placement(&self, letter: char) -> Result<PlacementType>;

    /// Physical disk number holding the volume.
    ///
    /// `Ok(None)` means the volume does not map to exactly one disk.
    fn physical_drive(&self, letter: char) -> Result<Option<u32>>;

    /// HDD/SSD probe of a physical disk.
    fn disk_type(&self, physical_drive: u32) -> Result<DiskType>;

    /// Label, serial number and file system of the volume.
    fn volume_information(&self, letter: char) -> Result<VolumeInformation>;
}

impl<S: PartitionSource + ?Sized> PartitionSource for Arc<S> {
    fn logical_drives(&self) -> Result<u32> {
        (**self).logical_drives()
    }

    fn placement(&self, letter: char) -> Result<PlacementType> {
        (**self).placement(letter)
    }

    fn physical_drive(&self, letter: char) -> Result<Option<u32>> {
        (**self).physical_drive(letter)
    }

    fn disk_type(&self, physical_drive: u32) -> Result<DiskType> {
        (**self).disk_type(physical_drive)
    }

    fn volume_information(&self, letter: char) -> Result<VolumeInformation> {
        (**self).volume_information(letter)
    }
}

/// Iterates the drive letters set in a `GetLogicalDrives`-style bitmap.
pub fn drive_letters(mask: u32) -> impl Iterator<Item = char> {
    (0..DRIVE_LETTER_COUNT)
        .filter(move |bit| mask & (1 << bit) != 0)
        .map(|bit| char::from(b'A' + bit as u8))
}

/// Options applied on every refresh.
#[derive(Clone, Copy, Debug)]
pub struct CacheOptions {
    /// Highest physical drive index whose disk type is probed.
    pub max_probed_drive: u32,
    /// Query label, serial number and file system of each volume.
    pub probe_volumes: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_probed_drive: 9,
            probe_volumes: true,
        }
    }
}

impl CacheOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the highest physical drive index whose disk type is probed.
    pub fn max_probed_drive(mut self, index: u32) -> Self {
        self.max_probed_drive = index;
        self
    }

    /// Enables or disables volume label/serial/file system queries.
    pub fn probe_volumes(mut self, probe: bool) -> Self {
        self.probe_volumes = probe;
        self
    }
}

/// Outcome of a successful [`PartitionCache::collect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Generation number of the snapshot now being served.
    pub generation: u64,
    /// Number of logical partitions found.
    pub partitions: usize,
    /// Number of distinct resolved physical drives.
    pub physical_drives: usize,
}

#[derive(Debug, Default)]
struct Snapshot {
    generation: u64,
    by_letter: BTreeMap<char, PartitionRecord>,
    by_physical_drive: BTreeMap<u32, Vec<PartitionRecord>>,
}

impl Snapshot {
    fn insert(&mut self, record: PartitionRecord) {
        if record.placement.is_physical() {
            if let Some(index) = record.physical_drive {
                self.by_physical_drive
                    .entry(index)
                    .or_default()
                    .push(record.clone());
            }
        }
        self.by_letter.insert(record.letter, record);
    }

    fn physical_drive_indices(&self) -> BTreeSet<u32> {
        self.by_letter
            .values()
            .filter_map(|record| record.physical_drive)
            .collect()
    }
}

/// Cached logical partition information.
///
/// `collect` is the only mutator; every other method is a reader that copies
/// out of the current snapshot.
pub struct PartitionCache {
    source: Box<dyn PartitionSource>,
    options: CacheOptions,
    snapshot: RwLock<Snapshot>,
    collector: Mutex<()>,
}

impl PartitionCache {
    /// Creates a cache over `source` and collects the first snapshot.
    ///
    /// This performs native queries and may block for a while; avoid calling it
    /// from a UI thread. A failed first refresh leaves the cache empty.
    pub fn new(source: impl PartitionSource + 'static) -> Self {
        Self::with_options(source, CacheOptions::default())
    }

    /// Creates a cache with explicit options and collects the first snapshot.
    pub fn with_options(source: impl PartitionSource + 'static, options: CacheOptions) -> Self {
        let cache = Self {
            source: Box::new(source),
            options,
            snapshot: RwLock::new(Snapshot::default()),
            collector: Mutex::new(()),
        };
        if let Err(e) = cache.collect() {
            warn!(error = %e, "initial partition collection failed, starting empty");
        }
        cache
    }

    /// Creates a cache backed by the Windows volume manager.
    #[cfg(windows)]
    pub fn native() -> Self {
        Self::new(WindowsPartitionSource::new())
    }

    /// Returns the options used on every refresh.
    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Rebuilds the snapshot from the partition source.
    ///
    /// Field-level query failures leave the affected field unknown or empty.
    /// If the drive bitmap itself cannot be read, the previous snapshot stays
    /// in place and `Error::Refresh` is returned.
    ///
    /// Concurrent calls are serialised. Readers keep being served the previous
    /// snapshot until the new one is complete.
    #[instrument(skip(self))]
    pub fn collect(&self) -> Result<RefreshSummary> {
        let _collector = self.collector.lock().unwrap_or_else(PoisonError::into_inner);

        let mask = match self.source.logical_drives() {
            Ok(mask) => mask,
            Err(e) => {
                warn!(error = %e, "drive enumeration failed, keeping previous partition snapshot");
                return Err(Error::refresh(e.to_string()));
            }
        };

        let mut fresh = Snapshot::default();
        for letter in drive_letters(mask) {
            fresh.insert(self.read_partition(letter));
        }

        let partitions = fresh.by_letter.len();
        let physical_drives = fresh.physical_drive_indices().len();

        let stale = {
            let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            fresh.generation = current.generation + 1;
            std::mem::replace(&mut *current, fresh)
        };
        let generation = stale.generation + 1;
        drop(stale);

        info!(generation, partitions, physical_drives, "partition snapshot refreshed");
        Ok(RefreshSummary {
            generation,
            partitions,
            physical_drives,
        })
    }

    fn read_partition(&self, letter: char) -> PartitionRecord {
        let placement = self.source.placement(letter).unwrap_or_else(|e| {
            debug!(%letter, error = %e, "drive placement query failed");
            PlacementType::Unknown
        });

        let physical_drive = self.source.physical_drive(letter).unwrap_or_else(|e| {
            debug!(%letter, error = %e, "physical drive query failed");
            None
        });

        let disk_type = match physical_drive {
            Some(index) if index <= self.options.max_probed_drive => {
                self.source.disk_type(index).unwrap_or_else(|e| {
                    debug!(%letter, index, error = %e, "disk type probe failed");
                    DiskType::Unknown
                })
            }
            _ => DiskType::Unknown,
        };

        let mut record = PartitionRecord {
            letter,
            physical_drive,
            placement,
            disk_type,
            ..Default::default()
        };

        if self.options.probe_volumes {
            match self.source.volume_information(letter) {
                Ok(volume) => {
                    record.volume_name = volume.name;
                    if volume.serial_number != 0 {
                        record.volume_id = volume.serial_number.to_string();
                    }
                    record.filesystem_name = volume.filesystem_name;
                }
                Err(e) => debug!(%letter, error = %e, "volume information query failed"),
            }
        }

        record
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns every partition in the current snapshot, ordered by letter.
    pub fn enumerate(&self) -> Vec<PartitionRecord> {
        self.read().by_letter.values().cloned().collect()
    }

    /// Returns the partitions located on one physical drive.
    ///
    /// Unknown indices yield an empty vector.
    pub fn enumerate_by_physical_drive(&self, index: u32) -> Vec<PartitionRecord> {
        self.read()
            .by_physical_drive
            .get(&index)
            .cloned()
            .unwrap_or_default()
    }

    /// Looks up the partition holding `path`.
    ///
    /// Only the first character (the drive letter) is examined, so mount points
    /// nested below a drive are attributed to that drive. Returns `None` for an
    /// empty path, a path not starting with a letter, or an unknown letter.
    pub fn find_by_path(&self, path: impl AsRef<str>) -> Option<PartitionRecord> {
        let letter = path
            .as_ref()
            .chars()
            .next()
            .filter(char::is_ascii_alphabetic)?
            .to_ascii_uppercase();
        self.read().by_letter.get(&letter).cloned()
    }

    /// Like [`find_by_path`](Self::find_by_path), returning the empty sentinel
    /// record instead of `None`.
    pub fn get_by_path(&self, path: impl AsRef<str>) -> PartitionRecord {
        self.find_by_path(path).unwrap_or_default()
    }

    /// Distinct resolved physical drive indices, ascending.
    ///
    /// Taken from every record in the snapshot, so a network or optical
    /// drive that reports a disk number contributes it here even though
    /// [`enumerate_by_physical_drive`](Self::enumerate_by_physical_drive)
    /// returns nothing for that index.
    pub fn physical_drive_indices(&self) -> Vec<u32> {
        self.read().physical_drive_indices().into_iter().collect()
    }

    /// Number of successful refreshes so far.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Length of a partition root identifier: one drive letter.
    pub fn root_string_size(&self) -> usize {
        1
    }
}

impl std::fmt::Debug for PartitionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.read();
        f.debug_struct("PartitionCache")
            .field("options", &self.options)
            .field("generation", &snapshot.generation)
            .field("partitions", &snapshot.by_letter.len())
            .finish()
    }
}
