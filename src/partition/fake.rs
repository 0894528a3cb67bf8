//! Scripted partition source for tests.

use super::{DiskType, PartitionSource, PlacementType, VolumeInformation};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone, Debug)]
pub(crate) struct FakeDrive {
    pub placement: PlacementType,
    pub physical: Option<u32>,
    pub disk: DiskType,
    pub volume: Option<VolumeInformation>,
}

impl FakeDrive {
    fn volume(letter_hint: &str, filesystem: &str) -> Option<VolumeInformation> {
        Some(VolumeInformation {
            name: letter_hint.to_string(),
            serial_number: 0xDEAD_BEEF,
            filesystem_name: filesystem.to_string(),
        })
    }

    pub fn fixed(physical: u32, disk: DiskType) -> Self {
        Self {
            placement: PlacementType::Fixed,
            physical: Some(physical),
            disk,
            volume: Self::volume("", "NTFS"),
        }
    }

    pub fn removable(physical: u32) -> Self {
        Self {
            placement: PlacementType::Removable,
            physical: Some(physical),
            disk: DiskType::Unknown,
            volume: Self::volume("USB", "FAT32"),
        }
    }

    pub fn network() -> Self {
        Self {
            placement: PlacementType::Network,
            physical: None,
            disk: DiskType::Unknown,
            volume: Self::volume("share", "NTFS"),
        }
    }

    pub fn cdrom() -> Self {
        Self {
            placement: PlacementType::CdRom,
            physical: None,
            disk: DiskType::Unknown,
            volume: None,
        }
    }

    /// Fixed drive without a resolvable disk, like a container volume.
    pub fn virtual_disk() -> Self {
        Self {
            placement: PlacementType::Fixed,
            physical: None,
            disk: DiskType::Unknown,
            volume: Self::volume("container", "NTFS"),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeSource {
    drives: Mutex<BTreeMap<char, FakeDrive>>,
    fail_enumeration: AtomicBool,
    fail_fields: AtomicBool,
    disk_type_probes: Mutex<Vec<u32>>,
    volume_queries: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, letter: char, drive: FakeDrive) -> Self {
        self.insert(letter, drive);
        self
    }

    /// Adds a drive; fixed drives get a `VOL_<letter>` label.
    pub fn insert(&self, letter: char, mut drive: FakeDrive) {
        if let Some(volume) = drive.volume.as_mut() {
            if volume.name.is_empty() {
                volume.name = format!("VOL_{letter}");
            }
        }
        self.drives.lock().unwrap().insert(letter, drive);
    }

    pub fn remove(&self, letter: char) {
        self.drives.lock().unwrap().remove(&letter);
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fields(&self, fail: bool) {
        self.fail_fields.store(fail, Ordering::SeqCst);
    }

    pub fn disk_type_probes(&self) -> Vec<u32> {
        self.disk_type_probes.lock().unwrap().clone()
    }

    pub fn volume_queries(&self) -> usize {
        self.volume_queries.load(Ordering::SeqCst)
    }

    fn drive(&self, letter: char) -> Result<FakeDrive> {
        if self.fail_fields.load(Ordering::SeqCst) {
            return Err(Error::custom(format!("query for {letter}: failed")));
        }
        self.drives
            .lock()
            .unwrap()
            .get(&letter)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{letter}:")))
    }
}

impl PartitionSource for FakeSource {
    fn logical_drives(&self) -> Result<u32> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(Error::custom("GetLogicalDrives failed"));
        }
        Ok(self
            .drives
            .lock()
            .unwrap()
            .keys()
            .fold(0, |mask, &letter| mask | 1 << (letter as u32 - 'A' as u32)))
    }

    fn placement(&self, letter: char) -> Result<PlacementType> {
        Ok(self.drive(letter)?.placement)
    }

    fn physical_drive(&self, letter: char) -> Result<Option<u32>> {
        Ok(self.drive(letter)?.physical)
    }

    fn disk_type(&self, physical_drive: u32) -> Result<DiskType> {
        self.disk_type_probes.lock().unwrap().push(physical_drive);
        self.drives
            .lock()
            .unwrap()
            .values()
            .find(|drive| drive.physical == Some(physical_drive))
            .map(|drive| drive.disk)
            .ok_or_else(|| Error::not_found(format!("PhysicalDrive{physical_drive}")))
    }

    fn volume_information(&self, letter: char) -> Result<VolumeInformation> {
        self.volume_queries.fetch_add(1, Ordering::SeqCst);
        self.drive(letter)?
            .volume
            .ok_or_else(|| Error::custom(format!("{letter}: has no media")))
    }
}
