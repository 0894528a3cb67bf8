//! Windows implementation of [`PartitionSource`].

use super::{DiskType, PartitionSource, PlacementType, VolumeInformation};
use crate::error::{last_error, Result};
use crate::handle::OwnedHandle;
use crate::string::{from_wide_lossy, WideString};
use std::ffi::c_void;
use windows::Win32::Foundation::{ERROR_MORE_DATA, MAX_PATH};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, GetDriveTypeW, GetLogicalDrives, GetVolumeInformationW, FILE_FLAGS_AND_ATTRIBUTES,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Ioctl::{
    PropertyStandardQuery, StorageDeviceTrimProperty, DEVICE_TRIM_DESCRIPTOR, DISK_EXTENT,
    STORAGE_PROPERTY_QUERY, VOLUME_DISK_EXTENTS,
};
use windows::Win32::System::IO::DeviceIoControl;

/// `CTL_CODE(IOCTL_VOLUME_BASE, 0, METHOD_BUFFERED, FILE_ANY_ACCESS)`
const IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS: u32 = 0x0056_0000;
/// `CTL_CODE(IOCTL_STORAGE_BASE, 0x500, METHOD_BUFFERED, FILE_ANY_ACCESS)`
const IOCTL_STORAGE_QUERY_PROPERTY: u32 = 0x002D_1400;

/// Queries the Windows volume manager.
///
/// Devices are opened without read or write access: both IOCTLs used here are
/// `FILE_ANY_ACCESS`, so no elevation is needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsPartitionSource;

impl WindowsPartitionSource {
    /// Creates the source.
    pub fn new() -> Self {
        Self
    }

    fn open_device(path: &str) -> Result<OwnedHandle> {
        let path = WideString::new(path);
        // SAFETY: `path` is a valid null-terminated wide string that outlives the call.
        let handle = unsafe {
            CreateFileW(
                path.as_pcwstr(),
                0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(0),
                None,
            )?
        };
        OwnedHandle::new(handle)
    }
}

fn drive_root(letter: char) -> WideString {
    WideString::new(&format!("{letter}:\\"))
}

impl PartitionSource for WindowsPartitionSource {
    fn logical_drives(&self) -> Result<u32> {
        // SAFETY: GetLogicalDrives takes no parameters.
        let mask = unsafe { GetLogicalDrives() };
        if mask == 0 {
            return Err(last_error());
        }
        Ok(mask)
    }

    fn placement(&self, letter: char) -> Result<PlacementType> {
        let root = drive_root(letter);
        // SAFETY: `root` is a valid null-terminated wide string.
        let code = unsafe { GetDriveTypeW(root.as_pcwstr()) };
        Ok(PlacementType::from_drive_type_code(code))
    }

    fn physical_drive(&self, letter: char) -> Result<Option<u32>> {
        let volume = Self::open_device(&format!("\\\\.\\{letter}:"))?;

        let mut extents = VOLUME_DISK_EXTENTS {
            NumberOfDiskExtents: 0,
            Extents: [DISK_EXTENT::default()],
        };
        let mut returned = 0u32;

        // SAFETY: `volume` is an open device handle and `extents` is a writable
        // buffer of the size passed in.
        let result = unsafe {
            DeviceIoControl(
                volume.as_raw(),
                IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS,
                None,
                0,
                Some(&mut extents as *mut _ as *mut c_void),
                std::mem::size_of::<VOLUME_DISK_EXTENTS>() as u32,
                Some(&mut returned),
                None,
            )
        };

        match result {
            // Spanned volumes fail with ERROR_MORE_DATA and have no single disk.
            Err(e) if e.code() == ERROR_MORE_DATA.to_hresult() => Ok(None),
            Err(e) => Err(e.into()),
            Ok(()) if extents.NumberOfDiskExtents == 1 => Ok(Some(extents.Extents[0].DiskNumber)),
            Ok(()) => Ok(None),
        }
    }

    fn disk_type(&self, physical_drive: u32) -> Result<DiskType> {
        let device = Self::open_device(&format!("\\\\?\\PhysicalDrive{physical_drive}"))?;

        let query = STORAGE_PROPERTY_QUERY {
            PropertyId: StorageDeviceTrimProperty,
            QueryType: PropertyStandardQuery,
            ..Default::default()
        };
        let mut trim = DEVICE_TRIM_DESCRIPTOR::default();
        let mut returned = 0u32;

        // SAFETY: `device` is an open device handle; input and output buffers
        // are properly sized stack structures.
        unsafe {
            DeviceIoControl(
                device.as_raw(),
                IOCTL_STORAGE_QUERY_PROPERTY,
                Some(&query as *const _ as *const c_void),
                std::mem::size_of::<STORAGE_PROPERTY_QUERY>() as u32,
                Some(&mut trim as *mut _ as *mut c_void),
                std::mem::size_of::<DEVICE_TRIM_DESCRIPTOR>() as u32,
                Some(&mut returned),
                None,
            )?;
        }

        if returned as usize != std::mem::size_of::<DEVICE_TRIM_DESCRIPTOR>() {
            return Ok(DiskType::Unknown);
        }
        Ok(if trim.TrimEnabled.0 != 0 {
            DiskType::Ssd
        } else {
            DiskType::Hdd
        })
    }

    fn volume_information(&self, letter: char) -> Result<VolumeInformation> {
        const BUFFER_SIZE: usize = (MAX_PATH + 1) as usize;

        let root = drive_root(letter);
        let mut label = [0u16; BUFFER_SIZE];
        let mut filesystem = [0u16; BUFFER_SIZE];
        let mut serial_number = 0u32;

        // SAFETY: `root` is a valid null-terminated wide string; the output
        // buffers are sized by the slices passed in.
        unsafe {
            GetVolumeInformationW(
                root.as_pcwstr(),
                Some(&mut label),
                Some(&mut serial_number),
                None,
                None,
                Some(&mut filesystem),
            )?;
        }

        Ok(VolumeInformation {
            name: from_wide_lossy(&label),
            serial_number,
            filesystem_name: from_wide_lossy(&filesystem),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionCache;

    #[test]
    fn test_logical_drives_not_empty() {
        let mask = WindowsPartitionSource::new().logical_drives().unwrap();
        assert_ne!(mask, 0);
    }

    #[test]
    fn test_system_drive_is_fixed() {
        let source = WindowsPartitionSource::new();
        let system = crate::partition::PortableView::system_drive();
        let letter = system.chars().next().unwrap().to_ascii_uppercase();
        assert_eq!(source.placement(letter).unwrap(), PlacementType::Fixed);
    }

    #[test]
    fn test_native_cache_matches_bitmap() {
        let mask = WindowsPartitionSource::new().logical_drives().unwrap();
        let cache = PartitionCache::native();
        let letters: String = cache.enumerate().iter().map(|r| r.letter).collect();
        let expected: String = crate::partition::drive_letters(mask).collect();
        assert_eq!(letters, expected);
        println!("{:#?}", cache.enumerate());
    }
}
