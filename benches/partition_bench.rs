//! Benchmarks for the partition cache.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use winapi_helpers::error::Result;
use winapi_helpers::partition::{
    DiskType, PartitionCache, PartitionSource, PlacementType, PortableView, VolumeInformation,
};

/// Every letter from `C` on is a fixed NTFS volume spread over four disks.
struct StaticSource {
    mask: u32,
}

impl StaticSource {
    fn with_drives(count: u32) -> Self {
        let mask = ((1u32 << count) - 1) << 2;
        Self { mask }
    }
}

impl PartitionSource for StaticSource {
    fn logical_drives(&self) -> Result<u32> {
        Ok(self.mask)
    }

    fn placement(&self, _letter: char) -> Result<PlacementType> {
        Ok(PlacementType::Fixed)
    }

    fn physical_drive(&self, letter: char) -> Result<Option<u32>> {
        Ok(Some((letter as u32 - 'A' as u32) % 4))
    }

    fn disk_type(&self, physical_drive: u32) -> Result<DiskType> {
        Ok(if physical_drive % 2 == 0 { DiskType::Ssd } else { DiskType::Hdd })
    }

    fn volume_information(&self, letter: char) -> Result<VolumeInformation> {
        Ok(VolumeInformation {
            name: format!("Volume {letter}"),
            serial_number: 0x1234_0000 | letter as u32,
            filesystem_name: "NTFS".to_string(),
        })
    }
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");

    for drives in [2u32, 8, 24].iter() {
        let cache = PartitionCache::new(StaticSource::with_drives(*drives));
        group.bench_with_input(BenchmarkId::from_parameter(drives), &cache, |b, cache| {
            b.iter(|| cache.collect())
        });
    }

    group.finish();
}

fn bench_readers(c: &mut Criterion) {
    let cache = PartitionCache::new(StaticSource::with_drives(24));

    c.bench_function("enumerate", |b| b.iter(|| cache.enumerate()));
    c.bench_function("get_by_path", |b| {
        b.iter(|| cache.get_by_path(black_box(r"q:\data\file.txt")))
    });
    c.bench_function("enumerate_by_physical_drive", |b| {
        b.iter(|| cache.enumerate_by_physical_drive(black_box(2)))
    });
}

fn bench_portable_view(c: &mut Criterion) {
    let view = PortableView::new(StaticSource::with_drives(24));

    c.bench_function("portable_enumerate", |b| b.iter(|| view.enumerate()));
    c.bench_function("portable_physical_drive_indices", |b| {
        b.iter(|| view.physical_drive_indices())
    });
}

criterion_group!(benches, bench_collect, bench_readers, bench_portable_view);
criterion_main!(benches);
