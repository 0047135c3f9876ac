pub mod entry;
pub mod fat;
pub mod filesystem;

use std::io::{Read, Seek, Write};

use crate::device::ImageDevice;
use crate::error::{FatError, Result};
use fat::FatFilesystem;

/// True for MBR partition type bytes that hold a FAT12/16/32 volume.
pub fn is_fat_partition_type(partition_type: u8) -> bool {
    matches!(
        partition_type,
        0x01 | 0x04 | 0x06 | 0x0E | 0x14 | 0x16 | 0x1E | 0x0B | 0x0C | 0x1B | 0x1C
    )
}

/// Mount the FAT volume of a partition inside a disk image.
///
/// `partition_offset` is in bytes from the start of `reader`;
/// `partition_type` is the MBR partition type byte.
pub fn open_filesystem<R: Read + Write + Seek>(
    reader: R,
    partition_offset: u64,
    sector_count: u64,
    bytes_per_sector: u32,
    partition_type: u8,
) -> Result<FatFilesystem<ImageDevice<R>>> {
    if !is_fat_partition_type(partition_type) {
        return Err(match partition_type {
            0x07 => FatError::Unsupported("NTFS/exFAT volumes are not supported".into()),
            0x83 => FatError::Unsupported("ext2/3/4 volumes are not supported".into()),
            _ => FatError::Unsupported(format!(
                "partition type 0x{partition_type:02X} is not a FAT volume"
            )),
        });
    }
    let device =
        ImageDevice::with_partition(reader, partition_offset, sector_count, bytes_per_sector)?;
    FatFilesystem::mount(device)
}
