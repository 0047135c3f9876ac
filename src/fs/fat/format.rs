//! Laying down a blank FAT12/16/32 volume.

use byteorder::{ByteOrder, LittleEndian};
use log::info;

use super::bpb::{BootParameterBlock, FatType};
use super::dir::{DirEntry, ATTR_VOLUME_ID, DIR_ENTRY_SIZE};
use super::name::{FatTimestamp, SHORT_NAME_LEN};
use crate::device::BlockDevice;
use crate::error::{FatError, Result};

pub(crate) const FSINFO_LEAD_SIG: u32 = 0x4161_5252;
pub(crate) const FSINFO_STRUCT_SIG: u32 = 0x6141_7272;
pub(crate) const FSINFO_TRAIL_SIG: u32 = 0xAA55_0000;
/// Free count / next-free value meaning "not known".
pub(crate) const FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

/// Knobs for [`format_with_options`].
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    /// Up to 11 characters; letters, digits, spaces and `_-` only.
    /// `None` writes `NO NAME`.
    pub volume_label: Option<String>,
    /// Volume serial; derived from the current time when `None`.
    pub volume_id: Option<u32>,
}

/// Format `device` as `fat_type` with default options.
pub fn format<D: BlockDevice>(device: &mut D, fat_type: FatType) -> Result<BootParameterBlock> {
    format_with_options(device, fat_type, &FormatOptions::default())
}

/// Write a fresh boot sector, empty FAT(s) and an empty root directory.
///
/// The geometry is chosen by [`BootParameterBlock::build`]; a device whose
/// size does not fit `fat_type` fails with `SizeOutOfRange`.
pub fn format_with_options<D: BlockDevice>(
    device: &mut D,
    fat_type: FatType,
    options: &FormatOptions,
) -> Result<BootParameterBlock> {
    let label = match &options.volume_label {
        Some(label) => Some(encode_label(label)?),
        None => None,
    };
    let bps = device.bytes_per_sector();
    let mut bpb = BootParameterBlock::build(fat_type, device.sector_count(), bps)?;
    let now = FatTimestamp::now();
    {
        let tail = bpb.tail_mut();
        if let Some(label) = label {
            tail.volume_label = label;
        }
        tail.volume_id = options
            .volume_id
            .unwrap_or(((now.date as u32) << 16) | now.time as u32);
    }

    let sector_len = bps as usize;
    let zero = vec![0u8; sector_len];
    let mut sector = vec![0u8; sector_len];

    // boot sector
    sector[..512].copy_from_slice(&bpb.encode());
    device.write_sector(0, &sector)?;

    // FAT32 keeps FSInfo and other reserved sectors; clear the rest
    for index in 1..bpb.reserved_sector_count as u64 {
        device.write_sector(index, &zero)?;
    }
    if fat_type == FatType::Fat32 {
        device.write_sector(1, &fs_info_sector(sector_len, FSINFO_UNKNOWN, FSINFO_UNKNOWN))?;
    }

    // FATs
    let first_fat = reserved_fat_sector(&bpb, sector_len);
    let fat_start = bpb.first_fat_sector() as u64;
    for copy in 0..bpb.number_of_fats as u64 {
        let base = fat_start + copy * bpb.fat_size() as u64;
        device.write_sector(base, &first_fat)?;
        for index in 1..bpb.fat_size() as u64 {
            device.write_sector(base + index, &zero)?;
        }
    }

    // root directory
    let mut root = vec![0u8; sector_len];
    let label_entry = DirEntry::new(bpb.tail().volume_label, ATTR_VOLUME_ID, &now);
    label_entry.encode(&mut root[..DIR_ENTRY_SIZE]);
    // the next slot is already the all-zero end marker

    let (root_start, root_sectors) = match bpb.root_cluster() {
        Some(cluster) => (
            bpb.first_data_sector() as u64 + (cluster as u64 - 2) * bpb.sectors_per_cluster as u64,
            bpb.sectors_per_cluster as u64,
        ),
        None => (bpb.first_root_sector() as u64, bpb.root_dir_sectors() as u64),
    };
    device.write_sector(root_start, &root)?;
    for index in 1..root_sectors {
        device.write_sector(root_start + index, &zero)?;
    }

    info!(
        "formatted {} volume: {} sectors, {} bytes/sector, {} sectors/cluster, {} clusters, FAT size {}",
        fat_type,
        bpb.total_sectors(),
        bps,
        bpb.sectors_per_cluster,
        bpb.count_of_clusters(),
        bpb.fat_size()
    );
    Ok(bpb)
}

/// First FAT sector: the two reserved entries (media descriptor and
/// end-of-chain with the clean/no-error bits set), plus the root
/// directory's end-of-chain on FAT32.
fn reserved_fat_sector(bpb: &BootParameterBlock, sector_len: usize) -> Vec<u8> {
    let mut fat = vec![0u8; sector_len];
    let media = bpb.media;
    match bpb.fat_type() {
        FatType::Fat12 => {
            let entry0 = 0x0F00u16 | media as u16;
            // cluster 0 low 12 bits, cluster 1 high 12 bits
            fat[0] = entry0 as u8;
            fat[1] = 0xF0 | ((entry0 >> 8) as u8 & 0x0F);
            fat[2] = 0xFF;
        }
        FatType::Fat16 => {
            LittleEndian::write_u16(&mut fat[0..2], 0xFF00 | media as u16);
            LittleEndian::write_u16(&mut fat[2..4], 0xFFFF);
        }
        FatType::Fat32 => {
            LittleEndian::write_u32(&mut fat[0..4], 0x0FFF_FF00 | media as u32);
            LittleEndian::write_u32(&mut fat[4..8], 0x0FFF_FFFF);
            if let Some(root) = bpb.root_cluster() {
                let off = root as usize * 4;
                LittleEndian::write_u32(&mut fat[off..off + 4], FatType::Fat32.ms_eoc());
            }
        }
    }
    fat
}

/// An FSInfo sector with the given free count and next-free hint.
pub(crate) fn fs_info_sector(sector_len: usize, free_count: u32, next_free: u32) -> Vec<u8> {
    let mut b = vec![0u8; sector_len];
    LittleEndian::write_u32(&mut b[0..4], FSINFO_LEAD_SIG);
    LittleEndian::write_u32(&mut b[484..488], FSINFO_STRUCT_SIG);
    LittleEndian::write_u32(&mut b[488..492], free_count);
    LittleEndian::write_u32(&mut b[492..496], next_free);
    LittleEndian::write_u32(&mut b[508..512], FSINFO_TRAIL_SIG);
    b
}

/// Upper-case and pad a volume label.
fn encode_label(label: &str) -> Result<[u8; SHORT_NAME_LEN]> {
    let invalid = || FatError::InvalidName(label.to_string());
    if label.is_empty() || label.len() > SHORT_NAME_LEN {
        return Err(invalid());
    }
    if !label
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b' ' || b == b'_' || b == b'-')
    {
        return Err(invalid());
    }
    let mut out = [b' '; SHORT_NAME_LEN];
    for (slot, b) in out.iter_mut().zip(label.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn read(dev: &mut MemoryDevice, index: u64) -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        dev.read_sector(index, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_boot_sector_written() {
        let mut dev = MemoryDevice::in_memory(20000, 512).unwrap();
        let bpb = format(&mut dev, FatType::Fat16).unwrap();

        let boot = read(&mut dev, 0);
        assert_eq!(&boot[0..3], &[0xEB, 0x00, 0x90]);
        assert_eq!(&boot[3..11], b"MSWIN4.1");
        assert_eq!(boot[21], 0xF8);
        assert_eq!(&boot[510..512], &[0x55, 0xAA]);
        assert_eq!(BootParameterBlock::parse(&boot).unwrap(), bpb);
    }

    #[test]
    fn test_reserved_fat_entries() {
        let mut dev = MemoryDevice::in_memory(2880, 512).unwrap();
        let bpb = format(&mut dev, FatType::Fat12).unwrap();
        let fat = read(&mut dev, bpb.first_fat_sector() as u64);
        assert_eq!(&fat[0..4], &[0xF8, 0xFF, 0xFF, 0x00]);

        let mut dev = MemoryDevice::in_memory(20000, 512).unwrap();
        let bpb = format(&mut dev, FatType::Fat16).unwrap();
        let fat = read(&mut dev, bpb.first_fat_sector() as u64);
        assert_eq!(&fat[0..6], &[0xF8, 0xFF, 0xFF, 0xFF, 0x00, 0x00]);

        let mut dev = MemoryDevice::in_memory(70000, 512).unwrap();
        let bpb = format(&mut dev, FatType::Fat32).unwrap();
        let fat = read(&mut dev, bpb.first_fat_sector() as u64);
        assert_eq!(LittleEndian::read_u32(&fat[0..4]), 0x0FFF_FFF8);
        assert_eq!(LittleEndian::read_u32(&fat[4..8]), 0x0FFF_FFFF);
        // root directory cluster
        assert_eq!(LittleEndian::read_u32(&fat[8..12]), 0x0FFF_FFFF);
        assert_eq!(LittleEndian::read_u32(&fat[12..16]), 0);
    }

    #[test]
    fn test_fat_region_is_cleared() {
        let mut dev = MemoryDevice::in_memory(20000, 512).unwrap();
        // dirty the whole device first
        for index in 0..20000 {
            dev.write_sector(index, &[0xAAu8; 512]).unwrap();
        }
        let bpb = format(&mut dev, FatType::Fat16).unwrap();
        let last_fat = bpb.first_fat_sector() as u64 + bpb.fat_size() as u64 - 1;
        assert!(read(&mut dev, last_fat).iter().all(|&b| b == 0));
        let last_root = bpb.first_data_sector() as u64 - 1;
        assert!(read(&mut dev, last_root).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_root_holds_label_then_end_marker() {
        let mut dev = MemoryDevice::in_memory(20000, 512).unwrap();
        let options = FormatOptions {
            volume_label: Some("backup".into()),
            volume_id: Some(0x1234_5678),
        };
        let bpb = format_with_options(&mut dev, FatType::Fat16, &options).unwrap();
        assert_eq!(bpb.volume_label().as_deref(), Some("BACKUP"));
        assert_eq!(bpb.tail().volume_id, 0x1234_5678);

        let root = read(&mut dev, bpb.first_root_sector() as u64);
        let label = DirEntry::parse(&root[0..32]);
        assert_eq!(&label.name, b"BACKUP     ");
        assert_eq!(label.attributes, ATTR_VOLUME_ID);
        assert!(DirEntry::parse(&root[32..64]).is_end());
    }

    #[test]
    fn test_fat32_fs_info() {
        let mut dev = MemoryDevice::in_memory(70000, 512).unwrap();
        format(&mut dev, FatType::Fat32).unwrap();
        let info = read(&mut dev, 1);
        assert_eq!(LittleEndian::read_u32(&info[0..4]), FSINFO_LEAD_SIG);
        assert_eq!(LittleEndian::read_u32(&info[484..488]), FSINFO_STRUCT_SIG);
        assert_eq!(LittleEndian::read_u32(&info[488..492]), FSINFO_UNKNOWN);
        assert_eq!(LittleEndian::read_u32(&info[508..512]), FSINFO_TRAIL_SIG);
    }

    #[test]
    fn test_bad_label_rejected() {
        let mut dev = MemoryDevice::in_memory(20000, 512).unwrap();
        let options = FormatOptions {
            volume_label: Some("WAY TOO LONG LABEL".into()),
            volume_id: None,
        };
        assert!(matches!(
            format_with_options(&mut dev, FatType::Fat16, &options),
            Err(FatError::InvalidName(_))
        ));
    }

    #[test]
    fn test_size_out_of_range() {
        let mut dev = MemoryDevice::in_memory(8400, 512).unwrap();
        assert!(matches!(
            format(&mut dev, FatType::Fat16),
            Err(FatError::SizeOutOfRange { .. })
        ));
    }
}
