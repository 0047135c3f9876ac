//! Boot parameter block: parse, validate, build.
//!
//! Bytes 36..90 of the boot sector are laid out differently on FAT12/16 and
//! FAT32 volumes. They are decoded into [`BpbExtension`], whose variant is
//! picked from the FAT type derived from the volume geometry.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{FatError, Result};

/// Size of the on-disk boot sector structure.
pub const BPB_SIZE: usize = 512;

/// Label used when the caller does not supply one.
pub const DEFAULT_VOLUME_LABEL: [u8; 11] = *b"NO NAME    ";

const OEM_NAME: [u8; 8] = *b"MSWIN4.1";
const MEDIA_FIXED_DISK: u8 = 0xF8;
const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;

/// Clusters below this count make a volume FAT12.
pub const FAT12_MAX_CLUSTERS: u32 = 4085;
/// Clusters below this count (and at least [`FAT12_MAX_CLUSTERS`]) make a volume FAT16.
pub const FAT16_MAX_CLUSTERS: u32 = 65525;

/// `(disk size in 512-byte sectors, sectors per cluster)`; the first row
/// whose limit covers the disk wins. A zero means "too small/large".
#[rustfmt::skip]
const FAT16_CLUSTER_TABLE: [(u32, u32); 8] = [
    (8400,       0),
    (32680,      2),
    (262144,     4),
    (524288,     8),
    (1048576,   16),
    // only reached when FAT16 is forced onto a large disk
    (2097152,   32),
    (4194304,   64),
    (0xFFFF_FFFF, 0),
];

#[rustfmt::skip]
const FAT32_CLUSTER_TABLE: [(u32, u32); 6] = [
    (66600,       0),
    (532480,      1),
    (16777216,    8),
    (33554432,   16),
    (67108864,   32),
    (0xFFFF_FFFF, 64),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    pub fn name(&self) -> &'static str {
        match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
        }
    }

    /// FAT type implied by a data-region cluster count.
    pub fn from_cluster_count(count_of_clusters: u32) -> Self {
        if count_of_clusters < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if count_of_clusters < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// Default FAT type to format a device of `sector_count` sectors with.
    pub fn for_sector_count(sector_count: u64) -> Self {
        if sector_count <= 8400 {
            FatType::Fat12
        } else if sector_count <= 66600 {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// Parse "FAT12" / "fat16" / ... as typed by a user.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "FAT12" => Some(FatType::Fat12),
            "FAT16" => Some(FatType::Fat16),
            "FAT32" => Some(FatType::Fat32),
            _ => None,
        }
    }

    fn fs_type_string(&self) -> [u8; 8] {
        match self {
            FatType::Fat12 => *b"FAT12   ",
            FatType::Fat16 => *b"FAT16   ",
            FatType::Fat32 => *b"FAT32   ",
        }
    }
}

impl fmt::Display for FatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drive number / serial / label block that closes the BPB on every FAT type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSectorTail {
    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

impl BootSectorTail {
    const SIZE: usize = 26;

    fn parse(b: &[u8]) -> Self {
        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&b[7..18]);
        let mut fs_type = [0u8; 8];
        fs_type.copy_from_slice(&b[18..26]);
        Self {
            drive_number: b[0],
            reserved1: b[1],
            boot_signature: b[2],
            volume_id: LittleEndian::read_u32(&b[3..7]),
            volume_label,
            fs_type,
        }
    }

    fn encode(&self, b: &mut [u8]) {
        b[0] = self.drive_number;
        b[1] = self.reserved1;
        b[2] = self.boot_signature;
        LittleEndian::write_u32(&mut b[3..7], self.volume_id);
        b[7..18].copy_from_slice(&self.volume_label);
        b[18..26].copy_from_slice(&self.fs_type);
    }
}

/// FAT32-only fields occupying bytes 36..64, followed by the tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat32Extension {
    pub fat_size_32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fs_info: u16,
    pub backup_boot_sector: u16,
    pub reserved: [u8; 12],
    pub tail: BootSectorTail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BpbExtension {
    /// FAT12/FAT16: the tail starts right at byte 36.
    Fat1x(BootSectorTail),
    Fat32(Fat32Extension),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootParameterBlock {
    pub jump_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub number_of_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    pub fat_size_16: u16,
    pub sectors_per_track: u16,
    pub number_of_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
    pub extension: BpbExtension,
}

impl BootParameterBlock {
    /// Decode a boot sector.
    ///
    /// Only the jump instruction (`EB xx 90` or `E9 xx xx`) is treated as a
    /// signature; geometry fields that would make the layout arithmetic
    /// meaningless are rejected as well.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BPB_SIZE {
            return Err(FatError::Validation(format!(
                "boot sector is {} bytes, expected {BPB_SIZE}",
                bytes.len()
            )));
        }

        let jump_ok = (bytes[0] == 0xEB && bytes[2] == 0x90) || bytes[0] == 0xE9;
        if !jump_ok {
            return Err(FatError::Validation(format!(
                "bad jump instruction {:02X} {:02X} {:02X}",
                bytes[0], bytes[1], bytes[2]
            )));
        }

        let mut jump_boot = [0u8; 3];
        jump_boot.copy_from_slice(&bytes[0..3]);
        let mut oem_name = [0u8; 8];
        oem_name.copy_from_slice(&bytes[3..11]);

        let bytes_per_sector = LittleEndian::read_u16(&bytes[11..13]);
        if bytes_per_sector == 0 {
            return Err(FatError::Validation("bytes per sector is 0".into()));
        }
        let sectors_per_cluster = bytes[13];
        if sectors_per_cluster == 0 {
            return Err(FatError::Validation("sectors per cluster is 0".into()));
        }

        let mut bpb = Self {
            jump_boot,
            oem_name,
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sector_count: LittleEndian::read_u16(&bytes[14..16]),
            number_of_fats: bytes[16],
            root_entry_count: LittleEndian::read_u16(&bytes[17..19]),
            total_sectors_16: LittleEndian::read_u16(&bytes[19..21]),
            media: bytes[21],
            fat_size_16: LittleEndian::read_u16(&bytes[22..24]),
            sectors_per_track: LittleEndian::read_u16(&bytes[24..26]),
            number_of_heads: LittleEndian::read_u16(&bytes[26..28]),
            hidden_sectors: LittleEndian::read_u32(&bytes[28..32]),
            total_sectors_32: LittleEndian::read_u32(&bytes[32..36]),
            extension: BpbExtension::Fat1x(BootSectorTail::parse(&bytes[36..36 + BootSectorTail::SIZE])),
        };

        // The FAT size needed to derive the type lives in the FAT32 area
        // whenever the 16-bit field is zero, so peek at it first.
        let fat_size = if bpb.fat_size_16 != 0 {
            bpb.fat_size_16 as u32
        } else {
            LittleEndian::read_u32(&bytes[36..40])
        };

        if bpb.fat_type_for(fat_size) == FatType::Fat32 {
            let mut reserved = [0u8; 12];
            reserved.copy_from_slice(&bytes[52..64]);
            bpb.extension = BpbExtension::Fat32(Fat32Extension {
                fat_size_32: LittleEndian::read_u32(&bytes[36..40]),
                ext_flags: LittleEndian::read_u16(&bytes[40..42]),
                fs_version: LittleEndian::read_u16(&bytes[42..44]),
                root_cluster: LittleEndian::read_u32(&bytes[44..48]),
                fs_info: LittleEndian::read_u16(&bytes[48..50]),
                backup_boot_sector: LittleEndian::read_u16(&bytes[50..52]),
                reserved,
                tail: BootSectorTail::parse(&bytes[64..64 + BootSectorTail::SIZE]),
            });
        }

        Ok(bpb)
    }

    /// Encode into the fixed 512-byte layout, boot signature included.
    pub fn encode(&self) -> [u8; BPB_SIZE] {
        let mut b = [0u8; BPB_SIZE];
        b[0..3].copy_from_slice(&self.jump_boot);
        b[3..11].copy_from_slice(&self.oem_name);
        LittleEndian::write_u16(&mut b[11..13], self.bytes_per_sector);
        b[13] = self.sectors_per_cluster;
        LittleEndian::write_u16(&mut b[14..16], self.reserved_sector_count);
        b[16] = self.number_of_fats;
        LittleEndian::write_u16(&mut b[17..19], self.root_entry_count);
        LittleEndian::write_u16(&mut b[19..21], self.total_sectors_16);
        b[21] = self.media;
        LittleEndian::write_u16(&mut b[22..24], self.fat_size_16);
        LittleEndian::write_u16(&mut b[24..26], self.sectors_per_track);
        LittleEndian::write_u16(&mut b[26..28], self.number_of_heads);
        LittleEndian::write_u32(&mut b[28..32], self.hidden_sectors);
        LittleEndian::write_u32(&mut b[32..36], self.total_sectors_32);

        match &self.extension {
            BpbExtension::Fat1x(tail) => tail.encode(&mut b[36..36 + BootSectorTail::SIZE]),
            BpbExtension::Fat32(ext) => {
                LittleEndian::write_u32(&mut b[36..40], ext.fat_size_32);
                LittleEndian::write_u16(&mut b[40..42], ext.ext_flags);
                LittleEndian::write_u16(&mut b[42..44], ext.fs_version);
                LittleEndian::write_u32(&mut b[44..48], ext.root_cluster);
                LittleEndian::write_u16(&mut b[48..50], ext.fs_info);
                LittleEndian::write_u16(&mut b[50..52], ext.backup_boot_sector);
                b[52..64].copy_from_slice(&ext.reserved);
                ext.tail.encode(&mut b[64..64 + BootSectorTail::SIZE]);
            }
        }

        b[510] = 0x55;
        b[511] = 0xAA;
        b
    }

    /// Build a fresh BPB for a blank volume.
    pub fn build(fat_type: FatType, total_sectors: u64, bytes_per_sector: u32) -> Result<Self> {
        let out_of_range = || FatError::SizeOutOfRange {
            sectors: total_sectors,
            fat_type,
        };
        if total_sectors > u32::MAX as u64 || !matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096)
        {
            return Err(out_of_range());
        }
        let sectors = total_sectors as u32;

        let tail = BootSectorTail {
            drive_number: if fat_type == FatType::Fat12 { 0x00 } else { 0x80 },
            reserved1: 0,
            boot_signature: EXTENDED_BOOT_SIGNATURE,
            volume_id: 0,
            volume_label: DEFAULT_VOLUME_LABEL,
            fs_type: fat_type.fs_type_string(),
        };
        let extension = if fat_type == FatType::Fat32 {
            BpbExtension::Fat32(Fat32Extension {
                fat_size_32: 0,
                // bit 7: no mirroring, FAT 0 is the only active table
                ext_flags: 0x0080,
                fs_version: 0,
                root_cluster: 2,
                fs_info: 1,
                backup_boot_sector: 0,
                reserved: [0; 12],
                tail,
            })
        } else {
            BpbExtension::Fat1x(tail)
        };

        let mut bpb = Self {
            jump_boot: [0xEB, 0x00, 0x90],
            oem_name: OEM_NAME,
            bytes_per_sector: bytes_per_sector as u16,
            sectors_per_cluster: 0,
            reserved_sector_count: if fat_type == FatType::Fat32 { 32 } else { 1 },
            number_of_fats: 1,
            root_entry_count: if fat_type == FatType::Fat32 { 0 } else { 512 },
            total_sectors_16: if sectors < 0x10000 { sectors as u16 } else { 0 },
            media: MEDIA_FIXED_DISK,
            fat_size_16: 0,
            sectors_per_track: 0,
            number_of_heads: 0,
            hidden_sectors: 0,
            total_sectors_32: if sectors >= 0x10000 { sectors } else { 0 },
            extension,
        };

        let disk_bytes = total_sectors * bytes_per_sector as u64;
        match fat_type {
            FatType::Fat12 => {
                // Smallest power of two that keeps the volume under the FAT12 limit.
                let mut spc = 1u32;
                loop {
                    bpb.sectors_per_cluster = spc as u8;
                    bpb.fill_fat_size(fat_type)?;
                    if bpb.count_of_clusters() < FAT12_MAX_CLUSTERS || spc == 128 {
                        break;
                    }
                    spc *= 2;
                }
            }
            FatType::Fat16 => {
                let spc = lookup_sectors_per_cluster(&FAT16_CLUSTER_TABLE, disk_bytes, bytes_per_sector);
                if spc == 0 || spc > 128 {
                    return Err(out_of_range());
                }
                bpb.sectors_per_cluster = spc as u8;
                bpb.fill_fat_size(fat_type)?;
            }
            FatType::Fat32 => {
                let spc = lookup_sectors_per_cluster(&FAT32_CLUSTER_TABLE, disk_bytes, bytes_per_sector);
                if spc == 0 || spc > 128 {
                    return Err(out_of_range());
                }
                bpb.sectors_per_cluster = spc as u8;
                bpb.fill_fat_size(fat_type)?;
            }
        }

        // A geometry that reads back as another FAT type is useless.
        if bpb.fat_type() != fat_type || bpb.count_of_clusters() == 0 {
            return Err(out_of_range());
        }
        Ok(bpb)
    }

    /// `FATSize = ceil(dataSectors / (256·spc + numberOfFATs) [/2 on FAT32])`.
    fn fill_fat_size(&mut self, fat_type: FatType) -> Result<()> {
        let disk = self.total_sectors();
        let data = disk.saturating_sub(self.reserved_sector_count as u32 + self.root_dir_sectors());
        let mut divisor = 256 * self.sectors_per_cluster as u32 + self.number_of_fats as u32;
        if fat_type == FatType::Fat32 {
            divisor /= 2;
        }
        let fat_size = data.div_ceil(divisor);

        match &mut self.extension {
            BpbExtension::Fat32(ext) => {
                self.fat_size_16 = 0;
                ext.fat_size_32 = fat_size;
            }
            BpbExtension::Fat1x(_) => {
                if fat_size > u16::MAX as u32 {
                    return Err(FatError::SizeOutOfRange {
                        sectors: disk as u64,
                        fat_type,
                    });
                }
                self.fat_size_16 = fat_size as u16;
            }
        }
        Ok(())
    }

    /// FAT type derived from the geometry; never stored.
    pub fn fat_type(&self) -> FatType {
        self.fat_type_for(self.fat_size())
    }

    fn fat_type_for(&self, fat_size: u32) -> FatType {
        let used = self.reserved_sector_count as u32
            + self.number_of_fats as u32 * fat_size
            + self.root_dir_sectors();
        let data_sectors = self.total_sectors().saturating_sub(used);
        FatType::from_cluster_count(data_sectors / self.sectors_per_cluster as u32)
    }

    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    /// Sectors in one FAT copy.
    pub fn fat_size(&self) -> u32 {
        if self.fat_size_16 != 0 {
            return self.fat_size_16 as u32;
        }
        match &self.extension {
            BpbExtension::Fat32(ext) => ext.fat_size_32,
            BpbExtension::Fat1x(_) => 0,
        }
    }

    pub fn root_dir_sectors(&self) -> u32 {
        (self.root_entry_count as u32 * 32).div_ceil(self.bytes_per_sector as u32)
    }

    pub fn first_fat_sector(&self) -> u32 {
        self.reserved_sector_count as u32
    }

    /// First sector of the fixed FAT12/16 root directory region.
    pub fn first_root_sector(&self) -> u32 {
        self.reserved_sector_count as u32 + self.number_of_fats as u32 * self.fat_size()
    }

    pub fn first_data_sector(&self) -> u32 {
        self.first_root_sector() + self.root_dir_sectors()
    }

    pub fn count_of_clusters(&self) -> u32 {
        let data_sectors = self.total_sectors().saturating_sub(self.first_data_sector());
        data_sectors / self.sectors_per_cluster as u32
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    /// Root directory cluster on FAT32 volumes.
    pub fn root_cluster(&self) -> Option<u32> {
        match &self.extension {
            BpbExtension::Fat32(ext) => Some(ext.root_cluster),
            BpbExtension::Fat1x(_) => None,
        }
    }

    pub fn tail(&self) -> &BootSectorTail {
        match &self.extension {
            BpbExtension::Fat1x(tail) => tail,
            BpbExtension::Fat32(ext) => &ext.tail,
        }
    }

    pub fn tail_mut(&mut self) -> &mut BootSectorTail {
        match &mut self.extension {
            BpbExtension::Fat1x(tail) => tail,
            BpbExtension::Fat32(ext) => &mut ext.tail,
        }
    }

    /// Volume label from the boot sector, trimmed; `None` when unset.
    pub fn volume_label(&self) -> Option<String> {
        let label = String::from_utf8_lossy(&self.tail().volume_label)
            .trim()
            .to_string();
        if label.is_empty() || label == "NO NAME" {
            None
        } else {
            Some(label)
        }
    }
}

fn lookup_sectors_per_cluster(table: &[(u32, u32)], disk_bytes: u64, bytes_per_sector: u32) -> u32 {
    table
        .iter()
        .find(|&&(limit, _)| limit as u64 * 512 >= disk_bytes)
        .map(|&(_, spc)| spc / (bytes_per_sector / 512))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fat_type_thresholds() {
        assert_eq!(FatType::from_cluster_count(4084), FatType::Fat12);
        assert_eq!(FatType::from_cluster_count(4085), FatType::Fat16);
        assert_eq!(FatType::from_cluster_count(65524), FatType::Fat16);
        assert_eq!(FatType::from_cluster_count(65525), FatType::Fat32);
    }

    #[test]
    fn test_parse_rejects_bad_jump() {
        let mut sector = BootParameterBlock::build(FatType::Fat16, 20000, 512)
            .unwrap()
            .encode();
        sector[0] = 0x00;
        assert!(matches!(
            BootParameterBlock::parse(&sector),
            Err(FatError::Validation(_))
        ));

        // EB without the trailing NOP is not a valid short jump either
        sector[0] = 0xEB;
        sector[2] = 0x00;
        assert!(BootParameterBlock::parse(&sector).is_err());

        // E9 accepts any displacement
        sector[0] = 0xE9;
        sector[1] = 0x12;
        sector[2] = 0x34;
        assert!(BootParameterBlock::parse(&sector).is_ok());
    }

    #[test]
    fn test_build_fat16_geometry() {
        let bpb = BootParameterBlock::build(FatType::Fat16, 8401, 512).unwrap();
        assert_eq!(bpb.sectors_per_cluster, 2);
        assert_eq!(bpb.reserved_sector_count, 1);
        assert_eq!(bpb.number_of_fats, 1);
        assert_eq!(bpb.root_entry_count, 512);
        assert_eq!(bpb.root_dir_sectors(), 32);
        // ceil((8401 - 33) / 513)
        assert_eq!(bpb.fat_size(), 17);
        assert_eq!(bpb.total_sectors_16, 8401);
        assert_eq!(bpb.total_sectors_32, 0);
        assert_eq!(bpb.fat_type(), FatType::Fat16);
    }

    #[test]
    fn test_build_fat32_geometry() {
        let bpb = BootParameterBlock::build(FatType::Fat32, 66601, 512).unwrap();
        assert_eq!(bpb.sectors_per_cluster, 1);
        assert_eq!(bpb.reserved_sector_count, 32);
        assert_eq!(bpb.root_entry_count, 0);
        assert_eq!(bpb.fat_size_16, 0);
        // ceil((66601 - 32) / 128)
        assert_eq!(bpb.fat_size(), 521);
        assert_eq!(bpb.total_sectors_32, 66601);
        assert_eq!(bpb.root_cluster(), Some(2));
        match &bpb.extension {
            BpbExtension::Fat32(ext) => {
                assert_eq!(ext.fs_info, 1);
                assert_eq!(ext.ext_flags & 0x80, 0x80);
            }
            BpbExtension::Fat1x(_) => panic!("expected FAT32 extension"),
        }
    }

    #[test]
    fn test_build_out_of_range() {
        assert!(matches!(
            BootParameterBlock::build(FatType::Fat16, 8400, 512),
            Err(FatError::SizeOutOfRange { sectors: 8400, .. })
        ));
        assert!(matches!(
            BootParameterBlock::build(FatType::Fat32, 66600, 512),
            Err(FatError::SizeOutOfRange { .. })
        ));
        // 32 sectors/cluster on 2 GiB yields more than 65524 clusters
        assert!(BootParameterBlock::build(FatType::Fat16, 2097152, 512).is_err());
    }

    #[test]
    fn test_build_fat12_picks_cluster_size() {
        let small = BootParameterBlock::build(FatType::Fat12, 2880, 512).unwrap();
        assert_eq!(small.sectors_per_cluster, 1);
        assert_eq!(small.fat_type(), FatType::Fat12);

        let large = BootParameterBlock::build(FatType::Fat12, 8400, 512).unwrap();
        assert_eq!(large.sectors_per_cluster, 4);
        assert_eq!(large.fat_type(), FatType::Fat12);
    }

    #[test]
    fn test_encode_parse_keeps_type_at_breakpoints() {
        for &(fat_type, sectors) in &[
            (FatType::Fat16, 8401u64),
            (FatType::Fat16, 32680),
            (FatType::Fat16, 32681),
            (FatType::Fat16, 262144),
            (FatType::Fat16, 262145),
            (FatType::Fat32, 66601),
            (FatType::Fat32, 532480),
            (FatType::Fat32, 532481),
        ] {
            let bpb = BootParameterBlock::build(fat_type, sectors, 512).unwrap();
            let parsed = BootParameterBlock::parse(&bpb.encode()).unwrap();
            assert_eq!(parsed.fat_type(), fat_type, "{sectors} sectors");
            assert_eq!(parsed, bpb);
        }
    }

    #[test]
    fn test_larger_sectors_scale_cluster_size() {
        let bpb = BootParameterBlock::build(FatType::Fat16, 20000, 1024).unwrap();
        // 20000 KiB-sectors is 40000 512-byte sectors -> 4 per cluster, halved
        assert_eq!(bpb.sectors_per_cluster, 2);
        assert_eq!(bpb.bytes_per_cluster(), 2048);
    }

    #[test]
    fn test_volume_label() {
        let mut bpb = BootParameterBlock::build(FatType::Fat16, 20000, 512).unwrap();
        assert_eq!(bpb.volume_label(), None);
        bpb.tail_mut().volume_label = *b"DATA       ";
        assert_eq!(bpb.volume_label().as_deref(), Some("DATA"));
    }

    #[test]
    fn test_fat_type_from_name() {
        assert_eq!(FatType::from_name("fat16"), Some(FatType::Fat16));
        assert_eq!(FatType::from_name(" FAT32 "), Some(FatType::Fat32));
        assert_eq!(FatType::from_name("exfat"), None);
    }
}
