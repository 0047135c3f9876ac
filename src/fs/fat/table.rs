//! FAT entry access: 12/16/32-bit packing, sector straddling, mirroring.

use byteorder::{ByteOrder, LittleEndian};

use super::bpb::FatType;
use super::FatFilesystem;
use crate::device::BlockDevice;
use crate::error::Result;

/// Value of an unallocated FAT entry.
pub const FREE_CLUSTER: u32 = 0;

pub const EOC12: u32 = 0x0FF8;
pub const EOC16: u32 = 0xFFF8;
pub const EOC32: u32 = 0x0FFF_FFF8;

pub const MS_EOC12: u32 = 0x0FFF;
pub const MS_EOC16: u32 = 0xFFFF;
pub const MS_EOC32: u32 = 0x0FFF_FFFF;

impl FatType {
    /// Bits of an entry that carry the cluster value.
    pub fn entry_mask(&self) -> u32 {
        match self {
            FatType::Fat12 => 0x0FFF,
            FatType::Fat16 => 0xFFFF,
            FatType::Fat32 => 0x0FFF_FFFF,
        }
    }

    /// Smallest masked value that terminates a chain.
    pub fn eoc_threshold(&self) -> u32 {
        match self {
            FatType::Fat12 => EOC12,
            FatType::Fat16 => EOC16,
            FatType::Fat32 => EOC32,
        }
    }

    /// Canonical end-of-chain value written when terminating a chain.
    pub fn ms_eoc(&self) -> u32 {
        match self {
            FatType::Fat12 => MS_EOC12,
            FatType::Fat16 => MS_EOC16,
            FatType::Fat32 => MS_EOC32,
        }
    }

    pub fn is_eoc(&self, value: u32) -> bool {
        value & self.entry_mask() >= self.eoc_threshold()
    }

    /// True when `value` cannot be followed as the next link of a chain.
    pub(crate) fn ends_chain(&self, value: u32) -> bool {
        let value = value & self.entry_mask();
        value < 2 || value >= self.eoc_threshold() - 1
    }
}

/// Sector (relative to the start of a FAT copy) and byte offset of the entry
/// for `cluster`. FAT12 entries are 1.5 bytes wide.
pub fn locate(fat_type: FatType, bytes_per_sector: u32, cluster: u32) -> (u32, usize) {
    let fat_offset = match fat_type {
        FatType::Fat12 => cluster + cluster / 2,
        FatType::Fat16 => cluster * 2,
        FatType::Fat32 => cluster * 4,
    };
    (
        fat_offset / bytes_per_sector,
        (fat_offset % bytes_per_sector) as usize,
    )
}

/// Decode the entry for `cluster` at `offset` in a staged FAT buffer.
fn decode_entry(fat_type: FatType, staged: &[u8], offset: usize, cluster: u32) -> u32 {
    match fat_type {
        FatType::Fat12 => {
            let val = LittleEndian::read_u16(&staged[offset..offset + 2]);
            if cluster & 1 == 1 {
                (val >> 4) as u32
            } else {
                (val & 0x0FFF) as u32
            }
        }
        FatType::Fat16 => LittleEndian::read_u16(&staged[offset..offset + 2]) as u32,
        FatType::Fat32 => LittleEndian::read_u32(&staged[offset..offset + 4]) & 0x0FFF_FFFF,
    }
}

/// Store `value` for `cluster`, keeping the neighbouring FAT12 nibble and
/// the reserved top nibble of FAT32 entries.
fn encode_entry(fat_type: FatType, staged: &mut [u8], offset: usize, cluster: u32, value: u32) {
    match fat_type {
        FatType::Fat12 => {
            let existing = LittleEndian::read_u16(&staged[offset..offset + 2]);
            let new_val = if cluster & 1 == 1 {
                (existing & 0x000F) | (((value & 0x0FFF) as u16) << 4)
            } else {
                (existing & 0xF000) | (value & 0x0FFF) as u16
            };
            LittleEndian::write_u16(&mut staged[offset..offset + 2], new_val);
        }
        FatType::Fat16 => {
            LittleEndian::write_u16(&mut staged[offset..offset + 2], value as u16);
        }
        FatType::Fat32 => {
            let existing = LittleEndian::read_u32(&staged[offset..offset + 4]);
            let new_val = (existing & 0xF000_0000) | (value & 0x0FFF_FFFF);
            LittleEndian::write_u32(&mut staged[offset..offset + 4], new_val);
        }
    }
}

impl<D: BlockDevice> FatFilesystem<D> {
    /// Read the FAT entry for `cluster`.
    pub fn get_fat(&mut self, cluster: u32) -> Result<u32> {
        let (_, offset, _) = self.stage_fat_entry(cluster)?;
        Ok(decode_entry(self.fat_type, &self.fat_buf, offset, cluster))
    }

    /// Write the FAT entry for `cluster` to every mirrored FAT copy.
    pub fn set_fat(&mut self, cluster: u32, value: u32) -> Result<()> {
        let (sector, offset, straddles) = self.stage_fat_entry(cluster)?;
        encode_entry(self.fat_type, &mut self.fat_buf, offset, cluster, value);

        let bps = self.bytes_per_sector() as usize;
        for copy in self.fat_copies_to_write() {
            let base = self.bpb.first_fat_sector() as u64 + copy as u64 * self.fat_size as u64;
            self.device
                .write_sector(base + sector as u64, &self.fat_buf[..bps])?;
            if straddles {
                self.device
                    .write_sector(base + sector as u64 + 1, &self.fat_buf[bps..])?;
            }
        }
        Ok(())
    }

    /// Load the sector(s) holding `cluster`'s entry from the active FAT into
    /// the staging buffer. Two sectors are staged when a FAT12 entry starts
    /// on the last byte of a sector.
    fn stage_fat_entry(&mut self, cluster: u32) -> Result<(u32, usize, bool)> {
        let bps = self.bytes_per_sector();
        let (sector, offset) = locate(self.fat_type, bps, cluster);
        let base = self.bpb.first_fat_sector() as u64
            + self.active_fat() as u64 * self.fat_size as u64
            + sector as u64;

        let bps = bps as usize;
        self.device.read_sector(base, &mut self.fat_buf[..bps])?;
        let straddles = self.fat_type == FatType::Fat12 && offset == bps - 1;
        if straddles {
            self.device.read_sector(base + 1, &mut self.fat_buf[bps..])?;
        }
        Ok((sector, offset, straddles))
    }

    /// Index of the FAT copy reads are served from.
    fn active_fat(&self) -> u32 {
        match &self.bpb.extension {
            super::bpb::BpbExtension::Fat32(ext) if ext.ext_flags & 0x80 != 0 => {
                let active = (ext.ext_flags & 0x0F) as u32;
                if active < self.bpb.number_of_fats as u32 {
                    active
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    /// FAT copies a write must reach: all of them unless FAT32 mirroring is off.
    fn fat_copies_to_write(&self) -> Vec<u32> {
        match &self.bpb.extension {
            super::bpb::BpbExtension::Fat32(ext) if ext.ext_flags & 0x80 != 0 => {
                vec![self.active_fat()]
            }
            _ => (0..self.bpb.number_of_fats as u32).collect(),
        }
    }
}
