//! FAT12/16/32 filesystem engine.
//!
//! [`FatFilesystem`] owns a [`BlockDevice`] for as long as the volume is
//! mounted. Files and directories are handled through [`Node`]s: a copy of
//! a directory record plus its on-disk location. Changes to a node are
//! written back explicitly by the operation that makes them.

pub mod bpb;
mod data;
pub mod dir;
mod format;
mod free;
pub mod name;
pub mod table;

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use serde::Serialize;

pub use bpb::{BootParameterBlock, BpbExtension, FatType};
pub use dir::{DirEntry, EntryLocation, ReadDir};
pub use format::{format, format_with_options, FormatOptions};

use self::bpb::BPB_SIZE;
use self::dir::{InsertMode, SlotMatch, ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_LONG_NAME};
use self::format::{fs_info_sector, FSINFO_LEAD_SIG, FSINFO_STRUCT_SIG, FSINFO_UNKNOWN};
use self::free::FreeClusters;
use self::name::{
    decode_oem_string, format_fat_datetime, format_name, FatTimestamp, DOTDOT_NAME, DOT_NAME,
};
use self::table::FREE_CLUSTER;
use super::entry::FileEntry;
use super::filesystem::{EditableFilesystem, Filesystem};
use crate::device::BlockDevice;
use crate::error::{FatError, Result};

const CHUNK_SIZE: usize = 256 * 1024; // 256 KB I/O buffer

/// A mounted FAT volume.
pub struct FatFilesystem<D: BlockDevice> {
    device: D,
    bpb: BootParameterBlock,
    fat_type: FatType,
    /// Sectors per FAT copy.
    fat_size: u32,
    /// FAT[1] as read at mount.
    eoc_mark: u32,
    free: FreeClusters,
    /// Staging buffer for FAT sectors; two sectors wide for FAT12 straddles.
    fat_buf: Vec<u8>,
    label: Option<String>,
}

/// A file or directory on a mounted volume.
///
/// The root directory has no record of its own, so its `location` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub entry: DirEntry,
    pub location: Option<EntryLocation>,
}

impl Node {
    pub fn name(&self) -> String {
        self.entry.display_name()
    }

    pub fn is_directory(&self) -> bool {
        self.entry.is_directory()
    }

    pub fn size(&self) -> u32 {
        self.entry.file_size
    }

    pub fn is_root(&self) -> bool {
        self.location.is_none()
    }
}

/// Sector totals as reported by `df`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub total_sectors: u64,
    pub used_sectors: u64,
}

/// Geometry and identity of a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    pub fat_type: FatType,
    pub label: Option<String>,
    pub volume_id: u32,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub number_of_fats: u32,
    pub fat_size: u32,
    pub root_entry_count: u32,
    pub total_sectors: u64,
    pub count_of_clusters: u32,
    pub free_clusters: u32,
    /// Clean-shutdown bit of FAT[1] (always true on FAT12).
    pub clean: bool,
}

impl<D: BlockDevice> FatFilesystem<D> {
    /// Mount the volume on `device`.
    ///
    /// Parses and checks the boot sector, reads the end-of-chain mark from
    /// FAT[1] and builds the free-cluster set by scanning the whole FAT.
    pub fn mount(mut device: D) -> Result<Self> {
        let bps = device.bytes_per_sector();
        let mut sector = vec![0u8; (bps as usize).max(BPB_SIZE)];
        device.read_sector(0, &mut sector)?;

        let bpb = BootParameterBlock::parse(&sector)?;
        validate_geometry(&bpb, &device)?;

        let fat_type = bpb.fat_type();
        let mut fs = Self {
            device,
            fat_type,
            fat_size: bpb.fat_size(),
            eoc_mark: 0,
            free: FreeClusters::new(),
            fat_buf: vec![0u8; bps as usize * 2],
            label: bpb.volume_label(),
            bpb,
        };

        fs.eoc_mark = fs.get_fat(1)?;
        fs.check_volume_flags();
        if let Some(label) = fs.read_root_label()? {
            fs.label = Some(label);
        }
        fs.scan_free_clusters()?;

        info!(
            "mounted {} volume{}: {} sectors of {} bytes, {} clusters ({} free)",
            fs.fat_type,
            fs.label
                .as_deref()
                .map(|l| format!(" \"{l}\""))
                .unwrap_or_default(),
            fs.bpb.total_sectors(),
            bps,
            fs.bpb.count_of_clusters(),
            fs.free.len()
        );
        Ok(fs)
    }

    /// Release the volume and hand the device back. FAT32 volumes get their
    /// FSInfo free count refreshed first.
    pub fn unmount(mut self) -> Result<D> {
        self.sync_fs_info()?;
        debug!("unmounted {} volume", self.fat_type);
        Ok(self.device)
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    pub fn bpb(&self) -> &BootParameterBlock {
        &self.bpb
    }

    /// FAT[1] as read at mount.
    pub fn eoc_mark(&self) -> u32 {
        self.eoc_mark
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The root directory.
    pub fn root(&self) -> Node {
        let mut entry = DirEntry {
            name: [b' '; name::SHORT_NAME_LEN],
            attributes: ATTR_DIRECTORY,
            ..DirEntry::default()
        };
        entry.set_first_cluster(self.bpb.root_cluster().unwrap_or(0));
        Node {
            entry,
            location: None,
        }
    }

    pub fn disk_usage(&self) -> DiskUsage {
        let total = self.bpb.total_sectors() as u64;
        let free = self.free.len() as u64 * self.bpb.sectors_per_cluster as u64;
        DiskUsage {
            total_sectors: total,
            used_sectors: total.saturating_sub(free),
        }
    }

    pub fn volume_info(&self) -> VolumeInfo {
        VolumeInfo {
            fat_type: self.fat_type,
            label: self.label.clone(),
            volume_id: self.bpb.tail().volume_id,
            bytes_per_sector: self.bytes_per_sector(),
            sectors_per_cluster: self.bpb.sectors_per_cluster as u32,
            reserved_sectors: self.bpb.reserved_sector_count as u32,
            number_of_fats: self.bpb.number_of_fats as u32,
            fat_size: self.fat_size,
            root_entry_count: self.bpb.root_entry_count as u32,
            total_sectors: self.bpb.total_sectors() as u64,
            count_of_clusters: self.bpb.count_of_clusters(),
            free_clusters: self.free_cluster_count(),
            clean: self.clean_bit().map_or(true, |bit| self.eoc_mark & bit != 0),
        }
    }

    /// Create an empty file in `parent`.
    pub fn create(&mut self, parent: &Node, name: &str) -> Result<Node> {
        self.ensure_directory(parent)?;
        let short = format_name(self.fat_type, name)?;
        let begin = self.dir_start(parent);
        if self.find_slot(begin, SlotMatch::Name(&short))?.is_some() {
            return Err(FatError::AlreadyExists(name.to_string()));
        }

        let entry = DirEntry::new(short, ATTR_ARCHIVE, &FatTimestamp::now());
        let location = self.insert_entry(parent, &entry, InsertMode::Append)?;
        debug!("created {}", entry.display_name());
        Ok(Node {
            entry,
            location: Some(location),
        })
    }

    /// Create a directory in `parent` with its `.` and `..` records.
    pub fn mkdir(&mut self, parent: &Node, name: &str) -> Result<Node> {
        self.ensure_directory(parent)?;
        let short = format_name(self.fat_type, name)?;
        let begin = self.dir_start(parent);
        if self.find_slot(begin, SlotMatch::Name(&short))?.is_some() {
            return Err(FatError::AlreadyExists(name.to_string()));
        }

        let cluster = self.alloc_chain()?;
        let now = FatTimestamp::now();
        let mut entry = DirEntry::new(short, ATTR_DIRECTORY, &now);
        entry.set_first_cluster(cluster);

        let inserted = self
            .zero_cluster(cluster)
            .and_then(|()| self.insert_entry(parent, &entry, InsertMode::Append));
        let location = match inserted {
            Ok(location) => location,
            Err(e) => {
                self.set_fat(cluster, FREE_CLUSTER)?;
                self.release_cluster(cluster);
                return Err(e);
            }
        };
        let node = Node {
            entry,
            location: Some(location),
        };

        let mut dot = DirEntry::new(DOT_NAME, ATTR_DIRECTORY, &now);
        dot.set_first_cluster(cluster);
        self.insert_entry(&node, &dot, InsertMode::Overwrite)?;

        let mut dotdot = DirEntry::new(DOTDOT_NAME, ATTR_DIRECTORY, &now);
        // the root is referenced as cluster 0, FAT32 included
        if !parent.is_root() {
            dotdot.set_first_cluster(parent.entry.first_cluster());
        }
        self.insert_entry(&node, &dotdot, InsertMode::Append)?;

        debug!("created directory {} at cluster {cluster}", node.name());
        Ok(node)
    }

    /// Remove an empty directory.
    pub fn rmdir(&mut self, dir: &Node) -> Result<()> {
        if dir.is_root() {
            return Err(FatError::Unsupported(
                "cannot remove the root directory".into(),
            ));
        }
        if !dir.is_directory() {
            return Err(FatError::NotADirectory(dir.name()));
        }
        if dir.entry.name == DOT_NAME || dir.entry.name == DOTDOT_NAME {
            return Err(FatError::InvalidName(dir.name()));
        }
        if self.has_children(dir)? {
            return Err(FatError::NotEmpty(dir.name()));
        }
        let mut node = dir.clone();
        self.remove_entry(&mut node)?;
        self.free_chain(node.entry.first_cluster())?;
        debug!("removed directory {}", dir.name());
        Ok(())
    }

    /// Remove a file and release its clusters.
    pub fn remove(&mut self, file: &Node) -> Result<()> {
        if file.is_directory() {
            return Err(FatError::IsADirectory(file.name()));
        }
        let mut node = file.clone();
        self.remove_entry(&mut node)?;
        self.free_chain(node.entry.first_cluster())?;
        debug!("removed {}", file.name());
        Ok(())
    }

    /// Resolve a `/`-separated path from the root.
    pub fn open_path(&mut self, path: &str) -> Result<Node> {
        let mut node = Self::root(self);
        for part in path.split('/').filter(|p| !p.is_empty()) {
            node = self.lookup(&node, part)?;
        }
        Ok(node)
    }

    // ---------------------------------------------------------------------
    // sector addressing
    // ---------------------------------------------------------------------

    pub fn bytes_per_sector(&self) -> u32 {
        self.bpb.bytes_per_sector as u32
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bpb.bytes_per_cluster()
    }

    pub(crate) fn entries_per_sector(&self) -> u32 {
        self.bytes_per_sector() / dir::DIR_ENTRY_SIZE as u32
    }

    pub(crate) fn sector_buf(&self) -> Vec<u8> {
        vec![0u8; self.bytes_per_sector() as usize]
    }

    /// Cluster 0 names the fixed root region on FAT12/16.
    pub(crate) fn is_fixed_root(&self, cluster: u32) -> bool {
        cluster == 0 && self.fat_type != FatType::Fat32
    }

    /// Absolute sector `sector` of data cluster `cluster`.
    pub(crate) fn cluster_sector(&self, cluster: u32, sector: u32) -> u64 {
        self.bpb.first_data_sector() as u64
            + (cluster as u64 - 2) * self.bpb.sectors_per_cluster as u64
            + sector as u64
    }

    /// Absolute sector holding the record at `location`.
    pub(crate) fn entry_sector(&self, location: &EntryLocation) -> u64 {
        if self.is_fixed_root(location.cluster) {
            self.bpb.first_root_sector() as u64 + location.sector as u64
        } else {
            self.cluster_sector(location.cluster, location.sector)
        }
    }

    pub(crate) fn read_entry_sector(&mut self, location: &EntryLocation, buf: &mut [u8]) -> Result<()> {
        let index = self.entry_sector(location);
        self.read_sector(index, buf)
    }

    pub(crate) fn read_sector(&mut self, index: u64, buf: &mut [u8]) -> Result<()> {
        self.device.read_sector(index, buf)?;
        Ok(())
    }

    pub(crate) fn write_sector(&mut self, index: u64, data: &[u8]) -> Result<()> {
        self.device.write_sector(index, data)?;
        Ok(())
    }

    pub(crate) fn zero_cluster(&mut self, cluster: u32) -> Result<()> {
        let zero = self.sector_buf();
        for sector in 0..self.bpb.sectors_per_cluster as u32 {
            let index = self.cluster_sector(cluster, sector);
            self.write_sector(index, &zero)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // mount helpers
    // ---------------------------------------------------------------------

    fn clean_bit(&self) -> Option<u32> {
        match self.fat_type {
            FatType::Fat12 => None,
            FatType::Fat16 => Some(0x8000),
            FatType::Fat32 => Some(0x0800_0000),
        }
    }

    fn check_volume_flags(&self) {
        let (clean, no_errors) = match self.fat_type {
            FatType::Fat12 => return,
            FatType::Fat16 => (0x8000, 0x4000),
            FatType::Fat32 => (0x0800_0000, 0x0400_0000),
        };
        if self.eoc_mark & clean == 0 {
            warn!("{} volume was not cleanly unmounted", self.fat_type);
        }
        if self.eoc_mark & no_errors == 0 {
            warn!("{} volume has recorded disk I/O errors", self.fat_type);
        }
    }

    /// Label from the volume-id record at the head of the root directory.
    fn read_root_label(&mut self) -> Result<Option<String>> {
        let root = Self::root(self);
        let start = self.dir_start(&root);
        if !self.is_fixed_root(start.cluster) && start.cluster < 2 {
            return Ok(None);
        }
        let mut buf = self.sector_buf();
        self.read_entry_sector(&start, &mut buf)?;
        let first = DirEntry::parse(&buf[..dir::DIR_ENTRY_SIZE]);
        if first.is_end()
            || first.is_free()
            || !first.is_volume_id()
            || first.attributes & ATTR_LONG_NAME == ATTR_LONG_NAME
        {
            return Ok(None);
        }
        let label = decode_oem_string(&first.name).trim_end().to_string();
        if label.is_empty() || label == "NO NAME" {
            Ok(None)
        } else {
            Ok(Some(label))
        }
    }

    /// Refresh the FAT32 FSInfo free count and next-free hint.
    fn sync_fs_info(&mut self) -> Result<()> {
        let fs_info = match &self.bpb.extension {
            BpbExtension::Fat32(ext) => ext.fs_info as u64,
            BpbExtension::Fat1x(_) => return Ok(()),
        };
        if fs_info == 0 || fs_info >= self.bpb.reserved_sector_count as u64 {
            return Ok(());
        }
        let mut buf = self.sector_buf();
        self.read_sector(fs_info, &mut buf)?;
        let lead = LittleEndian::read_u32(&buf[0..4]);
        let strukt = LittleEndian::read_u32(&buf[484..488]);
        if lead != FSINFO_LEAD_SIG || strukt != FSINFO_STRUCT_SIG {
            warn!("FSInfo sector {fs_info} has bad signatures; not updated");
            return Ok(());
        }
        let free = self.free_cluster_count();
        let next = self.free.peek().unwrap_or(FSINFO_UNKNOWN);
        let updated = fs_info_sector(buf.len(), free, next);
        self.write_sector(fs_info, &updated)?;
        debug!("updated FSInfo: {free} free clusters");
        Ok(())
    }

    fn file_entry(&self, node: &Node, parent_path: &str) -> FileEntry {
        let name = node.name();
        let path = if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        };
        let cluster = node.entry.first_cluster() as u64;
        let mut entry = if node.is_directory() {
            FileEntry::new_directory(name, path, cluster)
        } else {
            FileEntry::new_file(name, path, node.size() as u64, cluster)
        };
        let modified = format_fat_datetime(node.entry.write_date, node.entry.write_time);
        if !modified.is_empty() {
            entry.modified = Some(modified);
        }
        entry
    }
}

fn validate_geometry<D: BlockDevice>(bpb: &BootParameterBlock, device: &D) -> Result<()> {
    let bps = bpb.bytes_per_sector as u32;
    if !matches!(bps, 512 | 1024 | 2048 | 4096) {
        return Err(FatError::Validation(format!(
            "unsupported bytes per sector: {bps}"
        )));
    }
    if bps != device.bytes_per_sector() {
        return Err(FatError::Validation(format!(
            "volume uses {bps}-byte sectors but the device has {}-byte sectors",
            device.bytes_per_sector()
        )));
    }
    if bpb.number_of_fats == 0 {
        return Err(FatError::Validation("number of FATs is 0".into()));
    }
    if bpb.fat_size() == 0 {
        return Err(FatError::Validation("FAT size is 0".into()));
    }
    if bpb.total_sectors() as u64 > device.sector_count() {
        return Err(FatError::Validation(format!(
            "volume claims {} sectors but the device has {}",
            bpb.total_sectors(),
            device.sector_count()
        )));
    }
    if bpb.count_of_clusters() == 0 {
        return Err(FatError::Validation("volume has no data clusters".into()));
    }
    if let Some(root) = bpb.root_cluster() {
        if root < 2 || root >= bpb.count_of_clusters() + 2 {
            return Err(FatError::Validation(format!(
                "root cluster {root} is out of range"
            )));
        }
    }
    Ok(())
}

impl<D: BlockDevice> Filesystem for FatFilesystem<D> {
    fn root(&mut self) -> Result<FileEntry> {
        let mut root = FileEntry::root();
        root.location = self.bpb.root_cluster().unwrap_or(0) as u64;
        Ok(root)
    }

    fn list_directory(&mut self, entry: &FileEntry) -> Result<Vec<FileEntry>> {
        if !entry.is_directory() {
            return Err(FatError::NotADirectory(entry.path.clone()));
        }
        let dir = self.open_path(&entry.path)?;
        let mut entries: Vec<FileEntry> = self
            .list(&dir)?
            .iter()
            .filter(|node| node.entry.name != DOT_NAME && node.entry.name != DOTDOT_NAME)
            .map(|node| self.file_entry(node, &entry.path))
            .collect();
        entries.sort_by(|a, b| {
            b.is_directory()
                .cmp(&a.is_directory())
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(entries)
    }

    fn read_file(&mut self, entry: &FileEntry, max_bytes: usize) -> Result<Vec<u8>> {
        let node = self.open_path(&entry.path)?;
        let len = (node.size() as usize).min(max_bytes);
        let mut data = vec![0u8; len];
        let n = self.read(&node, 0, &mut data)?;
        data.truncate(n);
        Ok(data)
    }

    fn volume_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn fs_type(&self) -> &str {
        self.fat_type.name()
    }

    fn total_size(&self) -> u64 {
        self.bpb.total_sectors() as u64 * self.bytes_per_sector() as u64
    }

    fn used_size(&self) -> u64 {
        self.disk_usage().used_sectors * self.bytes_per_sector() as u64
    }

    fn write_file_to(&mut self, entry: &FileEntry, writer: &mut dyn Write) -> Result<u64> {
        let node = self.open_path(&entry.path)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut offset = 0u64;
        loop {
            let n = self.read(&node, offset, &mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            offset += n as u64;
        }
        Ok(offset)
    }
}

impl<D: BlockDevice> EditableFilesystem for FatFilesystem<D> {
    fn create_file(
        &mut self,
        parent: &FileEntry,
        name: &str,
        data: &mut dyn Read,
        data_len: u64,
    ) -> Result<FileEntry> {
        let dir = self.open_path(&parent.path)?;
        let mut node = self.create(&dir, name)?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut offset = 0u64;
        while offset < data_len {
            let len = ((data_len - offset) as usize).min(CHUNK_SIZE);
            data.read_exact(&mut buf[..len])?;
            let written = self.write(&mut node, offset, &buf[..len])?;
            if written < len {
                return Err(FatError::NoFreeSpace);
            }
            offset += len as u64;
        }
        Ok(self.file_entry(&node, &parent.path))
    }

    fn create_directory(&mut self, parent: &FileEntry, name: &str) -> Result<FileEntry> {
        let dir = self.open_path(&parent.path)?;
        let node = self.mkdir(&dir, name)?;
        Ok(self.file_entry(&node, &parent.path))
    }

    fn delete_entry(&mut self, parent: &FileEntry, entry: &FileEntry) -> Result<()> {
        let dir = self.open_path(&parent.path)?;
        let node = self.lookup(&dir, &entry.name)?;
        if node.is_directory() {
            self.rmdir(&node)
        } else {
            self.remove(&node)
        }
    }

    fn sync_metadata(&mut self) -> Result<()> {
        self.sync_fs_info()
    }

    fn free_space(&mut self) -> Result<u64> {
        Ok(self.free_cluster_count() as u64 * self.bytes_per_cluster() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn mounted(sectors: u64, fat_type: FatType) -> FatFilesystem<MemoryDevice> {
        let mut dev = MemoryDevice::in_memory(sectors, 512).unwrap();
        format(&mut dev, fat_type).unwrap();
        FatFilesystem::mount(dev).unwrap()
    }

    #[test]
    fn test_mount_reads_eoc_mark() {
        let fs = mounted(20000, FatType::Fat16);
        assert_eq!(fs.fat_type(), FatType::Fat16);
        assert_eq!(fs.eoc_mark(), 0xFFFF);
        assert!(fs.volume_info().clean);
    }

    #[test]
    fn test_mount_rejects_sector_size_mismatch() {
        let mut dev = MemoryDevice::in_memory(20000, 512).unwrap();
        format(&mut dev, FatType::Fat16).unwrap();
        let mut image = dev.into_inner();
        // claim 1024-byte sectors in the BPB
        image.get_mut()[11..13].copy_from_slice(&1024u16.to_le_bytes());
        let dev = MemoryDevice::new(image, 512).unwrap();
        assert!(matches!(
            FatFilesystem::mount(dev),
            Err(FatError::Validation(_))
        ));
    }

    #[test]
    fn test_mount_rejects_blank_device() {
        let dev = MemoryDevice::in_memory(20000, 512).unwrap();
        assert!(matches!(
            FatFilesystem::mount(dev),
            Err(FatError::Validation(_))
        ));
    }

    #[test]
    fn test_dirty_volume_still_mounts() {
        let mut fs = mounted(20000, FatType::Fat16);
        fs.set_fat(1, 0x7FFF).unwrap();
        let dev = fs.unmount().unwrap();
        let fs = FatFilesystem::mount(dev).unwrap();
        assert_eq!(fs.eoc_mark(), 0x7FFF);
        assert!(!fs.volume_info().clean);
    }

    #[test]
    fn test_create_and_lookup() {
        let mut fs = mounted(20000, FatType::Fat16);
        let root = fs.root();
        let file = fs.create(&root, "a.txt").unwrap();
        assert_eq!(file.name(), "A.TXT");
        assert_eq!(file.size(), 0);

        let found = fs.lookup(&root, "A.TXT").unwrap();
        assert_eq!(found, file);
        assert!(matches!(
            fs.create(&root, "A.TXT"),
            Err(FatError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.lookup(&root, "B.TXT"),
            Err(FatError::NotFound(_))
        ));
    }

    #[test]
    fn test_root_label_is_skipped_in_listing() {
        let mut dev = MemoryDevice::in_memory(20000, 512).unwrap();
        let options = FormatOptions {
            volume_label: Some("DISK1".into()),
            volume_id: None,
        };
        format_with_options(&mut dev, FatType::Fat16, &options).unwrap();
        let mut fs = FatFilesystem::mount(dev).unwrap();
        assert_eq!(fs.label(), Some("DISK1"));
        let root = fs.root();
        assert!(fs.list(&root).unwrap().is_empty());
    }

    #[test]
    fn test_mkdir_writes_dot_entries() {
        let mut fs = mounted(20000, FatType::Fat16);
        let root = fs.root();
        let dir = fs.mkdir(&root, "SUB").unwrap();
        let sub = fs.mkdir(&dir, "INNER").unwrap();

        let names: Vec<String> = fs.list(&dir).unwrap().iter().map(Node::name).collect();
        assert_eq!(names, vec![".", "..", "INNER"]);

        let entries = fs.list(&dir).unwrap();
        assert_eq!(entries[0].entry.first_cluster(), dir.entry.first_cluster());
        assert_eq!(entries[1].entry.first_cluster(), 0);

        let inner = fs.list(&sub).unwrap();
        assert_eq!(inner[1].entry.first_cluster(), dir.entry.first_cluster());

        // `..` leads back to the root
        let up = fs.lookup(&dir, "..").unwrap();
        assert!(fs.lookup(&up, "SUB").is_ok());
    }

    #[test]
    fn test_rmdir() {
        let mut fs = mounted(20000, FatType::Fat16);
        let root = fs.root();
        let dir = fs.mkdir(&root, "SUB").unwrap();
        fs.create(&dir, "X").unwrap();
        assert!(matches!(fs.rmdir(&dir), Err(FatError::NotEmpty(_))));

        let x = fs.lookup(&dir, "X").unwrap();
        assert!(matches!(fs.rmdir(&x), Err(FatError::NotADirectory(_))));
        fs.remove(&x).unwrap();

        let free_before = fs.free_cluster_count();
        fs.rmdir(&dir).unwrap();
        assert_eq!(fs.free_cluster_count(), free_before + 1);
        assert!(matches!(fs.lookup(&root, "SUB"), Err(FatError::NotFound(_))));
        assert!(matches!(fs.rmdir(&root), Err(FatError::Unsupported(_))));
    }

    #[test]
    fn test_rmdir_rejects_dot_entries() {
        let mut fs = mounted(20000, FatType::Fat16);
        let root = fs.root();
        let dir = fs.mkdir(&root, "SUB").unwrap();
        let free_before = fs.free_cluster_count();

        for name in [".", ".."] {
            let dot = fs.lookup(&dir, name).unwrap();
            assert!(matches!(fs.rmdir(&dot), Err(FatError::InvalidName(_))));
            assert!(matches!(fs.remove(&dot), Err(FatError::IsADirectory(_))));
        }

        assert_eq!(fs.free_cluster_count(), free_before);
        let cluster = dir.entry.first_cluster();
        assert!(FatType::Fat16.is_eoc(fs.get_fat(cluster).unwrap()));
        let names: Vec<String> = fs.list(&dir).unwrap().iter().map(Node::name).collect();
        assert_eq!(names, vec![".", ".."]);
    }

    #[test]
    fn test_remove_rejects_directory() {
        let mut fs = mounted(20000, FatType::Fat16);
        let root = fs.root();
        let dir = fs.mkdir(&root, "SUB").unwrap();
        assert!(matches!(fs.remove(&dir), Err(FatError::IsADirectory(_))));
    }

    #[test]
    fn test_removed_slot_is_reused() {
        let mut fs = mounted(20000, FatType::Fat16);
        let root = fs.root();
        let a = fs.create(&root, "A").unwrap();
        fs.create(&root, "B").unwrap();
        fs.remove(&a).unwrap();
        let c = fs.create(&root, "C").unwrap();
        assert_eq!(c.location, a.location);
    }

    #[test]
    fn test_fixed_root_fills_up() {
        let mut fs = mounted(20000, FatType::Fat16);
        let root = fs.root();
        // 512 slots, one taken by the volume label
        for i in 0..511 {
            fs.create(&root, &format!("F{i}")).unwrap();
        }
        assert!(matches!(
            fs.create(&root, "ONEMORE"),
            Err(FatError::DirectoryFull(_))
        ));
        assert_eq!(fs.list(&root).unwrap().len(), 511);
    }

    #[test]
    fn test_directory_grows_across_clusters() {
        // FAT12 on 2880 sectors: one 512-byte sector per cluster, 16 slots
        let mut fs = mounted(2880, FatType::Fat12);
        let root = fs.root();
        let dir = fs.mkdir(&root, "MANY").unwrap();
        let free_before = fs.free_cluster_count();

        for i in 0..40 {
            fs.create(&dir, &format!("F{i}")).unwrap();
        }
        // 42 records and an end marker need 3 clusters
        assert_eq!(fs.free_cluster_count(), free_before - 2);
        let listed = fs.list(&dir).unwrap();
        assert_eq!(listed.len(), 42);
        assert!(fs.lookup(&dir, "F39").is_ok());
    }

    #[test]
    fn test_fat32_root_is_a_chain() {
        let mut fs = mounted(70000, FatType::Fat32);
        let root = fs.root();
        assert_eq!(root.entry.first_cluster(), 2);
        let dir = fs.mkdir(&root, "DOCS").unwrap();
        fs.create(&dir, "note.txt").unwrap();
        let found = fs.open_path("/DOCS/note.txt").unwrap();
        assert_eq!(found.name(), "note.txt");

        let names: Vec<String> = fs.list(&root).unwrap().iter().map(Node::name).collect();
        assert_eq!(names, vec!["DOCS"]);
    }

    #[test]
    fn test_fat32_rejects_name_that_hides_itself() {
        let mut fs = mounted(70000, FatType::Fat32);
        let root = fs.root();
        fs.create(&root, "A").unwrap();
        assert!(matches!(
            fs.create(&root, "\0X"),
            Err(FatError::InvalidName(_))
        ));
        fs.create(&root, "B").unwrap();

        let names: Vec<String> = fs.list(&root).unwrap().iter().map(Node::name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_disk_usage_tracks_allocations() {
        let mut fs = mounted(20000, FatType::Fat16);
        let spc = fs.bpb().sectors_per_cluster as u64;
        let start = fs.disk_usage();
        assert_eq!(start.total_sectors, 20000);

        let root = fs.root();
        let dir = fs.mkdir(&root, "D").unwrap();
        assert_eq!(fs.disk_usage().used_sectors, start.used_sectors + spc);

        fs.rmdir(&dir).unwrap();
        assert_eq!(fs.disk_usage(), start);
    }

    #[test]
    fn test_unmount_refreshes_fs_info() {
        let mut fs = mounted(70000, FatType::Fat32);
        let free = fs.free_cluster_count();
        let mut dev = fs.unmount().unwrap();
        let mut info = vec![0u8; 512];
        dev.read_sector(1, &mut info).unwrap();
        assert_eq!(LittleEndian::read_u32(&info[488..492]), free);
    }
}
