//! Directory records and the directory entry store.
//!
//! A directory is either the fixed root region of a FAT12/16 volume
//! (addressed by sector, cannot grow) or a cluster chain. Both are walked
//! sector by sector with [`scan_sector`], which serves lookups, free-slot
//! searches and end-marker searches alike.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use super::name::{display_name, FatTimestamp, SHORT_NAME_LEN};
use super::{FatFilesystem, Node};
use crate::device::BlockDevice;
use crate::error::{FatError, Result};

pub const DIR_ENTRY_SIZE: usize = 32;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = 0x0F;

/// `name[0]` of the first unused record; nothing valid follows it.
pub const DIR_ENTRY_END: u8 = 0x00;
/// `name[0]` of a deleted record whose slot may be reused.
pub const DIR_ENTRY_FREE: u8 = 0xE5;

/// One 32-byte directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirEntry {
    pub name: [u8; SHORT_NAME_LEN],
    pub attributes: u8,
    pub nt_reserved: u8,
    pub create_time_tenth: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub last_access_date: u16,
    pub first_cluster_hi: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster_lo: u16,
    pub file_size: u32,
}

impl DirEntry {
    /// A fresh record with all timestamps set to `now`.
    pub fn new(name: [u8; SHORT_NAME_LEN], attributes: u8, now: &FatTimestamp) -> Self {
        Self {
            name,
            attributes,
            create_time_tenth: now.tenths,
            create_time: now.time,
            create_date: now.date,
            last_access_date: now.date,
            write_time: now.time,
            write_date: now.date,
            ..Self::default()
        }
    }

    /// The all-zero record that terminates a directory.
    pub fn end_marker() -> Self {
        Self::default()
    }

    pub fn parse(b: &[u8]) -> Self {
        let mut name = [0u8; SHORT_NAME_LEN];
        name.copy_from_slice(&b[0..11]);
        Self {
            name,
            attributes: b[11],
            nt_reserved: b[12],
            create_time_tenth: b[13],
            create_time: LittleEndian::read_u16(&b[14..16]),
            create_date: LittleEndian::read_u16(&b[16..18]),
            last_access_date: LittleEndian::read_u16(&b[18..20]),
            first_cluster_hi: LittleEndian::read_u16(&b[20..22]),
            write_time: LittleEndian::read_u16(&b[22..24]),
            write_date: LittleEndian::read_u16(&b[24..26]),
            first_cluster_lo: LittleEndian::read_u16(&b[26..28]),
            file_size: LittleEndian::read_u32(&b[28..32]),
        }
    }

    pub fn encode(&self, b: &mut [u8]) {
        b[0..11].copy_from_slice(&self.name);
        b[11] = self.attributes;
        b[12] = self.nt_reserved;
        b[13] = self.create_time_tenth;
        LittleEndian::write_u16(&mut b[14..16], self.create_time);
        LittleEndian::write_u16(&mut b[16..18], self.create_date);
        LittleEndian::write_u16(&mut b[18..20], self.last_access_date);
        LittleEndian::write_u16(&mut b[20..22], self.first_cluster_hi);
        LittleEndian::write_u16(&mut b[22..24], self.write_time);
        LittleEndian::write_u16(&mut b[24..26], self.write_date);
        LittleEndian::write_u16(&mut b[26..28], self.first_cluster_lo);
        LittleEndian::write_u32(&mut b[28..32], self.file_size);
    }

    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_hi as u32) << 16) | self.first_cluster_lo as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_hi = (cluster >> 16) as u16;
        self.first_cluster_lo = cluster as u16;
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// Volume labels and long-name fragments both carry the volume-id bit.
    pub fn is_volume_id(&self) -> bool {
        self.attributes & ATTR_VOLUME_ID != 0
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == DIR_ENTRY_FREE
    }

    pub fn is_end(&self) -> bool {
        self.name[0] == DIR_ENTRY_END
    }

    /// `BASE.EXT` rendering of the short name.
    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }

    /// Record a modification at `now`.
    pub fn touch(&mut self, now: &FatTimestamp) {
        self.write_time = now.time;
        self.write_date = now.date;
        self.last_access_date = now.date;
    }
}

/// Address of one directory record. `cluster == 0` on FAT12/16 means the
/// fixed root region, where `sector` counts from the start of that region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub cluster: u32,
    pub sector: u32,
    pub slot: u32,
}

/// What a sector scan is looking for.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotMatch<'a> {
    /// First record that is neither free nor the end marker.
    Any,
    /// Record with this short name (volume ids and long-name records never match).
    Name(&'a [u8; SHORT_NAME_LEN]),
    /// A deleted slot.
    Free,
    /// The end-of-entries marker.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotScan {
    Found(usize),
    /// Hit the end marker at this slot without a match.
    EndOfEntries(usize),
    /// Ran off the end of the sector.
    Exhausted,
}

/// Scan the records of one directory sector starting at slot `begin`.
pub(crate) fn scan_sector(sector: &[u8], want: SlotMatch<'_>, begin: usize) -> SlotScan {
    let slots = sector.len() / DIR_ENTRY_SIZE;
    for slot in begin..slots {
        let record = &sector[slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE];
        let marker = record[0];
        let hit = match want {
            SlotMatch::Any => marker != DIR_ENTRY_FREE && marker != DIR_ENTRY_END,
            SlotMatch::Name(name) => {
                &record[..SHORT_NAME_LEN] == name && record[11] & ATTR_VOLUME_ID == 0
            }
            SlotMatch::Free => marker == DIR_ENTRY_FREE,
            SlotMatch::End => marker == DIR_ENTRY_END,
        };
        if hit {
            return SlotScan::Found(slot);
        }
        if marker == DIR_ENTRY_END {
            return SlotScan::EndOfEntries(slot);
        }
    }
    SlotScan::Exhausted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertMode {
    /// Reuse a free slot or append at the end marker.
    Append,
    /// Write at slot 0 of the directory's first cluster and terminate it
    /// right after. Only used for the `.` record of a new directory.
    Overwrite,
}

impl<D: BlockDevice> FatFilesystem<D> {
    /// Where the records of `dir` start.
    pub(crate) fn dir_start(&self, dir: &Node) -> EntryLocation {
        let mut cluster = dir.entry.first_cluster();
        // `..` records point at cluster 0 when the parent is the root
        if cluster == 0 {
            if let Some(root) = self.bpb.root_cluster() {
                cluster = root;
            }
        }
        EntryLocation {
            cluster,
            sector: 0,
            slot: 0,
        }
    }

    pub(crate) fn ensure_directory(&self, node: &Node) -> Result<()> {
        if node.entry.is_directory() {
            Ok(())
        } else {
            Err(FatError::NotADirectory(node.entry.display_name()))
        }
    }

    /// Walk a directory from `begin` until a record matches `want`.
    ///
    /// Returns `None` when the end marker, the end of the fixed root region
    /// or the end of the cluster chain is reached first.
    pub(crate) fn find_slot(
        &mut self,
        begin: EntryLocation,
        want: SlotMatch<'_>,
    ) -> Result<Option<(EntryLocation, DirEntry)>> {
        let mut buf = self.sector_buf();
        let mut slot = begin.slot as usize;

        if self.is_fixed_root(begin.cluster) {
            for sector in begin.sector..self.bpb.root_dir_sectors() {
                let at = EntryLocation {
                    cluster: 0,
                    sector,
                    slot: 0,
                };
                self.read_entry_sector(&at, &mut buf)?;
                match scan_sector(&buf, want, slot) {
                    SlotScan::Found(i) => return Ok(Some(record_at(at, i, &buf))),
                    SlotScan::EndOfEntries(_) => return Ok(None),
                    SlotScan::Exhausted => slot = 0,
                }
            }
            return Ok(None);
        }

        if begin.cluster < 2 {
            return Err(FatError::Validation(format!(
                "directory starts at invalid cluster {}",
                begin.cluster
            )));
        }

        let spc = self.bpb.sectors_per_cluster as u32;
        let mut cluster = begin.cluster;
        let mut first_sector = begin.sector;
        for _ in 0..=self.bpb.count_of_clusters() {
            for sector in first_sector..spc {
                let at = EntryLocation {
                    cluster,
                    sector,
                    slot: 0,
                };
                self.read_entry_sector(&at, &mut buf)?;
                match scan_sector(&buf, want, slot) {
                    SlotScan::Found(i) => return Ok(Some(record_at(at, i, &buf))),
                    SlotScan::EndOfEntries(_) => return Ok(None),
                    SlotScan::Exhausted => slot = 0,
                }
            }
            first_sector = 0;

            let next = self.get_fat(cluster)?;
            if self.fat_type.ends_chain(next) {
                return Ok(None);
            }
            cluster = next;
        }
        Err(FatError::Validation(format!(
            "directory chain starting at {} does not terminate",
            begin.cluster
        )))
    }

    /// Find `name` in `parent`.
    pub fn lookup(&mut self, parent: &Node, name: &str) -> Result<Node> {
        self.ensure_directory(parent)?;
        let short = super::name::format_name(self.fat_type, name)?;
        let begin = self.dir_start(parent);
        match self.find_slot(begin, SlotMatch::Name(&short))? {
            Some((location, entry)) => Ok(Node {
                entry,
                location: Some(location),
            }),
            None => Err(FatError::NotFound(name.to_string())),
        }
    }

    /// True when `dir` holds anything besides `.` and `..`.
    pub(crate) fn has_children(&mut self, dir: &Node) -> Result<bool> {
        let mut begin = self.dir_start(dir);
        begin.slot = 2;
        Ok(self.find_slot(begin, SlotMatch::Any)?.is_some())
    }

    /// Overwrite the record at `location`.
    pub(crate) fn set_entry(&mut self, location: &EntryLocation, entry: &DirEntry) -> Result<()> {
        let mut buf = self.sector_buf();
        self.read_entry_sector(location, &mut buf)?;
        let off = location.slot as usize * DIR_ENTRY_SIZE;
        entry.encode(&mut buf[off..off + DIR_ENTRY_SIZE]);
        let sector = self.entry_sector(location);
        self.write_sector(sector, &buf)
    }

    /// Store `entry` in `parent` and return where it landed.
    pub(crate) fn insert_entry(
        &mut self,
        parent: &Node,
        entry: &DirEntry,
        mode: InsertMode,
    ) -> Result<EntryLocation> {
        let begin = self.dir_start(parent);
        let fixed_root = self.is_fixed_root(begin.cluster);

        if mode == InsertMode::Overwrite && !fixed_root {
            let at = begin;
            self.set_entry(&at, entry)?;
            self.set_entry(&EntryLocation { slot: 1, ..at }, &DirEntry::end_marker())?;
            return Ok(at);
        }

        if let Some((at, _)) = self.find_slot(begin, SlotMatch::Free)? {
            self.set_entry(&at, entry)?;
            return Ok(at);
        }

        let at = match self.find_slot(begin, SlotMatch::End)? {
            Some((at, _)) => at,
            None if fixed_root => {
                return Err(FatError::DirectoryFull(entry.display_name()));
            }
            None => {
                // every slot of the chain is in use: grow it
                let tail = self.last_cluster(begin.cluster)?;
                let cluster = self.extend_chain(tail)?;
                self.zero_cluster(cluster)?;
                EntryLocation {
                    cluster,
                    sector: 0,
                    slot: 0,
                }
            }
        };
        self.set_entry(&at, entry)?;

        match self.next_slot(at)? {
            Some(next) => self.set_entry(&next, &DirEntry::end_marker())?,
            None => debug!("root directory is now full"),
        }
        Ok(at)
    }

    /// The slot after `at`, crossing sectors and clusters. A cluster
    /// boundary moves to the existing successor or extends the chain.
    /// `None` when `at` was the last slot of the fixed root region.
    fn next_slot(&mut self, at: EntryLocation) -> Result<Option<EntryLocation>> {
        let mut next = EntryLocation {
            slot: at.slot + 1,
            ..at
        };
        if next.slot < self.entries_per_sector() {
            return Ok(Some(next));
        }
        next.slot = 0;
        next.sector += 1;

        if self.is_fixed_root(next.cluster) {
            return Ok((next.sector < self.bpb.root_dir_sectors()).then_some(next));
        }
        if next.sector < self.bpb.sectors_per_cluster as u32 {
            return Ok(Some(next));
        }

        let successor = self.get_fat(at.cluster)?;
        let cluster = if self.fat_type.ends_chain(successor) {
            let cluster = self.extend_chain(at.cluster)?;
            self.zero_cluster(cluster)?;
            debug!("directory grew into cluster {cluster}");
            cluster
        } else {
            successor
        };
        Ok(Some(EntryLocation {
            cluster,
            sector: 0,
            slot: 0,
        }))
    }

    /// Mark the record of `node` deleted. Clusters are left alone.
    pub(crate) fn remove_entry(&mut self, node: &mut Node) -> Result<()> {
        let location = node
            .location
            .ok_or_else(|| FatError::Unsupported("the root directory has no record".into()))?;
        node.entry.name[0] = DIR_ENTRY_FREE;
        self.set_entry(&location, &node.entry)
    }

    /// Lazily iterate the records of `dir`, skipping deleted slots and
    /// volume-id records. Each call starts over from the first record.
    pub fn read_dir(&mut self, dir: &Node) -> Result<ReadDir<'_, D>> {
        self.ensure_directory(dir)?;
        let start = self.dir_start(dir);
        if !self.is_fixed_root(start.cluster) && start.cluster < 2 {
            return Err(FatError::Validation(format!(
                "directory starts at invalid cluster {}",
                start.cluster
            )));
        }
        let buf = self.sector_buf();
        let clusters_left = self.bpb.count_of_clusters();
        Ok(ReadDir {
            fs: self,
            next: Some(start),
            buf,
            loaded: None,
            clusters_left,
        })
    }

    /// Collect [`read_dir`](Self::read_dir).
    pub fn list(&mut self, dir: &Node) -> Result<Vec<Node>> {
        self.read_dir(dir)?.collect()
    }
}

fn record_at(at: EntryLocation, slot: usize, sector: &[u8]) -> (EntryLocation, DirEntry) {
    let off = slot * DIR_ENTRY_SIZE;
    (
        EntryLocation {
            slot: slot as u32,
            ..at
        },
        DirEntry::parse(&sector[off..off + DIR_ENTRY_SIZE]),
    )
}

/// Iterator returned by [`FatFilesystem::read_dir`].
pub struct ReadDir<'a, D: BlockDevice> {
    fs: &'a mut FatFilesystem<D>,
    next: Option<EntryLocation>,
    buf: Vec<u8>,
    loaded: Option<(u32, u32)>,
    clusters_left: u32,
}

impl<D: BlockDevice> ReadDir<'_, D> {
    fn load(&mut self, at: &EntryLocation) -> Result<()> {
        if self.loaded != Some((at.cluster, at.sector)) {
            self.fs.read_entry_sector(at, &mut self.buf)?;
            self.loaded = Some((at.cluster, at.sector));
        }
        Ok(())
    }

    fn advance(&mut self, at: EntryLocation) -> Result<Option<EntryLocation>> {
        let mut next = EntryLocation {
            slot: at.slot + 1,
            ..at
        };
        if next.slot < self.fs.entries_per_sector() {
            return Ok(Some(next));
        }
        next.slot = 0;
        next.sector += 1;

        if self.fs.is_fixed_root(next.cluster) {
            return Ok((next.sector < self.fs.bpb.root_dir_sectors()).then_some(next));
        }
        if next.sector < self.fs.bpb.sectors_per_cluster as u32 {
            return Ok(Some(next));
        }

        if self.clusters_left == 0 {
            return Err(FatError::Validation(
                "directory chain does not terminate".into(),
            ));
        }
        self.clusters_left -= 1;
        let successor = self.fs.get_fat(at.cluster)?;
        if self.fs.fat_type.ends_chain(successor) {
            return Ok(None);
        }
        Ok(Some(EntryLocation {
            cluster: successor,
            sector: 0,
            slot: 0,
        }))
    }
}

impl<D: BlockDevice> Iterator for ReadDir<'_, D> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let at = self.next.take()?;
            if let Err(e) = self.load(&at) {
                return Some(Err(e));
            }
            let off = at.slot as usize * DIR_ENTRY_SIZE;
            let entry = DirEntry::parse(&self.buf[off..off + DIR_ENTRY_SIZE]);
            if entry.is_end() {
                return None;
            }
            match self.advance(at) {
                Ok(next) => self.next = next,
                Err(e) => return Some(Err(e)),
            }
            if entry.is_free() || entry.is_volume_id() {
                continue;
            }
            return Some(Ok(Node {
                entry,
                location: Some(at),
            }));
        }
    }
}
