//! File contents: reading and writing through a file's cluster chain.
//!
//! Both directions walk the chain from the first cluster on every call.
//! A device fault part way through turns into a short count; it is only
//! reported as an error when nothing was transferred.

use log::warn;

use super::name::FatTimestamp;
use super::{FatFilesystem, Node};
use crate::device::BlockDevice;
use crate::error::{FatError, Result};

/// Largest file size a directory record can describe.
const MAX_FILE_SIZE: u64 = u32::MAX as u64;

impl<D: BlockDevice> FatFilesystem<D> {
    /// Read up to `buf.len()` bytes of `node` starting at `offset`.
    ///
    /// Returns the number of bytes copied, which is short at end of file.
    pub fn read(&mut self, node: &Node, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if node.entry.is_directory() {
            return Err(FatError::IsADirectory(node.entry.display_name()));
        }
        let size = node.entry.file_size as u64;
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let end = (offset + buf.len() as u64).min(size);

        let mut pos = offset;
        match self.read_span(node, offset, end, buf, &mut pos) {
            Ok(()) => Ok((pos - offset) as usize),
            Err(e) if pos == offset => Err(e),
            Err(e) => {
                warn!(
                    "short read of {}: {} of {} bytes ({e})",
                    node.entry.display_name(),
                    pos - offset,
                    end - offset
                );
                Ok((pos - offset) as usize)
            }
        }
    }

    fn read_span(
        &mut self,
        node: &Node,
        offset: u64,
        end: u64,
        buf: &mut [u8],
        pos: &mut u64,
    ) -> Result<()> {
        let bps = self.bytes_per_sector() as u64;
        let cluster_size = self.bytes_per_cluster() as u64;
        let mut sector = self.sector_buf();

        let mut cluster = node.entry.first_cluster();
        let mut seq = 0u64;

        while *pos < end {
            while seq < *pos / cluster_size {
                let next = self.get_fat(cluster)?;
                if self.fat_type.ends_chain(next) {
                    return Err(FatError::Validation(format!(
                        "cluster chain of {} ends before its size",
                        node.entry.display_name()
                    )));
                }
                cluster = next;
                seq += 1;
            }
            if cluster < 2 {
                return Err(FatError::Validation(format!(
                    "{} has data but no clusters",
                    node.entry.display_name()
                )));
            }

            let sector_in_cluster = ((*pos % cluster_size) / bps) as u32;
            let sector_offset = (*pos % bps) as usize;
            let copy = (bps as usize - sector_offset).min((end - *pos) as usize);

            let index = self.cluster_sector(cluster, sector_in_cluster);
            self.read_sector(index, &mut sector)?;

            let at = (*pos - offset) as usize;
            buf[at..at + copy].copy_from_slice(&sector[sector_offset..sector_offset + copy]);
            *pos += copy as u64;
        }
        Ok(())
    }

    /// Write `data` into `node` at `offset`, growing the chain as needed.
    ///
    /// A file without clusters gets its first one here. The file size
    /// becomes `max(offset + written, old size)` and the record is
    /// persisted once, after the data. Running out of space part way
    /// through returns the count written so far.
    pub fn write(&mut self, node: &mut Node, offset: u64, data: &[u8]) -> Result<usize> {
        if node.entry.is_directory() {
            return Err(FatError::IsADirectory(node.entry.display_name()));
        }
        let location = node
            .location
            .ok_or_else(|| FatError::Unsupported("the root directory has no data".into()))?;
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= MAX_FILE_SIZE);
        let Some(end) = end else {
            return Err(FatError::Unsupported(format!(
                "{} would exceed the 4 GiB file size limit",
                node.entry.display_name()
            )));
        };

        let mut pos = offset;
        let outcome = self.write_span(node, offset, end, data, &mut pos);

        let written = pos - offset;
        if written > 0 {
            node.entry.file_size = node.entry.file_size.max(pos as u32);
            node.entry.touch(&FatTimestamp::now());
        }
        // also persists a first cluster allocated before a failure
        self.set_entry(&location, &node.entry)?;

        match outcome {
            Ok(()) => Ok(written as usize),
            Err(e) if written == 0 => Err(e),
            Err(e) => {
                warn!(
                    "short write to {}: {written} of {} bytes ({e})",
                    node.entry.display_name(),
                    data.len()
                );
                Ok(written as usize)
            }
        }
    }

    fn write_span(
        &mut self,
        node: &mut Node,
        offset: u64,
        end: u64,
        data: &[u8],
        pos: &mut u64,
    ) -> Result<()> {
        let bps = self.bytes_per_sector() as u64;
        let cluster_size = self.bytes_per_cluster() as u64;
        let mut sector = self.sector_buf();

        // Writing past the end leaves a hole between the old size and
        // `offset`; it must read back as zeros.
        let old_size = node.entry.file_size as u64;
        let tail_seq = (offset > old_size && old_size % cluster_size != 0)
            .then_some(old_size / cluster_size);

        let mut cluster = node.entry.first_cluster();
        if cluster == 0 {
            cluster = self.alloc_chain()?;
            node.entry.set_first_cluster(cluster);
            if offset > 0 {
                self.zero_cluster(cluster)?;
            }
        }
        let mut seq = 0u64;
        self.clear_tail(cluster, seq, tail_seq, old_size, offset)?;

        while *pos < end {
            while seq < *pos / cluster_size {
                let next = self.get_fat(cluster)?;
                cluster = if self.fat_type.ends_chain(next) {
                    let grown = self.extend_chain(cluster)?;
                    if (seq + 1) * cluster_size < offset {
                        self.zero_cluster(grown)?;
                    }
                    grown
                } else {
                    next
                };
                seq += 1;
                self.clear_tail(cluster, seq, tail_seq, old_size, offset)?;
            }

            let sector_in_cluster = ((*pos % cluster_size) / bps) as u32;
            let sector_offset = (*pos % bps) as usize;
            let copy = (bps as usize - sector_offset).min((end - *pos) as usize);
            let index = self.cluster_sector(cluster, sector_in_cluster);

            if copy != bps as usize {
                self.read_sector(index, &mut sector)?;
            }
            let at = (*pos - offset) as usize;
            sector[sector_offset..sector_offset + copy].copy_from_slice(&data[at..at + copy]);
            self.write_sector(index, &sector)?;

            *pos += copy as u64;
        }
        Ok(())
    }

    /// Zero the bytes between the old end of file and `offset` when
    /// `cluster` (number `seq` in the chain) holds the old end.
    fn clear_tail(
        &mut self,
        cluster: u32,
        seq: u64,
        tail_seq: Option<u64>,
        old_size: u64,
        offset: u64,
    ) -> Result<()> {
        if tail_seq != Some(seq) {
            return Ok(());
        }
        let bps = self.bytes_per_sector() as u64;
        let cluster_size = self.bytes_per_cluster() as u64;
        let from = old_size % cluster_size;
        let to = if offset / cluster_size == seq {
            offset % cluster_size
        } else {
            cluster_size
        };

        let mut sector = self.sector_buf();
        let mut at = from;
        while at < to {
            let index = self.cluster_sector(cluster, (at / bps) as u32);
            let off = (at % bps) as usize;
            let len = (bps as usize - off).min((to - at) as usize);
            self.read_sector(index, &mut sector)?;
            sector[off..off + len].fill(0);
            self.write_sector(index, &sector)?;
            at += len as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::device::MemoryDevice;
    use crate::error::FatError;
    use crate::fs::fat::{format, FatFilesystem, FatType, Node};

    fn mounted(sectors: u64, fat_type: FatType) -> FatFilesystem<MemoryDevice> {
        let mut dev = MemoryDevice::in_memory(sectors, 512).unwrap();
        format(&mut dev, fat_type).unwrap();
        FatFilesystem::mount(dev).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    fn new_file(fs: &mut FatFilesystem<MemoryDevice>, name: &str) -> Node {
        let root = fs.root();
        fs.create(&root, name).unwrap()
    }

    #[test]
    fn test_multi_cluster_round_trip() {
        // 2880 sectors formats FAT12 with one sector per cluster
        let mut fs = mounted(2880, FatType::Fat12);
        assert_eq!(fs.bpb.sectors_per_cluster, 1);

        let mut file = new_file(&mut fs, "DATA.BIN");
        let data = pattern(5000);
        assert_eq!(fs.write(&mut file, 0, &data).unwrap(), 5000);
        assert_eq!(file.entry.file_size, 5000);

        let mut out = vec![0u8; 5000];
        assert_eq!(fs.read(&file, 0, &mut out).unwrap(), 5000);
        assert_eq!(out, data);

        // the persisted record matches the handle
        let root = fs.root();
        let reread = fs.lookup(&root, "DATA.BIN").unwrap();
        assert_eq!(reread.entry.file_size, 5000);
        assert_eq!(reread.entry.first_cluster(), file.entry.first_cluster());
    }

    #[test]
    fn test_read_clamps_to_size() {
        let mut fs = mounted(2880, FatType::Fat12);
        let mut file = new_file(&mut fs, "SHORT.TXT");
        fs.write(&mut file, 0, b"hello world").unwrap();

        let mut out = [0u8; 64];
        assert_eq!(fs.read(&file, 6, &mut out).unwrap(), 5);
        assert_eq!(&out[..5], b"world");
        assert_eq!(fs.read(&file, 11, &mut out).unwrap(), 0);
        assert_eq!(fs.read(&file, 100, &mut out).unwrap(), 0);
    }

    #[test]
    fn test_partial_overwrite_keeps_neighbours() {
        let mut fs = mounted(2880, FatType::Fat12);
        let mut file = new_file(&mut fs, "EDIT.TXT");
        let data = pattern(1500);
        fs.write(&mut file, 0, &data).unwrap();

        fs.write(&mut file, 510, b"XYZW").unwrap();
        assert_eq!(file.entry.file_size, 1500);

        let mut out = vec![0u8; 1500];
        fs.read(&file, 0, &mut out).unwrap();
        assert_eq!(&out[..510], &data[..510]);
        assert_eq!(&out[510..514], b"XYZW");
        assert_eq!(&out[514..], &data[514..]);
    }

    #[test]
    fn test_write_past_end_zero_fills_gap() {
        let mut fs = mounted(2880, FatType::Fat12);
        let mut file = new_file(&mut fs, "SPARSE.BIN");
        fs.write(&mut file, 0, b"abc").unwrap();
        fs.write(&mut file, 2000, b"xyz").unwrap();
        assert_eq!(file.entry.file_size, 2003);

        let mut out = vec![0xFFu8; 2003];
        assert_eq!(fs.read(&file, 0, &mut out).unwrap(), 2003);
        assert_eq!(&out[..3], b"abc");
        assert!(out[3..2000].iter().all(|&b| b == 0));
        assert_eq!(&out[2000..], b"xyz");
    }

    #[test]
    fn test_lazy_first_cluster() {
        let mut fs = mounted(2880, FatType::Fat12);
        let mut file = new_file(&mut fs, "EMPTY.TXT");
        assert_eq!(file.entry.first_cluster(), 0);
        let free_before = fs.free_cluster_count();

        fs.write(&mut file, 0, b"x").unwrap();
        assert_ne!(file.entry.first_cluster(), 0);
        assert_eq!(fs.free_cluster_count(), free_before - 1);
    }

    #[test]
    fn test_write_stops_when_space_runs_out() {
        let mut fs = mounted(2880, FatType::Fat12);
        let mut file = new_file(&mut fs, "BIG.BIN");
        // leave exactly two clusters
        while fs.free_cluster_count() > 2 {
            fs.alloc_cluster().unwrap();
        }
        let data = pattern(4 * 512);
        assert_eq!(fs.write(&mut file, 0, &data).unwrap(), 1024);
        assert_eq!(file.entry.file_size, 1024);

        // nothing left at all: the error surfaces
        assert!(matches!(
            fs.write(&mut file, 1024, &data),
            Err(FatError::NoFreeSpace)
        ));
    }

    #[test]
    fn test_write_beyond_size_limit_is_rejected() {
        let mut fs = mounted(2880, FatType::Fat12);
        let mut file = new_file(&mut fs, "HUGE.BIN");
        let free_before = fs.free_cluster_count();

        for offset in [u64::MAX - 1, u64::MAX, u32::MAX as u64] {
            assert!(matches!(
                fs.write(&mut file, offset, b"xyz"),
                Err(FatError::Unsupported(_))
            ));
        }
        assert_eq!(file.entry.file_size, 0);
        assert_eq!(file.entry.first_cluster(), 0);
        assert_eq!(fs.free_cluster_count(), free_before);
    }

    #[test]
    fn test_directory_data_is_rejected() {
        let mut fs = mounted(2880, FatType::Fat12);
        let root = fs.root();
        let mut dir = fs.mkdir(&root, "SUB").unwrap();
        let mut out = [0u8; 4];
        assert!(matches!(fs.read(&dir, 0, &mut out), Err(FatError::IsADirectory(_))));
        assert!(matches!(fs.write(&mut dir, 0, b"x"), Err(FatError::IsADirectory(_))));
    }
}
