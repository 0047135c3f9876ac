use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context};

/// Sector-addressed storage the FAT engine reads and writes through.
///
/// Calls are blocking and are never retried by the engine; an error is
/// handed straight back to the caller of the filesystem operation.
pub trait BlockDevice {
    /// Size of one sector in bytes.
    fn bytes_per_sector(&self) -> u32;

    /// Number of sectors on the device.
    fn sector_count(&self) -> u64;

    /// Read sector `index` into `buf`. `buf` must hold at least one sector.
    fn read_sector(&mut self, index: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write one sector from the front of `data` to sector `index`.
    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn bytes_per_sector(&self) -> u32 {
        (**self).bytes_per_sector()
    }

    fn sector_count(&self) -> u64 {
        (**self).sector_count()
    }

    fn read_sector(&mut self, index: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_sector(index, buf)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        (**self).write_sector(index, data)
    }
}

/// A block device backed by a seekable byte image (raw disk image, file,
/// or in-memory buffer). The volume starts `partition_offset` bytes in.
pub struct ImageDevice<F> {
    inner: F,
    partition_offset: u64,
    bytes_per_sector: u32,
    sector_count: u64,
}

/// RAM-backed device, mostly for tests and scratch volumes.
pub type MemoryDevice = ImageDevice<Cursor<Vec<u8>>>;

impl<F: Read + Write + Seek> ImageDevice<F> {
    /// Wrap a whole image. The sector count is taken from the image length.
    pub fn new(mut inner: F, bytes_per_sector: u32) -> io::Result<Self> {
        check_sector_size(bytes_per_sector)?;
        let len = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            partition_offset: 0,
            bytes_per_sector,
            sector_count: len / bytes_per_sector as u64,
        })
    }

    /// Wrap a volume that lives `partition_offset` bytes into the image.
    pub fn with_partition(
        inner: F,
        partition_offset: u64,
        sector_count: u64,
        bytes_per_sector: u32,
    ) -> io::Result<Self> {
        check_sector_size(bytes_per_sector)?;
        Ok(Self {
            inner,
            partition_offset,
            bytes_per_sector,
            sector_count,
        })
    }

    /// Give back the underlying image.
    pub fn into_inner(self) -> F {
        self.inner
    }

    fn sector_offset(&self, index: u64) -> io::Result<u64> {
        if index >= self.sector_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "sector {index} is beyond the end of the device ({} sectors)",
                    self.sector_count
                ),
            ));
        }
        Ok(self.partition_offset + index * self.bytes_per_sector as u64)
    }
}

impl MemoryDevice {
    /// A zero-filled RAM device of `sector_count` sectors.
    pub fn in_memory(sector_count: u64, bytes_per_sector: u32) -> io::Result<Self> {
        check_sector_size(bytes_per_sector)?;
        let image = vec![0u8; (sector_count * bytes_per_sector as u64) as usize];
        Ok(Self {
            inner: Cursor::new(image),
            partition_offset: 0,
            bytes_per_sector,
            sector_count,
        })
    }
}

impl<F: Read + Write + Seek> BlockDevice for ImageDevice<F> {
    fn bytes_per_sector(&self) -> u32 {
        self.bytes_per_sector
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read_sector(&mut self, index: u64, buf: &mut [u8]) -> io::Result<()> {
        let offset = self.sector_offset(index)?;
        let len = self.bytes_per_sector as usize;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(&mut buf[..len])
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        let offset = self.sector_offset(index)?;
        let len = self.bytes_per_sector as usize;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(&data[..len])
    }
}

fn check_sector_size(bytes_per_sector: u32) -> io::Result<()> {
    if !matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported sector size: {bytes_per_sector}"),
        ));
    }
    Ok(())
}

/// Create (or truncate) a zero-filled image file of `sector_count` sectors.
pub fn create_image_file(
    path: &Path,
    sector_count: u64,
    bytes_per_sector: u32,
) -> anyhow::Result<ImageDevice<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.set_len(sector_count * bytes_per_sector as u64)
        .with_context(|| format!("failed to size {}", path.display()))?;
    ImageDevice::new(file, bytes_per_sector)
        .with_context(|| format!("failed to open {} as a block device", path.display()))
}

/// Open an existing image file read-write.
pub fn open_image_file(path: &Path, bytes_per_sector: u32) -> anyhow::Result<ImageDevice<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let device = ImageDevice::new(file, bytes_per_sector)
        .with_context(|| format!("failed to open {} as a block device", path.display()))?;
    if device.sector_count() == 0 {
        bail!("{} is smaller than one sector", path.display());
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_device_read_write() {
        let mut dev = MemoryDevice::in_memory(4, 512).unwrap();
        assert_eq!(dev.sector_count(), 4);

        let data = [0xA5u8; 512];
        dev.write_sector(2, &data).unwrap();

        let mut buf = [0u8; 512];
        dev.read_sector(2, &mut buf).unwrap();
        assert_eq!(buf, data);

        dev.read_sector(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_out_of_range_sector() {
        let mut dev = MemoryDevice::in_memory(2, 512).unwrap();
        let mut buf = [0u8; 512];
        let err = dev.read_sector(2, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_partition_offset() {
        let image = Cursor::new(vec![0u8; 4096]);
        let mut dev = ImageDevice::with_partition(image, 1024, 4, 512).unwrap();
        dev.write_sector(0, &[0x11u8; 512]).unwrap();

        let image = dev.into_inner().into_inner();
        assert!(image[..1024].iter().all(|&b| b == 0));
        assert!(image[1024..1536].iter().all(|&b| b == 0x11));
    }

    #[test]
    fn test_rejects_odd_sector_size() {
        assert!(MemoryDevice::in_memory(4, 500).is_err());
    }
}
