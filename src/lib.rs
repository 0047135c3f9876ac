//! FAT12/16/32 filesystem engine over a sector-addressed block device.
//!
//! The engine mounts a volume, tracks free clusters, walks cluster chains
//! and edits directory records in place. See [`fs::fat::FatFilesystem`].

pub mod device;
pub mod error;
pub mod fs;

pub use device::{BlockDevice, ImageDevice, MemoryDevice};
pub use error::{FatError, Result};
pub use fs::fat::{FatFilesystem, FatType, Node};
