use thiserror::Error;

use crate::fs::fat::FatType;

#[derive(Error, Debug)]
pub enum FatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Filesystem validation failed: {0}")]
    Validation(String),

    #[error("Volume of {sectors} sectors is out of range for {fat_type}")]
    SizeOutOfRange { sectors: u64, fat_type: FatType },

    #[error("No free clusters remain on the volume")]
    NoFreeSpace,

    #[error("Root directory is full: {0}")]
    DirectoryFull(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid 8.3 name: {0}")]
    InvalidName(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, FatError>;
