// self mods

// use other mods
use enum_group::EnumGroup;
use thiserror_no_std::Error;

// use self mods

#[derive(Error, EnumGroup, Debug)]
pub enum OFSError {
    #[groups(device)]
    #[error("Block {0} out of bounds")]
    BlockOutOfBounds(usize),

    #[groups(block)]
    #[error("Data out of bounds")]
    DataOutOfBounds,

    #[groups(vfs)]
    #[error("File system was already mounted")]
    AlreadyMounted,

    #[groups(vfs)]
    #[error("File system is not mounted")]
    NotMounted,

    #[groups(vfs)]
    #[error("Not valid file system magic number")]
    NotValidMagic,

    #[groups(vfs)]
    #[error("Not enough blocks in the device to format")]
    NoEnoughBlocks,

    #[groups(inode)]
    #[error("Inode number {0} out of range")]
    InumberOutOfRange(usize),

    #[groups(inode)]
    #[error("Inode {0} is not valid")]
    InodeNotValid(usize),

    #[groups(inode)]
    #[error("Inode area was exhausted")]
    InodeAreaExhausted,

    #[groups(others, core)]
    #[error("core error: {0}")]
    WriteFmtError(#[from] core::fmt::Error),
}

pub type Result<T> = core::result::Result<T, OFSError>;
