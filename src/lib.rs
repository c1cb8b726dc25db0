#![cfg_attr(not(test), no_std)]

// self mods
pub mod block;
pub mod configs;
pub mod error;
pub mod layout;
pub mod vfs;

// use other mods
#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

extern crate spin;

// reexports
pub use block::{BlockDevice, MemoryBlockDevice};
pub use error::{OFSError, Result};
pub use vfs::OutpostFileSystem;
