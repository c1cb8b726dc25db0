// self mods
mod disk_inode;
mod super_block;

// use other mods

// use self mods

// reexport
pub use disk_inode::*;
pub use super_block::*;
