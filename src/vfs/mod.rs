// self mods
mod free_map;
mod fs;

// use other mods

// use self mods

// reexport
pub(crate) use free_map::*;
pub use fs::*;
