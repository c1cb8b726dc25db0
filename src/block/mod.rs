// self mods
mod buffer;
mod device;

// use other mods

// use self mods

// reexports
pub use buffer::*;
pub use device::*;
