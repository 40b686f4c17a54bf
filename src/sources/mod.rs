//! Concrete byte sources

pub mod memory;
pub mod replay;
#[cfg(feature = "serial")]
pub mod serial;

pub use memory::MemorySource;
pub use replay::ReplaySource;
#[cfg(feature = "serial")]
pub use serial::SerialSource;
