// # State Store Implementations
//
// This module provides implementations of the KnownStateStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
