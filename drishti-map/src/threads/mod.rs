//! Thread infrastructure for the mapping daemon.

mod mapper_thread;

pub use mapper_thread::{MapperThread, MapperThreadConfig};
