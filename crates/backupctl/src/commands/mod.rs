//! Command implementations

pub mod backup;
pub mod profile;
pub mod progress;
