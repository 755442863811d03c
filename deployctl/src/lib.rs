pub mod config;
pub mod database;
pub mod deploy;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod overrides;
pub mod parameters;
pub mod platforms;
pub mod toggle;

#[cfg(test)]
mod testing;

pub use error::Error;
