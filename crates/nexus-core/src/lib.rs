pub mod config;
pub mod error;
pub mod profile;
pub mod sanitize;
pub mod sentinel;
pub mod types;

pub use error::{NexusError, Result};
